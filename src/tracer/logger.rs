use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::TraceSink;
use crate::config::DepthScope;
use crate::Result;

pub const SEPARATOR: &str = "======================= xtrace =======================";

/// What is printed before an outermost (depth 0) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryHeader {
    /// Blank line, separator rule, blank line.
    Rule,
    /// Blank line, then `/* TID <tid> */`.
    ThreadId,
}

/// Identifier of the calling OS thread.
#[cfg(unix)]
pub fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

/// Nesting depth bookkeeping. Decrements floor at zero.
#[derive(Debug)]
enum DepthCounter {
    Global(AtomicUsize),
    PerThread(Mutex<HashMap<u64, usize>>),
}

impl DepthCounter {
    fn new(scope: DepthScope) -> Self {
        match scope {
            DepthScope::Global => DepthCounter::Global(AtomicUsize::new(0)),
            DepthScope::Thread => DepthCounter::PerThread(Mutex::new(HashMap::new())),
        }
    }

    fn get(&self, thread_id: u64) -> usize {
        match self {
            DepthCounter::Global(depth) => depth.load(Ordering::SeqCst),
            DepthCounter::PerThread(map) => map
                .lock()
                .map(|m| m.get(&thread_id).copied().unwrap_or(0))
                .unwrap_or(0),
        }
    }

    fn increment(&self, thread_id: u64) {
        match self {
            DepthCounter::Global(depth) => {
                depth.fetch_add(1, Ordering::SeqCst);
            }
            DepthCounter::PerThread(map) => {
                if let Ok(mut m) = map.lock() {
                    *m.entry(thread_id).or_insert(0) += 1;
                }
            }
        }
    }

    /// Returns the depth after decrementing.
    fn decrement(&self, thread_id: u64) -> usize {
        match self {
            DepthCounter::Global(depth) => {
                let previous = depth
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| Some(d.saturating_sub(1)))
                    .unwrap_or(0);
                previous.saturating_sub(1)
            }
            DepthCounter::PerThread(map) => {
                let Ok(mut m) = map.lock() else { return 0 };
                let remaining = m.get(&thread_id).copied().unwrap_or(0).saturating_sub(1);
                if remaining == 0 {
                    m.remove(&thread_id);
                } else {
                    m.insert(thread_id, remaining);
                }
                remaining
            }
        }
    }
}

/// Renders entry/exit events indented by call depth.
pub struct TraceLogger {
    sink: Arc<dyn TraceSink>,
    depth: DepthCounter,
    indent: String,
    header: EntryHeader,
    duration: bool,
    backtrace: bool,
}

impl TraceLogger {
    pub fn new(
        sink: Arc<dyn TraceSink>,
        scope: DepthScope,
        indent: &str,
        header: EntryHeader,
        duration: bool,
        backtrace: bool,
    ) -> Self {
        Self {
            sink,
            depth: DepthCounter::new(scope),
            indent: indent.to_string(),
            header,
            duration,
            backtrace,
        }
    }

    pub fn depth(&self, thread_id: u64) -> usize {
        self.depth.get(thread_id)
    }

    pub fn backtrace_enabled(&self) -> bool {
        self.backtrace
    }

    /// Emit a line without indentation.
    pub fn raw(&self, line: &str) {
        self.sink.emit(line);
    }

    /// Emit `msg` at the thread's current depth, one prefix per line.
    pub fn log(&self, thread_id: u64, msg: &str) {
        let prefix = self.indent.repeat(self.depth.get(thread_id));
        for line in msg.split('\n') {
            self.sink.emit(&format!("{}{}", prefix, line));
        }
    }

    /// Entry event: header at depth 0, signature, one line per argument, an
    /// optional backtrace block, then the depth goes up by one.
    ///
    /// `backtrace` is only invoked when backtraces are enabled.
    pub fn log_entry<F>(&self, thread_id: u64, signature: &str, args: &[String], backtrace: F)
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        if self.depth.get(thread_id) == 0 {
            match self.header {
                EntryHeader::Rule => {
                    self.raw("");
                    self.raw(SEPARATOR);
                    self.raw("");
                }
                EntryHeader::ThreadId => {
                    self.raw("");
                    self.raw(&format!("/* TID {} */", thread_id));
                }
            }
        }

        if self.duration {
            self.log(thread_id, &format!("{} start: {}", timestamp_ms(), signature));
        } else {
            self.log(thread_id, &format!("call: {}", signature));
        }
        for (index, arg) in args.iter().enumerate() {
            self.log(thread_id, &format!("arg{}: {}", index + 1, arg));
        }
        if self.backtrace {
            match backtrace() {
                Ok(frames) => {
                    self.log(thread_id, "Backtrace:");
                    for frame in frames {
                        self.log(thread_id, &format!("\t{}", frame));
                    }
                }
                Err(e) => self.log(thread_id, &format!("Backtrace: unavailable ({})", e)),
            }
        }

        self.depth.increment(thread_id);
    }

    /// Exit event: depth goes down first, then the rendered result.
    pub fn log_exit(&self, thread_id: u64, signature: &str, result: &str) {
        self.depth.decrement(thread_id);
        self.log(thread_id, &format!("return: {}", result));
        self.log_end(thread_id, signature);
    }

    /// Exit by exception.
    pub fn log_throw(&self, thread_id: u64, signature: &str, thrown: &str) {
        self.depth.decrement(thread_id);
        self.log(thread_id, &format!("throw: {}", thrown));
        self.log_end(thread_id, signature);
    }

    fn log_end(&self, thread_id: u64, signature: &str) {
        if self.duration {
            self.log(thread_id, &format!("{} end: {}", timestamp_ms(), signature));
        }
    }

    /// Entry event returning a guard that owns the matching exit.
    pub fn begin<F>(&self, thread_id: u64, signature: String, args: &[String], backtrace: F) -> CallFrame<'_>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        self.log_entry(thread_id, &signature, args, backtrace);
        CallFrame { logger: self, thread_id, signature, open: true }
    }
}

/// One active intercepted call. Dropping an unfinished frame (the original
/// call unwound) still restores the depth.
pub struct CallFrame<'a> {
    logger: &'a TraceLogger,
    thread_id: u64,
    signature: String,
    open: bool,
}

impl CallFrame<'_> {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn exit(mut self, result: &str) {
        self.open = false;
        self.logger.log_exit(self.thread_id, &self.signature, result);
    }

    pub fn throw(mut self, thrown: &str) {
        self.open = false;
        self.logger.log_throw(self.thread_id, &self.signature, thrown);
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        if self.open {
            self.logger.depth.decrement(self.thread_id);
        }
    }
}

fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
