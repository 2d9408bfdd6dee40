use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Destination for operator-facing trace lines. Emitting is synchronous and
/// best-effort: a sink never blocks the traced thread and never fails it.
pub trait TraceSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes every line to standard output.
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&self, line: &str) {
        println!("{}", line);
    }
}

/// Forwards lines over a bounded channel. Lines are dropped when the receiver
/// falls behind or has gone away.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx, dropped: AtomicU64::new(0) }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TraceSink for ChannelSink {
    fn emit(&self, line: &str) {
        if self.tx.try_send(line.to_string()).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total.is_power_of_two() {
                tracing::warn!("Trace channel full or closed, {} lines dropped so far", total);
            }
        }
    }
}

/// Keeps every line in memory.
#[derive(Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl TraceSink for BufferSink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
