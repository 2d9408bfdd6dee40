use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::interceptor::{ManagedInterceptor, NativeInterceptor};
use super::logger::{EntryHeader, TraceLogger};
use super::resolver::{resolve_managed, resolve_native};
use super::TraceSink;
use crate::config::SessionConfig;
use crate::objects::{ObjectSerializer, StructuralValue};
use crate::runtime::{ManagedRuntime, NativeRuntime, ObjectRef};
use crate::Result;

/// Lifecycle of a tracing session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceState {
    Uninitialized,
    ResolvingMethods,
    Intercepting,
    Tracing,
}

#[derive(Debug)]
struct StateCell(Mutex<TraceState>);

impl StateCell {
    fn new() -> Self {
        Self(Mutex::new(TraceState::Uninitialized))
    }

    fn get(&self) -> TraceState {
        self.0.lock().map(|s| *s).unwrap_or(TraceState::Tracing)
    }

    /// Move to `next` if it is ahead of the current state.
    fn advance(&self, next: TraceState) -> bool {
        let Ok(mut state) = self.0.lock() else { return false };
        if next <= *state {
            return false;
        }
        tracing::debug!("Trace state {:?} -> {:?}", *state, next);
        *state = next;
        true
    }
}

/// The runtime found in the target, if any.
pub enum TargetRuntime {
    Managed(Arc<dyn ManagedRuntime>),
    Native(Arc<dyn NativeRuntime>),
    Unavailable,
}

/// A started tracing session.
pub enum Tracer {
    Managed(ManagedMode),
    Native(NativeMode),
    Idle,
}

impl Tracer {
    /// Pick the mode for `runtime` and start it. Managed wins over native.
    pub fn start(config: SessionConfig, runtime: TargetRuntime, sink: Arc<dyn TraceSink>) -> Result<Self> {
        match runtime {
            TargetRuntime::Managed(rt) => {
                let mode = ManagedMode::new(config, rt, sink);
                mode.start()?;
                Ok(Tracer::Managed(mode))
            }
            TargetRuntime::Native(rt) => {
                let mode = NativeMode::new(config, rt, sink);
                mode.start();
                Ok(Tracer::Native(mode))
            }
            TargetRuntime::Unavailable => {
                sink.emit("No managed or native-object runtime found, nothing to trace");
                Ok(Tracer::Idle)
            }
        }
    }

    pub fn state(&self) -> TraceState {
        match self {
            Tracer::Managed(m) => m.state(),
            Tracer::Native(n) => n.state(),
            Tracer::Idle => TraceState::Uninitialized,
        }
    }
}

fn emit_banner(sink: &dyn TraceSink, title: &str, config: &SessionConfig, with_spawn: bool) {
    sink.emit("");
    sink.emit(&format!("{} init:", title));
    sink.emit(&format!("\tinclude_method: {}", config.patterns_display()));
    sink.emit(&format!("\tbacktrace: {}", config.backtrace));
    sink.emit(&format!("\tduration: {}", config.duration));
    if with_spawn {
        sink.emit(&format!("\tspawn: {}", config.spawn));
    }
}

struct ManagedInner {
    config: SessionConfig,
    runtime: Arc<dyn ManagedRuntime>,
    sink: Arc<dyn TraceSink>,
    logger: Arc<TraceLogger>,
    state: StateCell,
    installed: AtomicUsize,
}

/// Managed runtime session. In spawn mode instrumentation waits for the
/// application object to be created so late-loaded classes resolve.
#[derive(Clone)]
pub struct ManagedMode {
    inner: Arc<ManagedInner>,
}

impl ManagedMode {
    pub fn new(config: SessionConfig, runtime: Arc<dyn ManagedRuntime>, sink: Arc<dyn TraceSink>) -> Self {
        let logger = Arc::new(TraceLogger::new(
            sink.clone(),
            config.settings.depth_scope,
            &config.settings.indent,
            EntryHeader::Rule,
            config.duration,
            config.backtrace,
        ));
        Self {
            inner: Arc::new(ManagedInner {
                config,
                runtime,
                sink,
                logger,
                state: StateCell::new(),
                installed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        emit_banner(&*inner.sink, "ManagedMode", &inner.config, true);

        if inner.config.spawn {
            tracing::info!("Spawn mode: deferring instrumentation until application create");
            let mode = self.clone();
            inner.runtime.on_application_create(Box::new(move || {
                mode.instrument();
            }))
        } else {
            self.instrument();
            Ok(())
        }
    }

    /// Resolve and wrap. Runs at most once per session.
    fn instrument(&self) {
        let inner = &self.inner;
        if !inner.state.advance(TraceState::ResolvingMethods) {
            return;
        }
        let matches = resolve_managed(&*inner.runtime, &inner.config.include_methods);

        inner.state.advance(TraceState::Intercepting);
        let interceptor = ManagedInterceptor::new(
            inner.runtime.clone(),
            inner.logger.clone(),
            inner.config.settings.on_format_failure,
            inner.config.settings.serializer_max_depth,
        );
        let installed = interceptor.install(&matches);
        inner.installed.store(installed, Ordering::SeqCst);

        inner.state.advance(TraceState::Tracing);
    }

    pub fn state(&self) -> TraceState {
        self.inner.state.get()
    }

    /// Number of overload wrappers installed.
    pub fn installed(&self) -> usize {
        self.inner.installed.load(Ordering::SeqCst)
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.inner.logger
    }
}

/// Key application paths, in display order.
#[derive(Debug, Serialize)]
struct AppInfo {
    #[serde(rename = "Name")]
    name: StructuralValue,
    #[serde(rename = "Bundle ID")]
    bundle_id: Option<String>,
    #[serde(rename = "Version")]
    version: StructuralValue,
    #[serde(rename = "Bundle")]
    bundle: Option<String>,
    #[serde(rename = "Data")]
    data: Option<String>,
    #[serde(rename = "Binary")]
    binary: Option<String>,
}

/// Native-object runtime session. Always instruments immediately, after a
/// one-shot dump of bundle metadata.
pub struct NativeMode {
    config: SessionConfig,
    runtime: Arc<dyn NativeRuntime>,
    sink: Arc<dyn TraceSink>,
    logger: Arc<TraceLogger>,
    state: StateCell,
    installed: AtomicUsize,
}

impl NativeMode {
    pub fn new(config: SessionConfig, runtime: Arc<dyn NativeRuntime>, sink: Arc<dyn TraceSink>) -> Self {
        let logger = Arc::new(TraceLogger::new(
            sink.clone(),
            config.settings.depth_scope,
            &config.settings.indent,
            EntryHeader::ThreadId,
            config.duration,
            config.backtrace,
        ));
        Self {
            config,
            runtime,
            sink,
            logger,
            state: StateCell::new(),
            installed: AtomicUsize::new(0),
        }
    }

    pub fn start(&self) {
        emit_banner(&*self.sink, "NativeMode", &self.config, false);
        self.dump_metadata();

        if !self.state.advance(TraceState::ResolvingMethods) {
            return;
        }
        let matches = resolve_native(&*self.runtime, &self.config.include_methods);

        self.state.advance(TraceState::Intercepting);
        let interceptor = NativeInterceptor::new(
            self.runtime.clone(),
            self.logger.clone(),
            self.config.settings.serializer_max_depth,
        );
        self.installed.store(interceptor.install(&matches), Ordering::SeqCst);

        self.state.advance(TraceState::Tracing);
    }

    fn dump_metadata(&self) {
        let Some(bundle) = self.runtime.main_bundle() else {
            tracing::warn!("No main bundle, skipping metadata dump");
            return;
        };
        let serializer = ObjectSerializer::new(&*self.runtime, self.config.settings.serializer_max_depth);

        let info = AppInfo {
            name: self.info_lookup(bundle.info_dictionary, "CFBundleName"),
            bundle_id: bundle.identifier,
            version: self.info_lookup(bundle.info_dictionary, "CFBundleVersion"),
            bundle: bundle.bundle_path,
            data: bundle.home_directory,
            binary: bundle.executable_path,
        };
        self.sink.emit("");
        self.sink.emit("Dump key app paths and metadata:");
        match serde_json::to_string_pretty(&info) {
            Ok(json) => self.sink.emit(&json),
            Err(e) => tracing::warn!("Cannot render app info: {}", e),
        }

        self.sink.emit("");
        self.sink.emit("Contents of Info.plist:");
        let plist = match bundle.info_dictionary {
            Some(dict) => serializer.serialize(Some(dict)).unwrap_or_else(|e| {
                tracing::warn!("Cannot serialize Info.plist: {}", e);
                StructuralValue::Null
            }),
            None => StructuralValue::Null,
        };
        self.sink.emit(&plist.to_json_pretty());
    }

    /// Value stored under `key` in the info dictionary, null when absent.
    fn info_lookup(&self, info: Option<ObjectRef>, key: &str) -> StructuralValue {
        let Some(dict) = info else { return StructuralValue::Null };
        let serializer = ObjectSerializer::new(&*self.runtime, self.config.settings.serializer_max_depth);
        let lookup = || -> Result<StructuralValue> {
            for candidate in self.runtime.dictionary_keys(dict)? {
                if self.runtime.describe(candidate)? == key {
                    let value = self.runtime.dictionary_value(dict, candidate)?;
                    return serializer.serialize(value);
                }
            }
            Ok(StructuralValue::Null)
        };
        lookup().unwrap_or_else(|e| {
            tracing::warn!("Info.plist lookup of {} failed: {}", key, e);
            StructuralValue::Null
        })
    }

    pub fn state(&self) -> TraceState {
        self.state.get()
    }

    pub fn installed(&self) -> usize {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.logger
    }
}
