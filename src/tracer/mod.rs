mod interceptor;
mod logger;
mod mode;
mod resolver;
mod sink;

pub use interceptor::{ManagedInterceptor, NativeInterceptor, HOOKED_HEADER};
pub use logger::{current_thread_id, CallFrame, EntryHeader, TraceLogger, SEPARATOR};
pub use mode::{ManagedMode, NativeMode, TargetRuntime, TraceState, Tracer};
pub use resolver::{
    resolve_managed, resolve_native, selector_arity, MatchTarget, MethodMatch, PatternMatcher,
    TracePattern, ALREADY_HOOKED_MARKER,
};
pub use sink::{BufferSink, ChannelSink, StdoutSink, TraceSink};
