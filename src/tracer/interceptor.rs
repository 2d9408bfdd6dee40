use std::sync::Arc;

use super::logger::current_thread_id;
use super::resolver::{selector_arity, MatchTarget, MethodMatch};
use super::TraceLogger;
use crate::config::FormatFailurePolicy;
use crate::objects::{looks_like_object, ObjectSerializer, StructuralValue};
use crate::runtime::{
    CallResult, InvocationContext, InvocationListener, ManagedCall, ManagedRuntime, NativeRuntime,
    ObjectRef, Overload, Replacement, Value,
};
use crate::Result;

pub const HOOKED_HEADER: &str = "Hooked methods:";

/// Installs entry/exit wrappers over every overload of managed methods.
pub struct ManagedInterceptor {
    runtime: Arc<dyn ManagedRuntime>,
    logger: Arc<TraceLogger>,
    on_format_failure: FormatFailurePolicy,
    max_depth: usize,
}

impl ManagedInterceptor {
    pub fn new(
        runtime: Arc<dyn ManagedRuntime>,
        logger: Arc<TraceLogger>,
        on_format_failure: FormatFailurePolicy,
        max_depth: usize,
    ) -> Self {
        Self { runtime, logger, on_format_failure, max_depth }
    }

    /// Wrap every overload of every match. Returns the number of wrappers
    /// installed; failures are logged and skipped.
    pub fn install(&self, matches: &[MethodMatch]) -> usize {
        self.logger.raw("");
        self.logger.raw(HOOKED_HEADER);

        let mut installed = 0;
        for m in matches {
            let MatchTarget::Overloads(overloads) = &m.target else {
                tracing::warn!("{} is not a managed method, skipping", m.qualified_name());
                continue;
            };
            let mut wrapped = 0;
            for overload in overloads {
                let wrapper = Arc::new(OverloadWrapper {
                    runtime: self.runtime.clone(),
                    logger: self.logger.clone(),
                    class_name: m.class_name.clone(),
                    method: m.method_name.clone(),
                    overload: overload.clone(),
                    on_format_failure: self.on_format_failure,
                    max_depth: self.max_depth,
                });
                let replacement = as_replacement(move |call| wrapper.invoke(call));
                match self.runtime.replace(&m.class_name, &m.method_name, overload, replacement) {
                    Ok(()) => wrapped += 1,
                    Err(e) => tracing::warn!(
                        "Failed to wrap {}({}): {}",
                        m.qualified_name(),
                        overload.parameter_types.join(", "),
                        e
                    ),
                }
            }
            if wrapped > 1 {
                self.logger.raw(&format!("{} overloads x {}", m.qualified_name(), wrapped));
            } else if wrapped == 1 {
                self.logger.raw(&m.qualified_name());
            }
            installed += wrapped;
        }

        tracing::info!("Installed {} managed wrappers", installed);
        installed
    }
}

fn as_replacement<F>(f: F) -> Replacement
where
    F: Fn(&ManagedCall<'_>) -> CallResult + Send + Sync + 'static,
{
    Arc::new(f)
}

struct OverloadWrapper {
    runtime: Arc<dyn ManagedRuntime>,
    logger: Arc<TraceLogger>,
    class_name: String,
    method: String,
    overload: Overload,
    on_format_failure: FormatFailurePolicy,
    max_depth: usize,
}

impl OverloadWrapper {
    fn invoke(&self, call: &ManagedCall<'_>) -> CallResult {
        let thread_id = current_thread_id();

        let frame = match self.format_entry(call.args) {
            Ok((signature, args)) => Some(self.logger.begin(thread_id, signature, &args, || {
                let trace = self.runtime.stack_trace()?;
                Ok(trace
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect())
            })),
            Err(e) => {
                let target = format!("{}.{}", self.class_name, self.method);
                self.logger.log(thread_id, &format!("error: failed to trace {}: {}", target, e));
                tracing::warn!("Entry formatting failed for {}: {}", target, e);
                if self.on_format_failure == FormatFailurePolicy::SkipCall {
                    return Ok(self.skipped_value());
                }
                None
            }
        };

        let result = call.call_original();

        if let Some(frame) = frame {
            match &result {
                Ok(value) => {
                    let rendered = self
                        .render(value)
                        .unwrap_or_else(|e| format!("<unformattable: {}>", e));
                    frame.exit(&rendered);
                }
                Err(thrown) => frame.throw(&thrown.to_string()),
            }
        }
        result
    }

    fn format_entry(&self, args: &[Value]) -> Result<(String, Vec<String>)> {
        let signature = self.signature(args)?;
        let rendered = args.iter().map(|a| self.render(a)).collect::<Result<Vec<_>>>()?;
        Ok((signature, rendered))
    }

    /// `Class.method(type, type)`: runtime class names for objects, declared
    /// types for primitives.
    fn signature(&self, args: &[Value]) -> Result<String> {
        let mut types = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let ty = match arg {
                Value::Object(obj) => self.runtime.class_name_of(*obj)?,
                Value::Null | Value::Str(_) => arg.placeholder_type().to_string(),
                _ => self
                    .overload
                    .parameter_types
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| arg.placeholder_type().to_string()),
            };
            types.push(ty);
        }
        Ok(format!("{}.{}({})", self.class_name, self.method, types.join(", ")))
    }

    fn render(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => "null".to_string(),
            Value::Void => "void".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Str(s) => s.clone(),
            Value::Object(obj) => {
                match ObjectSerializer::new(&*self.runtime, self.max_depth).serialize(Some(*obj))? {
                    StructuralValue::Text(s) => s,
                    structured => structured.to_json(),
                }
            }
        })
    }

    fn skipped_value(&self) -> Value {
        if self.overload.return_type == "void" {
            Value::Void
        } else {
            Value::Null
        }
    }
}

/// Attaches entry/exit listeners at native method addresses.
pub struct NativeInterceptor {
    runtime: Arc<dyn NativeRuntime>,
    logger: Arc<TraceLogger>,
    max_depth: usize,
}

impl NativeInterceptor {
    pub fn new(runtime: Arc<dyn NativeRuntime>, logger: Arc<TraceLogger>, max_depth: usize) -> Self {
        Self { runtime, logger, max_depth }
    }

    pub fn install(&self, matches: &[MethodMatch]) -> usize {
        self.logger.raw("");
        self.logger.raw(HOOKED_HEADER);

        let mut installed = 0;
        for m in matches {
            let MatchTarget::Address { address, symbol } = &m.target else {
                tracing::warn!("{} has no native address, skipping", m.qualified_name());
                continue;
            };
            let listener = Arc::new(NativeListener {
                runtime: self.runtime.clone(),
                logger: self.logger.clone(),
                name: symbol.clone(),
                arity: selector_arity(symbol),
                max_depth: self.max_depth,
            });
            match self.runtime.attach(*address, listener) {
                Ok(()) => {
                    self.logger.raw(symbol);
                    installed += 1;
                }
                Err(e) => tracing::warn!("Failed to attach {} at {:#x}: {}", symbol, address, e),
            }
        }

        tracing::info!("Attached {} native listeners", installed);
        installed
    }
}

struct NativeListener {
    runtime: Arc<dyn NativeRuntime>,
    logger: Arc<TraceLogger>,
    name: String,
    arity: usize,
    max_depth: usize,
}

impl NativeListener {
    /// Real arguments: skip receiver and selector, keep one slot per `:`.
    fn real_args<'a>(&self, ctx: &'a InvocationContext) -> &'a [u64] {
        let start = ctx.args.len().min(2);
        let end = ctx.args.len().min(2 + self.arity);
        &ctx.args[start..end]
    }

    fn render(&self, pointer: u64) -> String {
        if !looks_like_object(&*self.runtime, pointer) {
            return format!("{:#x}", pointer);
        }
        match ObjectSerializer::new(&*self.runtime, self.max_depth).serialize(Some(ObjectRef(pointer))) {
            Ok(value) => value.to_json(),
            Err(e) => {
                tracing::debug!("Serializing {:#x} failed: {}", pointer, e);
                format!("{:#x} <unformattable: {}>", pointer, e)
            }
        }
    }
}

impl InvocationListener for NativeListener {
    fn on_enter(&self, ctx: &InvocationContext) {
        let args: Vec<String> = self.real_args(ctx).iter().map(|p| self.render(*p)).collect();
        self.logger.log_entry(ctx.thread_id, &self.name, &args, || {
            Ok(self
                .runtime
                .backtrace(ctx)
                .into_iter()
                .map(|addr| self.runtime.symbolicate(addr))
                .collect())
        });
    }

    fn on_leave(&self, ctx: &InvocationContext, retval: u64) {
        let rendered = self.render(retval);
        self.logger.log_exit(ctx.thread_id, &self.name, &rendered);
    }
}
