use std::sync::Arc;

use super::{ObjectIntrospector, ObjectRef};
use crate::objects::MemoryReader;
use crate::Result;

/// A method implementation found in the native-object runtime, e.g.
/// `-[NSURLSession dataTaskWithRequest:completionHandler:]` at its IMP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSymbol {
    pub name: String,
    pub address: u64,
}

/// Raw state of one intercepted native call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub thread_id: u64,
    /// Raw argument slots in calling-convention order: receiver, selector,
    /// then the real arguments.
    pub args: Vec<u64>,
    /// Opaque CPU context handle, used to walk the stack.
    pub cpu_context: u64,
}

/// Entry/exit callbacks attached at a code address.
pub trait InvocationListener: Send + Sync {
    fn on_enter(&self, ctx: &InvocationContext);
    fn on_leave(&self, ctx: &InvocationContext, retval: u64);
}

/// Main bundle metadata of the traced application.
#[derive(Debug, Clone, Default)]
pub struct MainBundle {
    pub identifier: Option<String>,
    pub bundle_path: Option<String>,
    pub executable_path: Option<String>,
    pub home_directory: Option<String>,
    pub info_dictionary: Option<ObjectRef>,
}

/// A message-passing object runtime where methods resolve to addresses.
pub trait NativeRuntime: MemoryReader + ObjectIntrospector {
    /// Every method implementation currently registered.
    fn methods(&self) -> Vec<NativeSymbol>;

    fn attach(&self, address: u64, listener: Arc<dyn InvocationListener>) -> Result<()>;

    /// Return addresses of the intercepted thread, innermost first.
    fn backtrace(&self, ctx: &InvocationContext) -> Vec<u64>;

    /// Symbolic name for a code address, e.g. `Foundation!-[NSString length]`.
    fn symbolicate(&self, address: u64) -> String;

    fn main_bundle(&self) -> Option<MainBundle>;
}
