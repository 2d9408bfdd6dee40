use std::sync::Arc;

use super::{CallResult, ObjectIntrospector, ObjectRef, Value};
use crate::Result;

/// A loaded class and the names of the methods it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub methods: Vec<String>,
}

/// One overload of a managed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overload {
    pub parameter_types: Vec<String>,
    pub return_type: String,
}

impl Overload {
    pub fn new(parameter_types: &[&str], return_type: &str) -> Self {
        Self {
            parameter_types: parameter_types.iter().map(|s| s.to_string()).collect(),
            return_type: return_type.to_string(),
        }
    }

    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }
}

/// A call reaching a replacement implementation: the original arguments and a
/// handle to the original implementation bound to the same receiver.
pub struct ManagedCall<'a> {
    pub args: &'a [Value],
    pub original: &'a dyn Fn(&[Value]) -> CallResult,
}

impl ManagedCall<'_> {
    pub fn call_original(&self) -> CallResult {
        (self.original)(self.args)
    }
}

/// Replacement implementation installed over one overload.
pub type Replacement = Arc<dyn Fn(&ManagedCall<'_>) -> CallResult + Send + Sync>;

/// A managed (VM-hosted) runtime with named classes and overload resolution.
pub trait ManagedRuntime: ObjectIntrospector {
    /// Snapshot of the classes currently loaded.
    fn loaded_classes(&self) -> Vec<ClassInfo>;

    fn overloads(&self, class_name: &str, method: &str) -> Result<Vec<Overload>>;

    /// Swap the implementation of one overload. Performed once per overload.
    fn replace(
        &self,
        class_name: &str,
        method: &str,
        overload: &Overload,
        replacement: Replacement,
    ) -> Result<()>;

    /// Runtime class name of an object reference.
    fn class_name_of(&self, object: ObjectRef) -> Result<String>;

    /// Stack trace of the calling thread, rendered by the runtime.
    fn stack_trace(&self) -> Result<String>;

    /// Run `callback` once, when the application object has been created.
    fn on_application_create(&self, callback: Box<dyn FnOnce() + Send>) -> Result<()>;
}
