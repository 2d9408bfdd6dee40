//! Bridge between the tracer and a live target runtime.
//!
//! The tracer never touches a VM or the native object runtime directly. A host
//! integration implements [`ManagedRuntime`] or [`NativeRuntime`] on top of
//! its own memory/symbol access layer, and everything above this module is
//! written against these traits.

mod managed;
mod native;

pub use managed::{ClassInfo, ManagedCall, ManagedRuntime, Overload, Replacement};
pub use native::{InvocationContext, InvocationListener, MainBundle, NativeRuntime, NativeSymbol};

use std::fmt;

use crate::Result;

/// Identity of an object living in the target runtime (a managed handle or a
/// native object pointer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A single argument or return value crossing an intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Object(ObjectRef),
}

impl Value {
    /// Type placeholder used in signatures when no runtime class lookup applies.
    pub fn placeholder_type(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Void => "void",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "long",
            Value::Float(_) => "double",
            Value::Char(_) => "char",
            Value::Str(_) => "java.lang.String",
            Value::Object(_) => "java.lang.Object",
        }
    }
}

/// Exception raised by the target application. Wrappers hand it back to the
/// caller unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    pub class_name: String,
    pub message: String,
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}

/// Outcome of invoking an original method.
pub type CallResult = std::result::Result<Value, Thrown>;

/// Structural category of a runtime object, checked in this order by the
/// serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Dictionary,
    Array,
    Set,
    Opaque,
}

/// Read-only object introspection. Every call may fail because it runs code
/// inside the target (a `toString` that throws, a deallocated object, ...).
pub trait ObjectIntrospector: Send + Sync {
    fn kind_of(&self, object: ObjectRef) -> Result<ObjectKind>;

    /// Keys of a dictionary-like object.
    fn dictionary_keys(&self, dict: ObjectRef) -> Result<Vec<ObjectRef>>;

    /// Value stored under `key`, `None` for a null entry.
    fn dictionary_value(&self, dict: ObjectRef, key: ObjectRef) -> Result<Option<ObjectRef>>;

    /// Element count of an array-like object.
    fn count(&self, array: ObjectRef) -> Result<usize>;

    fn element_at(&self, array: ObjectRef, index: usize) -> Result<Option<ObjectRef>>;

    /// Array-like view of a set's members.
    fn set_members(&self, set: ObjectRef) -> Result<ObjectRef>;

    /// Default string representation (`toString`, `description`).
    fn describe(&self, object: ObjectRef) -> Result<String>;
}
