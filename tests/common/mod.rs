#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use xtrace::objects::MemoryReader;
use xtrace::runtime::{
    CallResult, ClassInfo, InvocationContext, InvocationListener, MainBundle, ManagedCall,
    ManagedRuntime, NativeRuntime, NativeSymbol, ObjectIntrospector, ObjectKind, ObjectRef,
    Overload, Replacement, Value,
};
use xtrace::{Error, Result};

/// Objects shared by both fake runtimes.
#[derive(Debug, Clone)]
pub enum FakeObject {
    Text { class: String, text: String },
    Broken { class: String },
    List { class: String, items: Vec<Option<u64>> },
    Set { class: String, members: u64 },
    Map { class: String, entries: Vec<(u64, Option<u64>)> },
}

impl FakeObject {
    pub fn text(class: &str, text: &str) -> Self {
        FakeObject::Text { class: class.into(), text: text.into() }
    }

    fn class(&self) -> &str {
        match self {
            FakeObject::Text { class, .. }
            | FakeObject::Broken { class }
            | FakeObject::List { class, .. }
            | FakeObject::Set { class, .. }
            | FakeObject::Map { class, .. } => class,
        }
    }
}

#[derive(Default)]
pub struct FakeHeap {
    objects: Mutex<HashMap<u64, FakeObject>>,
}

impl FakeHeap {
    pub fn put(&self, id: u64, object: FakeObject) {
        self.objects.lock().unwrap().insert(id, object);
    }

    fn get(&self, id: ObjectRef) -> Result<FakeObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::Runtime(format!("no object at {}", id)))
    }

    pub fn class_of(&self, id: ObjectRef) -> Result<String> {
        Ok(self.get(id)?.class().to_string())
    }
}

impl ObjectIntrospector for FakeHeap {
    fn kind_of(&self, object: ObjectRef) -> Result<ObjectKind> {
        Ok(match self.get(object)? {
            FakeObject::Map { .. } => ObjectKind::Dictionary,
            FakeObject::List { .. } => ObjectKind::Array,
            FakeObject::Set { .. } => ObjectKind::Set,
            FakeObject::Text { .. } | FakeObject::Broken { .. } => ObjectKind::Opaque,
        })
    }

    fn dictionary_keys(&self, dict: ObjectRef) -> Result<Vec<ObjectRef>> {
        match self.get(dict)? {
            FakeObject::Map { entries, .. } => Ok(entries.iter().map(|(k, _)| ObjectRef(*k)).collect()),
            _ => Err(Error::Runtime("not a map".into())),
        }
    }

    fn dictionary_value(&self, dict: ObjectRef, key: ObjectRef) -> Result<Option<ObjectRef>> {
        match self.get(dict)? {
            FakeObject::Map { entries, .. } => Ok(entries
                .iter()
                .find(|(k, _)| *k == key.0)
                .and_then(|(_, v)| v.map(ObjectRef))),
            _ => Err(Error::Runtime("not a map".into())),
        }
    }

    fn count(&self, array: ObjectRef) -> Result<usize> {
        match self.get(array)? {
            FakeObject::List { items, .. } => Ok(items.len()),
            _ => Err(Error::Runtime("not a list".into())),
        }
    }

    fn element_at(&self, array: ObjectRef, index: usize) -> Result<Option<ObjectRef>> {
        match self.get(array)? {
            FakeObject::List { items, .. } => Ok(items.get(index).copied().flatten().map(ObjectRef)),
            _ => Err(Error::Runtime("not a list".into())),
        }
    }

    fn set_members(&self, set: ObjectRef) -> Result<ObjectRef> {
        match self.get(set)? {
            FakeObject::Set { members, .. } => Ok(ObjectRef(members)),
            _ => Err(Error::Runtime("not a set".into())),
        }
    }

    fn describe(&self, object: ObjectRef) -> Result<String> {
        match self.get(object)? {
            FakeObject::Text { text, .. } => Ok(text),
            FakeObject::Broken { class } => {
                Err(Error::Runtime(format!("java.lang.NullPointerException in {}.toString", class)))
            }
            other => Ok(format!("<{}>", other.class())),
        }
    }
}

type HookKey = (String, String, Vec<String>);

/// In-memory managed VM: classes, overloads, swappable implementations.
#[derive(Default)]
pub struct FakeJvm {
    pub heap: FakeHeap,
    classes: Mutex<Vec<ClassInfo>>,
    overloads: Mutex<HashMap<(String, String), Vec<Overload>>>,
    hooks: Mutex<HashMap<HookKey, Replacement>>,
    app_create: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    pub stack: String,
}

impl FakeJvm {
    pub fn new() -> Self {
        Self {
            stack: "java.lang.Exception\n\tat com.example.Main.run(Main.java:10)\n\tat android.app.ActivityThread.main(ActivityThread.java:7000)".into(),
            ..Default::default()
        }
    }

    pub fn add_class(&self, name: &str, methods: &[(&str, Vec<Overload>)]) {
        self.classes.lock().unwrap().push(ClassInfo {
            name: name.into(),
            methods: methods.iter().map(|(m, _)| m.to_string()).collect(),
        });
        let mut overloads = self.overloads.lock().unwrap();
        for (method, list) in methods {
            overloads.insert((name.to_string(), method.to_string()), list.clone());
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }

    pub fn is_hooked(&self, class: &str, method: &str, params: &[&str]) -> bool {
        self.hooks.lock().unwrap().contains_key(&key(class, method, params))
    }

    /// Call through the installed replacement if any, else the original.
    pub fn invoke<F>(&self, class: &str, method: &str, params: &[&str], args: &[Value], original: F) -> CallResult
    where
        F: Fn(&[Value]) -> CallResult,
    {
        let hook = self.hooks.lock().unwrap().get(&key(class, method, params)).cloned();
        match hook {
            Some(replacement) => replacement(&ManagedCall { args, original: &original }),
            None => original(args),
        }
    }

    pub fn fire_application_create(&self) {
        let callbacks: Vec<_> = self.app_create.lock().unwrap().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }
}

fn key(class: &str, method: &str, params: &[&str]) -> HookKey {
    (class.to_string(), method.to_string(), params.iter().map(|s| s.to_string()).collect())
}

impl ObjectIntrospector for FakeJvm {
    fn kind_of(&self, object: ObjectRef) -> Result<ObjectKind> {
        self.heap.kind_of(object)
    }
    fn dictionary_keys(&self, dict: ObjectRef) -> Result<Vec<ObjectRef>> {
        self.heap.dictionary_keys(dict)
    }
    fn dictionary_value(&self, dict: ObjectRef, key: ObjectRef) -> Result<Option<ObjectRef>> {
        self.heap.dictionary_value(dict, key)
    }
    fn count(&self, array: ObjectRef) -> Result<usize> {
        self.heap.count(array)
    }
    fn element_at(&self, array: ObjectRef, index: usize) -> Result<Option<ObjectRef>> {
        self.heap.element_at(array, index)
    }
    fn set_members(&self, set: ObjectRef) -> Result<ObjectRef> {
        self.heap.set_members(set)
    }
    fn describe(&self, object: ObjectRef) -> Result<String> {
        self.heap.describe(object)
    }
}

impl ManagedRuntime for FakeJvm {
    fn loaded_classes(&self) -> Vec<ClassInfo> {
        self.classes.lock().unwrap().clone()
    }

    fn overloads(&self, class_name: &str, method: &str) -> Result<Vec<Overload>> {
        self.overloads
            .lock()
            .unwrap()
            .get(&(class_name.to_string(), method.to_string()))
            .cloned()
            .ok_or_else(|| Error::Runtime(format!("{}.{} not found", class_name, method)))
    }

    fn replace(&self, class_name: &str, method: &str, overload: &Overload, replacement: Replacement) -> Result<()> {
        let params: Vec<&str> = overload.parameter_types.iter().map(|s| s.as_str()).collect();
        self.hooks
            .lock()
            .unwrap()
            .insert(key(class_name, method, &params), replacement);
        Ok(())
    }

    fn class_name_of(&self, object: ObjectRef) -> Result<String> {
        self.heap.class_of(object)
    }

    fn stack_trace(&self) -> Result<String> {
        Ok(self.stack.clone())
    }

    fn on_application_create(&self, callback: Box<dyn FnOnce() + Send>) -> Result<()> {
        self.app_create.lock().unwrap().push(callback);
        Ok(())
    }
}

/// Base of the fake class table; every object's isa points in here.
pub const CLASS_BASE: u64 = 0x7000_0000;

/// In-memory native-object runtime with a sparse readable address space.
#[derive(Default)]
pub struct FakeObjc {
    pub heap: FakeHeap,
    memory: Mutex<HashMap<u64, u64>>,
    methods: Mutex<Vec<NativeSymbol>>,
    listeners: Mutex<HashMap<u64, Vec<Arc<dyn InvocationListener>>>>,
    pub bundle: Option<MainBundle>,
}

impl FakeObjc {
    pub fn new() -> Self {
        let objc = Self::default();
        objc.memory.lock().unwrap().insert(CLASS_BASE, 0);
        objc
    }

    pub fn add_method(&self, name: &str, address: u64) {
        self.methods.lock().unwrap().push(NativeSymbol { name: name.into(), address });
    }

    /// Register an object: its first word points at a readable class.
    pub fn add_object(&self, pointer: u64, object: FakeObject) {
        self.memory.lock().unwrap().insert(pointer, CLASS_BASE);
        self.heap.put(pointer, object);
    }

    pub fn write_word(&self, address: u64, word: u64) {
        self.memory.lock().unwrap().insert(address, word);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().values().map(|l| l.len()).sum()
    }

    /// Simulate one call of the method at `address`; `body` runs between the
    /// entry and exit callbacks.
    pub fn call_with<F: FnOnce()>(&self, address: u64, thread_id: u64, args: Vec<u64>, retval: u64, body: F) {
        let listeners = self.listeners.lock().unwrap().get(&address).cloned().unwrap_or_default();
        let ctx = InvocationContext { thread_id, args, cpu_context: 0 };
        for l in &listeners {
            l.on_enter(&ctx);
        }
        body();
        for l in &listeners {
            l.on_leave(&ctx, retval);
        }
    }

    pub fn call(&self, address: u64, thread_id: u64, args: Vec<u64>, retval: u64) {
        self.call_with(address, thread_id, args, retval, || {});
    }
}

impl MemoryReader for FakeObjc {
    fn read_u8(&self, address: u64) -> Option<u8> {
        self.memory.lock().unwrap().get(&address).map(|w| *w as u8)
    }

    fn read_pointer(&self, address: u64) -> Option<u64> {
        self.memory.lock().unwrap().get(&address).copied()
    }
}

impl ObjectIntrospector for FakeObjc {
    fn kind_of(&self, object: ObjectRef) -> Result<ObjectKind> {
        self.heap.kind_of(object)
    }
    fn dictionary_keys(&self, dict: ObjectRef) -> Result<Vec<ObjectRef>> {
        self.heap.dictionary_keys(dict)
    }
    fn dictionary_value(&self, dict: ObjectRef, key: ObjectRef) -> Result<Option<ObjectRef>> {
        self.heap.dictionary_value(dict, key)
    }
    fn count(&self, array: ObjectRef) -> Result<usize> {
        self.heap.count(array)
    }
    fn element_at(&self, array: ObjectRef, index: usize) -> Result<Option<ObjectRef>> {
        self.heap.element_at(array, index)
    }
    fn set_members(&self, set: ObjectRef) -> Result<ObjectRef> {
        self.heap.set_members(set)
    }
    fn describe(&self, object: ObjectRef) -> Result<String> {
        self.heap.describe(object)
    }
}

impl NativeRuntime for FakeObjc {
    fn methods(&self) -> Vec<NativeSymbol> {
        self.methods.lock().unwrap().clone()
    }

    fn attach(&self, address: u64, listener: Arc<dyn InvocationListener>) -> Result<()> {
        if address == 0 {
            return Err(Error::Runtime("cannot attach at null".into()));
        }
        self.listeners.lock().unwrap().entry(address).or_default().push(listener);
        Ok(())
    }

    fn backtrace(&self, _ctx: &InvocationContext) -> Vec<u64> {
        vec![0x1000_0010, 0x1000_0020]
    }

    fn symbolicate(&self, address: u64) -> String {
        format!("App!sym_{:x}", address)
    }

    fn main_bundle(&self) -> Option<MainBundle> {
        self.bundle.clone()
    }
}

/// Lines without the trailing banner and hooked-method listing noise.
pub fn trace_lines(lines: &[String]) -> Vec<String> {
    let start = lines
        .iter()
        .position(|l| l == xtrace::tracer::SEPARATOR || l.starts_with("/* TID"))
        .unwrap_or(lines.len());
    lines[start.saturating_sub(1)..].to_vec()
}
