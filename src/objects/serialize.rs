use std::collections::BTreeMap;

use serde::Serialize;

use crate::runtime::{ObjectIntrospector, ObjectKind, ObjectRef};
use crate::Result;

pub const CYCLE_MARKER: &str = "<cycle>";
pub const MAX_DEPTH_MARKER: &str = "<max depth>";

/// JSON-compatible snapshot of a runtime object graph. Leaves are always
/// strings: only the shape of containers is preserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StructuralValue {
    Null,
    Text(String),
    List(Vec<StructuralValue>),
    Map(BTreeMap<String, StructuralValue>),
}

impl StructuralValue {
    pub fn text(s: impl Into<String>) -> Self {
        StructuralValue::Text(s.into())
    }

    /// Single-line rendering for trace output.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "<unrenderable>".to_string())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "<unrenderable>".to_string())
    }
}

/// Converts runtime objects into [`StructuralValue`]s.
///
/// Rules, in order: null, dictionary (keys described, values recursed), array
/// (index order), set (its members as an array), anything else described.
/// A reference already on the current path renders as `"<cycle>"`; nesting
/// beyond `max_depth` renders as `"<max depth>"`.
pub struct ObjectSerializer<'a, R: ObjectIntrospector + ?Sized> {
    runtime: &'a R,
    max_depth: usize,
}

impl<'a, R: ObjectIntrospector + ?Sized> ObjectSerializer<'a, R> {
    pub fn new(runtime: &'a R, max_depth: usize) -> Self {
        Self { runtime, max_depth }
    }

    pub fn serialize(&self, object: Option<ObjectRef>) -> Result<StructuralValue> {
        let mut path = Vec::new();
        self.walk(object, 0, &mut path)
    }

    fn walk(
        &self,
        object: Option<ObjectRef>,
        depth: usize,
        path: &mut Vec<ObjectRef>,
    ) -> Result<StructuralValue> {
        let Some(object) = object else {
            return Ok(StructuralValue::Null);
        };
        if path.contains(&object) {
            return Ok(StructuralValue::text(CYCLE_MARKER));
        }
        if depth >= self.max_depth {
            return Ok(StructuralValue::text(MAX_DEPTH_MARKER));
        }

        path.push(object);
        let value = match self.runtime.kind_of(object)? {
            ObjectKind::Dictionary => self.dictionary(object, depth, path),
            ObjectKind::Array => self.array(object, depth, path),
            ObjectKind::Set => {
                let members = self.runtime.set_members(object)?;
                self.array(members, depth, path)
            }
            ObjectKind::Opaque => self.runtime.describe(object).map(StructuralValue::Text),
        };
        path.pop();
        value
    }

    fn dictionary(
        &self,
        dict: ObjectRef,
        depth: usize,
        path: &mut Vec<ObjectRef>,
    ) -> Result<StructuralValue> {
        let mut map = BTreeMap::new();
        for key in self.runtime.dictionary_keys(dict)? {
            let name = self.runtime.describe(key)?;
            let value = self.runtime.dictionary_value(dict, key)?;
            map.insert(name, self.walk(value, depth + 1, path)?);
        }
        Ok(StructuralValue::Map(map))
    }

    fn array(
        &self,
        array: ObjectRef,
        depth: usize,
        path: &mut Vec<ObjectRef>,
    ) -> Result<StructuralValue> {
        let count = self.runtime.count(array)?;
        let mut items = Vec::with_capacity(count);
        for index in 0..count {
            let element = self.runtime.element_at(array, index)?;
            items.push(self.walk(element, depth + 1, path)?);
        }
        Ok(StructuralValue::List(items))
    }
}
