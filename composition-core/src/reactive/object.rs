//! Reactive objects.
//!
//! [`PlainObject`] is a shared, insertion-ordered bag of properties. A
//! property holds a JSON value, a reactive reference, a nested plain object
//! or an existing reactive view.
//!
//! [`reactive`] builds a [`ReactiveObject`] over a plain object: a view that
//! mirrors the source's keys and hides the references inside it. How each
//! key behaves is decided once, from what the source held when the view was
//! built:
//!
//! - a reference: reads and writes go through to the reference itself,
//! - an object: reads return the *current* source object, wrapped again on
//!   every read when the view is deep, so replacing it wholesale is seen,
//! - anything else: reads and writes go to the source property.
//!
//! Source properties that are not writable produce read-only keys.
//!
//! Reads of object and plain keys track `(source, key)`, and writes that
//! change a source property trigger it, so effects can depend on plain
//! fields as well as on refs.
//!
//! ```rust,ignore
//! let count = use_ref(json!(0));
//! let state = reactive(
//!     PlainObject::new()
//!         .with("count", count.clone())
//!         .with("label", json!("clicks")),
//! );
//!
//! state.set("count", json!(3))?;
//! assert_eq!(count.get(), json!(3));
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use super::computed::Computed;
use super::context::untrack;
use super::ids::TargetId;
use super::refs::{ReactiveRef, Ref};
use super::runtime::Runtime;
use super::same_value::SameValue;
use crate::error::ReactiveError;

/// A shared reactive reference holding JSON.
pub type ValueRef = Arc<dyn ReactiveRef<Value>>;

/// What a plain-object property holds.
#[derive(Clone)]
pub enum Field {
    Value(Value),
    Ref(ValueRef),
    Object(PlainObject),
    Reactive(ReactiveObject),
}

impl Field {
    /// Convert JSON, turning nested JSON objects into plain objects.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Field::Object(PlainObject::from_json(map)),
            other => Field::Value(other),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Field::Ref(_))
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, Field::Reactive(_))
    }

    /// Identity for references and objects, [`SameValue`] for JSON.
    fn same_as(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Value(a), Field::Value(b)) => a.same_value(b),
            (Field::Ref(a), Field::Ref(b)) => same_ref(a, b),
            (Field::Object(a), Field::Object(b)) => a.ptr_eq(b),
            (Field::Reactive(a), Field::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Field::Value(value) => value.clone(),
            Field::Ref(r) => r.get(),
            Field::Object(object) => object.to_json(),
            Field::Reactive(object) => object.to_json(),
        }
    }
}

fn same_ref(a: &ValueRef, b: &ValueRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::from_json(value)
    }
}

impl From<Ref<Value>> for Field {
    fn from(r: Ref<Value>) -> Self {
        Field::Ref(Arc::new(r))
    }
}

impl From<Computed<Value>> for Field {
    fn from(c: Computed<Value>) -> Self {
        Field::Ref(Arc::new(c))
    }
}

impl From<ValueRef> for Field {
    fn from(r: ValueRef) -> Self {
        Field::Ref(r)
    }
}

impl From<PlainObject> for Field {
    fn from(object: PlainObject) -> Self {
        Field::Object(object)
    }
}

impl From<ReactiveObject> for Field {
    fn from(object: ReactiveObject) -> Self {
        Field::Reactive(object)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Field::Ref(r) => f.debug_tuple("Ref").field(&r.target_id()).finish(),
            Field::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Field::Reactive(object) => f.debug_tuple("Reactive").field(object).finish(),
        }
    }
}

/// Check whether a field holds a reactive reference.
pub fn is_ref(field: &Field) -> bool {
    field.is_ref()
}

/// Check whether a field holds a view produced by [`reactive`].
pub fn is_reactive(field: &Field) -> bool {
    field.is_reactive()
}

#[derive(Clone)]
struct Property {
    field: Field,
    writable: bool,
}

struct PlainInner {
    id: TargetId,
    properties: RwLock<IndexMap<String, Property>>,
}

impl Drop for PlainInner {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// A shared, mutable object. Clones refer to the same properties.
#[derive(Clone)]
pub struct PlainObject {
    inner: Arc<PlainInner>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PlainInner {
                id: TargetId::new(),
                properties: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Builder form of [`PlainObject::insert`].
    pub fn with(self, key: impl Into<String>, field: impl Into<Field>) -> Self {
        self.define(key, field, true);
        self
    }

    /// Add a property that cannot be written.
    pub fn with_readonly(self, key: impl Into<String>, field: impl Into<Field>) -> Self {
        self.define(key, field, false);
        self
    }

    /// Recursively convert a JSON object.
    pub fn from_json(map: Map<String, Value>) -> Self {
        let object = Self::new();
        {
            let mut properties = object.inner.properties.write();
            for (key, value) in map {
                properties.insert(
                    key,
                    Property {
                        field: Field::from_json(value),
                        writable: true,
                    },
                );
            }
        }
        object
    }

    /// Add or overwrite a writable property, notifying dependents on change.
    pub fn insert(&self, key: impl Into<String>, field: impl Into<Field>) {
        self.define(key, field, true);
    }

    fn define(&self, key: impl Into<String>, field: impl Into<Field>, writable: bool) {
        let key = key.into();
        let field = field.into();
        let changed = {
            let mut properties = self.inner.properties.write();
            let changed = properties
                .get(&key)
                .map_or(true, |existing| !existing.field.same_as(&field));
            properties.insert(key.clone(), Property { field, writable });
            changed
        };
        if changed {
            self.notify(&key);
        }
    }

    /// Write a property. Fails on read-only properties; unknown keys are
    /// added.
    pub fn set(&self, key: &str, field: impl Into<Field>) -> Result<(), ReactiveError> {
        if !self.is_writable(key) {
            return Err(ReactiveError::ReadOnly {
                key: key.to_string(),
            });
        }
        self.write(key, field.into());
        Ok(())
    }

    /// Store a field without checking writability.
    fn write(&self, key: &str, field: Field) {
        let changed = {
            let mut properties = self.inner.properties.write();
            match properties.get_mut(key) {
                Some(property) if property.field.same_as(&field) => false,
                Some(property) => {
                    property.field = field;
                    true
                }
                None => {
                    properties.insert(
                        key.to_string(),
                        Property {
                            field,
                            writable: true,
                        },
                    );
                    true
                }
            }
        };
        if changed {
            self.notify(key);
        }
    }

    fn notify(&self, key: &str) {
        trace!(target = %self.inner.id, key, "property changed");
        untrack(|| Runtime::trigger(self.inner.id, key));
    }

    /// Untracked read of a property.
    pub fn get_field(&self, key: &str) -> Option<Field> {
        self.inner
            .properties
            .read()
            .get(key)
            .map(|property| property.field.clone())
    }

    /// Missing keys count as writable.
    pub fn is_writable(&self, key: &str) -> bool {
        self.inner
            .properties
            .read()
            .get(key)
            .map_or(true, |property| property.writable)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.properties.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.properties.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.properties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot as JSON, resolving references. Reads are untracked.
    pub fn to_json(&self) -> Value {
        let properties: Vec<(String, Field)> = self
            .inner
            .properties
            .read()
            .iter()
            .map(|(key, property)| (key.clone(), property.field.clone()))
            .collect();
        untrack(|| {
            Value::Object(
                properties
                    .into_iter()
                    .map(|(key, field)| (key, field.to_json()))
                    .collect(),
            )
        })
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &PlainObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn snapshot(&self) -> Vec<(String, Property)> {
        self.inner
            .properties
            .read()
            .iter()
            .map(|(key, property)| (key.clone(), property.clone()))
            .collect()
    }
}

impl Default for PlainObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainObject")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

/// Options for [`reactive_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveOptions {
    /// Wrap nested objects in reactive views when they are read.
    pub deep: bool,
}

impl Default for ReactiveOptions {
    fn default() -> Self {
        Self { deep: true }
    }
}

impl ReactiveOptions {
    pub fn shallow() -> Self {
        Self { deep: false }
    }
}

#[derive(Clone)]
enum Accessor {
    Ref(ValueRef),
    Nested,
    Plain,
}

struct Key {
    accessor: Accessor,
    writable: bool,
}

struct ReactiveInner {
    source: PlainObject,
    keys: IndexMap<String, Key>,
    options: ReactiveOptions,
}

/// A reactive view over a [`PlainObject`].
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Arc<ReactiveInner>,
}

/// The result of reading a reactive-object key.
#[derive(Debug, Clone)]
pub enum ReactiveValue {
    Value(Value),
    /// A nested object, wrapped in a fresh view.
    Object(ReactiveObject),
    /// A nested object of a shallow view.
    Plain(PlainObject),
}

impl ReactiveValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ReactiveValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            ReactiveValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            ReactiveValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ReactiveValue::Value(value) => value.clone(),
            ReactiveValue::Object(object) => object.to_json(),
            ReactiveValue::Plain(object) => object.to_json(),
        }
    }
}

impl ReactiveObject {
    fn build(source: PlainObject, options: ReactiveOptions) -> Self {
        let keys = source
            .snapshot()
            .into_iter()
            .map(|(key, property)| {
                let accessor = match property.field {
                    Field::Ref(r) => Accessor::Ref(r),
                    Field::Object(_) | Field::Reactive(_) => Accessor::Nested,
                    Field::Value(_) => Accessor::Plain,
                };
                let writable = property.writable;
                (key, Key { accessor, writable })
            })
            .collect();

        Self {
            inner: Arc::new(ReactiveInner {
                source,
                keys,
                options,
            }),
        }
    }

    fn key(&self, key: &str) -> Result<&Key, ReactiveError> {
        self.inner
            .keys
            .get(key)
            .ok_or_else(|| ReactiveError::UnknownProperty {
                key: key.to_string(),
            })
    }

    /// Read a key.
    pub fn get(&self, key: &str) -> Result<ReactiveValue, ReactiveError> {
        let deep = match &self.key(key)?.accessor {
            Accessor::Ref(r) => return Ok(ReactiveValue::Value(r.get())),
            Accessor::Nested => self.inner.options.deep,
            Accessor::Plain => false,
        };

        let source = &self.inner.source;
        Runtime::track(source.id(), key.to_string());
        let field = source
            .get_field(key)
            .ok_or_else(|| ReactiveError::UnknownProperty {
                key: key.to_string(),
            })?;

        Ok(match field {
            Field::Value(value) => ReactiveValue::Value(value),
            Field::Ref(r) => ReactiveValue::Value(r.get()),
            Field::Reactive(object) => ReactiveValue::Object(object),
            Field::Object(object) if deep => {
                ReactiveValue::Object(Self::build(object, self.inner.options))
            }
            Field::Object(object) => ReactiveValue::Plain(object),
        })
    }

    /// Read a key that holds plain JSON.
    pub fn get_value(&self, key: &str) -> Result<Value, ReactiveError> {
        Ok(self.get(key)?.to_json())
    }

    /// Write a key. Reference keys write through to the reference; other
    /// keys write the source property.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ReactiveError> {
        let entry = self.key(key)?;
        if !entry.writable {
            return Err(ReactiveError::ReadOnly {
                key: key.to_string(),
            });
        }
        match &entry.accessor {
            Accessor::Ref(r) => r.set(value),
            Accessor::Nested | Accessor::Plain => {
                self.inner.source.write(key, Field::from_json(value));
                Ok(())
            }
        }
    }

    /// Replace the source property with any field, such as a new nested
    /// object. Reference keys only accept plain values.
    pub fn replace(&self, key: &str, field: impl Into<Field>) -> Result<(), ReactiveError> {
        let field = field.into();
        let entry = self.key(key)?;
        if !entry.writable {
            return Err(ReactiveError::ReadOnly {
                key: key.to_string(),
            });
        }
        match (&entry.accessor, field) {
            (Accessor::Ref(r), Field::Value(value)) => r.set(value),
            (Accessor::Ref(_), _) => Err(ReactiveError::NotAValue {
                key: key.to_string(),
            }),
            (_, field) => {
                self.inner.source.write(key, field);
                Ok(())
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys.keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.keys.contains_key(key)
    }

    pub fn is_writable(&self, key: &str) -> bool {
        self.inner.keys.get(key).is_some_and(|entry| entry.writable)
    }

    pub fn len(&self) -> usize {
        self.inner.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.keys.is_empty()
    }

    /// The object this view was built over.
    pub fn source(&self) -> &PlainObject {
        &self.inner.source
    }

    pub fn options(&self) -> ReactiveOptions {
        self.inner.options
    }

    /// Untracked snapshot of every key as JSON.
    pub fn to_json(&self) -> Value {
        untrack(|| {
            Value::Object(
                self.inner
                    .keys
                    .keys()
                    .filter_map(|key| {
                        self.get(key)
                            .ok()
                            .map(|value| (key.clone(), value.to_json()))
                    })
                    .collect(),
            )
        })
    }

    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("source", &self.inner.source.id())
            .field("keys", &self.keys())
            .field("deep", &self.inner.options.deep)
            .finish()
    }
}

/// Things [`reactive`] accepts.
pub trait IntoReactive {
    fn into_reactive(self, options: ReactiveOptions) -> ReactiveObject;
}

impl IntoReactive for PlainObject {
    fn into_reactive(self, options: ReactiveOptions) -> ReactiveObject {
        ReactiveObject::build(self, options)
    }
}

impl IntoReactive for &PlainObject {
    fn into_reactive(self, options: ReactiveOptions) -> ReactiveObject {
        ReactiveObject::build(self.clone(), options)
    }
}

/// Already reactive: returned unchanged.
impl IntoReactive for ReactiveObject {
    fn into_reactive(self, _options: ReactiveOptions) -> ReactiveObject {
        self
    }
}

impl IntoReactive for &ReactiveObject {
    fn into_reactive(self, _options: ReactiveOptions) -> ReactiveObject {
        self.clone()
    }
}

/// Build a deep reactive view.
pub fn reactive(target: impl IntoReactive) -> ReactiveObject {
    target.into_reactive(ReactiveOptions::default())
}

pub fn reactive_with(target: impl IntoReactive, options: ReactiveOptions) -> ReactiveObject {
    target.into_reactive(options)
}
