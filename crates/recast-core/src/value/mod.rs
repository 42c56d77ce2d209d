//! Dynamic value graph the transformation engine operates on
//!
//! The engine walks object graphs whose shape is only known at runtime, so
//! values are an explicit tagged union rather than static types. Containers
//! (`Array`, `Set`, `Map`, `Object`) are reference-counted handles with
//! interior mutability: object identity is handle identity, existing
//! structures can be populated in place, and cyclic graphs are expressible.
//!
//! Two non-data variants round out the platform surface the engine has to
//! tolerate: [`Value::Thunk`] for computed/getter-style fields on live
//! instances, and [`Value::Pending`] for values that settle asynchronously.

pub mod json;
mod ordered;

pub use ordered::OrderedMap;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use futures::future::{FutureExt, LocalBoxFuture, Shared};

use crate::metadata::ModelId;

/// A dynamically typed value.
///
/// `Undefined` (absent/unset) and `Null` (present null) are distinct: the
/// engine omits `Undefined` fields from output unless told otherwise, while
/// `Null` survives transformation untouched.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    Array(ArrayHandle),
    Set(SetHandle),
    Map(MapHandle),
    Object(ObjectHandle),
    Thunk(Thunk),
    Pending(PendingValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::Array(ArrayHandle::from_vec(items.into_iter().collect()))
    }

    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Value {
        let handle = SetHandle::new();
        for item in items {
            handle.insert(item);
        }
        Value::Set(handle)
    }

    pub fn map<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let handle = MapHandle::new();
        for (key, value) in entries {
            handle.set(key.into(), value);
        }
        Value::Map(handle)
    }

    /// A plain object literal.
    pub fn object<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let handle = ObjectHandle::new_plain();
        for (key, value) in entries {
            handle.set(key.into(), value);
        }
        Value::Object(handle)
    }

    /// An instance of a declared model.
    pub fn instance<K, I>(model: ModelId, entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let handle = ObjectHandle::new_instance(model);
        for (key, value) in entries {
            handle.set(key.into(), value);
        }
        Value::Object(handle)
    }

    /// A computed field: reading it on an instance invokes the closure.
    pub fn thunk(f: impl Fn() -> Value + 'static) -> Value {
        Value::Thunk(Thunk::new(f))
    }

    /// A value that settles asynchronously.
    pub fn pending(future: impl Future<Output = Value> + 'static) -> Value {
        Value::Pending(PendingValue::new(future))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Null or undefined: the two "absent" states type coercion never touches.
    pub fn is_null_like(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_array_like(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Set(_))
    }

    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Map(_))
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapHandle> {
        match self {
            Value::Map(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The model this value is an instance of, if any.
    pub fn model(&self) -> Option<ModelId> {
        match self {
            Value::Object(handle) => handle.model(),
            _ => None,
        }
    }

    /// Element at `index` for array-like sources, `Undefined` otherwise.
    pub fn element(&self, index: usize) -> Value {
        match self {
            Value::Array(handle) => handle.get(index).unwrap_or_default(),
            Value::Set(handle) => handle.get(index).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Raw member read: object field or map entry, never invoking thunks.
    pub fn member(&self, key: &str) -> Value {
        match self {
            Value::Object(handle) => handle.get(key).unwrap_or_default(),
            Value::Map(handle) => handle.get(key).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Identity comparison: scalars by value, containers and thunks by
    /// handle, pendings never equal. The engine's "did a custom transform
    /// change anything" and set-deduplication checks both use this.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_id() == b.ptr_id(),
            (Value::Set(a), Value::Set(b)) => a.ptr_id() == b.ptr_id(),
            (Value::Map(a), Value::Map(b)) => a.ptr_id() == b.ptr_id(),
            (Value::Object(a), Value::Object(b)) => a.ptr_id() == b.ptr_id(),
            (Value::Thunk(a), Value::Thunk(b)) => a.ptr_id() == b.ptr_id(),
            _ => false,
        }
    }

    /// Structural equality. Arrays and sets compare element-wise in order;
    /// objects and maps compare by key set (order-insensitive) and model
    /// tag. Intended for tests and acyclic data.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.items(), b.items());
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.items(), b.items());
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.entries()
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.deep_eq(&w)))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.model() == b.model()
                    && a.len() == b.len()
                    && a.entries()
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.deep_eq(&w)))
            }
            _ => self.same(other),
        }
    }

    /// Truthiness following the source platform: false, 0, NaN, empty
    /// string, null and undefined are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric conversion. Unparseable input yields NaN rather than failing.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::BigInt(n) => *n as f64,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Date(d) => d.timestamp_millis() as f64,
            _ => f64::NAN,
        }
    }

    /// Text conversion. Containers render as their JSON text.
    pub fn to_text(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.is_nan() {
                    "NaN".to_string()
                } else {
                    n.to_string()
                }
            }
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.to_rfc3339(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Thunk(t) => t.call().to_text(),
            Value::Pending(_) => "[pending]".to_string(),
            other => json::to_json(other).to_string(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Thunk(_) => "thunk",
            Value::Pending(_) => "pending",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::BigInt(n) => write!(f, "BigInt({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::Array(a) => f.debug_list().entries(a.items()).finish(),
            Value::Set(s) => {
                write!(f, "Set")?;
                f.debug_list().entries(s.items()).finish()
            }
            Value::Map(m) => {
                write!(f, "Map")?;
                f.debug_map().entries(m.entries()).finish()
            }
            Value::Object(o) => {
                match o.model() {
                    Some(model) => write!(f, "{model}")?,
                    None => write!(f, "Object")?,
                }
                f.debug_map().entries(o.entries()).finish()
            }
            Value::Thunk(_) => write!(f, "Thunk(..)"),
            Value::Pending(_) => write!(f, "Pending(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Shared mutable list.
#[derive(Clone, Default)]
pub struct ArrayHandle(Rc<RefCell<Vec<Value>>>);

impl ArrayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    /// Snapshot of the elements; taken before iterating so recursive work
    /// never holds a borrow on the container.
    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// Shared mutable set with insertion order. Deduplicates on insert using
/// identity semantics ([`Value::same`]).
#[derive(Clone, Default)]
pub struct SetHandle(Rc<RefCell<Vec<Value>>>);

impl SetHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn insert(&self, value: Value) {
        let mut items = self.0.borrow_mut();
        if !items.iter().any(|existing| existing.same(&value)) {
            items.push(value);
        }
    }

    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// Shared mutable string-keyed map with insertion order.
#[derive(Clone, Default)]
pub struct MapHandle(Rc<RefCell<OrderedMap<String, Value>>>);

impl MapHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(&key.to_string()).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

#[derive(Default)]
struct ObjectBody {
    model: Option<ModelId>,
    fields: OrderedMap<String, Value>,
}

/// Shared mutable object-like structure: a plain literal when `model` is
/// absent, an instance of a declared model otherwise.
#[derive(Clone, Default)]
pub struct ObjectHandle(Rc<RefCell<ObjectBody>>);

impl ObjectHandle {
    pub fn new_plain() -> Self {
        Self::default()
    }

    pub fn new_instance(model: ModelId) -> Self {
        let handle = Self::default();
        handle.0.borrow_mut().model = Some(model);
        handle
    }

    pub fn model(&self) -> Option<ModelId> {
        self.0.borrow().model
    }

    pub fn set_model(&self, model: Option<ModelId>) {
        self.0.borrow_mut().model = model;
    }

    pub fn len(&self) -> usize {
        self.0.borrow().fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().fields.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().fields.contains_key(&key.to_string())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().fields.get(&key.to_string()).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().fields.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().fields.remove(&key.to_string())
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().fields.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// A computed field backed by a closure.
#[derive(Clone)]
pub struct Thunk(Rc<dyn Fn() -> Value>);

impl Thunk {
    pub fn new(f: impl Fn() -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self) -> Value {
        (self.0)()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// A value that settles later. Backed by a shared single-threaded future so
/// a pending value can be cloned into several positions and resolved once.
#[derive(Clone)]
pub struct PendingValue {
    inner: Shared<LocalBoxFuture<'static, Value>>,
}

impl PendingValue {
    pub fn new(future: impl Future<Output = Value> + 'static) -> Self {
        Self {
            inner: future.boxed_local().shared(),
        }
    }

    pub async fn resolve(&self) -> Value {
        self.inner.clone().await
    }
}
