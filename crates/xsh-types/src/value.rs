//! The dynamic value type shared by every layer of the engine.
//!
//! Values are what expressions evaluate to: scalars, ordered sequences,
//! keyed mappings, callables, and deferred (not-yet-resolved) results.
//! The null/undefined distinction is preserved — `loose_eq` treats them as
//! equal, strict equality does not.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::XshResult;

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    Null,
    #[default]
    Undef,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered sequence (array literal, variadic tail, …).
    Seq(Vec<Value>),
    /// Insertion-ordered keyed mapping (object literal).
    Map(Map),
    /// Native or engine-bound function, possibly with a bound receiver.
    Fn(Callable),
    /// An asynchronous result that has not resolved yet.
    Deferred(Deferred),
}

impl Value {
    /// True for `Null` and `Undef` — the values `??` skips over.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undef)
    }

    /// Truthiness for `&&` / `||`. Sequences, mappings, callables and
    /// deferreds are always truthy; empty strings and zero are not.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undef => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Seq(_) | Value::Map(_) | Value::Fn(_) | Value::Deferred(_) => true,
        }
    }

    /// Loose equality: null == undefined, numbers compare across int/float/
    /// string/bool representations, everything else falls back to strict.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_nullish() && other.is_nullish() {
            return true;
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Numeric view used by loose equality and comparisons: ints, floats,
    /// bools and numeric strings all have one; other values do not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Name of the variant, used in error payloads.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undef => "undefined",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Fn(_) => "function",
            Value::Deferred(_) => "deferred",
        }
    }

    /// String form used for concatenation and template output.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Undef => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::Seq(_) | Value::Map(_) => {
                serde_json::to_string(&crate::json::value_to_json(self)).unwrap_or_default()
            }
            Value::Fn(c) => match c.name() {
                Some(name) => format!("[fn {name}]"),
                None => "[fn]".to_string(),
            },
            Value::Deferred(_) => "[deferred]".to_string(),
        }
    }
}

/// Format a float the way the DSL prints numbers: integral values drop the
/// fractional part (`4.0` → `"4"`).
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Undef, Value::Undef) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Fn(a), Value::Fn(b)) => a.ptr_eq(b),
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Undef => write!(f, "Undef"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Value::Fn(c) => write!(f, "Fn({})", c.name().unwrap_or("?")),
            Value::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Delegate to value_to_json for a consistent JSON representation.
        // Float NaN → null, functions and deferreds → null.
        crate::json::value_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(crate::json::json_to_value(json))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Insertion-ordered string-keyed mapping.
///
/// Backed by a vector of pairs: object literals are small, iteration order
/// matters for merges and JSON output, and path lookup converts keys to
/// strings anyway.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace, preserving the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get the slot for `key`, inserting `default` first if absent.
    pub fn entry_or_insert(&mut self, key: &str, default: Value) -> &mut Value {
        let i = match self.entries.iter().position(|(k, _)| k == key) {
            Some(i) => i,
            None => {
                self.entries.push((key.to_string(), default));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }

    /// Right-biased merge: entries of `other` win over entries of `self`.
    pub fn merged(&self, other: &Map) -> Map {
        let mut out = self.clone();
        for (k, v) in &other.entries {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Signature of a native function: optional bound receiver plus arguments.
pub type NativeFn = dyn Fn(Option<&Value>, &[Value]) -> XshResult<Value> + Send + Sync;

/// A callable value — a host-supplied native function, optionally bound to
/// the mapping it was looked up on (dotted-path method resolution).
///
/// Callables compare by function identity plus receiver.
#[derive(Clone)]
pub struct Callable {
    name: Option<Arc<str>>,
    func: Arc<NativeFn>,
    receiver: Option<Arc<Value>>,
}

impl Callable {
    /// Wrap a native function.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> XshResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Some(Arc::from(name.into().as_str())),
            func: Arc::new(func),
            receiver: None,
        }
    }

    /// Wrap an anonymous native function.
    pub fn anonymous<F>(func: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> XshResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
            receiver: None,
        }
    }

    /// A copy of this callable bound to `receiver` (the parent object of a
    /// dotted-path lookup).
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
            receiver: Some(Arc::new(receiver)),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn invoke(&self, args: &[Value]) -> XshResult<Value> {
        (self.func)(self.receiver.as_deref(), args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
            && match (&self.receiver, &other.receiver) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// A value that resolves later.
///
/// Clonable and awaitable any number of times; resolution may carry an
/// engine error (the promise-rejection channel).
#[derive(Clone)]
pub struct Deferred {
    fut: Shared<BoxFuture<'static, XshResult<Value>>>,
}

impl Deferred {
    /// Defer an arbitrary future.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = XshResult<Value>> + Send + 'static,
    {
        Self {
            fut: fut.boxed().shared(),
        }
    }

    /// An already-resolved deferred.
    pub fn ready(value: Value) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// Await the resolution. Safe to call from several clones.
    pub async fn wait(&self) -> XshResult<Value> {
        self.fut.clone().await
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        self.fut.ptr_eq(&other.fut)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_undef_distinct_but_loosely_equal() {
        assert_ne!(Value::Null, Value::Undef);
        assert!(Value::Null.loose_eq(&Value::Undef));
    }

    #[test]
    fn loose_eq_coerces_numbers() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::Int(1).loose_eq(&Value::Str("1".into())));
        assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
        assert!(!Value::Int(1).loose_eq(&Value::Int(2)));
    }

    #[test]
    fn strict_eq_distinguishes_types() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Str("1".into()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Null.truthy());
        assert!(Value::Seq(vec![]).truthy());
        assert!(Value::Map(Map::new()).truthy());
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut m = Map::new();
        m.insert("b", Value::Int(1));
        m.insert("a", Value::Int(2));
        m.insert("b", Value::Int(3));
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(m.get("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn map_merge_is_right_biased() {
        let left: Map = [("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]
            .into_iter()
            .collect();
        let right: Map = [("b".to_string(), Value::Int(9))].into_iter().collect();
        let merged = left.merged(&right);
        assert_eq!(merged.get("a"), Some(&Value::Int(1)));
        assert_eq!(merged.get("b"), Some(&Value::Int(9)));
    }

    #[test]
    fn callable_binding_and_identity() {
        let f = Callable::native("id", |recv, _args| {
            Ok(recv.cloned().unwrap_or(Value::Undef))
        });
        let bound = f.bind(Value::Int(7));
        assert_eq!(bound.invoke(&[]).unwrap(), Value::Int(7));
        assert!(!f.ptr_eq(&bound));
        assert!(f.ptr_eq(&f.clone()));
    }

    #[tokio::test]
    async fn deferred_resolves_repeatedly() {
        let d = Deferred::ready(Value::Int(5));
        assert_eq!(d.wait().await.unwrap(), Value::Int(5));
        assert_eq!(d.clone().wait().await.unwrap(), Value::Int(5));
    }

    #[test]
    fn float_display_drops_integral_fraction() {
        assert_eq!(format_float(4.0), "4");
        assert_eq!(format_float(4.5), "4.5");
    }
}
