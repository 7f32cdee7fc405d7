//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.  Values are created from anything
//! that implements [`Serialize`](serde::Serialize) or through the various
//! `From` conversions.
//!
//! ```
//! # use stencil::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let list_value = Value::from(vec![1, 2, 3]);
//! ```
//!
//! # Absence
//!
//! Resolving a variable or attribute that does not exist never fails.  It
//! produces the special [`Value::UNDEFINED`] value instead.  Undefined is
//! distinguishable from an explicit null ([`Value::is_undefined`] vs
//! [`Value::is_none`]) but the engine treats both the same way: they are
//! falsy, render as empty text, compare equal to each other and are
//! replaced by the `default` filter.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

pub use crate::value::serialize::ValueSerializer;

mod serialize;

/// The insertion ordered map type used by [`Value`].
pub type ValueMap = IndexMap<Arc<str>, Value>;

/// Describes the kind of value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined (absent).
    Undefined,
    /// The value is the none singleton (explicit null).
    None,
    /// The value is a [`bool`]
    Bool,
    /// The value is a number of a supported type.
    Number,
    /// The value is a string.
    String,
    /// The value is a sequence.
    Seq,
    /// The value is a key/value mapping.
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
        })
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined,
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl Default for Value {
    fn default() -> Value {
        Value::UNDEFINED
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Undefined => f.write_str("undefined"),
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(&val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(&val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(&val, f),
            ValueRepr::String(ref val) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(ref val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(ref val) => f.debug_map().entries(val.iter()).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => Ok(()),
            ValueRepr::Bool(val) => fmt::Display::fmt(&val, f),
            ValueRepr::I64(val) => fmt::Display::fmt(&val, f),
            ValueRepr::F64(val) => {
                if val.is_nan() {
                    f.write_str("NaN")
                } else if val.is_infinite() {
                    write!(f, "{}inf", if val.is_sign_negative() { "-" } else { "" })
                } else {
                    let mut num = val.to_string();
                    if !num.contains('.') {
                        num.push_str(".0");
                    }
                    write!(f, "{num}")
                }
            }
            ValueRepr::String(ref val) => f.write_str(val),
            ValueRepr::Seq(ref values) => {
                ok!(f.write_str("["));
                for (idx, val) in values.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{val:?}"));
                }
                f.write_str("]")
            }
            ValueRepr::Map(ref m) => {
                ok!(f.write_str("{"));
                for (idx, (key, val)) in m.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{key:?}: {val:?}"));
                }
                f.write_str("}")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (
                ValueRepr::Undefined | ValueRepr::None,
                ValueRepr::Undefined | ValueRepr::None,
            ) => true,
            (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
            (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a == b,
            (ValueRepr::Map(a), ValueRepr::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }
}

impl Value {
    /// The undefined value.
    ///
    /// This is what path resolution produces when any segment is missing.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined);

    /// Creates a value from something that can be serialized.
    ///
    /// This is what [`context!`](crate::context) and
    /// [`Environment::render_with`](crate::Environment::render_with) use
    /// internally.  Values that cannot be represented (for instance maps with
    /// non-scalar keys) turn into undefined.
    ///
    /// ```
    /// # use stencil::Value;
    /// let val = Value::from_serialize(&vec![1, 2, 3]);
    /// ```
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> Value {
        match value.serialize(ValueSerializer) {
            Ok(rv) => rv,
            Err(err) => {
                tracing::debug!(error = %err, "value could not be converted, using undefined");
                Value::UNDEFINED
            }
        }
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined => ValueKind::Undefined,
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
        }
    }

    /// Is this value undefined?
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined)
    }

    /// Is this value none?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Returns `true` for undefined and none.
    pub fn is_absent(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined | ValueRepr::None)
    }

    /// Is this value considered true?
    ///
    /// Absent values, `false`, zero, the empty string and empty
    /// containers are false.
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::I64(val) => val != 0,
            ValueRepr::F64(val) => val != 0.0,
            ValueRepr::String(ref val) => !val.is_empty(),
            ValueRepr::Seq(ref val) => !val.is_empty(),
            ValueRepr::Map(ref val) => !val.is_empty(),
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer, return it.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a number, return it as float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a sequence, return its items.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::Seq(ref items) => Some(items),
            _ => None,
        }
    }

    /// If the value is a map, return it.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map) => Some(map),
            _ => None,
        }
    }

    /// Returns the length of the contained value.
    ///
    /// Strings report their length in characters.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::Seq(ref items) => Some(items.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            _ => None,
        }
    }

    /// Looks up a single path segment.
    ///
    /// Maps are looked up by key, sequences by numeric index.  Anything
    /// else, or a missing key, produces undefined.
    pub fn get_attr(&self, key: &str) -> Value {
        match self.0 {
            ValueRepr::Map(ref map) => map.get(key).cloned().unwrap_or_default(),
            ValueRepr::Seq(ref items) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx))
                .cloned()
                .unwrap_or_default(),
            _ => Value::UNDEFINED,
        }
    }

    /// Resolves a dotted path (`a.b.c`) against this value.
    ///
    /// Any missing segment, or a step into something that is not a
    /// container, yields [`Value::UNDEFINED`].  This never fails.
    ///
    /// ```
    /// # use stencil::{context, Value};
    /// let ctx = context! { user => context! { name => "Ada" } };
    /// assert_eq!(ctx.resolve_path("user.name"), Value::from("Ada"));
    /// assert!(ctx.resolve_path("user.email.domain").is_undefined());
    /// ```
    pub fn resolve_path(&self, path: &str) -> Value {
        let mut rv = self.clone();
        for segment in path.split('.') {
            rv = rv.get_attr(segment);
            if rv.is_undefined() {
                break;
            }
        }
        rv
    }

    /// Iterates over the value if it's iterable.
    ///
    /// Sequences yield their items, maps yield their values in insertion
    /// order, absent values yield nothing.  Other values are not iterable
    /// and `None` is returned.
    pub fn try_iter(&self) -> Option<Box<dyn Iterator<Item = Value> + '_>> {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => Some(Box::new(std::iter::empty::<Value>())),
            ValueRepr::Seq(ref items) => Some(Box::new(items.iter().cloned())),
            ValueRepr::Map(ref map) => Some(Box::new(map.values().cloned())),
            _ => None,
        }
    }

    /// Orders two values if they are comparable.
    ///
    /// Numbers compare with numbers and strings with strings.  Everything
    /// else is unordered.
    pub(crate) fn partial_order(&self, other: &Value) -> Option<Ordering> {
        match (&self.0, &other.0) {
            (ValueRepr::String(a), ValueRepr::String(b)) => Some(a.cmp(b)),
            (ValueRepr::I64(a), ValueRepr::I64(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Returns a copy of this map with one extra entry.
    ///
    /// Non-map values are treated as an empty map.
    pub(crate) fn with_entry(&self, key: &str, value: Value) -> Value {
        let mut map = self.as_map().cloned().unwrap_or_default();
        map.insert(Arc::from(key), value);
        Value::from(map)
    }
}

/// Merges multiple maps into one.  Keys of later maps win.
///
/// Values that are not maps are ignored.
pub fn merge_maps<I>(iter: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut rv = ValueMap::new();
    for value in iter {
        if let Some(map) = value.as_map() {
            for (key, value) in map.iter() {
                rv.insert(key.clone(), value.clone());
            }
        }
    }
    Value::from(rv)
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::String(ref s) => serializer.serialize_str(s),
            ValueRepr::Seq(ref items) => items.serialize(serializer),
            ValueRepr::Map(ref entries) => {
                use serde::ser::SerializeMap;
                let mut map = ok!(serializer.serialize_map(Some(entries.len())));
                for (k, v) in entries.iter() {
                    ok!(map.serialize_entry(&**k, v));
                }
                map.end()
            }
        }
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                Value(ValueRepr::$dst(val as _))
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        match i64::try_from(val) {
            Ok(val) => Value(ValueRepr::I64(val)),
            Err(_) => Value(ValueRepr::F64(val as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value(ValueRepr::None)
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        Value::from(val.to_string())
    }
}

impl<'a> From<&'a str> for Value {
    fn from(val: &'a str) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Self {
        Value(ValueRepr::String(val))
    }
}

impl<'a> From<std::borrow::Cow<'a, str>> for Value {
    fn from(val: std::borrow::Cow<'a, str>) -> Self {
        Value::from(&*val)
    }
}

impl<'a> From<&'a Value> for Value {
    fn from(val: &'a Value) -> Self {
        val.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value(ValueRepr::None),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        Value(ValueRepr::Seq(Arc::new(
            val.into_iter().map(Into::into).collect(),
        )))
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        Value(ValueRepr::Map(Arc::new(val)))
    }
}

impl<K: AsRef<str>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        val.into_iter()
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into()))
            .collect::<ValueMap>()
            .into()
    }
}

impl<K: AsRef<str>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(val: HashMap<K, V>) -> Self {
        val.into_iter()
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into()))
            .collect::<ValueMap>()
            .into()
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Value(ValueRepr::Seq(Arc::new(
            iter.into_iter().map(Into::into).collect(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::context;

    #[test]
    fn test_resolve_path_never_fails() {
        let ctx = context! {
            user => context! { name => "Ada", tags => vec!["a", "b"] },
            count => 0,
        };
        assert_eq!(ctx.resolve_path("user.name"), Value::from("Ada"));
        assert_eq!(ctx.resolve_path("user.tags.1"), Value::from("b"));
        assert!(ctx.resolve_path("user.tags.7").is_undefined());
        assert!(ctx.resolve_path("missing").is_undefined());
        assert!(ctx.resolve_path("missing.deeper.still").is_undefined());
        assert!(ctx.resolve_path("count.digits").is_undefined());
        assert!(ctx.resolve_path("user.name.first").is_undefined());
    }

    #[test]
    fn test_absent_and_null_compare_equal() {
        assert_eq!(Value::UNDEFINED, Value::from(()));
        assert!(!Value::UNDEFINED.is_true());
        assert!(!Value::from(()).is_true());
        assert!(Value::UNDEFINED.is_undefined());
        assert!(!Value::from(()).is_undefined());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from(0).is_true());
        assert!(!Value::from("").is_true());
        assert!(!Value::from(Vec::<i32>::new()).is_true());
        assert!(Value::from("0").is_true());
        assert!(Value::from(0.5).is_true());
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_eq!(
            Value::from(2).partial_order(&Value::from(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::from("a").partial_order(&Value::from(1)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::UNDEFINED.to_string(), "");
        assert_eq!(Value::from(()).to_string(), "");
        assert_eq!(Value::from(2.0).to_string(), "2.0");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), r#"["a", "b"]"#);
        assert_eq!(context! { a => 1 }.to_string(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_merge_maps_later_wins() {
        let merged = merge_maps([context! { a => 1, b => 1 }, context! { b => 2 }]);
        assert_eq!(merged.resolve_path("a"), Value::from(1));
        assert_eq!(merged.resolve_path("b"), Value::from(2));
    }

    #[test]
    fn test_map_iteration_keeps_insertion_order() {
        let ctx = context! { z => 1, a => 2, m => 3 };
        let values: Vec<_> = ctx.try_iter().unwrap().collect();
        assert_eq!(values, vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert!(Value::from(42).try_iter().is_none());
        assert_eq!(Value::UNDEFINED.try_iter().unwrap().count(), 0);
    }
}
