//! Filter functions and abstractions.
//!
//! Filters transform the value of an output expression.  They are applied
//! left to right with the pipe operator and can take a single argument
//! separated by a colon:
//!
//! ```text
//! {{ user.name|upper|truncate:'3' }}
//! ```
//!
//! Filters never fail a render.  An unknown filter leaves the value as it
//! is, and so does a filter that is handed a value (or argument) it cannot
//! work with.
//!
//! # The `default` filter
//!
//! `default` is reserved.  It replaces an absent (undefined or none) value
//! with its argument and leaves every other value alone, including falsy
//! ones like `0` or `""`.  It cannot be overridden.
//!
//! # Custom Filters
//!
//! A custom filter is a function that accepts the value and optionally the
//! argument, then returns something that converts into a
//! [`Value`]:
//!
//! ```
//! # use stencil::Environment;
//! # let mut env = Environment::new();
//! fn shout(value: String) -> String {
//!     format!("{}!", value.to_uppercase())
//! }
//!
//! fn repeat(value: String, times: usize) -> String {
//!     value.repeat(times)
//! }
//!
//! env.add_filter("shout", shout);
//! env.add_filter("repeat", repeat);
//! ```
//!
//! The accepted value types are those implementing [`FilterInput`], the
//! accepted argument types those implementing [`FilterArg`].  User filters
//! take precedence over built-in filters of the same name.
use std::fmt;
use std::sync::Arc;

use crate::value::{Value, ValueKind};

type FilterFunc = dyn Fn(&Value, Option<&str>) -> Value + Sync + Send + 'static;

/// A boxed filter.
#[derive(Clone)]
pub(crate) struct BoxedFilter(Arc<FilterFunc>, &'static str);

/// A utility trait that represents filters.
///
/// Implemented for functions and closures that take the value, or the
/// value and the argument.
pub trait Filter<V, Rv, Args>: Send + Sync + 'static {
    /// Applies a filter to value with the given arguments.
    #[doc(hidden)]
    fn apply_to(&self, value: V, args: Args) -> Rv;
}

impl<Func, V, Rv> Filter<V, Rv, ()> for Func
where
    Func: Fn(V) -> Rv + Send + Sync + 'static,
{
    fn apply_to(&self, value: V, _: ()) -> Rv {
        (self)(value)
    }
}

impl<Func, V, Rv, A> Filter<V, Rv, (A,)> for Func
where
    Func: Fn(V, A) -> Rv + Send + Sync + 'static,
{
    fn apply_to(&self, value: V, args: (A,)) -> Rv {
        (self)(value, args.0)
    }
}

/// Converts the filtered value into the type a filter expects.
///
/// Returning `None` skips the filter.
pub trait FilterInput: Sized {
    /// Converts from the filtered value.
    fn from_input(value: &Value) -> Option<Self>;
}

impl FilterInput for Value {
    fn from_input(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FilterInput for String {
    fn from_input(value: &Value) -> Option<Self> {
        match value.kind() {
            ValueKind::String | ValueKind::Number | ValueKind::Bool => Some(value.to_string()),
            _ => None,
        }
    }
}

impl FilterInput for i64 {
    fn from_input(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FilterInput for f64 {
    fn from_input(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FilterInput for bool {
    fn from_input(value: &Value) -> Option<Self> {
        match value.kind() {
            ValueKind::Bool => Some(value.is_true()),
            _ => None,
        }
    }
}

impl FilterInput for Vec<Value> {
    fn from_input(value: &Value) -> Option<Self> {
        value.as_seq().map(|items| items.to_vec())
    }
}

/// Converts the filter argument into the type a filter expects.
///
/// Returning `None` skips the filter.
pub trait FilterArg: Sized {
    /// Converts from the optional argument.
    fn from_arg(arg: Option<&str>) -> Option<Self>;
}

impl FilterArg for Option<String> {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        Some(arg.map(String::from))
    }
}

impl FilterArg for String {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        arg.map(String::from)
    }
}

impl FilterArg for usize {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        arg.and_then(|x| x.trim().parse().ok())
    }
}

impl FilterArg for i64 {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        arg.and_then(|x| x.trim().parse().ok())
    }
}

/// The argument list of a filter: nothing or a single [`FilterArg`].
#[doc(hidden)]
pub trait FilterArgs: Sized {
    fn from_arg(arg: Option<&str>) -> Option<Self>;
}

impl FilterArgs for () {
    fn from_arg(_: Option<&str>) -> Option<Self> {
        Some(())
    }
}

impl<A: FilterArg> FilterArgs for (A,) {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        A::from_arg(arg).map(|x| (x,))
    }
}

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, V, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<V, Rv, Args>,
        V: FilterInput + 'static,
        Rv: Into<Value> + 'static,
        Args: FilterArgs + 'static,
    {
        BoxedFilter(
            Arc::new(
                move |value, arg| match (V::from_input(value), Args::from_arg(arg)) {
                    (Some(value), Some(args)) => f.apply_to(value, args).into(),
                    _ => value.clone(),
                },
            ),
            std::any::type_name::<F>(),
        )
    }

    /// Applies the filter to a value and argument.
    pub fn apply_to(&self, value: &Value, arg: Option<&str>) -> Value {
        (self.0)(value, arg)
    }
}

impl fmt::Debug for BoxedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.1.is_empty() {
            "BoxedFilter"
        } else {
            self.1
        })
    }
}

/// Replaces an absent value with the fallback.
///
/// This backs the reserved `default` filter and is not registered in the
/// filter table.
pub fn default(value: Value, fallback: Option<&Value>) -> Value {
    match fallback {
        Some(fallback) if value.is_absent() => fallback.clone(),
        _ => value,
    }
}

mod builtins {
    use super::*;

    use crate::utils::{self, HtmlEscape};

    /// Converts a value to uppercase.
    ///
    /// ```text
    /// <h1>{{ chapter.title|upper }}</h1>
    /// ```
    pub fn upper(v: String) -> String {
        v.to_uppercase()
    }

    /// Converts a value to lowercase.
    pub fn lower(v: String) -> String {
        v.to_lowercase()
    }

    /// Uppercases the first character.
    pub fn capitalize(v: String) -> String {
        utils::capitalize(&v)
    }

    /// Lowercases the first character.
    pub fn lcfirst(v: String) -> String {
        utils::lcfirst(&v)
    }

    /// Uppercases the first character of each word.
    pub fn title(v: String) -> String {
        utils::title(&v)
    }

    /// Converts to `lowerCamelCase`.
    pub fn camel(v: String) -> String {
        utils::camel(&v)
    }

    /// Converts to `UpperCamelCase`.
    pub fn pascal(v: String) -> String {
        utils::pascal(&v)
    }

    /// Converts to `snake_case`.
    pub fn snake(v: String) -> String {
        utils::snake(&v)
    }

    /// Converts to `kebab-case`.
    pub fn kebab(v: String) -> String {
        utils::kebab(&v)
    }

    /// Converts a string into a URL slug.
    ///
    /// ```text
    /// <a href="/posts/{{ post.title|slugify }}">
    /// ```
    pub fn slugify(v: String) -> String {
        utils::slugify(&v)
    }

    /// Keeps the first N characters.
    ///
    /// Without a numeric argument the value is left unchanged.
    ///
    /// ```text
    /// {{ summary|truncate:'120' }}
    /// ```
    pub fn truncate(v: String, limit: usize) -> String {
        utils::truncate(&v, limit)
    }

    /// Keeps the first N words.
    pub fn limit_words(v: String, limit: usize) -> String {
        utils::limit_words(&v, limit)
    }

    /// Joins a sequence with a separator (empty by default).
    ///
    /// ```text
    /// {{ tags|join:', ' }}
    /// ```
    pub fn join(v: Vec<Value>, sep: Option<String>) -> String {
        let sep = sep.as_deref().unwrap_or("");
        v.iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// HTML escapes a value.
    ///
    /// Registered as `escape` and `e`.
    pub fn escape(v: Value) -> String {
        match v.as_str() {
            Some(s) => HtmlEscape(s).to_string(),
            None => HtmlEscape(&v.to_string()).to_string(),
        }
    }

    /// Serializes a value to JSON.
    #[cfg(feature = "json")]
    pub fn json(v: Value) -> Value {
        match serde_json::to_string(&v) {
            Ok(rv) => Value::from(rv),
            Err(_) => v,
        }
    }

    /// Returns the length of a string (in characters), sequence or map.
    ///
    /// Registered as `length` and `count`.  Absent values have length zero.
    pub fn length(v: Value) -> Value {
        match v.len() {
            Some(len) => Value::from(len),
            None if v.is_absent() => Value::from(0),
            None => v,
        }
    }

    /// Reverses a string or sequence.
    pub fn reverse(v: Value) -> Value {
        if let Some(s) = v.as_str() {
            Value::from(utils::reverse(s))
        } else if let Some(items) = v.as_seq() {
            items.iter().rev().cloned().collect()
        } else {
            v
        }
    }

    /// Rotates ASCII letters by 13 places.
    pub fn rot13(v: String) -> String {
        utils::rot13(&v)
    }

    /// Strips leading and trailing whitespace.
    pub fn trim(v: String) -> String {
        v.trim().to_string()
    }

    /// Normalizes whitespace: trims and collapses runs into one space.
    pub fn squish(v: String) -> String {
        utils::squish(&v)
    }

    /// Inserts `<br>` before newlines.
    pub fn nl2br(v: String) -> String {
        utils::nl2br(&v)
    }

    /// Removes markup tags.
    pub fn striptags(v: String) -> String {
        utils::strip_tags(&v)
    }

    /// Returns the first item of a sequence or character of a string.
    pub fn first(v: Value) -> Value {
        if let Some(s) = v.as_str() {
            s.chars().next().map(Value::from).unwrap_or_default()
        } else if let Some(items) = v.as_seq() {
            items.first().cloned().unwrap_or_default()
        } else {
            v
        }
    }

    /// Returns the last item of a sequence or character of a string.
    pub fn last(v: Value) -> Value {
        if let Some(s) = v.as_str() {
            s.chars().next_back().map(Value::from).unwrap_or_default()
        } else if let Some(items) = v.as_seq() {
            items.last().cloned().unwrap_or_default()
        } else {
            v
        }
    }

    /// Percent encodes a value for use in URLs.
    ///
    /// ```text
    /// <a href="/search?q={{ query|urlencode }}">
    /// ```
    #[cfg(feature = "urlencode")]
    pub fn urlencode(v: String) -> String {
        const SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
            .remove(b'/')
            .remove(b'.')
            .remove(b'-')
            .remove(b'_')
            .add(b' ');
        percent_encoding::utf8_percent_encode(&v, SET).to_string()
    }

    /// Converts a value into its string form.
    pub fn string(v: Value) -> String {
        v.to_string()
    }
}

pub use self::builtins::*;

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_default_only_replaces_absent() {
        let fallback = Value::from("X");
        assert_eq!(default(Value::UNDEFINED, Some(&fallback)), Value::from("X"));
        assert_eq!(default(Value::from(()), Some(&fallback)), Value::from("X"));
        assert_eq!(default(Value::from(0), Some(&fallback)), Value::from(0));
        assert_eq!(default(Value::from(""), Some(&fallback)), Value::from(""));
        assert!(default(Value::UNDEFINED, None).is_undefined());
    }

    #[test]
    fn test_unconvertible_input_passes_through() {
        let filter = BoxedFilter::new(upper);
        assert_eq!(filter.apply_to(&Value::from("abc"), None), Value::from("ABC"));
        assert_eq!(filter.apply_to(&Value::from(42), None), Value::from("42"));
        assert!(filter.apply_to(&Value::UNDEFINED, None).is_undefined());
        let seq = Value::from(vec![1, 2]);
        assert_eq!(filter.apply_to(&seq, None), seq);
    }

    #[test]
    fn test_missing_argument_passes_through() {
        let filter = BoxedFilter::new(truncate);
        assert_eq!(filter.apply_to(&Value::from("hello"), Some("3")), Value::from("hel"));
        assert_eq!(filter.apply_to(&Value::from("hello"), None), Value::from("hello"));
        assert_eq!(filter.apply_to(&Value::from("hello"), Some("x")), Value::from("hello"));
    }

    #[test]
    fn test_closures() {
        let filter = BoxedFilter::new(|v: String, suffix: String| format!("{v}{suffix}"));
        assert_eq!(filter.apply_to(&Value::from("a"), Some("b")), Value::from("ab"));
    }

    #[test]
    fn test_sequence_filters() {
        let items = Value::from(vec!["a", "b", "c"]);
        assert_eq!(join(items.as_seq().unwrap().to_vec(), Some("-".into())), "a-b-c");
        assert_eq!(reverse(items.clone()), Value::from(vec!["c", "b", "a"]));
        assert_eq!(first(items.clone()), Value::from("a"));
        assert_eq!(last(items.clone()), Value::from("c"));
        assert_eq!(length(items), Value::from(3));
        assert_eq!(length(Value::UNDEFINED), Value::from(0));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json() {
        let value = crate::context! { a => vec![1, 2] };
        assert_eq!(json(value), Value::from(r#"{"a":[1,2]}"#));
    }
}
