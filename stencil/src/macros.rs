// `ok!` is a less bloaty alternative to the standard library's try operator (`?`).
// Since we do not need type conversions in this crate we can fall back to much easier match
// patterns that compile faster and produce less bloaty code.

macro_rules! ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => return Err(err),
        }
    };
}

/// Hidden utility module for the [`context!`](crate::context!) macro.
#[doc(hidden)]
pub mod __context {
    use crate::value::{Value, ValueMap};

    #[inline(always)]
    pub fn make() -> ValueMap {
        ValueMap::default()
    }

    #[inline(always)]
    pub fn add(ctx: &mut ValueMap, key: &'static str, value: Value) {
        ctx.insert(key.into(), value);
    }

    #[inline(always)]
    pub fn build(ctx: ValueMap) -> Value {
        Value::from(ctx)
    }
}

/// Creates a render context from keys and values.
///
/// ```rust
/// # use stencil::context;
/// let ctx = context! {
///     name => "Peter",
///     location => "World",
/// };
/// ```
///
/// If the variable name matches the key name it can be omitted:
///
/// ```rust
/// # use stencil::context;
/// let name = "Peter";
/// let ctx = context! { name };
/// ```
///
/// Other maps can be merged in with a leading `..`.  Keys set explicitly
/// win over merged keys, and earlier merged values win over later ones:
///
/// ```rust
/// # use stencil::context;
/// let defaults = context! { title => "Untitled", lang => "en" };
/// let ctx = context! { title => "Home", ..defaults };
/// ```
///
/// Values are converted with [`Value::from_serialize`](crate::Value::from_serialize).
#[macro_export]
macro_rules! context {
    () => {
        $crate::__context::build($crate::__context::make())
    };
    (
        $($key:ident $(=> $value:expr)?),*
        $(, .. $ctx:expr)* $(,)?
    ) => {{
        let mut ctx = $crate::__context::make();
        $(
            $crate::__context_pair!(ctx, $key $(=> $value)?);
        )*
        let ctx = $crate::__context::build(ctx);
        let merge_ctx: Vec<$crate::Value> = vec![
            $(
                $crate::Value::from($ctx),
            )*
        ];
        $crate::value::merge_maps(
            merge_ctx.into_iter().rev().chain(::std::iter::once(ctx)))
    }};
    (
        $(.. $ctx:expr),* $(,)?
    ) => {{
        let merge_ctx: Vec<$crate::Value> = vec![
            $(
                $crate::Value::from($ctx),
            )*
        ];
        $crate::value::merge_maps(merge_ctx.into_iter().rev())
    }};
}

#[macro_export]
#[doc(hidden)]
macro_rules! __context_pair {
    ($ctx:ident, $key:ident) => {{
        $crate::__context_pair!($ctx, $key => $key);
    }};
    ($ctx:ident, $key:ident => $value:expr) => {
        $crate::__context::add(
            &mut $ctx,
            stringify!($key),
            $crate::Value::from_serialize(&$value),
        );
    };
}
