use std::collections::BTreeMap;

use crate::filters::{self, BoxedFilter};

/// Name of the reserved fallback filter.
pub(crate) const DEFAULT_FILTER: &str = "default";

/// Maximum nesting of include, embed and each partials.
pub(crate) const MAX_RENDER_DEPTH: usize = 100;

/// Maximum nesting of `fill` directives inside section bodies.
pub(crate) const MAX_FILL_DEPTH: usize = 32;

pub(crate) fn get_builtin_filters() -> BTreeMap<&'static str, BoxedFilter> {
    let mut rv = BTreeMap::new();
    rv.insert("upper", BoxedFilter::new(filters::upper));
    rv.insert("lower", BoxedFilter::new(filters::lower));
    rv.insert("capitalize", BoxedFilter::new(filters::capitalize));
    rv.insert("lcfirst", BoxedFilter::new(filters::lcfirst));
    rv.insert("title", BoxedFilter::new(filters::title));
    rv.insert("camel", BoxedFilter::new(filters::camel));
    rv.insert("pascal", BoxedFilter::new(filters::pascal));
    rv.insert("snake", BoxedFilter::new(filters::snake));
    rv.insert("kebab", BoxedFilter::new(filters::kebab));
    rv.insert("slugify", BoxedFilter::new(filters::slugify));
    rv.insert("truncate", BoxedFilter::new(filters::truncate));
    rv.insert("limit_words", BoxedFilter::new(filters::limit_words));
    rv.insert("join", BoxedFilter::new(filters::join));
    rv.insert("escape", BoxedFilter::new(filters::escape));
    rv.insert("e", BoxedFilter::new(filters::escape));
    rv.insert("length", BoxedFilter::new(filters::length));
    rv.insert("count", BoxedFilter::new(filters::length));
    rv.insert("reverse", BoxedFilter::new(filters::reverse));
    rv.insert("rot13", BoxedFilter::new(filters::rot13));
    rv.insert("trim", BoxedFilter::new(filters::trim));
    rv.insert("squish", BoxedFilter::new(filters::squish));
    rv.insert("nl2br", BoxedFilter::new(filters::nl2br));
    rv.insert("striptags", BoxedFilter::new(filters::striptags));
    rv.insert("first", BoxedFilter::new(filters::first));
    rv.insert("last", BoxedFilter::new(filters::last));
    rv.insert("string", BoxedFilter::new(filters::string));
    #[cfg(feature = "json")]
    {
        rv.insert("json", BoxedFilter::new(filters::json));
    }
    #[cfg(feature = "urlencode")]
    {
        rv.insert("urlencode", BoxedFilter::new(filters::urlencode));
    }
    rv
}

/// The marker written in place of an include or embed that failed.
pub(crate) fn default_fragment_error_formatter(err: &crate::Error) -> String {
    let mut rv = format!("[{}", err);
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        rv.push_str(": ");
        rv.push_str(&cause.to_string());
        source = cause.source();
    }
    rv.push(']');
    rv
}
