use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::{fmt, io};

use serde::Serialize;

use crate::defaults::{self, DEFAULT_FILTER};
use crate::error::Error;
use crate::filters::{BoxedFilter, Filter, FilterArgs, FilterInput};
use crate::output::{Output, WriteWrapper};
use crate::session::RenderSession;
use crate::store::{MemoryStore, TemplateStore};
use crate::template::CompiledTemplate;
use crate::value::{merge_maps, Value, ValueMap};
use crate::vm::Vm;

type FragmentErrorFormatter = dyn Fn(&Error) -> String + Sync + Send;

/// The name used for templates rendered from a string.
const STRING_TEMPLATE_NAME: &str = "<string>";

/// An abstraction that holds the engine configuration.
///
/// The environment is where templates are looked up, where global data is
/// kept and where filters are registered.  It is cheap to clone, and it is
/// `Send` and `Sync` so it can be shared between threads.  Every render
/// call uses a fresh [`RenderSession`] so renders never see each other's
/// layouts or sections.
///
/// ```
/// # use stencil::{context, Environment};
/// let mut env = Environment::new();
/// env.add_template("row", "<li>{{ item.name|upper }}</li>");
/// env.add_template("list", "<ul>{{each item in items using 'row'}}</ul>");
/// let rv = env.render_with("list", context! {
///     items => vec![context! { name => "a" }, context! { name => "b" }],
/// }).unwrap();
/// assert_eq!(rv, "<ul><li>A</li><li>B</li></ul>");
/// ```
#[derive(Clone)]
pub struct Environment {
    templates: MemoryStore,
    store: Option<Arc<dyn TemplateStore>>,
    globals: ValueMap,
    filters: BTreeMap<Cow<'static, str>, BoxedFilter>,
    builtin_filters: Arc<BTreeMap<&'static str, BoxedFilter>>,
    fragment_error_formatter: Arc<FragmentErrorFormatter>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("templates", &self.templates)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Environment {
    /// Creates a new environment.
    ///
    /// It has no templates and no globals, but all the built-in filters
    /// are available.
    pub fn new() -> Environment {
        Environment {
            templates: MemoryStore::new(),
            store: None,
            globals: ValueMap::new(),
            filters: BTreeMap::new(),
            builtin_filters: Arc::new(defaults::get_builtin_filters()),
            fragment_error_formatter: Arc::new(defaults::default_fragment_error_formatter),
        }
    }

    /// Adds a template from a string.
    ///
    /// Templates added this way are looked up before the configured
    /// [`TemplateStore`].  Adding a template with an existing name
    /// replaces it.
    pub fn add_template<N, S>(&mut self, name: N, source: S)
    where
        N: Into<String>,
        S: Into<String>,
    {
        self.templates.insert(name, source);
    }

    /// Removes a template added with [`add_template`](Self::add_template).
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Sets the store that templates are loaded from.
    pub fn set_store<S: TemplateStore + 'static>(&mut self, store: S) {
        self.store = Some(Arc::new(store));
    }

    /// Returns `true` if a template with that name can be loaded.
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.exists(name) || self.store.as_ref().map_or(false, |s| s.exists(name))
    }

    /// Adds a global variable.
    ///
    /// Globals are visible in every render.  Values passed to a render
    /// call win over globals with the same name.
    pub fn add_global<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Arc<str>>,
        V: Into<Value>,
    {
        self.globals.insert(name.into(), value.into());
    }

    /// Merges a map of values into the globals.
    ///
    /// Existing globals with the same name are replaced.  Anything that
    /// does not serialize to a map is ignored.
    ///
    /// ```
    /// # use stencil::{context, Environment};
    /// let mut env = Environment::new();
    /// env.set_globals(context! { site => "Example", year => 2024 });
    /// assert_eq!(env.render_str("{{ site }} {{ year }}", ()).unwrap(), "Example 2024");
    /// ```
    pub fn set_globals<S: Serialize>(&mut self, values: S) {
        let values = Value::from_serialize(&values);
        match values.as_map() {
            Some(map) => {
                for (key, value) in map.iter() {
                    self.globals.insert(key.clone(), value.clone());
                }
            }
            None => {
                tracing::warn!(kind = %values.kind(), "globals must be a map, ignoring");
            }
        }
    }

    /// Returns a global variable.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Registers a filter.
    ///
    /// User filters shadow built-in filters of the same name.  The name
    /// `default` is reserved and cannot be registered.  For details about
    /// filters have a look at [`filters`](crate::filters).
    pub fn add_filter<N, F, V, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'static, str>>,
        F: Filter<V, Rv, Args>,
        V: FilterInput + 'static,
        Rv: Into<Value> + 'static,
        Args: FilterArgs + 'static,
    {
        let name = name.into();
        if name == DEFAULT_FILTER {
            tracing::warn!("the default filter is reserved and cannot be replaced");
            return;
        }
        self.filters.insert(name, BoxedFilter::new(f));
    }

    /// Alias of [`add_filter`](Self::add_filter).
    pub fn register<N, F, V, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'static, str>>,
        F: Filter<V, Rv, Args>,
        V: FilterInput + 'static,
        Rv: Into<Value> + 'static,
        Args: FilterArgs + 'static,
    {
        self.add_filter(name, f)
    }

    /// Removes a registered filter.
    ///
    /// Built-in filters of the same name become visible again.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    /// Sets the function that turns a failed include or embed into the
    /// text written in its place.
    ///
    /// The default writes `[` followed by the error and its causes and a
    /// closing `]`.
    ///
    /// ```
    /// # use stencil::Environment;
    /// let mut env = Environment::new();
    /// env.set_fragment_error_formatter(|_| "<!-- broken -->".into());
    /// env.add_template("page", "a{{include 'missing'}}b");
    /// assert_eq!(env.render("page").unwrap(), "a<!-- broken -->b");
    /// ```
    pub fn set_fragment_error_formatter<F>(&mut self, f: F)
    where
        F: Fn(&Error) -> String + Sync + Send + 'static,
    {
        self.fragment_error_formatter = Arc::new(f);
    }

    /// Renders a template with only the globals as context.
    pub fn render(&self, name: &str) -> Result<String, Error> {
        self.render_with(name, ())
    }

    /// Renders a template with an extra context.
    ///
    /// The context is anything that serializes to a map.  Its values win
    /// over globals of the same name.
    pub fn render_with<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, Error> {
        let mut rv = String::new();
        ok!(self.render_impl(
            name,
            None,
            Value::from_serialize(&ctx),
            &mut Output::new(&mut rv)
        ));
        Ok(rv)
    }

    /// Renders a template directly into a [`io::Write`].
    ///
    /// Output is streamed as it is produced.  Note that includes and
    /// embeds are buffered until they completed so a failing fragment
    /// never leaves partial output behind.
    pub fn render_to_write<S: Serialize, W: io::Write>(
        &self,
        name: &str,
        ctx: S,
        w: W,
    ) -> Result<(), Error> {
        let mut wrapper = WriteWrapper::new(w);
        self.render_impl(
            name,
            None,
            Value::from_serialize(&ctx),
            &mut Output::new(&mut wrapper),
        )
        .map_err(|err| wrapper.take_err(err))
    }

    /// Renders a template from a string.
    ///
    /// The template is named `<string>`.  It can extend layouts and use
    /// partials from the environment.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        let mut rv = String::new();
        ok!(self.render_impl(
            STRING_TEMPLATE_NAME,
            Some(source.to_string()),
            Value::from_serialize(&ctx),
            &mut Output::new(&mut rv)
        ));
        Ok(rv)
    }

    /// Compiles a template for inspection.
    ///
    /// The template is compiled against an empty session, so `fill`
    /// directives compile to nothing unless the template defines the
    /// section itself.  Layouts are not followed.
    pub fn compile(&self, name: &str) -> Result<CompiledTemplate, Error> {
        let source = ok!(self.load_source(name));
        CompiledTemplate::compile(name, source, &mut RenderSession::new())
    }

    /// Compiles a template from a string for inspection.
    pub fn compile_str(&self, source: &str) -> Result<CompiledTemplate, Error> {
        CompiledTemplate::compile(
            STRING_TEMPLATE_NAME,
            source.to_string(),
            &mut RenderSession::new(),
        )
    }

    fn render_impl(
        &self,
        name: &str,
        source: Option<String>,
        ctx: Value,
        out: &mut Output,
    ) -> Result<(), Error> {
        let root = merge_maps([Value::from(self.globals.clone()), ctx]);
        let mut session = RenderSession::new();
        Vm::new(self).render(name, source, &root, root.clone(), &mut session, 0, out)
    }

    /// Loads the source of a template.
    pub(crate) fn load_source(&self, name: &str) -> Result<String, Error> {
        if let Some(source) = self.templates.get(name) {
            return Ok(source.to_string());
        }
        if let Some(ref store) = self.store {
            if let Some(source) = ok!(store.read(name)) {
                return Ok(source);
            }
        }
        Err(self.not_found(name))
    }

    #[cold]
    fn not_found(&self, name: &str) -> Error {
        let mut siblings = self.templates.list_siblings(name);
        let attempted_path = match self.store {
            Some(ref store) => {
                siblings.extend(store.list_siblings(name));
                store.describe(name)
            }
            None => self.templates.describe(name),
        };
        siblings.sort();
        siblings.dedup();
        Error::new_not_found(name, attempted_path, siblings)
    }

    /// Applies a filter by name.  Unknown filters pass the value through.
    pub(crate) fn apply_filter(&self, name: &str, value: &Value, arg: Option<&str>) -> Value {
        if let Some(filter) = self.filters.get(name) {
            return filter.apply_to(value, arg);
        }
        if let Some(filter) = self.builtin_filters.get(name) {
            return filter.apply_to(value, arg);
        }
        tracing::trace!(filter = name, "unknown filter, passing value through");
        value.clone()
    }

    /// Produces the text that replaces a failed fragment.
    pub(crate) fn format_fragment_error(&self, err: &Error) -> String {
        (self.fragment_error_formatter)(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::context;
    use crate::error::ErrorKind;

    #[test]
    fn test_environment_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Environment>();
    }

    #[test]
    fn test_apply_filter_lookup_order() {
        let mut env = Environment::new();
        let value = Value::from("Hello");
        assert_eq!(env.apply_filter("upper", &value, None), Value::from("HELLO"));
        assert_eq!(env.apply_filter("nope", &value, None), value);
        env.add_filter("upper", |v: String| format!("<{v}>"));
        assert_eq!(env.apply_filter("upper", &value, None), Value::from("<Hello>"));
        env.remove_filter("upper");
        assert_eq!(env.apply_filter("upper", &value, None), Value::from("HELLO"));
    }

    #[test]
    fn test_default_filter_cannot_be_registered() {
        let mut env = Environment::new();
        env.add_filter("default", |_: Value| "replaced");
        assert_eq!(
            env.render_str("{{ missing|default:'x' }}", ()).unwrap(),
            "x"
        );
    }

    #[test]
    fn test_globals_lose_against_context() {
        let mut env = Environment::new();
        env.add_global("name", "global");
        env.add_global("other", 1);
        let rv = env
            .render_str("{{ name }} {{ other }}", context! { name => "local" })
            .unwrap();
        assert_eq!(rv, "local 1");
        assert_eq!(env.get_global("other"), Some(Value::from(1)));
    }

    #[test]
    fn test_set_globals_merges() {
        let mut env = Environment::new();
        env.add_global("a", 1);
        env.set_globals(context! { a => 2, b => 3 });
        env.set_globals(vec![1, 2, 3]);
        assert_eq!(env.get_global("a"), Some(Value::from(2)));
        assert_eq!(env.get_global("b"), Some(Value::from(3)));
    }

    #[test]
    fn test_not_found_merges_siblings() {
        let mut env = Environment::new();
        env.add_template("pages/a.tpl", "");
        env.add_template("pages/b.tpl", "");
        env.add_template("other.tpl", "");
        let err = env.render("pages/c.tpl").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
        assert_eq!(err.siblings(), ["a.tpl", "b.tpl"]);
        assert_eq!(err.attempted_path(), Some("<memory>/pages/c.tpl"));
        assert!(!env.has_template("pages/c.tpl"));
        assert!(env.has_template("pages/a.tpl"));
    }
}
