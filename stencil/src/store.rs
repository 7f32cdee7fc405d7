//! Template stores supply raw template sources by name.
//!
//! The [`Environment`](crate::Environment) first consults the templates that
//! were added with [`add_template`](crate::Environment::add_template) and then
//! the configured [`TemplateStore`].  Two stores ship with the crate: the
//! [`MemoryStore`] and the [`FileSystemStore`].
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Supplies template sources by name.
///
/// Names use forward slashes as separators independent of the platform.
pub trait TemplateStore: Send + Sync {
    /// Returns `true` if the store has a template with that name.
    fn exists(&self, name: &str) -> bool;

    /// Reads the source of a template.  `Ok(None)` means the template
    /// does not exist.
    fn read(&self, name: &str) -> Result<Option<String>, Error>;

    /// Lists the names of the templates next to `name` (in the same
    /// directory), sorted.  Used for not found errors.
    fn list_siblings(&self, name: &str) -> Vec<String>;

    /// Describes where the store looked for `name`.
    fn describe(&self, name: &str) -> String;
}

fn split_dir(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(idx) => (&name[..idx + 1], &name[idx + 1..]),
        None => ("", name),
    }
}

/// A store that holds template sources in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    templates: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Adds or replaces a template.
    pub fn insert<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) {
        self.templates.insert(name.into(), source.into());
    }

    /// Removes a template.
    pub fn remove(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Returns the source of a template.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(|x| x.as_str())
    }

    /// Returns `true` if no templates were added.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    fn read(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.templates.get(name).cloned())
    }

    fn list_siblings(&self, name: &str) -> Vec<String> {
        let (dir, _) = split_dir(name);
        self.templates
            .keys()
            .filter_map(|key| key.strip_prefix(dir))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect()
    }

    fn describe(&self, name: &str) -> String {
        format!("<memory>/{name}")
    }
}

/// Safely joins two paths.
///
/// Segments starting with a dot and backslashes are rejected so that a
/// template name cannot escape the base directory.
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// A store that loads templates from a directory.
///
/// ```no_run
/// # use stencil::{Environment, FileSystemStore};
/// let mut env = Environment::new();
/// env.set_store(FileSystemStore::new("templates").with_extension("tpl"));
/// // loads templates/pages/home.tpl
/// let rv = env.render("pages/home");
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
    extension: Option<String>,
}

impl FileSystemStore {
    /// Creates a store rooted at the given directory.
    pub fn new<P: AsRef<Path>>(root: P) -> FileSystemStore {
        FileSystemStore {
            root: root.as_ref().to_path_buf(),
            extension: None,
        }
    }

    /// Sets an extension that is appended to names without one.
    pub fn with_extension(mut self, extension: &str) -> FileSystemStore {
        let extension = extension.trim_start_matches('.');
        self.extension = if extension.is_empty() {
            None
        } else {
            Some(extension.to_string())
        };
        self
    }

    /// Returns the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let (_, file_name) = split_dir(name);
        match self.extension {
            Some(ref ext) if !file_name.contains('.') => {
                safe_join(&self.root, &format!("{name}.{ext}"))
            }
            _ => safe_join(&self.root, name),
        }
    }
}

impl TemplateStore for FileSystemStore {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map_or(false, |path| path.is_file())
    }

    fn read(&self, name: &str) -> Result<Option<String>, Error> {
        let path = match self.resolve(name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(&path) {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::new(
                ErrorKind::ReadFailure,
                format!("could not read {}", path.display()),
            )
            .with_source(err)),
        }
    }

    fn list_siblings(&self, name: &str) -> Vec<String> {
        let (dir, _) = split_dir(name);
        let dir = match dir.trim_end_matches('/') {
            "" => Some(self.root.clone()),
            dir => safe_join(&self.root, dir),
        };
        let entries = match dir.map(fs::read_dir) {
            Some(Ok(entries)) => entries,
            _ => return Vec::new(),
        };
        let mut rv: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map_or(false, |x| x.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        rv.sort();
        rv
    }

    fn describe(&self, name: &str) -> String {
        match self.resolve(name) {
            Some(path) => path.display().to_string(),
            None => format!("{} (invalid template name)", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar\\baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar//baz"), None);
    }

    #[test]
    fn test_memory_siblings() {
        let mut store = MemoryStore::new();
        store.insert("index.tpl", "");
        store.insert("partials/row.tpl", "");
        store.insert("partials/card.tpl", "");
        store.insert("partials/deep/x.tpl", "");
        assert_eq!(
            store.list_siblings("partials/nope.tpl"),
            vec!["card.tpl", "row.tpl"]
        );
        assert_eq!(store.list_siblings("nope.tpl"), vec!["index.tpl"]);
        assert!(store.exists("index.tpl"));
        assert_eq!(store.read("nope").unwrap(), None);
    }

    #[test]
    fn test_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("partials")).unwrap();
        fs::write(dir.path().join("partials/row.tpl"), "{{item}}").unwrap();
        fs::write(dir.path().join("partials/card.tpl"), "card").unwrap();
        fs::write(dir.path().join("partials/.hidden"), "").unwrap();

        let store = FileSystemStore::new(dir.path()).with_extension(".tpl");
        assert!(store.exists("partials/row"));
        assert!(store.exists("partials/row.tpl"));
        assert!(!store.exists("partials/nope"));
        assert_eq!(
            store.read("partials/row").unwrap().as_deref(),
            Some("{{item}}")
        );
        assert_eq!(store.read("../etc/passwd").unwrap(), None);
        assert_eq!(
            store.list_siblings("partials/nope"),
            vec!["card.tpl", "row.tpl"]
        );
        assert!(store.describe("partials/nope").ends_with("nope.tpl"));
    }
}
