use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Errors carry the kind of failure, an optional detail message and the
/// location (template name and line) where they happened.  Depending on the
/// kind some extra information is attached:
///
/// * [`ErrorKind::TemplateNotFound`] errors know the path that was attempted
///   and the files that exist next to it ([`Error::siblings`]).
/// * [`ErrorKind::ExecutionError`] errors carry the compiled instruction
///   listing of the template that failed ([`Error::compiled_form`]).
///
/// Formatting an error with the alternative formatting (``format!("{:#}",
/// err)``) renders the offending template line in context and the compiled
/// form if available.
///
/// ```rust
/// # let mut env = stencil::Environment::new();
/// # env.add_template("index", "");
/// match env.render("index") {
///     Ok(result) => println!("{}", result),
///     Err(err) => {
///         eprintln!("Could not render template:");
///         eprintln!("  {:#}", err);
///     }
/// }
/// ```
pub struct Error {
    repr: Box<ErrorRepr>,
}

struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    template_source: Option<String>,
    attempted_path: Option<String>,
    siblings: Vec<String>,
    compiled_form: Option<String>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind());
        if let Some(ref detail) = self.repr.detail {
            err.field("detail", detail);
        }
        if let Some(name) = self.name() {
            err.field("name", &name);
        }
        if let Some(line) = self.line() {
            err.field("line", &line);
        }
        if let Some(ref source) = self.repr.source {
            err.field("source", source);
        }
        err.finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A template directive could not be parsed.
    SyntaxError,
    /// The requested template does not exist in any store.
    TemplateNotFound,
    /// A compiled template failed while being evaluated.
    ExecutionError,
    /// An `include` or `embed` failed.  Never escapes a render.
    FragmentRender,
    /// The template store failed to read a template.
    ReadFailure,
    /// Writing rendered output failed.
    WriteFailure,
    /// A value could not be converted into the engine's value type.
    BadSerialization,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::ExecutionError => "template execution failed",
            ErrorKind::FragmentRender => "could not render fragment",
            ErrorKind::ReadFailure => "could not read template",
            ErrorKind::WriteFailure => "failed to write output",
            ErrorKind::BadSerialization => "could not serialize to value",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.repr.detail {
            write!(f, "{}: {}", self.kind(), detail)?;
        } else {
            write!(f, "{}", self.kind())?;
        }
        if !self.repr.siblings.is_empty() {
            write!(f, " (available: {})", self.repr.siblings.join(", "))?;
        }
        if let Some(ref filename) = self.repr.name {
            write!(f, " (in {}:{})", filename, self.repr.lineno)?
        }
        if f.alternate() {
            if let Some(source) = self.template_source() {
                ok!(render_source_excerpt(f, source, self.repr.lineno));
            }
            if let Some(compiled) = self.compiled_form() {
                writeln!(f)?;
                writeln!(f, "{:-^1$}", " Compiled Template ", 74)?;
                writeln!(f, "{}", compiled.trim_end())?;
                write!(f, "{:-^1$}", "", 74)?;
            }
        }
        Ok(())
    }
}

fn render_source_excerpt(f: &mut fmt::Formatter<'_>, source: &str, lineno: usize) -> fmt::Result {
    let lines: Vec<_> = source.lines().enumerate().collect();
    let idx = lineno.saturating_sub(1);
    if idx >= lines.len() {
        return Ok(());
    }
    writeln!(f)?;
    writeln!(f, "{:-^1$}", " Template Source ", 74)?;
    let skip = idx.saturating_sub(3);
    let pre = lines.iter().skip(skip).take(3.min(idx));
    let post = lines.iter().skip(idx + 1).take(3);
    for (idx, line) in pre {
        writeln!(f, "{:>4} | {}", idx + 1, line)?;
    }
    writeln!(f, "{:>4} > {}", idx + 1, lines[idx].1)?;
    for (idx, line) in post {
        writeln!(f, "{:>4} | {}", idx + 1, line)?;
    }
    write!(f, "{:-^1$}", "", 74)
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        let mut err = Error::from(kind);
        err.repr.detail = Some(detail.into());
        err
    }

    /// Creates a not found error that lists the attempted path and
    /// the templates found next to it.
    pub(crate) fn new_not_found(name: &str, attempted_path: String, siblings: Vec<String>) -> Error {
        let mut err = Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist (looked in {attempted_path})"),
        );
        err.repr.attempted_path = Some(attempted_path);
        err.repr.siblings = siblings;
        err
    }

    pub(crate) fn set_location(&mut self, filename: &str, lineno: usize) {
        self.repr.name = Some(filename.into());
        self.repr.lineno = lineno;
    }

    pub(crate) fn has_location(&self) -> bool {
        self.repr.name.is_some()
    }

    pub(crate) fn set_template_source(&mut self, source: &str) {
        if self.repr.template_source.is_none() {
            self.repr.template_source = Some(source.to_string());
        }
    }

    pub(crate) fn set_compiled_form(&mut self, compiled: String) {
        if self.repr.compiled_form.is_none() {
            self.repr.compiled_form = Some(compiled);
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the error detail
    ///
    /// The detail is an error message that provides further details about
    /// the error kind.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the name of the template that failed.
    pub fn name(&self) -> Option<&str> {
        self.repr.name.as_deref()
    }

    /// Returns the line.
    pub fn line(&self) -> Option<usize> {
        self.repr.name.as_ref().map(|_| self.repr.lineno)
    }

    /// For not found errors, the path the store tried to load.
    pub fn attempted_path(&self) -> Option<&str> {
        self.repr.attempted_path.as_deref()
    }

    /// For not found errors, the names of the templates next to the
    /// attempted path.
    pub fn siblings(&self) -> &[String] {
        &self.repr.siblings
    }

    /// For execution errors, the instruction listing of the compiled
    /// template that failed.
    pub fn compiled_form(&self) -> Option<&str> {
        self.repr.compiled_form.as_deref()
    }

    /// Returns the template source if available.
    pub fn template_source(&self) -> Option<&str> {
        self.repr.template_source.as_deref()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                name: None,
                lineno: 0,
                source: None,
                template_source: None,
                attempted_path: None,
                siblings: Vec::new(),
                compiled_form: None,
            }),
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::WriteFailure, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
