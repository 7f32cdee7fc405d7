//! Per-render layout and section bookkeeping.
//!
//! A [`RenderSession`] is created for every top level render call.  While
//! templates are compiled, `extends` declares the layout on the session
//! and `section` blocks capture their body text into it.  When the layout
//! is compiled afterwards its `fill` directives are resolved against the
//! captured sections.
use std::collections::BTreeMap;

/// A section body captured while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSection {
    pub(crate) origin: String,
    pub(crate) source: String,
    pub(crate) line: u32,
    pub(crate) col: u32,
}

impl CapturedSection {
    /// The name of the template the section was captured from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The raw template source of the section body.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The line in the origin template where the body starts.
    pub fn line(&self) -> u32 {
        self.line
    }
}

/// Holds the layout pointer and captured sections of one render.
///
/// ```
/// # use stencil::RenderSession;
/// let mut session = RenderSession::new();
/// session.declare_layout("base");
/// session.capture_section("title", "Hello");
/// assert_eq!(session.current_layout(), Some("base"));
/// assert_eq!(session.resolve_fill("title"), "Hello");
/// assert_eq!(session.resolve_fill("missing"), "");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RenderSession {
    layout: Option<String>,
    sections: BTreeMap<String, CapturedSection>,
}

impl RenderSession {
    /// Creates an empty session.
    pub fn new() -> RenderSession {
        RenderSession::default()
    }

    /// Records the layout the current template extends.
    pub fn declare_layout(&mut self, name: &str) {
        self.layout = Some(name.to_string());
    }

    /// Captures a section body.
    ///
    /// Returns `false` if a section with that name was captured before,
    /// in which case the earlier capture is kept.  This lets content
    /// templates override the defaults of the layouts they extend.
    pub fn capture_section(&mut self, name: &str, text: &str) -> bool {
        self.capture_section_at(name, text, "<session>", 1, 0)
    }

    pub(crate) fn capture_section_at(
        &mut self,
        name: &str,
        text: &str,
        origin: &str,
        line: u32,
        col: u32,
    ) -> bool {
        if self.sections.contains_key(name) {
            return false;
        }
        self.sections.insert(
            name.to_string(),
            CapturedSection {
                origin: origin.to_string(),
                source: text.to_string(),
                line,
                col,
            },
        );
        true
    }

    /// Returns the captured text of a section or an empty string.
    pub fn resolve_fill(&self, name: &str) -> &str {
        self.sections
            .get(name)
            .map_or("", |section| section.source.as_str())
    }

    /// Returns the captured section with all its origin information.
    pub fn section(&self, name: &str) -> Option<&CapturedSection> {
        self.sections.get(name)
    }

    /// The names of all captured sections.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(|x| x.as_str())
    }

    /// The layout declared by the most recently compiled template.
    pub fn current_layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    /// Takes the declared layout out of the session.
    pub fn take_layout(&mut self) -> Option<String> {
        self.layout.take()
    }

    /// Creates a session for a fragment (include, embed or partial).
    ///
    /// The fragment sees the sections captured so far but it cannot
    /// change the layout of its parent.
    pub fn fork(&self) -> RenderSession {
        RenderSession {
            layout: None,
            sections: self.sections.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_first_capture_wins() {
        let mut session = RenderSession::new();
        assert!(session.capture_section("s", "content"));
        assert!(!session.capture_section("s", "layout default"));
        assert_eq!(session.resolve_fill("s"), "content");
    }

    #[test]
    fn test_take_layout() {
        let mut session = RenderSession::new();
        assert_eq!(session.current_layout(), None);
        session.declare_layout("a");
        session.declare_layout("b");
        assert_eq!(session.take_layout().as_deref(), Some("b"));
        assert_eq!(session.current_layout(), None);
    }

    #[test]
    fn test_fork_keeps_sections_only() {
        let mut session = RenderSession::new();
        session.declare_layout("base");
        session.capture_section("s", "x");
        let child = session.fork();
        assert_eq!(child.current_layout(), None);
        assert_eq!(child.resolve_fill("s"), "x");
        assert_eq!(child.section_names().collect::<Vec<_>>(), vec!["s"]);
    }
}
