use std::fmt;

use crate::environment::Environment;
use crate::session::RenderSession;
use crate::template::CompiledTemplate;
use crate::vm::context::Context;

/// The execution state of a single template evaluation.
///
/// Fragments (includes, embeds and partials) do not share the state of
/// their parent; they are rendered with a state of their own.
pub(crate) struct State<'vm, 'env> {
    pub(crate) env: &'env Environment,
    pub(crate) ctx: Context,
    pub(crate) template: &'vm CompiledTemplate,
    pub(crate) session: &'vm RenderSession,
}

impl fmt::Debug for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl<'vm, 'env> State<'vm, 'env> {
    /// Returns the name of the template being evaluated.
    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// Creates the session for a fragment rendered from this state.
    pub fn fork_session(&self) -> RenderSession {
        self.session.fork()
    }
}
