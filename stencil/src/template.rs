use std::fmt;

use crate::compiler::codegen::{record_declarations, CodeGenerator};
use crate::compiler::instructions::Instructions;
use crate::compiler::parser::parse;
use crate::error::Error;
use crate::session::RenderSession;

/// A template compiled against a [`RenderSession`].
///
/// Compilation has side effects on the session: the declared layout and
/// the captured sections are recorded on it, and `fill` directives are
/// resolved from it.  Because of that a compiled template is only valid
/// for the render it was compiled for and is never cached.
///
/// The [`Debug`](fmt::Debug) form shows the instruction listing:
///
/// ```
/// let env = stencil::Environment::new();
/// let tmpl = env.compile_str("Hello {{ name|upper }}!").unwrap();
/// assert_eq!(tmpl.instructions().len(), 5);
/// ```
#[derive(Clone)]
pub struct CompiledTemplate {
    name: String,
    source: String,
    instructions: Instructions,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .finish()
    }
}

impl CompiledTemplate {
    pub(crate) fn compile(
        name: &str,
        source: String,
        session: &mut RenderSession,
    ) -> Result<CompiledTemplate, Error> {
        let instructions = {
            let ast = ok!(parse(&source, name));
            let captured = record_declarations(&ast, name, session);
            let mut gen = CodeGenerator::new(session);
            ok!(gen.compile_stmt(&ast).map_err(|mut err| {
                if !err.has_location() {
                    err.set_location(name, 0);
                }
                err
            }));
            let instructions = gen.finish();
            tracing::debug!(
                template = name,
                layout = ?session.current_layout(),
                sections = captured,
                instructions = instructions.len(),
                "compiled template"
            );
            instructions
        };
        Ok(CompiledTemplate {
            name: name.to_string(),
            source,
            instructions,
        })
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the compiled instructions.
    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    /// The textual form of the instructions as reported by execution
    /// errors.
    pub fn compiled_form(&self) -> String {
        format!("{:#?}", self.instructions)
    }
}
