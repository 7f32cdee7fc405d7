use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::compiler::instructions::Instruction;
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::filters;
use crate::output::Output;
use crate::session::RenderSession;
use crate::template::CompiledTemplate;
use crate::value::{merge_maps, Value, ValueKind, ValueMap};
use crate::vm::context::{Context, Stack};
use crate::vm::state::State;

mod context;
mod state;

/// Helps to evaluate something.
pub struct Vm<'env> {
    env: &'env Environment,
}

/// Orders two values for the relational operators.
///
/// Absent values are never ordered, so every comparison with them is
/// false.  Values of unrelated kinds cannot be compared at all.
fn ordering(a: &Value, b: &Value) -> Result<Option<Ordering>, Error> {
    if a.is_absent() || b.is_absent() {
        return Ok(None);
    }
    match a.partial_order(b) {
        Some(rv) => Ok(Some(rv)),
        // NaN
        None if a.kind() == ValueKind::Number && b.kind() == ValueKind::Number => Ok(None),
        None => Err(Error::new(
            ErrorKind::ExecutionError,
            format!("cannot compare {} and {}", a.kind(), b.kind()),
        )),
    }
}

impl<'env> Vm<'env> {
    /// Creates a new VM.
    pub fn new(env: &'env Environment) -> Vm<'env> {
        Vm { env }
    }

    /// Renders a template and the layouts it extends.
    ///
    /// The template is compiled and evaluated first.  If it declared a
    /// layout its output is thrown away and the layout is compiled and
    /// evaluated next, with its `fill` directives resolving against the
    /// sections captured so far.  This repeats until a template does not
    /// extend anything; only that last template writes to `out`.
    ///
    /// `source` optionally supplies the source of the first template
    /// instead of loading it from the environment.  `root` is the root
    /// context of the whole render, `vars` the context of this template.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        name: &str,
        source: Option<String>,
        root: &Value,
        vars: Value,
        session: &mut RenderSession,
        depth: usize,
        out: &mut Output,
    ) -> Result<(), Error> {
        let mut seen = BTreeSet::new();
        let mut name = name.to_string();
        let mut source = source;
        loop {
            if !seen.insert(name.clone()) {
                return Err(Error::new(
                    ErrorKind::ExecutionError,
                    format!("cycle in template inheritance: {name:?} was extended twice"),
                ));
            }
            let text = match source.take() {
                Some(text) => text,
                None => ok!(self.env.load_source(&name)),
            };
            let tmpl = ok!(CompiledTemplate::compile(&name, text, session));
            match session.take_layout() {
                Some(layout) => {
                    tracing::debug!(template = %name, layout = %layout, "rendering content phase");
                    ok!(self.eval(&tmpl, root, vars.clone(), session, depth, &mut Output::null()));
                    name = layout;
                }
                None => {
                    tracing::debug!(template = %name, depth, "rendering final phase");
                    return self.eval(&tmpl, root, vars, session, depth, out);
                }
            }
        }
    }

    fn eval(
        &self,
        template: &CompiledTemplate,
        root: &Value,
        vars: Value,
        session: &RenderSession,
        depth: usize,
        out: &mut Output,
    ) -> Result<(), Error> {
        let state = State {
            env: self.env,
            ctx: ok!(Context::new(vars, root.clone(), depth)),
            template,
            session,
        };
        self.eval_state(&state, out)
    }

    /// This is the actual evaluation loop.
    fn eval_state(&self, state: &State<'_, 'env>, out: &mut Output) -> Result<(), Error> {
        let instructions = state.template.instructions();
        let mut stack = Stack::default();
        let mut pc = 0u32;

        while let Some(instr) = instructions.get(pc) {
            // values popped for the current instruction and a potential
            // error that needs processing.
            let a;
            let b;
            let mut err;

            macro_rules! bail {
                ($err:expr) => {{
                    err = $err;
                    process_err(&mut err, pc, state);
                    return Err(err);
                }};
            }

            macro_rules! ctx_ok {
                ($expr:expr) => {
                    match $expr {
                        Ok(rv) => rv,
                        Err(err) => bail!(err),
                    }
                };
            }

            macro_rules! cmp_binop {
                ($check:expr) => {{
                    b = ctx_ok!(stack.pop());
                    a = ctx_ok!(stack.pop());
                    let rv = ctx_ok!(ordering(&a, &b)).map_or(false, $check);
                    stack.push(Value::from(rv));
                }};
            }

            match instr {
                Instruction::EmitRaw(val) => {
                    // this only produces a format error, no need to attach
                    // location information.
                    ok!(out.write_str(val).map_err(Error::from));
                }
                Instruction::Emit => {
                    a = ctx_ok!(stack.pop());
                    ok!(write!(out, "{}", a).map_err(Error::from));
                }
                Instruction::Lookup(name) => {
                    stack.push(state.ctx.load(name));
                }
                Instruction::GetAttr(name) => {
                    a = ctx_ok!(stack.pop());
                    stack.push(a.get_attr(name));
                }
                Instruction::LoadConst(value) => {
                    stack.push(value.clone());
                }
                Instruction::BuildMap(pair_count) => {
                    let mut pairs = Vec::with_capacity(*pair_count);
                    for _ in 0..*pair_count {
                        let value = ctx_ok!(stack.pop());
                        let key = ctx_ok!(stack.pop());
                        pairs.push((key, value));
                    }
                    let mut map = ValueMap::new();
                    for (key, value) in pairs.into_iter().rev() {
                        match key.as_str() {
                            Some(key) => map.insert(Arc::from(key), value),
                            None => bail!(Error::new(
                                ErrorKind::ExecutionError,
                                format!("map keys must be strings, got {}", key.kind())
                            )),
                        };
                    }
                    stack.push(Value::from(map));
                }
                Instruction::ApplyFilter(name, arg) => {
                    a = ctx_ok!(stack.pop());
                    stack.push(state.env.apply_filter(name, &a, arg.as_deref()));
                }
                Instruction::ApplyDefault(arg) => {
                    a = ctx_ok!(stack.pop());
                    let fallback = arg.as_deref().map(Value::from);
                    stack.push(filters::default(a, fallback.as_ref()));
                }
                Instruction::Eq => {
                    b = ctx_ok!(stack.pop());
                    a = ctx_ok!(stack.pop());
                    stack.push(Value::from(a == b));
                }
                Instruction::Ne => {
                    b = ctx_ok!(stack.pop());
                    a = ctx_ok!(stack.pop());
                    stack.push(Value::from(a != b));
                }
                Instruction::Lt => cmp_binop!(Ordering::is_lt),
                Instruction::Lte => cmp_binop!(Ordering::is_le),
                Instruction::Gt => cmp_binop!(Ordering::is_gt),
                Instruction::Gte => cmp_binop!(Ordering::is_ge),
                Instruction::Not => {
                    a = ctx_ok!(stack.pop());
                    stack.push(Value::from(!a.is_true()));
                }
                Instruction::Jump(jump_target) => {
                    pc = *jump_target;
                    continue;
                }
                Instruction::JumpIfFalse(jump_target) => {
                    a = ctx_ok!(stack.pop());
                    if !a.is_true() {
                        pc = *jump_target;
                        continue;
                    }
                }
                Instruction::JumpIfFalseOrPop(jump_target) => {
                    if let Some(value) = stack.peek() {
                        if !value.is_true() {
                            pc = *jump_target;
                            continue;
                        }
                    }
                    ctx_ok!(stack.pop());
                }
                Instruction::JumpIfTrueOrPop(jump_target) => {
                    if let Some(value) = stack.peek() {
                        if value.is_true() {
                            pc = *jump_target;
                            continue;
                        }
                    }
                    ctx_ok!(stack.pop());
                }
                Instruction::Each(var, partial) => {
                    a = ctx_ok!(stack.pop());
                    ctx_ok!(self.render_each(state, &a, var, partial, out));
                }
                Instruction::Include(name) => {
                    let vars = state.ctx.vars().clone();
                    ok!(self.render_fragment(state, "include", name, vars, out));
                }
                Instruction::Embed(name) => {
                    a = ctx_ok!(stack.pop());
                    let vars = merge_maps([state.ctx.root().clone(), a]);
                    ok!(self.render_fragment(state, "embed", name, vars, out));
                }
            }
            pc += 1;
        }

        Ok(())
    }

    /// Renders the partial once for every item of the collection.
    ///
    /// Failures of the partial are fatal to the render.
    fn render_each(
        &self,
        state: &State<'_, 'env>,
        collection: &Value,
        var: &str,
        partial: &str,
        out: &mut Output,
    ) -> Result<(), Error> {
        let items = match collection.try_iter() {
            Some(items) => items,
            None => {
                return Err(Error::new(
                    ErrorKind::ExecutionError,
                    format!("cannot iterate over {}", collection.kind()),
                ))
            }
        };
        for item in items {
            let vars = state.ctx.root().with_entry(var, item);
            let mut session = state.fork_session();
            ok!(self.render(
                partial,
                None,
                state.ctx.root(),
                vars,
                &mut session,
                state.ctx.depth() + 1,
                out
            ));
        }
        Ok(())
    }

    /// Renders an include or embed.
    ///
    /// The fragment renders into a buffer of its own.  If it fails the
    /// failure is logged and a marker is written in its place; only
    /// failures of the output itself are returned.
    fn render_fragment(
        &self,
        state: &State<'_, 'env>,
        kind: &str,
        name: &str,
        vars: Value,
        out: &mut Output,
    ) -> Result<(), Error> {
        if out.is_discarding() {
            return Ok(());
        }
        let mut buf = String::new();
        let mut session = state.fork_session();
        let rv = self.render(
            name,
            None,
            state.ctx.root(),
            vars,
            &mut session,
            state.ctx.depth() + 1,
            &mut Output::new(&mut buf),
        );
        match rv {
            Ok(()) => out.write_str(&buf).map_err(Error::from),
            Err(cause) => {
                let err = Error::new(ErrorKind::FragmentRender, format!("{kind} {name:?}"))
                    .with_source(cause);
                tracing::warn!(
                    template = state.name(),
                    fragment = name,
                    error = %err,
                    "fragment failed to render"
                );
                let marker = state.env.format_fragment_error(&err);
                out.write_str(&marker).map_err(Error::from)
            }
        }
    }
}

#[inline(never)]
#[cold]
fn process_err(err: &mut Error, pc: u32, state: &State) {
    let instructions = state.template.instructions();
    // only attach line information if the error does not have line info yet.
    if !err.has_location() {
        let origin = instructions.get_origin(pc);
        if let Some(lineno) = instructions.get_line(pc) {
            err.set_location(origin.unwrap_or_else(|| state.name()), lineno);
        }
        if origin.is_none() {
            err.set_template_source(state.template.source());
        }
    }
    if err.kind() == ErrorKind::ExecutionError {
        err.set_compiled_form(state.template.compiled_form());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_ordering() {
        assert_eq!(
            ordering(&Value::from(1), &Value::from(2.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(
            ordering(&Value::from("b"), &Value::from("a")).unwrap(),
            Some(Ordering::Greater)
        );
        assert_eq!(ordering(&Value::UNDEFINED, &Value::from(1)).unwrap(), None);
        assert_eq!(ordering(&Value::from(()), &Value::from("a")).unwrap(), None);
        let err = ordering(&Value::from("a"), &Value::from(1)).unwrap_err();
        assert_eq!(err.detail(), Some("cannot compare string and number"));
    }
}
