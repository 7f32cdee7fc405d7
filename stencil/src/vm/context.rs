use std::fmt;

use crate::defaults::MAX_RENDER_DEPTH;
use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// The value stack of the VM.
#[derive(Default)]
pub(crate) struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn push(&mut self, arg: Value) {
        self.values.push(arg);
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.values
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::ExecutionError, "stack underflow"))
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }
}

/// The variables visible to a template and the nesting depth of the
/// render it belongs to.
///
/// Next to its own variables a context carries the root context of the
/// render (globals merged with the caller's context).  Partials rendered
/// by `each` and `embed` start from the root rather than from the
/// variables of whatever template invoked them.
pub(crate) struct Context {
    vars: Value,
    root: Value,
    depth: usize,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("vars", &self.vars)
            .field("root", &self.root)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Context {
    /// Creates a context at the given depth.
    ///
    /// Fails if the depth exceeds the nesting limit of renders.
    pub fn new(vars: Value, root: Value, depth: usize) -> Result<Context, Error> {
        if depth > MAX_RENDER_DEPTH {
            return Err(Error::new(
                ErrorKind::ExecutionError,
                "recursion limit exceeded while rendering nested templates",
            ));
        }
        Ok(Context { vars, root, depth })
    }

    /// Looks up a variable.  Missing variables are undefined.
    pub fn load(&self, key: &str) -> Value {
        self.vars.get_attr(key)
    }

    /// Returns all variables as map value.
    pub fn vars(&self) -> &Value {
        &self.vars
    }

    /// The root context of the render.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The nesting depth of the current render.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::context;

    #[test]
    fn test_stack_underflow_is_an_error() {
        let mut stack = Stack::default();
        stack.push(Value::from(1));
        assert_eq!(stack.peek(), Some(&Value::from(1)));
        assert_eq!(stack.pop().unwrap(), Value::from(1));
        assert_eq!(stack.pop().unwrap_err().kind(), ErrorKind::ExecutionError);
    }

    #[test]
    fn test_depth_limit() {
        assert!(Context::new(Value::UNDEFINED, Value::UNDEFINED, MAX_RENDER_DEPTH).is_ok());
        let err = Context::new(Value::UNDEFINED, Value::UNDEFINED, MAX_RENDER_DEPTH + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }

    #[test]
    fn test_load() {
        let ctx = Context::new(context! { a => 1 }, context! { b => 2 }, 0).unwrap();
        assert_eq!(ctx.load("a"), Value::from(1));
        assert!(ctx.load("b").is_undefined());
        assert_eq!(ctx.root().get_attr("b"), Value::from(2));
    }
}
