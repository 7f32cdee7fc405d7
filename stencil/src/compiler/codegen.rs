use std::sync::Arc;

use crate::compiler::ast;
use crate::compiler::instructions::{Instruction, Instructions};
use crate::compiler::parser::parse_fragment;
use crate::defaults::{DEFAULT_FILTER, MAX_FILL_DEPTH};
use crate::error::{Error, ErrorKind};
use crate::session::RenderSession;
use crate::value::Value;

/// Represents an open block of code that does not yet have updated
/// jump targets.
enum PendingBlock {
    Branch { jump_instr: u32 },
    ScBool { jump_instrs: Vec<u32> },
}

/// Records the layout and the sections a template declares.
///
/// This runs before code generation so that `fill` directives of a
/// template can see the sections the same template declares, no matter
/// where in the template they are.  Returns the number of sections that
/// were newly captured.
pub fn record_declarations(
    stmt: &ast::Stmt<'_>,
    origin: &str,
    session: &mut RenderSession,
) -> usize {
    match stmt {
        ast::Stmt::Template(t) => t
            .children
            .iter()
            .map(|node| record_declarations(node, origin, session))
            .sum(),
        ast::Stmt::Conditional(cond) => {
            let mut rv = 0;
            for branch in &cond.branches {
                for node in &branch.body {
                    rv += record_declarations(node, origin, session);
                }
            }
            for node in cond.else_body.iter().flatten() {
                rv += record_declarations(node, origin, session);
            }
            rv
        }
        ast::Stmt::Extends(extends) => {
            session.declare_layout(&extends.name);
            0
        }
        ast::Stmt::Section(section) => {
            if session.capture_section_at(
                &section.name,
                section.body,
                origin,
                section.body_line,
                section.body_col,
            ) {
                1
            } else {
                tracing::trace!(
                    section = %section.name,
                    template = origin,
                    "section already captured, keeping earlier body"
                );
                0
            }
        }
        _ => 0,
    }
}

/// Provides a convenient interface to creating instructions for the VM.
pub struct CodeGenerator<'s> {
    instructions: Instructions,
    pending_block: Vec<PendingBlock>,
    current_line: u32,
    origin: Option<Arc<str>>,
    session: &'s RenderSession,
    fill_depth: usize,
}

impl<'s> CodeGenerator<'s> {
    /// Creates a new code generator.
    ///
    /// `fill` directives are resolved against the given session.
    pub fn new(session: &'s RenderSession) -> CodeGenerator<'s> {
        CodeGenerator {
            instructions: Instructions::new(),
            pending_block: Vec::with_capacity(16),
            current_line: 0,
            origin: None,
            session,
            fill_depth: 0,
        }
    }

    /// Sets the current location's line.
    pub fn set_line(&mut self, lineno: u32) {
        self.current_line = lineno;
    }

    /// Add a simple instruction with the current location.
    pub fn add(&mut self, instr: Instruction) -> u32 {
        self.instructions
            .add_with_location(instr, self.current_line, self.origin.as_ref())
    }

    /// Returns the next instruction index.
    pub fn next_instruction(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Begins an if conditional
    pub fn start_if(&mut self) {
        let jump_instr = self.add(Instruction::JumpIfFalse(!0));
        self.pending_block.push(PendingBlock::Branch { jump_instr });
    }

    /// Begins an else conditional
    pub fn start_else(&mut self) {
        let jump_instr = self.add(Instruction::Jump(!0));
        self.end_condition(jump_instr + 1);
        self.pending_block.push(PendingBlock::Branch { jump_instr });
    }

    /// Closes the current if block.
    pub fn end_if(&mut self) {
        self.end_condition(self.next_instruction());
    }

    /// Starts a short-circuited bool block.
    pub fn start_sc_bool(&mut self) {
        self.pending_block.push(PendingBlock::ScBool {
            jump_instrs: Vec::new(),
        });
    }

    /// Emits a short-circuited bool operator.
    pub fn sc_bool(&mut self, and: bool) {
        let instr = self.add(if and {
            Instruction::JumpIfFalseOrPop(!0)
        } else {
            Instruction::JumpIfTrueOrPop(!0)
        });
        if let Some(PendingBlock::ScBool { jump_instrs }) = self.pending_block.last_mut() {
            jump_instrs.push(instr);
        }
    }

    /// Ends a short-circuited bool block.
    pub fn end_sc_bool(&mut self) {
        let end = self.next_instruction();
        if let Some(PendingBlock::ScBool { jump_instrs }) = self.pending_block.pop() {
            for instr in jump_instrs {
                if let Some(Instruction::JumpIfFalseOrPop(target))
                | Some(Instruction::JumpIfTrueOrPop(target)) = self.instructions.get_mut(instr)
                {
                    *target = end;
                }
            }
        }
    }

    fn end_condition(&mut self, new_jump_instr: u32) {
        if let Some(PendingBlock::Branch { jump_instr }) = self.pending_block.pop() {
            if let Some(Instruction::JumpIfFalse(target)) | Some(Instruction::Jump(target)) =
                self.instructions.get_mut(jump_instr)
            {
                *target = new_jump_instr;
            }
        }
    }

    /// Compiles a statement.
    pub fn compile_stmt(&mut self, stmt: &ast::Stmt<'_>) -> Result<(), Error> {
        match stmt {
            ast::Stmt::Template(t) => {
                self.set_line(t.span().start_line);
                for node in &t.children {
                    ok!(self.compile_stmt(node));
                }
            }
            ast::Stmt::EmitRaw(raw) => {
                self.set_line(raw.span().start_line);
                self.add(Instruction::EmitRaw(raw.raw.into()));
            }
            ast::Stmt::EmitExpr(expr) => {
                self.set_line(expr.span().start_line);
                self.compile_expr(&expr.expr);
                self.add(Instruction::Emit);
            }
            ast::Stmt::Conditional(cond) => {
                self.set_line(cond.span().start_line);
                ok!(self.compile_conditional(cond));
            }
            ast::Stmt::Each(each) => {
                self.set_line(each.span().start_line);
                self.compile_expr(&each.collection);
                self.add(Instruction::Each(
                    each.item.into(),
                    each.partial.as_ref().into(),
                ));
            }
            ast::Stmt::Include(include) => {
                self.set_line(include.span().start_line);
                self.add(Instruction::Include(include.name.as_ref().into()));
            }
            ast::Stmt::Embed(embed) => {
                self.set_line(embed.span().start_line);
                for (key, path) in &embed.bindings {
                    self.add(Instruction::LoadConst(Value::from(key.as_ref())));
                    self.compile_expr(path);
                }
                self.add(Instruction::BuildMap(embed.bindings.len()));
                self.add(Instruction::Embed(embed.name.as_ref().into()));
            }
            ast::Stmt::Fill(fill) => {
                self.set_line(fill.span().start_line);
                ok!(self.compile_fill(&fill.name));
            }
            // declarations were recorded before code generation
            ast::Stmt::Extends(_) | ast::Stmt::Section(_) => {}
        }
        Ok(())
    }

    fn compile_conditional(
        &mut self,
        cond: &ast::Spanned<ast::Conditional<'_>>,
    ) -> Result<(), Error> {
        for (idx, branch) in cond.branches.iter().enumerate() {
            if idx > 0 {
                self.start_else();
            }
            self.set_line(branch.expr.span().start_line);
            self.compile_expr(&branch.expr);
            self.start_if();
            for node in &branch.body {
                ok!(self.compile_stmt(node));
            }
        }
        if let Some(ref else_body) = cond.else_body {
            self.start_else();
            for node in else_body {
                ok!(self.compile_stmt(node));
            }
        }
        for _ in 0..cond.branches.len() {
            self.end_if();
        }
        Ok(())
    }

    fn compile_fill(&mut self, name: &str) -> Result<(), Error> {
        let session = self.session;
        let section = match session.section(name) {
            Some(section) => section,
            None => return Ok(()),
        };
        if self.fill_depth >= MAX_FILL_DEPTH {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                format!("section {name:?} is filled recursively"),
            ));
        }
        let ast = ok!(parse_fragment(
            section.source(),
            section.origin(),
            section.line,
            section.col,
        ));
        let old_origin = std::mem::replace(&mut self.origin, Some(section.origin().into()));
        let old_line = self.current_line;
        self.fill_depth += 1;
        let rv = self.compile_stmt(&ast);
        self.fill_depth -= 1;
        self.origin = old_origin;
        self.current_line = old_line;
        rv
    }

    /// Compiles an expression.
    pub fn compile_expr(&mut self, expr: &ast::Expr<'_>) {
        match expr {
            ast::Expr::Var(v) => {
                self.add(Instruction::Lookup(v.id.into()));
            }
            ast::Expr::Const(v) => {
                self.add(Instruction::LoadConst(v.value.clone()));
            }
            ast::Expr::GetAttr(attr) => {
                self.compile_expr(&attr.expr);
                self.add(Instruction::GetAttr(attr.name.as_ref().into()));
            }
            ast::Expr::UnaryOp(c) => {
                self.compile_expr(&c.expr);
                match c.op {
                    ast::UnaryOpKind::Not => self.add(Instruction::Not),
                };
            }
            ast::Expr::BinOp(c) => self.compile_bin_op(c),
            ast::Expr::Filter(f) => {
                self.compile_expr(&f.expr);
                let arg = f.arg.as_ref().map(|x| Arc::from(x.as_ref()));
                if f.name == DEFAULT_FILTER {
                    self.add(Instruction::ApplyDefault(arg));
                } else {
                    self.add(Instruction::ApplyFilter(f.name.into(), arg));
                }
            }
        }
    }

    fn compile_bin_op(&mut self, c: &ast::Spanned<ast::BinOp<'_>>) {
        let instr = match c.op {
            ast::BinOpKind::Eq => Instruction::Eq,
            ast::BinOpKind::Ne => Instruction::Ne,
            ast::BinOpKind::Lt => Instruction::Lt,
            ast::BinOpKind::Lte => Instruction::Lte,
            ast::BinOpKind::Gt => Instruction::Gt,
            ast::BinOpKind::Gte => Instruction::Gte,
            ast::BinOpKind::ScAnd | ast::BinOpKind::ScOr => {
                self.start_sc_bool();
                self.compile_expr(&c.left);
                self.sc_bool(matches!(c.op, ast::BinOpKind::ScAnd));
                self.compile_expr(&c.right);
                self.end_sc_bool();
                return;
            }
        };
        self.compile_expr(&c.left);
        self.compile_expr(&c.right);
        self.add(instr);
    }

    /// Converts the compiler into the instructions.
    pub fn finish(self) -> Instructions {
        debug_assert!(self.pending_block.is_empty());
        self.instructions
    }
}
