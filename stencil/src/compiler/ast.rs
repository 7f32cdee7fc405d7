use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use crate::compiler::tokens::Span;
use crate::value::Value;

/// Container for nodes with location info.
///
/// Besides carrying the span this keeps the node on the heap so that
/// the enums below stay small.
pub struct Spanned<T> {
    inner: Box<(T, Span)>,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            inner: Box::new((node, span)),
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.inner.1
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(fmt::Debug::fmt(&self.inner.0, f));
        write!(f, "{:?}", self.inner.1)
    }
}

/// A statement node.
pub enum Stmt<'a> {
    Template(Spanned<Template<'a>>),
    EmitRaw(Spanned<EmitRaw<'a>>),
    EmitExpr(Spanned<EmitExpr<'a>>),
    Conditional(Spanned<Conditional<'a>>),
    Each(Spanned<Each<'a>>),
    Include(Spanned<Include<'a>>),
    Embed(Spanned<Embed<'a>>),
    Fill(Spanned<Fill<'a>>),
    Extends(Spanned<Extends<'a>>),
    Section(Spanned<Section<'a>>),
}

impl fmt::Debug for Stmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Template(s) => fmt::Debug::fmt(s, f),
            Stmt::EmitRaw(s) => fmt::Debug::fmt(s, f),
            Stmt::EmitExpr(s) => fmt::Debug::fmt(s, f),
            Stmt::Conditional(s) => fmt::Debug::fmt(s, f),
            Stmt::Each(s) => fmt::Debug::fmt(s, f),
            Stmt::Include(s) => fmt::Debug::fmt(s, f),
            Stmt::Embed(s) => fmt::Debug::fmt(s, f),
            Stmt::Fill(s) => fmt::Debug::fmt(s, f),
            Stmt::Extends(s) => fmt::Debug::fmt(s, f),
            Stmt::Section(s) => fmt::Debug::fmt(s, f),
        }
    }
}

/// An expression node.
#[allow(clippy::enum_variant_names)]
pub enum Expr<'a> {
    Var(Spanned<Var<'a>>),
    Const(Spanned<Const>),
    GetAttr(Spanned<GetAttr<'a>>),
    UnaryOp(Spanned<UnaryOp<'a>>),
    BinOp(Spanned<BinOp<'a>>),
    Filter(Spanned<Filter<'a>>),
}

impl fmt::Debug for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(s) => fmt::Debug::fmt(s, f),
            Expr::Const(s) => fmt::Debug::fmt(s, f),
            Expr::GetAttr(s) => fmt::Debug::fmt(s, f),
            Expr::UnaryOp(s) => fmt::Debug::fmt(s, f),
            Expr::BinOp(s) => fmt::Debug::fmt(s, f),
            Expr::Filter(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl<'a> Expr<'a> {
    pub fn description(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Const(_) => "constant",
            Expr::GetAttr(_) => "attribute lookup",
            Expr::UnaryOp(_) | Expr::BinOp(_) => "operator",
            Expr::Filter(_) => "filter expression",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Var(s) => s.span(),
            Expr::Const(s) => s.span(),
            Expr::GetAttr(s) => s.span(),
            Expr::UnaryOp(s) => s.span(),
            Expr::BinOp(s) => s.span(),
            Expr::Filter(s) => s.span(),
        }
    }

    /// Returns `true` if this is a plain dotted path (`a.b.0.c`).
    pub fn is_path(&self) -> bool {
        match self {
            Expr::Var(_) => true,
            Expr::GetAttr(attr) => attr.expr.is_path(),
            _ => false,
        }
    }
}

/// Root template node.
#[derive(Debug)]
pub struct Template<'a> {
    pub children: Vec<Stmt<'a>>,
}

/// Outputs template source data verbatim.
#[derive(Debug)]
pub struct EmitRaw<'a> {
    pub raw: &'a str,
}

/// Outputs the result of an expression.
#[derive(Debug)]
pub struct EmitExpr<'a> {
    pub expr: Expr<'a>,
}

/// A single `if` or `elseif` arm.
#[derive(Debug)]
pub struct CondBranch<'a> {
    pub expr: Expr<'a>,
    pub body: Vec<Stmt<'a>>,
}

/// An `if`/`elseif`/`else` chain.
#[derive(Debug)]
pub struct Conditional<'a> {
    pub branches: Vec<CondBranch<'a>>,
    pub else_body: Option<Vec<Stmt<'a>>>,
}

/// Renders a partial once per element of a collection.
#[derive(Debug)]
pub struct Each<'a> {
    pub item: &'a str,
    pub collection: Expr<'a>,
    pub partial: Cow<'a, str>,
}

/// Renders another template with the current context.
#[derive(Debug)]
pub struct Include<'a> {
    pub name: Cow<'a, str>,
}

/// Renders another template with a set of bound paths.
#[derive(Debug)]
pub struct Embed<'a> {
    pub name: Cow<'a, str>,
    pub bindings: Vec<(Cow<'a, str>, Expr<'a>)>,
}

/// Splices a captured section into the output.
#[derive(Debug)]
pub struct Fill<'a> {
    pub name: Cow<'a, str>,
}

/// Declares the layout of the template.
#[derive(Debug)]
pub struct Extends<'a> {
    pub name: Cow<'a, str>,
}

/// A captured section.  It produces no output where it is declared.
#[derive(Debug)]
pub struct Section<'a> {
    pub name: Cow<'a, str>,
    pub body: &'a str,
    pub body_line: u32,
    pub body_col: u32,
}

/// Looks up a variable.
#[derive(Debug)]
pub struct Var<'a> {
    pub id: &'a str,
}

/// Loads a constant
#[derive(Debug)]
pub struct Const {
    pub value: Value,
}

/// A kind of unary operator.
#[derive(Debug, Clone, Copy)]
pub enum UnaryOpKind {
    Not,
}

/// An unary operator expression.
#[derive(Debug)]
pub struct UnaryOp<'a> {
    pub op: UnaryOpKind,
    pub expr: Expr<'a>,
}

/// A kind of binary operator.
#[derive(Debug, Clone, Copy)]
pub enum BinOpKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
}

/// A binary operator expression.
#[derive(Debug)]
pub struct BinOp<'a> {
    pub op: BinOpKind,
    pub left: Expr<'a>,
    pub right: Expr<'a>,
}

/// Looks up a segment of a dotted path.
#[derive(Debug)]
pub struct GetAttr<'a> {
    pub expr: Expr<'a>,
    pub name: Cow<'a, str>,
}

/// A filter application.
#[derive(Debug)]
pub struct Filter<'a> {
    pub name: &'a str,
    pub expr: Expr<'a>,
    pub arg: Option<Cow<'a, str>>,
}
