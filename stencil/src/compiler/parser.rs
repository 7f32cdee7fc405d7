use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::compiler::ast::{self, Spanned};
use crate::compiler::lexer::Tokenizer;
use crate::compiler::tokens::{Span, Token};
use crate::error::{Error, ErrorKind};
use crate::value::Value;

const MAX_RECURSION: usize = 150;
const KEYWORDS: [&str; 11] = [
    "extends",
    "section",
    "endsection",
    "fill",
    "if",
    "elseif",
    "else",
    "endif",
    "each",
    "include",
    "embed",
];

fn unexpected<D: fmt::Display>(unexpected: D, expected: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("unexpected {unexpected}, expected {expected}"),
    )
}

fn unexpected_eof(expected: &str) -> Error {
    unexpected("end of input", expected)
}

fn make_const(value: Value, span: Span) -> ast::Expr<'static> {
    ast::Expr::Const(Spanned::new(ast::Const { value }, span))
}

fn syntax_error(msg: Cow<'static, str>) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(syntax_error(Cow::Borrowed($msg)));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(syntax_error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(rv) => rv,
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some((token @ $match, span)) => (token, span),
            Some((token, _)) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(($match, span)) => ($target, span),
            Some((token, _)) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
}

macro_rules! skip_token {
    ($p:expr, $match:pat) => {
        match $p.stream.current() {
            Err(err) => return Err(err),
            Ok(Some(($match, _))) => {
                let _ = $p.stream.next();
                true
            }
            _ => false,
        }
    };
}

struct TokenStream<'a> {
    tokenizer: Tokenizer<'a>,
    current: Option<Result<(Token<'a>, Span), Error>>,
    last_span: Span,
}

impl<'a> TokenStream<'a> {
    pub fn new(mut tokenizer: Tokenizer<'a>) -> TokenStream<'a> {
        let line = tokenizer.current_line();
        let current = tokenizer.next_token().transpose();
        TokenStream {
            tokenizer,
            current,
            last_span: Span {
                start_line: line,
                end_line: line,
                ..Span::default()
            },
        }
    }

    /// Advance the stream.
    pub fn next(&mut self) -> Result<Option<(Token<'a>, Span)>, Error> {
        let rv = self.current.take();
        self.current = self.tokenizer.next_token().transpose();
        if let Some(Ok((_, span))) = rv {
            self.last_span = span;
        }
        rv.transpose()
    }

    /// Look at the current token
    pub fn current(&mut self) -> Result<Option<(&Token<'a>, Span)>, Error> {
        if let Some(Err(_)) = self.current {
            if let Some(Err(err)) = self.current.take() {
                return Err(err);
            }
        }
        match self.current {
            Some(Ok(ref tok)) => Ok(Some((&tok.0, tok.1))),
            _ => Ok(None),
        }
    }

    /// Expands the span
    #[inline(always)]
    pub fn expand_span(&self, mut span: Span) -> Span {
        span.end_line = self.last_span.end_line;
        span.end_col = self.last_span.end_col;
        span.end_offset = self.last_span.end_offset;
        span
    }

    /// Returns the current span.
    #[inline(always)]
    pub fn current_span(&self) -> Span {
        if let Some(Ok((_, span))) = self.current {
            span
        } else {
            self.last_span
        }
    }

    /// Returns the last seen span.
    #[inline(always)]
    pub fn last_span(&self) -> Span {
        self.last_span
    }
}

struct Parser<'a> {
    stream: TokenStream<'a>,
    source: &'a str,
    filename: &'a str,
    sections: BTreeSet<String>,
    extends_seen: bool,
    depth: usize,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<ast::Expr<'a>, Error> {
            let span = self.stream.current_span();
            let mut left = ok!(self.$next());
            loop {
                let op = match ok!(self.stream.current()) {
                    $($tok)*
                    _ => break,
                };
                ok!(self.stream.next());
                let right = ok!(self.$next());
                left = ast::Expr::BinOp(Spanned::new(
                    ast::BinOp { op, left, right, },
                    self.stream.expand_span(span),
                ));
            }
            Ok(left)
        }
    };
}

macro_rules! unaryop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<ast::Expr<'a>, Error> {
            let span = self.stream.current_span();
            let op = match ok!(self.stream.current()) {
                $($tok)*
                _ => return self.$next()
            };
            ok!(self.stream.next());
            Ok(ast::Expr::UnaryOp(Spanned::new(
                ast::UnaryOp {
                    op,
                    expr: ok!(self.$func()),
                },
                self.stream.expand_span(span),
            )))
        }
    };
}

macro_rules! with_recursion_guard {
    ($parser:expr, $expr:expr) => {{
        $parser.depth += 1;
        if $parser.depth > MAX_RECURSION {
            return Err(syntax_error(Cow::Borrowed(
                "template exceeds maximum recursion limits",
            )));
        }
        let rv = $expr;
        $parser.depth -= 1;
        rv
    }};
}

impl<'a> Parser<'a> {
    fn new(tokenizer: Tokenizer<'a>, source: &'a str, filename: &'a str) -> Parser<'a> {
        Parser {
            stream: TokenStream::new(tokenizer),
            source,
            filename,
            sections: BTreeSet::new(),
            extends_seen: false,
            depth: 0,
        }
    }

    /// Parses a template.
    fn parse(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.last_span();
        self.subparse(&|_| false)
            .map(|children| {
                ast::Stmt::Template(Spanned::new(
                    ast::Template { children },
                    self.stream.expand_span(span),
                ))
            })
            .map_err(|err| self.attach_location_to_error(err))
    }

    fn parse_expr(&mut self) -> Result<ast::Expr<'a>, Error> {
        with_recursion_guard!(self, self.parse_or())
    }

    binop!(parse_or, parse_and, {
        Some((Token::OrOr | Token::Ident("or"), _)) => ast::BinOpKind::ScOr,
    });
    binop!(parse_and, parse_not, {
        Some((Token::AndAnd | Token::Ident("and"), _)) => ast::BinOpKind::ScAnd,
    });
    unaryop!(parse_not, parse_compare, {
        Some((Token::Bang | Token::Ident("not"), _)) => ast::UnaryOpKind::Not,
    });
    binop!(parse_compare, parse_filter_expr, {
        Some((Token::Eq, _)) => ast::BinOpKind::Eq,
        Some((Token::Ne, _)) => ast::BinOpKind::Ne,
        Some((Token::Lt, _)) => ast::BinOpKind::Lt,
        Some((Token::Lte, _)) => ast::BinOpKind::Lte,
        Some((Token::Gt, _)) => ast::BinOpKind::Gt,
        Some((Token::Gte, _)) => ast::BinOpKind::Gte,
    });

    fn parse_filter_expr(&mut self) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        let mut expr = ok!(self.parse_primary());
        while skip_token!(self, Token::Pipe) {
            let (name, _) = expect_token!(self, Token::Ident(name) => name, "filter name");
            let arg = if skip_token!(self, Token::Colon) {
                Some(ok!(self.parse_filter_arg()))
            } else {
                None
            };
            expr = ast::Expr::Filter(Spanned::new(
                ast::Filter { name, expr, arg },
                self.stream.expand_span(span),
            ));
        }
        Ok(expr)
    }

    fn parse_filter_arg(&mut self) -> Result<Cow<'a, str>, Error> {
        match ok!(self.stream.next()) {
            Some((Token::Str(s), _)) => Ok(Cow::Borrowed(s)),
            Some((Token::String(s), _)) => Ok(Cow::Owned(s)),
            Some((Token::Int(i), _)) => Ok(Cow::Owned(i.to_string())),
            Some((Token::Float(f), _)) => Ok(Cow::Owned(f.to_string())),
            Some((token, _)) => Err(unexpected(token, "filter argument")),
            None => Err(unexpected_eof("filter argument")),
        }
    }

    fn parse_primary(&mut self) -> Result<ast::Expr<'a>, Error> {
        with_recursion_guard!(self, self.parse_primary_impl())
    }

    fn parse_primary_impl(&mut self) -> Result<ast::Expr<'a>, Error> {
        let (token, span) = expect_token!(self, "expression");
        let expr = match token {
            Token::Ident("true" | "True") => make_const(Value::from(true), span),
            Token::Ident("false" | "False") => make_const(Value::from(false), span),
            Token::Ident("null" | "none" | "None") => make_const(Value::from(()), span),
            Token::Ident(id) => ast::Expr::Var(Spanned::new(ast::Var { id }, span)),
            Token::Str(s) => make_const(Value::from(s), span),
            Token::String(s) => make_const(Value::from(s), span),
            Token::Int(i) => make_const(Value::from(i), span),
            Token::Float(f) => make_const(Value::from(f), span),
            Token::ParenOpen => {
                let expr = ok!(self.parse_expr());
                expect_token!(self, Token::ParenClose, "`)`");
                expr
            }
            token => return Err(unexpected(token, "expression")),
        };
        self.parse_postfix(expr, span)
    }

    fn parse_postfix(&mut self, mut expr: ast::Expr<'a>, span: Span) -> Result<ast::Expr<'a>, Error> {
        while skip_token!(self, Token::Dot) {
            let name = match ok!(self.stream.next()) {
                Some((Token::Ident(name), _)) => Cow::Borrowed(name),
                Some((Token::Int(idx), _)) => Cow::Owned(idx.to_string()),
                Some((token, _)) => return Err(unexpected(token, "path segment")),
                None => return Err(unexpected_eof("path segment")),
            };
            expr = ast::Expr::GetAttr(Spanned::new(
                ast::GetAttr { expr, name },
                self.stream.expand_span(span),
            ));
        }
        Ok(expr)
    }

    /// Parses a bare dotted path.  Used by embed bindings which do not
    /// accept anything else.
    fn parse_path(&mut self) -> Result<ast::Expr<'a>, Error> {
        let expr = ok!(self.parse_primary());
        if !expr.is_path() {
            syntax_error!(
                "embed bindings must be dotted paths, got {}",
                expr.description()
            );
        }
        Ok(expr)
    }

    fn parse_name(&mut self, expected: &str) -> Result<Cow<'a, str>, Error> {
        match ok!(self.stream.next()) {
            Some((Token::Str(s), _)) => Ok(Cow::Borrowed(s)),
            Some((Token::String(s), _)) => Ok(Cow::Owned(s)),
            Some((token, _)) => Err(unexpected(token, expected)),
            None => Err(unexpected_eof(expected)),
        }
    }

    fn parse_tag(&mut self, span: Span) -> Result<ast::Stmt<'a>, Error> {
        let keyword = match ok!(self.stream.current()) {
            Some((Token::Ident(ident), _)) if KEYWORDS.contains(ident) => Some(*ident),
            Some(_) => None,
            None => return Err(unexpected_eof("expression")),
        };
        let keyword = match keyword {
            Some(keyword) => keyword,
            None => {
                let expr = ok!(self.parse_expr());
                expect_token!(self, Token::TagEnd, "end of tag");
                return Ok(ast::Stmt::EmitExpr(Spanned::new(
                    ast::EmitExpr { expr },
                    self.stream.expand_span(span),
                )));
            }
        };
        ok!(self.stream.next());
        Ok(match keyword {
            "extends" => ast::Stmt::Extends(Spanned::new(
                ok!(self.parse_extends()),
                self.stream.expand_span(span),
            )),
            "section" => ast::Stmt::Section(Spanned::new(
                ok!(self.parse_section()),
                self.stream.expand_span(span),
            )),
            "fill" => ast::Stmt::Fill(Spanned::new(
                ok!(self.parse_fill()),
                self.stream.expand_span(span),
            )),
            "if" => ast::Stmt::Conditional(Spanned::new(
                ok!(with_recursion_guard!(self, self.parse_conditional())),
                self.stream.expand_span(span),
            )),
            "each" => ast::Stmt::Each(Spanned::new(
                ok!(self.parse_each()),
                self.stream.expand_span(span),
            )),
            "include" => ast::Stmt::Include(Spanned::new(
                ok!(self.parse_include()),
                self.stream.expand_span(span),
            )),
            "embed" => ast::Stmt::Embed(Spanned::new(
                ok!(self.parse_embed()),
                self.stream.expand_span(span),
            )),
            keyword => syntax_error!("unexpected `{}`", keyword),
        })
    }

    fn parse_extends(&mut self) -> Result<ast::Extends<'a>, Error> {
        if self.extends_seen {
            syntax_error!("tried to extend a second time in a template");
        }
        self.extends_seen = true;
        let name = ok!(self.parse_name("layout name"));
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Extends { name })
    }

    fn parse_section(&mut self) -> Result<ast::Section<'a>, Error> {
        let name = ok!(self.parse_name("section name"));
        let (_, tag_end) = expect_token!(self, Token::TagEnd, "end of tag");
        if !self.sections.insert(name.to_string()) {
            syntax_error!("section {:?} defined twice", name);
        }

        // the body is kept as raw source and only compiled when filled
        let start = tag_end.end_offset as usize;
        loop {
            let (token, span) = expect_token!(self, "endsection");
            if !matches!(token, Token::TagStart) {
                continue;
            }
            match ok!(self.stream.current()) {
                Some((Token::Ident("endsection"), _)) => {
                    ok!(self.stream.next());
                    expect_token!(self, Token::TagEnd, "end of tag");
                    let body = self
                        .source
                        .get(start..span.start_offset as usize)
                        .unwrap_or_default();
                    return Ok(ast::Section {
                        name,
                        body,
                        body_line: tag_end.end_line,
                        body_col: tag_end.end_col,
                    });
                }
                Some((Token::Ident("section"), _)) => {
                    syntax_error!("sections cannot be nested");
                }
                _ => {}
            }
        }
    }

    fn parse_fill(&mut self) -> Result<ast::Fill<'a>, Error> {
        let name = ok!(self.parse_name("section name"));
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Fill { name })
    }

    fn parse_conditional(&mut self) -> Result<ast::Conditional<'a>, Error> {
        let mut branches = Vec::new();
        let mut else_body = None;
        let mut expr = ok!(self.parse_expr());
        loop {
            expect_token!(self, Token::TagEnd, "end of tag");
            let body = ok!(self.subparse(&|tok| {
                matches!(tok, Token::Ident("elseif" | "else" | "endif"))
            }));
            branches.push(ast::CondBranch { expr, body });
            let (keyword, _) = expect_token!(self, Token::Ident(kw) => kw, "endif");
            match keyword {
                "elseif" => {
                    expr = ok!(self.parse_expr());
                }
                "else" => {
                    expect_token!(self, Token::TagEnd, "end of tag");
                    else_body =
                        Some(ok!(self.subparse(&|tok| matches!(tok, Token::Ident("endif")))));
                    expect_token!(self, Token::Ident("endif"), "endif");
                    break;
                }
                _ => break,
            }
        }
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Conditional {
            branches,
            else_body,
        })
    }

    fn parse_each(&mut self) -> Result<ast::Each<'a>, Error> {
        let (item, _) = expect_token!(self, Token::Ident(name) => name, "identifier");
        expect_token!(self, Token::Ident("in"), "in");
        let collection = ok!(self.parse_expr());
        expect_token!(self, Token::Ident("using"), "using");
        let partial = ok!(self.parse_name("partial name"));
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Each {
            item,
            collection,
            partial,
        })
    }

    fn parse_include(&mut self) -> Result<ast::Include<'a>, Error> {
        let name = ok!(self.parse_name("template name"));
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Include { name })
    }

    fn parse_embed(&mut self) -> Result<ast::Embed<'a>, Error> {
        let name = ok!(self.parse_name("template name"));
        let mut bindings = Vec::new();
        if skip_token!(self, Token::Ident("with")) {
            expect_token!(self, Token::BracketOpen, "`[`");
            loop {
                if skip_token!(self, Token::BracketClose) {
                    break;
                }
                if !bindings.is_empty() {
                    expect_token!(self, Token::Comma, "`,`");
                    if skip_token!(self, Token::BracketClose) {
                        break;
                    }
                }
                let key = ok!(self.parse_name("binding key"));
                expect_token!(self, Token::Arrow, "`=>`");
                let value = ok!(self.parse_path());
                bindings.push((key, value));
            }
        }
        expect_token!(self, Token::TagEnd, "end of tag");
        Ok(ast::Embed { name, bindings })
    }

    fn subparse(
        &mut self,
        end_check: &dyn Fn(&Token) -> bool,
    ) -> Result<Vec<ast::Stmt<'a>>, Error> {
        let mut rv = Vec::new();
        while let Some((token, span)) = ok!(self.stream.next()) {
            match token {
                Token::TemplateData(raw) => {
                    rv.push(ast::Stmt::EmitRaw(Spanned::new(ast::EmitRaw { raw }, span)))
                }
                Token::TagStart => {
                    if let Some((tok, _)) = ok!(self.stream.current()) {
                        if end_check(tok) {
                            return Ok(rv);
                        }
                    }
                    rv.push(ok!(self.parse_tag(span)));
                }
                token => return Err(unexpected(token, "template data or tag")),
            }
        }
        Ok(rv)
    }

    #[inline]
    fn attach_location_to_error(&mut self, mut err: Error) -> Error {
        if !err.has_location() {
            err.set_location(self.filename, self.stream.last_span().end_line as usize);
        }
        err
    }
}

/// Parses a template.
pub fn parse<'a>(source: &'a str, filename: &'a str) -> Result<ast::Stmt<'a>, Error> {
    Parser::new(Tokenizer::new(source), source, filename)
        .parse()
        .map_err(|mut err| {
            err.set_template_source(source);
            err
        })
}

/// Parses a section body that was cut out of a template.
///
/// `line` and `col` are the position of the body in its origin template
/// so that errors point to the right place.
pub fn parse_fragment<'a>(
    source: &'a str,
    filename: &'a str,
    line: u32,
    col: u32,
) -> Result<ast::Stmt<'a>, Error> {
    Parser::new(Tokenizer::new_at(source, line, col), source, filename).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn children<'a>(stmt: &'a ast::Stmt<'a>) -> &'a [ast::Stmt<'a>] {
        match stmt {
            ast::Stmt::Template(t) => &t.children,
            _ => panic!("not a template"),
        }
    }

    fn parse_err(source: &str) -> Error {
        parse(source, "test.tpl").unwrap_err()
    }

    #[test]
    fn test_directives_are_recognized() {
        let tmpl = parse(
            "{{extends 'base'}}{{section 'a'}}A{{endsection}}{{fill 'a'}}\
             {{include 'x'}}{{embed 'y' with ['k' => a.b]}}{{each i in items using 'row'}}{{name}}",
            "test.tpl",
        )
        .unwrap();
        let kinds: Vec<_> = children(&tmpl)
            .iter()
            .map(|stmt| match stmt {
                ast::Stmt::Extends(_) => "extends",
                ast::Stmt::Section(_) => "section",
                ast::Stmt::Fill(_) => "fill",
                ast::Stmt::Include(_) => "include",
                ast::Stmt::Embed(_) => "embed",
                ast::Stmt::Each(_) => "each",
                ast::Stmt::EmitExpr(_) => "output",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["extends", "section", "fill", "include", "embed", "each", "output"]
        );
    }

    #[test]
    fn test_section_body_is_raw() {
        let tmpl = parse("x\n{{section 'main'}}Hi {{name|upper}}{{endsection}}", "t").unwrap();
        match &children(&tmpl)[1] {
            ast::Stmt::Section(section) => {
                assert_eq!(section.name, "main");
                assert_eq!(section.body, "Hi {{name|upper}}");
                assert_eq!(section.body_line, 2);
                assert_eq!(section.body_col, 18);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_conditional_branches() {
        let tmpl = parse("{{if a}}1{{elseif b}}2{{elseif c}}3{{else}}4{{endif}}", "t").unwrap();
        match &children(&tmpl)[0] {
            ast::Stmt::Conditional(cond) => {
                assert_eq!(cond.branches.len(), 3);
                assert_eq!(cond.else_body.as_ref().map(|x| x.len()), Some(1));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_nested_conditionals() {
        let tmpl = parse("{{if a}}{{if b}}x{{endif}}{{else}}y{{endif}}", "t").unwrap();
        match &children(&tmpl)[0] {
            ast::Stmt::Conditional(cond) => {
                assert!(matches!(
                    cond.branches[0].body[0],
                    ast::Stmt::Conditional(_)
                ));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_filter_chain_and_args() {
        let tmpl = parse("{{name|upper|truncate:'3'|limit_words:2}}", "t").unwrap();
        let mut names = Vec::new();
        let mut expr = match &children(&tmpl)[0] {
            ast::Stmt::EmitExpr(emit) => &emit.expr,
            other => panic!("unexpected node {:?}", other),
        };
        while let ast::Expr::Filter(filter) = expr {
            names.push((filter.name, filter.arg.as_deref().map(|x| x.to_string())));
            expr = &filter.expr;
        }
        assert_eq!(
            names,
            vec![
                ("limit_words", Some("2".to_string())),
                ("truncate", Some("3".to_string())),
                ("upper", None),
            ]
        );
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_err("{{extends 'a'}}{{extends 'b'}}");
        assert_eq!(
            err.detail(),
            Some("tried to extend a second time in a template")
        );
        let err = parse_err("{{section 'a'}}{{section 'b'}}{{endsection}}");
        assert_eq!(err.detail(), Some("sections cannot be nested"));
        let err = parse_err("{{section 'a'}}1{{endsection}}{{section 'a'}}2{{endsection}}");
        assert_eq!(err.detail(), Some("section \"a\" defined twice"));
        let err = parse_err("{{if a}}oops");
        assert_eq!(
            err.detail(),
            Some("unexpected end of input, expected endif")
        );
        let err = parse_err("{{endif}}");
        assert_eq!(err.detail(), Some("unexpected `endif`"));
        let err = parse_err("{{embed 'card' with ['title' => 'literal']}}");
        assert_eq!(
            err.detail(),
            Some("embed bindings must be dotted paths, got constant")
        );
    }

    #[test]
    fn test_error_location() {
        let err = parse_err("line one\n{{if a}}\n{{bad bad}}\n{{endif}}");
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert_eq!(err.name(), Some("test.tpl"));
        assert_eq!(err.line(), Some(3));
        assert!(err.template_source().is_some());
    }

    #[test]
    fn test_fragment_line_offsets() {
        let err = parse_fragment("\n\n{{if}}", "layout.tpl", 10, 4).unwrap_err();
        assert_eq!(err.line(), Some(12));
    }
}
