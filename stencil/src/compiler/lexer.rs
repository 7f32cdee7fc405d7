use std::ops::ControlFlow;

use crate::compiler::tokens::{Span, Token};
use crate::error::{Error, ErrorKind};

const TAG_START: &str = "{{";
const TAG_END: &str = "}}";

/// Tokenizes templates.
///
/// Everything outside of `{{ ... }}` tags is emitted as template data.
pub struct Tokenizer<'s> {
    in_tag: bool,
    rest: &'s str,
    current_line: u32,
    current_col: u32,
    current_offset: u32,
}

fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

fn unescape(s: &str) -> Result<String, Error> {
    let mut rv = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            rv.push(c);
            continue;
        }
        rv.push(match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some(c @ ('\\' | '\'' | '"' | '/')) => c,
            _ => return Err(Error::new(ErrorKind::SyntaxError, "bad string escape")),
        });
    }
    Ok(rv)
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    ///
    /// A single trailing newline is not part of the template.
    pub fn new(input: &'s str) -> Tokenizer<'s> {
        let mut rest = input;
        if let Some(stripped) = rest.strip_suffix('\n') {
            rest = stripped.strip_suffix('\r').unwrap_or(stripped);
        }
        Tokenizer {
            in_tag: false,
            rest,
            current_line: 1,
            current_col: 0,
            current_offset: 0,
        }
    }

    /// Creates a tokenizer for a fragment that was cut out of a larger
    /// template, so that line numbers keep pointing into the original.
    pub fn new_at(input: &'s str, line: u32, col: u32) -> Tokenizer<'s> {
        Tokenizer {
            in_tag: false,
            rest: input,
            current_line: line,
            current_col: col,
            current_offset: 0,
        }
    }

    /// Produces the next token from the tokenizer.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        loop {
            if self.rest.is_empty() {
                return if self.in_tag {
                    Err(self.syntax_error("unexpected end of input, expected end of tag"))
                } else {
                    Ok(None)
                };
            }
            let outcome = if self.in_tag {
                self.tokenize_tag()
            } else {
                self.tokenize_root()
            };
            match ok!(outcome) {
                ControlFlow::Break(rv) => return Ok(Some(rv)),
                ControlFlow::Continue(()) => continue,
            }
        }
    }

    /// The current line of the tokenizer.
    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    #[inline]
    fn rest_bytes(&self) -> &[u8] {
        self.rest.as_bytes()
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.current_offset += bytes as u32;
        self.rest = new_rest;
        skipped
    }

    #[inline]
    fn loc(&self) -> (u32, u32, u32) {
        (self.current_line, self.current_col, self.current_offset)
    }

    #[inline]
    fn span(&self, (start_line, start_col, start_offset): (u32, u32, u32)) -> Span {
        Span {
            start_line,
            start_col,
            start_offset,
            end_line: self.current_line,
            end_col: self.current_col,
            end_offset: self.current_offset,
        }
    }

    #[inline]
    fn syntax_error(&self, msg: &'static str) -> Error {
        Error::new(ErrorKind::SyntaxError, msg)
    }

    fn eat_number(&mut self) -> Result<(Token<'s>, Span), Error> {
        let old_loc = self.loc();
        let bytes = self.rest_bytes();
        let int_len = bytes.iter().take_while(|c| c.is_ascii_digit()).count();
        // `items.0.name` must not lex `0.` as a float
        let num_len = match (bytes.get(int_len), bytes.get(int_len + 1)) {
            (Some(b'.'), Some(c)) if c.is_ascii_digit() => {
                int_len + 1 + bytes[int_len + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit())
                    .count()
            }
            _ => int_len,
        };
        let is_float = num_len != int_len;
        let num = self.advance(num_len);
        Ok((
            ok!(if is_float {
                num.parse()
                    .map(Token::Float)
                    .map_err(|_| self.syntax_error("invalid float"))
            } else {
                num.parse()
                    .map(Token::Int)
                    .map_err(|_| self.syntax_error("invalid integer"))
            }),
            self.span(old_loc),
        ))
    }

    fn eat_identifier(&mut self) -> Result<(Token<'s>, Span), Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            let old_loc = self.loc();
            let ident = self.advance(ident_len);
            Ok((Token::Ident(ident), self.span(old_loc)))
        } else {
            Err(self.syntax_error("unexpected character"))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<(Token<'s>, Span), Error> {
        let old_loc = self.loc();
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        Ok(if has_escapes {
            (
                Token::String(ok!(unescape(&s[1..s.len() - 1]))),
                self.span(old_loc),
            )
        } else {
            (Token::Str(&s[1..s.len() - 1]), self.span(old_loc))
        })
    }

    fn tokenize_root(&mut self) -> Result<ControlFlow<(Token<'s>, Span)>, Error> {
        let old_loc = self.loc();
        let mut skip = 0;
        if self.rest.starts_with(TAG_START) {
            if self.opens_tag() {
                self.advance(TAG_START.len());
                self.in_tag = true;
                return Ok(ControlFlow::Break((Token::TagStart, self.span(old_loc))));
            }
            // a stray `{{` stays part of the surrounding text
            skip = TAG_START.len();
        }
        let lead = match self.rest[skip..].find(TAG_START) {
            Some(start) => self.advance(skip + start),
            None => self.advance(self.rest.len()),
        };
        Ok(ControlFlow::Break((
            Token::TemplateData(lead),
            self.span(old_loc),
        )))
    }

    /// A `{{` only starts a tag if a `}}` closes it before the next `{{`.
    fn opens_tag(&self) -> bool {
        let body = &self.rest[TAG_START.len()..];
        match body.find(TAG_END) {
            Some(end) => !body[..end].contains(TAG_START),
            None => false,
        }
    }

    fn tokenize_tag(&mut self) -> Result<ControlFlow<(Token<'s>, Span)>, Error> {
        // whitespace inside of tags is insignificant
        match self
            .rest_bytes()
            .iter()
            .position(|&x| !x.is_ascii_whitespace())
        {
            Some(0) => {}
            None => {
                self.advance(self.rest.len());
                return Ok(ControlFlow::Continue(()));
            }
            Some(offset) => {
                self.advance(offset);
                return Ok(ControlFlow::Continue(()));
            }
        }

        let old_loc = self.loc();
        if self.rest.starts_with(TAG_END) {
            self.in_tag = false;
            self.advance(TAG_END.len());
            return Ok(ControlFlow::Break((Token::TagEnd, self.span(old_loc))));
        }

        // two character operators
        let op = match self.rest_bytes().get(..2) {
            Some(b"==") => Some(Token::Eq),
            Some(b"!=") => Some(Token::Ne),
            Some(b">=") => Some(Token::Gte),
            Some(b"<=") => Some(Token::Lte),
            Some(b"=>") => Some(Token::Arrow),
            Some(b"&&") => Some(Token::AndAnd),
            Some(b"||") => Some(Token::OrOr),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok(ControlFlow::Break((op, self.span(old_loc))));
        }

        // single character operators (and strings)
        let op = match self.rest_bytes().first() {
            Some(b'!') => Some(Token::Bang),
            Some(b'.') => Some(Token::Dot),
            Some(b',') => Some(Token::Comma),
            Some(b':') => Some(Token::Colon),
            Some(b'|') => Some(Token::Pipe),
            Some(b'>') => Some(Token::Gt),
            Some(b'<') => Some(Token::Lt),
            Some(b'(') => Some(Token::ParenOpen),
            Some(b')') => Some(Token::ParenClose),
            Some(b'[') => Some(Token::BracketOpen),
            Some(b']') => Some(Token::BracketClose),
            Some(b'\'') => {
                return Ok(ControlFlow::Break(ok!(self.eat_string(b'\''))));
            }
            Some(b'"') => {
                return Ok(ControlFlow::Break(ok!(self.eat_string(b'"'))));
            }
            Some(c) if c.is_ascii_digit() => return Ok(ControlFlow::Break(ok!(self.eat_number()))),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            Ok(ControlFlow::Break((op, self.span(old_loc))))
        } else {
            Ok(ControlFlow::Break(ok!(self.eat_identifier())))
        }
    }
}

/// Utility function to quickly tokenize into an iterator.
pub fn tokenize(input: &str) -> impl Iterator<Item = Result<(Token<'_>, Span), Error>> {
    let mut tokenizer = Tokenizer::new(input);
    std::iter::from_fn(move || tokenizer.next_token().transpose())
}
