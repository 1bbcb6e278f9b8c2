//! Template and expression parsing.
//!
//! # Grammar
//! ```text
//! template   := (text | "{{" expr "}}" | "{#" comment "#}")*
//! expr       := filtered (("+" | "~") filtered)*
//! filtered   := postfix ("|" IDENT)*
//! postfix    := primary ("." IDENT | "[" expr "]")*
//! primary    := IDENT | STRING | INT | "(" expr ")"
//! ```
//!
//! # Design Decisions
//! - `{% ... %}` statement blocks are not part of the language
//! - A `(` directly after a postfix expression is a call and is refused as a
//!   security violation, not a syntax error
//! - Filters are resolved here, so an unknown filter never reaches evaluation

use crate::template::TemplateError;

/// Built-in filters. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Md5,
    ToJson,
}

impl Filter {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "md5" => Some(Filter::Md5),
            "tojson" => Some(Filter::ToJson),
            _ => None,
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    Filter(Box<Expr>, Filter),
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
}

/// Parse template source into nodes.
pub fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = find_tag(rest) {
        if start > 0 {
            nodes.push(Node::Text(rest[..start].to_string()));
        }
        let tag = &rest[start..start + 2];
        let inner = &rest[start + 2..];
        let consumed = match tag {
            "{{" => {
                let (expr, used) = parse_output(inner, offset + start + 2)?;
                nodes.push(Node::Output(expr));
                used
            }
            "{#" => match inner.find("#}") {
                Some(end) => end + 2,
                None => {
                    return Err(TemplateError::Syntax {
                        position: offset + start,
                        message: "unterminated comment".into(),
                    })
                }
            },
            _ => {
                return Err(TemplateError::Syntax {
                    position: offset + start,
                    message: "statement blocks are not supported".into(),
                })
            }
        };
        let advance = start + 2 + consumed;
        offset += advance;
        rest = &rest[advance..];
    }

    if !rest.is_empty() {
        nodes.push(Node::Text(rest.to_string()));
    }
    Ok(nodes)
}

/// Parse a standalone expression (no delimiters).
pub fn parse_expression(source: &str) -> Result<Expr, TemplateError> {
    let tokens = lex(source, 0, false)?.0;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

fn find_tag(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'#' | b'%'))
}

/// Parse the body of `{{ ... }}`; returns the expression and the bytes used
/// including the closing `}}`.
fn parse_output(inner: &str, base: usize) -> Result<(Expr, usize), TemplateError> {
    let (tokens, used) = lex(inner, base, true)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok((expr, used))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Plus,
    Tilde,
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    position: usize,
}

/// Tokenize. With `delimited`, lexing stops at the first `}}` outside a
/// string literal, which must exist.
fn lex(src: &str, base: usize, delimited: bool) -> Result<(Vec<Spanned>, usize), TemplateError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let syntax = |position: usize, message: String| TemplateError::Syntax {
        position: base + position,
        message,
    };

    while i < chars.len() {
        let (at, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if delimited && c == '}' && chars.get(i + 1).map(|(_, n)| *n) == Some('}') {
            return Ok((tokens, at + 2));
        }

        let token = match c {
            '.' => Token::Dot,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '|' => Token::Pipe,
            '+' => Token::Plus,
            '~' => Token::Tilde,
            '\'' | '"' => {
                let (value, next) = lex_string(&chars, i, c)
                    .ok_or_else(|| syntax(at, "unterminated string literal".into()))?;
                tokens.push(Spanned { token: Token::Str(value), position: base + at });
                i = next;
                continue;
            }
            d if d.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
                let value = text
                    .parse::<i64>()
                    .map_err(|_| syntax(at, format!("integer literal out of range: {text}")))?;
                tokens.push(Spanned { token: Token::Int(value), position: base + at });
                continue;
            }
            a if a.is_alphabetic() || a == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
                tokens.push(Spanned { token: Token::Ident(text), position: base + at });
                continue;
            }
            other => return Err(syntax(at, format!("unexpected character '{other}'"))),
        };
        tokens.push(Spanned { token, position: base + at });
        i += 1;
    }

    if delimited {
        return Err(syntax(src.len(), "unterminated '{{' block".into()));
    }
    Ok((tokens, src.len()))
}

fn lex_string(chars: &[(usize, char)], start: usize, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' => {
                let escaped = chars.get(i + 1)?.1;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Some((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    None
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect_end(&self) -> Result<(), TemplateError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
        }
    }

    fn expr(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.filtered()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    let right = self.filtered()?;
                    left = Expr::Add(Box::new(left), Box::new(right));
                }
                Some(Token::Tilde) => {
                    self.pos += 1;
                    let right = self.filtered()?;
                    left = Expr::Concat(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn filtered(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.postfix()?;
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(self.error("expected filter name after '|'")),
            };
            let filter = Filter::lookup(&name)
                .ok_or_else(|| TemplateError::Security(format!("filter '{name}' is not allowed")))?;
            if self.peek() == Some(&Token::LParen) {
                return Err(TemplateError::Security(format!(
                    "filter '{name}' does not take arguments"
                )));
            }
            expr = Expr::Filter(Box::new(expr), filter);
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => expr = Expr::Attr(Box::new(expr), name),
                        Some(Token::Int(index)) => {
                            expr = Expr::Index(Box::new(expr), Box::new(Expr::Int(index)))
                        }
                        _ => return Err(self.error("expected attribute name after '.'")),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    if self.next() != Some(Token::RBracket) {
                        return Err(self.error("expected ']'"));
                    }
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::LParen) => {
                    return Err(TemplateError::Security("function calls are not allowed".into()))
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" | "True" => Expr::Bool(true),
                "false" | "False" => Expr::Bool(false),
                "none" | "None" => Expr::None,
                _ => Expr::Name(name),
            }),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if self.next() != Some(Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some(token) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {token:?}")))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }
}
