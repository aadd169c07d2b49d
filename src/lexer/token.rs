use std::fmt::Write;

use crate::pool::BinOp;
use crate::span::Span;

#[derive(Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, strum::AsRefStr)]
pub(crate) enum TokenKind {
    Ident(String),
    Keyword(&'static str),
    Literal(Literal),

    /// Infix operator, from punctuation or a lexicon operator entry.
    Op(BinOp),

    /// single-char control tokens
    Control(char),

    /// Backtick-string fragment before the first `${`.
    StrOpen(String),
    /// Fragment between two interpolated expressions.
    StrMid(String),
    /// Fragment after the last interpolated expression.
    StrClose(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    /// Raw decimal lexeme, kept as text.
    Num(String),
    Text(String),
    Bool(bool),
    Null,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => {
                if s.is_empty() {
                    // FYI this shows up in errors
                    write!(f, "an identifier")
                } else {
                    write!(f, "{s}")
                }
            }
            TokenKind::Keyword(s) => write!(f, "keyword {s}"),
            TokenKind::Literal(lit) => write!(f, "{lit}"),
            TokenKind::Op(op) => write!(f, "{op}"),
            TokenKind::Control(c) => f.write_char(*c),
            TokenKind::StrOpen(s) => write!(f, "`{s}${{"),
            TokenKind::StrMid(s) => write!(f, "}}{s}${{"),
            TokenKind::StrClose(s) => write!(f, "}}{s}`"),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Num(text) => f.write_str(text),
            Literal::Text(text) => f.write_str(&quote_text(text)),
            Literal::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Literal::Null => f.write_str("null"),
        }
    }
}

/// Re-quote a string with the canonical single-quote style, minimally
/// escaped. Shared with the unparser.
pub(crate) fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}: {:?}", self.span, self.kind)
    }
}
