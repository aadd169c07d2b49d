//! The scanner: converts a character stream into a token stream.
//!
//! Hand-rolled over a byte cursor so that a terminator character can be
//! left unconsumed (the one-character "back up" the grammar needs after
//! numbers and identifiers). `peek` is idempotent: peeking twice without
//! consuming returns the same token.
//!
//! Identifier lexemes are classified against the fixed keyword table first
//! and the caller lexicon second; unknown lexemes default to identifier
//! tokens, to be resolved later by the folder.

mod token;

pub(crate) use token::{quote_text, Literal, Token, TokenKind};

use crate::diagnostic::{Diagnostic, DiagnosticCode, WithErrorInfo};
use crate::lexicon::{self, Lexicon};
use crate::pool::BinOp;
use crate::span::Span;

/// Characters allowed in a non-leading identifier position.
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '@' | '+' | '#' | '~')
}

#[derive(Debug)]
pub(crate) struct Scanner<'s> {
    source: &'s str,
    pos: usize,
    peeked: Option<Option<Token>>,
    /// Brace depth of each active `${…}` interpolation, innermost last.
    interp: Vec<u32>,
}

impl<'s> Scanner<'s> {
    pub fn new(source: &'s str) -> Self {
        Scanner {
            source,
            pos: 0,
            peeked: None,
            interp: Vec::new(),
        }
    }

    /// The next token without consuming it.
    pub fn peek(&mut self, lexicon: &Lexicon) -> Result<Option<Token>, Diagnostic> {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan(lexicon)?);
        }
        Ok(self.peeked.clone().unwrap())
    }

    /// Consume and return the next token; `None` at end of input.
    pub fn next_token(&mut self, lexicon: &Lexicon) -> Result<Option<Token>, Diagnostic> {
        self.peek(lexicon)?;
        Ok(self.peeked.take().flatten())
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.source[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::between(start as u32, self.pos as u32)
    }

    fn scan(&mut self, lexicon: &Lexicon) -> Result<Option<Token>, Diagnostic> {
        loop {
            while self.peek_char().is_some_and(char::is_whitespace) {
                self.bump();
            }

            let start = self.pos;
            let Some(c) = self.peek_char() else {
                return Ok(None);
            };

            // A `}` at interpolation depth 0 resumes the enclosing
            // backtick string.
            if c == '}' && self.interp.last() == Some(&0) {
                self.bump();
                self.interp.pop();
                return self.scan_string_body('`', start, true).map(Some);
            }

            let kind = match c {
                '#' | ';' => {
                    // Line comment: consume to end of line, no token produced.
                    while self.peek_char().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                    continue;
                }

                '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    return self.scan_number(start).map(Some);
                }

                '{' => {
                    if let Some(depth) = self.interp.last_mut() {
                        *depth += 1;
                    }
                    self.bump();
                    TokenKind::Control('{')
                }
                '}' => {
                    if let Some(depth) = self.interp.last_mut() {
                        *depth -= 1;
                    }
                    self.bump();
                    TokenKind::Control('}')
                }

                '(' | ')' | '[' | ']' | '<' | '>' | ',' | ':' | '.' | '=' => {
                    self.bump();
                    TokenKind::Control(c)
                }

                '-' => {
                    self.bump();
                    TokenKind::Op(BinOp::Sub)
                }
                '^' => {
                    self.bump();
                    TokenKind::Op(BinOp::Pow)
                }
                '*' => {
                    self.bump();
                    TokenKind::Op(BinOp::Mul)
                }

                '\'' | '"' | '`' => {
                    self.bump();
                    return self.scan_string_body(c, start, false).map(Some);
                }

                c if c.is_ascii_digit() => return self.scan_number(start).map(Some),

                c if c.is_alphabetic() || c == '_' => {
                    return Ok(Some(self.scan_ident(start, lexicon)));
                }

                other => {
                    self.bump();
                    return Err(Diagnostic::new(
                        format!("unrecognized character `{other}`"),
                        DiagnosticCode::LEX,
                    )
                    .with_span(Some(self.span_from(start))));
                }
            };

            let token = Token {
                kind,
                span: self.span_from(start),
            };
            tracing::trace!("token {}: {:?}", token.kind.as_ref(), token);
            return Ok(Some(token));
        }
    }

    /// Digit sequence with at most one decimal point, allowing the
    /// `.5` form. Stops before (does not consume) the terminator.
    fn scan_number(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let mut seen_point = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !seen_point && self.peek_second().is_some_and(|c| c.is_ascii_digit())
            {
                seen_point = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        Ok(Token {
            kind: TokenKind::Literal(Literal::Num(text.to_string())),
            span: self.span_from(start),
        })
    }

    fn scan_ident(&mut self, start: usize, lexicon: &Lexicon) -> Token {
        self.bump();
        while self.peek_char().is_some_and(is_ident_continue) {
            self.bump();
        }
        let lexeme = &self.source[start..self.pos];

        let kind = match lexeme {
            "true" => TokenKind::Literal(Literal::Bool(true)),
            "false" => TokenKind::Literal(Literal::Bool(false)),
            "null" => TokenKind::Literal(Literal::Null),
            _ => {
                if let Some(kw) = lexicon::keyword(lexeme) {
                    TokenKind::Keyword(kw)
                } else if let Some(op) = lexicon.infix_op(lexeme) {
                    TokenKind::Op(op)
                } else {
                    TokenKind::Ident(lexeme.to_string())
                }
            }
        };
        Token {
            kind,
            span: self.span_from(start),
        }
    }

    /// Scan a string body after its opening quote (or after the `}` that
    /// resumed an interpolated backtick string). Emits a plain text
    /// literal, or the open/mid/close fragments of an interpolation.
    fn scan_string_body(
        &mut self,
        quote: char,
        start: usize,
        resumed: bool,
    ) -> Result<Token, Diagnostic> {
        let mut text = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(Diagnostic::new(
                    "unterminated string",
                    DiagnosticCode::LEX,
                )
                .with_span(Some(self.span_from(start))));
            };

            if c == quote {
                let kind = if resumed {
                    TokenKind::StrClose(text)
                } else {
                    TokenKind::Literal(Literal::Text(text))
                };
                return Ok(Token {
                    kind,
                    span: self.span_from(start),
                });
            }

            if c == '\\' {
                let escaped = self.bump().ok_or_else(|| {
                    Diagnostic::new("unterminated string", DiagnosticCode::LEX)
                        .with_span(Some(self.span_from(start)))
                })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                continue;
            }

            if quote == '`' && c == '$' && self.peek_char() == Some('{') {
                self.bump();
                self.interp.push(0);
                let kind = if resumed {
                    TokenKind::StrMid(text)
                } else {
                    TokenKind::StrOpen(text)
                };
                return Ok(Token {
                    kind,
                    span: self.span_from(start),
                });
            }

            text.push(c);
        }
    }
}
