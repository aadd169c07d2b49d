use crate::span::Span;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,

    pub message: String,

    pub span: Option<Span>,

    pub additional: Vec<Additional>,
}

impl Diagnostic {
    pub(crate) fn new<S: ToString>(message: S, code: DiagnosticCode) -> Self {
        Diagnostic {
            code,
            message: message.to_string(),
            span: None,
            additional: vec![],
        }
    }

    // Span and hint attachment live on [WithErrorInfo], shared with
    // `Result`.

    /// Things that you *think* should never happen, but are not sure.
    pub(crate) fn new_assert<S: Into<String>>(message: S) -> Self {
        Diagnostic::new("Internal bug. Please file an issue.", DiagnosticCode::BUG)
            .push_hint(message)
    }

    pub(crate) fn is_fatal(&self) -> bool {
        self.code == DiagnosticCode::RECURSION
    }
}

#[derive(Debug, Clone)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticCode(&'static str);

impl DiagnosticCode {
    pub const BUG: DiagnosticCode = DiagnosticCode("E0001");
    /// Unterminated string or unrecognized character.
    pub const LEX: DiagnosticCode = DiagnosticCode("E0002");
    /// Unexpected token.
    pub const SYNTAX: DiagnosticCode = DiagnosticCode("E0003");
    /// Too few arguments to a named function or lambda.
    pub const ARITY: DiagnosticCode = DiagnosticCode("E0004");
    /// Identifier not bound in any scope (strict resolution only).
    pub const UNRESOLVED: DiagnosticCode = DiagnosticCode("E0005");
    /// Folding depth exceeded. Fatal, never recovered into the pool.
    pub const RECURSION: DiagnosticCode = DiagnosticCode("E0006");

    pub fn get(&self) -> &'static str {
        self.0
    }

    pub const fn get_severity(&self) -> Severity {
        match self.0.as_bytes()[0] {
            b'E' => Severity::Error,
            b'W' => Severity::Warning,
            _ => panic!(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Additional {
    pub message: String,

    pub span: Option<Span>,
}

pub trait WithErrorInfo: Sized {
    fn push_hint<S: Into<String>>(self, hint: S) -> Self;

    fn with_span(self, span: Option<Span>) -> Self;

    fn with_span_fallback(self, span: Option<Span>) -> Self;
}

impl WithErrorInfo for Diagnostic {
    fn push_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.additional.push(Additional {
            message: hint.into(),
            span: None,
        });
        self
    }

    fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    fn with_span_fallback(mut self, span: Option<Span>) -> Self {
        self.span = self.span.or(span);
        self
    }
}

impl<T, E: WithErrorInfo> WithErrorInfo for Result<T, E> {
    fn push_hint<S: Into<String>>(self, hint: S) -> Self {
        self.map_err(|e| e.push_hint(hint))
    }

    fn with_span(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span(span))
    }

    fn with_span_fallback(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span_fallback(span))
    }
}
