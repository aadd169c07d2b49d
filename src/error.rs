use std::fmt;

use itertools::Itertools;

use crate::diagnostic::{Diagnostic, Severity};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("invalid lexicon: {problem}")]
    Lexicon { problem: String },

    #[error("{}", DisplayMessages(.diagnostics))]
    Compile { diagnostics: Vec<DiagnosticMessage> },
}

impl Error {
    pub(crate) fn from_diagnostics(diagnostics: Vec<Diagnostic>, source: &str) -> Self {
        let diagnostics = diagnostics
            .into_iter()
            .map(|d| DiagnosticMessage::compose(d, source))
            .collect();
        Error::Compile { diagnostics }
    }
}

#[derive(Debug)]
pub struct DiagnosticMessage {
    diagnostic: Diagnostic,

    display: String,

    location: Option<SourceLocation>,
}

impl DiagnosticMessage {
    pub fn code(&self) -> &'static str {
        self.diagnostic.code.get()
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }

    pub fn span(&self) -> &Option<crate::Span> {
        &self.diagnostic.span
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn location(&self) -> &Option<SourceLocation> {
        &self.location
    }

    fn compose(diagnostic: Diagnostic, source: &str) -> DiagnosticMessage {
        let location = diagnostic.span.map(|span| SourceLocation {
            start: offset_to_line_col(source, span.start as usize),
            end: offset_to_line_col(source, span.end() as usize),
        });
        let display = match diagnostic.span {
            Some(_) => compose_display(&diagnostic, source),
            None => format!("[{}] Error: {}", diagnostic.code.get(), diagnostic.message),
        };
        DiagnosticMessage {
            diagnostic,
            display,
            location,
        }
    }
}

/// Location within the source file.
/// Tuples contain:
/// - line number (0-based),
/// - column number within that line (0-based),
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub start: (usize, usize),

    pub end: (usize, usize),
}

fn compose_display(diagnostic: &Diagnostic, source: &str) -> String {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    let config = Config::default().with_color(false);

    let span = std::ops::Range::from(diagnostic.span.unwrap());

    let kind = match diagnostic.code.get_severity() {
        Severity::Warning => ReportKind::Warning,
        Severity::Error => ReportKind::Error,
    };

    let mut report = Report::build(kind, (), span.start)
        .with_config(config)
        .with_code(diagnostic.code.get())
        .with_label(Label::new(span).with_message(&diagnostic.message));

    let mut notes = String::new();
    for additional in &diagnostic.additional {
        if let Some(span) = additional.span {
            let span = std::ops::Range::from(span);
            report.add_label(Label::new(span).with_message(&additional.message));
        } else {
            notes += &additional.message;
            notes += "\n";
        }
    }
    if !notes.is_empty() {
        report.set_note(notes);
    }

    let mut out = Vec::new();
    if report
        .finish()
        .write(Source::from(source.to_string()), &mut out)
        .is_err()
    {
        return format!("[{}] Error: {}", diagnostic.code.get(), diagnostic.message);
    }
    String::from_utf8(out).unwrap_or_default()
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

struct DisplayMessages<'a>(&'a Vec<DiagnosticMessage>);

impl fmt::Display for DisplayMessages<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().map(|d| d.display.trim_end()).join("\n"))
    }
}
