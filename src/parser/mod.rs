//! Parse driver: feeds scanner tokens to the pushdown machine one at a
//! time and turns failures into inline `ERROR` nodes.
//!
//! Parsing "always succeeds" from the caller's point of view: recoverable
//! lexing, syntax, arity and resolution failures land in the pool as
//! `ERROR` nodes reachable from the root, and the driver resynchronizes at
//! the next `.`. Only two failures are hard errors: a program that never
//! reaches its terminating `..`, and the folding recursion limit.

mod machine;
#[cfg(test)]
mod test;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::error::Error;
use crate::fold::ResolutionMode;
use crate::lexer::{Scanner, TokenKind};
use crate::lexicon::Lexicon;
use crate::pool::AstPool;

use machine::Machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseOptions {
    /// What unresolved identifiers do: error out, or pass through for a
    /// later stage.
    #[serde(default)]
    pub resolution: ResolutionMode,
}

/// Parse source text into a serializable node pool.
pub fn parse(source: &str, lexicon: &Lexicon) -> Result<AstPool, Error> {
    parse_with_options(source, lexicon, &ParseOptions::default())
}

pub fn parse_with_options(
    source: &str,
    lexicon: &Lexicon,
    options: &ParseOptions,
) -> Result<AstPool, Error> {
    let mut scanner = Scanner::new(source);
    let mut machine = Machine::new(lexicon, options.resolution);

    loop {
        let token = match scanner.next_token(lexicon) {
            Ok(Some(token)) => token,
            Ok(None) => break,
            Err(diagnostic) => {
                machine.recover(&diagnostic);
                skip_to_sync(&mut scanner, lexicon);
                continue;
            }
        };

        if machine.terminated() {
            let diagnostic = Diagnostic::new(
                format!("expected end of input, found {}", token.kind),
                DiagnosticCode::SYNTAX,
            );
            machine.recover(&diagnostic);
            // Nothing after `..` can restart the program; drain the rest.
            while let Ok(Some(_)) = scanner.next_token(lexicon) {}
            break;
        }

        let at_boundary = token.kind == TokenKind::Control('.');
        if let Err(diagnostic) = machine.step(token) {
            if diagnostic.is_fatal() {
                return Err(Error::from_diagnostics(vec![diagnostic], source));
            }
            machine.recover(&diagnostic);
            // If the failure happened at a `.` the stream is already at an
            // expression boundary; otherwise discard up to the next one.
            if !at_boundary {
                skip_to_sync(&mut scanner, lexicon);
            }
        }
    }

    let (pool, root) = machine
        .finish()
        .map_err(|d| Error::from_diagnostics(vec![d], source))?;
    Ok(pool.into_ast_pool(root))
}

/// After an error, discard tokens until the next expression boundary.
fn skip_to_sync(scanner: &mut Scanner, lexicon: &Lexicon) {
    loop {
        match scanner.next_token(lexicon) {
            Ok(Some(token)) if token.kind == TokenKind::Control('.') => break,
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => continue,
        }
    }
}
