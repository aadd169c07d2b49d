//! Compiler front end for the Strand expression language.
//!
//! The pipeline: source text plus a caller-supplied [Lexicon] goes through
//! the scanner and the resumable parser into a hash-consed node pool,
//! constant-folded as it is built; the finished [AstPool] is the
//! serializable wire representation handed to storage and per-dialect
//! compiler backends. [unparse] reconstructs source text from a pool.
//!
//! Parsing never fails on malformed sub-expressions: those surface as
//! inline `ERROR` nodes for a downstream consumer to report. The only hard
//! failures are a missing `..` terminator and the folding recursion limit.

mod diagnostic;
mod env;
mod fold;
mod lexer;
mod parser;
mod pool;
mod printer;
mod span;

pub mod error;
pub mod lexicon;

pub use error::Error;
pub use fold::ResolutionMode;
pub use lexicon::{LexEntry, Lexicon, TokenClass, WordClass};
pub use parser::{parse, parse_with_options, ParseOptions};
pub use pool::{AstPool, Element, NodeId, NodeTag, PoolNode};
pub use printer::{unparse, UnparseOptions};
pub use span::Span;

/// Parse and immediately unparse: normalizes formatting.
pub fn reformat(
    source: &str,
    lexicon: &Lexicon,
    options: &UnparseOptions,
) -> Result<String, Error> {
    let pool = parse(source, lexicon)?;
    Ok(unparse(&pool, lexicon, options))
}
