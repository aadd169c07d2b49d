//! The caller-supplied lexicon: a dialect's source-level vocabulary.
//!
//! A lexicon maps source lexemes to AST tag names, a binding class and an
//! arity. The core itself hardcodes only the fixed keyword table and a
//! handful of builtin primitives; everything else a dialect speaks arrives
//! through this table, typically loaded from a JSON data file:
//!
//! ```json
//! {
//!   "fill":   { "tag": "FILL", "class": "function", "arity": 1 },
//!   "turn":   { "tag": "TURN", "class": "function", "arity": 1 },
//!   "and":    { "tag": "AND", "token_class": "operator" }
//! }
//! ```
//!
//! Entries with `token_class: "operator"` lex as infix operator tokens;
//! their tag must name one of the binary operators.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::pool::{BinOp, NodeTag};

/// Fixed keyword table. Lexemes here are never looked up in the lexicon.
pub const KEYWORDS: &[&str] = &[
    "let", "if", "then", "else", "case", "of", "end", "true", "false", "null",
];

pub(crate) fn keyword(lexeme: &str) -> Option<&'static str> {
    KEYWORDS.iter().find(|k| **k == lexeme).copied()
}

/// Builtin primitive operators: `(lexeme, tag, arity)`. Available to every
/// dialect; a lexicon entry of the same name shadows the builtin.
pub(crate) fn builtin(name: &str) -> Option<(NodeTag, usize)> {
    Some(match name {
        "add" => (NodeTag::Add, 2),
        "mod" => (NodeTag::Mod, 2),
        "pow" => (NodeTag::Pow, 2),
        "concat" => (NodeTag::Concat, 2),
        "apply" => (NodeTag::Apply, 2),
        "val" => (NodeTag::Dialect("VAL".into()), 2),
        "key" => (NodeTag::Dialect("KEY".into()), 2),
        "len" => (NodeTag::Dialect("LEN".into()), 1),
        "map" => (NodeTag::Dialect("MAP".into()), 2),
        "arg" => (NodeTag::Dialect("ARG".into()), 1),
        "data" => (NodeTag::Dialect("DATA".into()), 1),
        "json" => (NodeTag::Dialect("JSON".into()), 1),
        "in" => (NodeTag::Dialect("IN".into()), 2),
        _ => return None,
    })
}

pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "add", "mod", "pow", "concat", "apply", "val", "key", "len", "map", "arg", "data", "json", "in",
];

/// Reverse lookup for the unparser: the builtin lexeme producing `tag`.
pub(crate) fn builtin_lexeme(tag: &NodeTag) -> Option<&'static str> {
    BUILTIN_NAMES
        .iter()
        .find(|name| builtin(name).is_some_and(|(t, _)| &t == tag))
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordClass {
    #[default]
    Val,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    /// Lexes as an identifier; resolved by the folder.
    #[default]
    Word,
    /// Lexes as an infix operator token; the tag names which one.
    Operator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexEntry {
    pub tag: NodeTag,

    #[serde(default)]
    pub class: WordClass,

    #[serde(default)]
    pub arity: usize,

    #[serde(default)]
    pub token_class: TokenClass,
}

impl LexEntry {
    pub fn function(tag: NodeTag, arity: usize) -> Self {
        LexEntry {
            tag,
            class: WordClass::Function,
            arity,
            token_class: TokenClass::Word,
        }
    }

    pub fn operator(tag: NodeTag) -> Self {
        LexEntry {
            tag,
            class: WordClass::Val,
            arity: 2,
            token_class: TokenClass::Operator,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    entries: IndexMap<String, LexEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Lexicon::default()
    }

    /// Parse a lexicon from its JSON data-file form and validate it.
    pub fn from_json_str(json: &str) -> Result<Lexicon, Error> {
        let lexicon: Lexicon = serde_json::from_str(json).map_err(|e| Error::Lexicon {
            problem: e.to_string(),
        })?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    pub fn insert(&mut self, lexeme: impl Into<String>, entry: LexEntry) -> &mut Self {
        self.entries.insert(lexeme.into(), entry);
        self
    }

    pub fn get(&self, lexeme: &str) -> Option<&LexEntry> {
        self.entries.get(lexeme)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter_entries(&self) -> impl Iterator<Item = (&str, &LexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Infix operator classification for the scanner.
    pub(crate) fn infix_op(&self, lexeme: &str) -> Option<BinOp> {
        let entry = self.get(lexeme)?;
        if entry.token_class != TokenClass::Operator {
            return None;
        }
        BinOp::from_tag(&entry.tag)
    }

    /// Tag and arity a name resolves to: lexicon first, builtins second.
    pub(crate) fn word(&self, name: &str) -> Option<(NodeTag, usize)> {
        if let Some(entry) = self.get(name) {
            return Some((entry.tag.clone(), entry.arity));
        }
        builtin(name)
    }

    /// Reverse lookup for the unparser: the first lexeme mapping to `tag`.
    pub(crate) fn lexeme_for_tag(&self, tag: &NodeTag) -> Option<(&str, TokenClass)> {
        self.entries
            .iter()
            .find(|(_, e)| &e.tag == tag)
            .map(|(lexeme, e)| (lexeme.as_str(), e.token_class))
    }

    fn validate(&self) -> Result<(), Error> {
        for (lexeme, entry) in &self.entries {
            if keyword(lexeme).is_some() {
                return Err(Error::Lexicon {
                    problem: format!("`{lexeme}` is a reserved keyword"),
                });
            }
            if entry.token_class == TokenClass::Operator && BinOp::from_tag(&entry.tag).is_none() {
                return Err(Error::Lexicon {
                    problem: format!("operator entry `{lexeme}` must map to an operator tag"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builtins() {
        assert_eq!(builtin("add"), Some((NodeTag::Add, 2)));
        assert_eq!(builtin("len"), Some((NodeTag::Dialect("LEN".into()), 1)));
        assert_eq!(builtin("turn"), None);
        assert_eq!(builtin_lexeme(&NodeTag::Concat), Some("concat"));
    }

    #[test]
    fn test_json_loading() {
        let lexicon = Lexicon::from_json_str(
            r#"{
                "fill": { "tag": "FILL", "class": "function", "arity": 1 },
                "and": { "tag": "AND", "token_class": "operator" }
            }"#,
        )
        .unwrap();

        let fill = lexicon.get("fill").unwrap();
        assert_eq!(fill.tag, NodeTag::Dialect("FILL".into()));
        assert_eq!(fill.arity, 1);
        assert_eq!(lexicon.infix_op("and"), Some(BinOp::And));
        assert_eq!(lexicon.infix_op("fill"), None);
    }

    #[test]
    fn test_rejects_bad_operator_entry() {
        let err = Lexicon::from_json_str(r#"{ "weird": { "tag": "FILL", "token_class": "operator" } }"#);
        assert!(err.is_err());

        let err = Lexicon::from_json_str(r#"{ "let": { "tag": "LET" } }"#);
        assert!(err.is_err());
    }
}
