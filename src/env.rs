//! Lexical scopes: a stack of frames mapping names to bindings.
//!
//! The base frame is seeded from the builtin primitives and the caller
//! lexicon; `let` definitions and lambda applications push frames on top.
//! Depth is bounded because folding inlines user-defined function bodies at
//! every call site; a non-terminating user recursion must become a fatal
//! diagnostic instead of exhausting the process stack.

use indexmap::IndexMap;

use crate::diagnostic::{Diagnostic, DiagnosticCode, WithErrorInfo};
use crate::lexicon::{self, Lexicon};
use crate::pool::NodeId;
use crate::span::Span;

pub(crate) const MAX_SCOPE_DEPTH: usize = 380;

/// A binding record.
#[derive(Debug, Clone)]
pub(crate) enum Word {
    /// A value binding. `offset` is the binding's position among the
    /// enclosing parameters; `nid` is NONE until resolved.
    Val { offset: usize, nid: NodeId },

    /// A function binding. `arity` gates how many operands are popped
    /// before folding is attempted; `nid` is the stored body (NONE for
    /// builtin and lexicon primitives); `params` is the formal pattern.
    Function {
        arity: usize,
        nid: NodeId,
        params: Vec<(String, NodeId)>,
    },
}

#[derive(Debug)]
pub(crate) struct Frame {
    #[allow(dead_code)]
    pub name: String,
    pub words: IndexMap<String, Word>,
    /// Formal-parameter nodes accumulated while parsing a `let` head.
    pub pattern: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) struct Environment {
    frames: Vec<Frame>,
}

impl Environment {
    pub fn new(lexicon: &Lexicon) -> Self {
        let mut words = IndexMap::new();
        for name in lexicon::BUILTIN_NAMES {
            let (_, arity) = lexicon::builtin(name).expect("builtin table is closed");
            words.insert(
                name.to_string(),
                Word::Function {
                    arity,
                    nid: NodeId::NONE,
                    params: vec![],
                },
            );
        }
        for (lexeme, entry) in lexicon.iter_entries() {
            words.insert(
                lexeme.to_string(),
                Word::Function {
                    arity: entry.arity,
                    nid: NodeId::NONE,
                    params: vec![],
                },
            );
        }

        Environment {
            frames: vec![Frame {
                name: "global".to_string(),
                words,
                pattern: vec![],
            }],
        }
    }

    pub fn enter(&mut self, name: &str, span: Option<Span>) -> Result<(), Diagnostic> {
        if self.frames.len() >= MAX_SCOPE_DEPTH {
            return Err(Diagnostic::new(
                format!("runaway recursion while folding `{name}`"),
                DiagnosticCode::RECURSION,
            )
            .with_span(span));
        }
        self.frames.push(Frame {
            name: name.to_string(),
            words: IndexMap::new(),
            pattern: vec![],
        });
        Ok(())
    }

    pub fn exit(&mut self) {
        debug_assert!(self.frames.len() > 1, "exiting the global frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Innermost-frame-first search up the stack.
    pub fn find(&self, name: &str) -> Option<&Word> {
        self.frames.iter().rev().find_map(|f| f.words.get(name))
    }

    /// Bind into the current topmost frame.
    pub fn add(&mut self, name: &str, word: Word) {
        self.frames
            .last_mut()
            .expect("environment has a global frame")
            .words
            .insert(name.to_string(), word);
    }

    /// Resolve the innermost binding of `name` to a concrete node.
    pub fn bind(&mut self, name: &str, body: NodeId) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(word) = frame.words.get_mut(name) {
                match word {
                    Word::Val { nid, .. } => *nid = body,
                    Word::Function { nid, .. } => *nid = body,
                }
                return;
            }
        }
    }

    pub fn pattern_push(&mut self, id: NodeId) {
        self.frames
            .last_mut()
            .expect("environment has a global frame")
            .pattern
            .push(id);
    }

    /// The formal-parameter nodes accumulated in the current frame.
    pub fn pattern(&self) -> &[NodeId] {
        self.frames
            .last()
            .map(|f| f.pattern.as_slice())
            .unwrap_or(&[])
    }

    pub fn reset_to_base(&mut self) {
        self.frames.truncate(1);
    }
}
