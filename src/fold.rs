//! The folder: a parse-time constant-folding / partial-evaluation pass.
//!
//! A tag-dispatched walker over the node pool, driven bottom-up with
//! children visited in reverse-declaration order, so that left-to-right
//! source order is preserved on the operand stack and function words can
//! pop their already-folded operands. Invoked by the parser at each
//! top-level expression group and recursively during lambda application.

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, DiagnosticCode, WithErrorInfo};
use crate::env::{Environment, Word};
use crate::lexicon::Lexicon;
use crate::pool::{BinOp, NodeId, NodePool, NodeTag, OperandStack};
use crate::span::Span;

/// What happens when an identifier is not bound in any scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Unresolved identifiers are an error.
    Strict,
    /// Unresolved identifiers pass through untouched, to be resolved by a
    /// later stage.
    #[default]
    Permissive,
}

/// Per-invocation folding context. All state is borrowed from the parse
/// session; nothing is shared across calls.
pub(crate) struct Folder<'a> {
    pub pool: &'a mut NodePool,
    pub stack: &'a mut OperandStack,
    pub env: &'a mut Environment,
    pub lexicon: &'a Lexicon,
    pub mode: ResolutionMode,
}

impl Folder<'_> {
    /// Fold the terms of one expression group inside a private operand
    /// frame. A single leftover operand becomes the group's result;
    /// several leftovers rebuild an `EXPRS` node in source order.
    pub fn fold_group(&mut self, terms: &[NodeId]) -> Result<NodeId, Diagnostic> {
        self.stack.enter();
        for &term in terms.iter().rev() {
            if let Err(e) = self.fold(term) {
                self.stack.exit();
                return Err(e);
            }
        }
        let mut results = self.stack.exit();
        results.reverse();
        Ok(match results.len() {
            0 => self.pool.null(),
            1 => results[0],
            _ => self.pool.interior(NodeTag::Exprs, results),
        })
    }

    /// Fold one node in isolation and return its result id.
    fn fold_single(&mut self, id: NodeId) -> Result<NodeId, Diagnostic> {
        self.stack.enter();
        let folded = self.fold(id);
        let mut results = self.stack.exit();
        folded?;
        results
            .pop()
            .ok_or_else(|| Diagnostic::new_assert("folding produced no result"))
    }

    fn fold(&mut self, id: NodeId) -> Result<(), Diagnostic> {
        let node = self.pool.node(id).clone();
        let children: Vec<NodeId> = node.children().collect();
        tracing::trace!("fold {} {:?}", node.tag, id);

        match &node.tag {
            // Leaves and deferred definitions pass through.
            NodeTag::Num
            | NodeTag::Str
            | NodeTag::Bool
            | NodeTag::Null
            | NodeTag::Error
            | NodeTag::Let => self.stack.push(id),

            NodeTag::Lambda => {
                let folded = self.fold_lambda(id)?;
                self.stack.push(folded);
            }

            NodeTag::Ident => return self.resolve_ident(id, &node),

            NodeTag::Exprs => {
                let folded = self.fold_group(&children)?;
                self.stack.push(folded);
            }

            NodeTag::Paren => {
                let folded = self.fold_group(&children)?;
                let paren = self.pool.interior(NodeTag::Paren, vec![folded]);
                self.stack.push(paren);
            }

            NodeTag::List => {
                // A private frame, so the surrounding expression's operand
                // count is unaffected by how many items the list folds to.
                self.stack.enter();
                for &child in children.iter().rev() {
                    if let Err(e) = self.fold(child) {
                        self.stack.exit();
                        return Err(e);
                    }
                }
                let mut items = self.stack.exit();
                items.reverse();
                let list = self.pool.interior(NodeTag::List, items);
                self.stack.push(list);
            }

            NodeTag::Record | NodeTag::Binding | NodeTag::If | NodeTag::Case | NodeTag::Prog => {
                let folded = self.fold_children(&children)?;
                let rebuilt = self.pool.interior(node.tag.clone(), folded);
                self.stack.push(rebuilt);
            }

            NodeTag::Of => {
                // Patterns are matched literally downstream; only the arm
                // value folds.
                let pattern = children.first().copied().unwrap_or(NodeId::NONE);
                let value = children.get(1).copied().unwrap_or(NodeId::NONE);
                let value = self.fold_single(value)?;
                let rebuilt = self.pool.interior(NodeTag::Of, vec![pattern, value]);
                self.stack.push(rebuilt);
            }

            NodeTag::Apply => {
                let folded = self.fold_children(&children)?;
                let mut folded = folded.into_iter();
                let callee = folded.next().unwrap_or(NodeId::NONE);
                let rebuilt = self.pool.apply_late(callee, folded.collect());
                self.stack.push(rebuilt);
            }

            NodeTag::Neg => {
                let value = self.fold_single(children[0])?;
                let folded = self.pool.fold_neg(value);
                self.stack.push(folded);
            }

            NodeTag::Add
            | NodeTag::Sub
            | NodeTag::Mul
            | NodeTag::Div
            | NodeTag::Mod
            | NodeTag::Pow
            | NodeTag::Concat
            | NodeTag::Eq
            | NodeTag::Ne
            | NodeTag::Lt
            | NodeTag::Gt
            | NodeTag::Le
            | NodeTag::Ge
            | NodeTag::And
            | NodeTag::Or => {
                let op = BinOp::from_tag(&node.tag).expect("operator tag");
                let lhs = self.fold_single(children[0])?;
                let rhs = self.fold_single(children[1])?;
                let folded = self.pool.fold_binary(op, lhs, rhs);
                self.stack.push(folded);
            }

            // Dialect-specific operators: rebuild the call from folded
            // children and leave resolution to a downstream stage.
            NodeTag::Dialect(_) => {
                let folded = self.fold_children(&children)?;
                let rebuilt = self.pool.interior(node.tag.clone(), folded);
                self.stack.push(rebuilt);
            }
        }
        Ok(())
    }

    fn fold_children(&mut self, children: &[NodeId]) -> Result<Vec<NodeId>, Diagnostic> {
        children.iter().map(|&c| self.fold_single(c)).collect()
    }

    fn resolve_ident(&mut self, id: NodeId, node: &crate::pool::Node) -> Result<(), Diagnostic> {
        let name = node
            .elements
            .first()
            .and_then(|e| e.as_text())
            .cloned()
            .unwrap_or_default();
        let span = self.pool.coord(id);

        match self.env.find(&name).cloned() {
            None => match self.mode {
                ResolutionMode::Strict => Err(Diagnostic::new(
                    format!("unresolved identifier `{name}`"),
                    DiagnosticCode::UNRESOLVED,
                )
                .with_span(span)),
                ResolutionMode::Permissive => {
                    self.stack.push(id);
                    Ok(())
                }
            },

            Some(Word::Val { nid, .. }) => {
                if nid.is_none() {
                    // An unbound parameter stays symbolic; partial
                    // application relies on this in both modes.
                    self.stack.push(id);
                } else if self.pool.lambda_parts(nid).is_some() {
                    return self.apply(nid, span);
                } else {
                    self.stack.push(nid);
                }
                Ok(())
            }

            Some(Word::Function { arity, nid, params }) => {
                self.apply_function(&name, arity, nid, &params, span)
            }
        }
    }

    /// A named function: pop exactly `arity` folded operands, then either
    /// fold the stored body under a bound frame, or construct a generic
    /// tagged node for a builtin/lexicon primitive without a body.
    fn apply_function(
        &mut self,
        name: &str,
        arity: usize,
        nid: NodeId,
        params: &[(String, NodeId)],
        span: Option<Span>,
    ) -> Result<(), Diagnostic> {
        let available = self.stack.top_len();
        if available < arity {
            return Err(Diagnostic::new(
                format!("`{name}` expects {arity} arguments, found {available}"),
                DiagnosticCode::ARITY,
            )
            .with_span(span));
        }

        // First pop is the leftmost operand.
        let mut args = Vec::with_capacity(arity);
        for _ in 0..arity {
            args.push(self.stack.pop().expect("operand count checked"));
        }

        if !nid.is_none() {
            self.env.enter(name, span)?;
            for (offset, (param, _)) in params.iter().enumerate() {
                let bound = args.get(offset).copied().unwrap_or(NodeId::NONE);
                self.env.add(param, Word::Val { offset, nid: bound });
            }
            let result = self.fold_single(nid);
            self.env.exit();
            self.stack.push(result?);
            return Ok(());
        }

        let Some((tag, _)) = self.lexicon.word(name) else {
            return Err(Diagnostic::new_assert(format!(
                "function word `{name}` has neither body nor tag"
            )));
        };
        self.fold_primitive(tag, args)
    }

    fn fold_primitive(&mut self, tag: NodeTag, args: Vec<NodeId>) -> Result<(), Diagnostic> {
        if let Some(op) = BinOp::from_tag(&tag) {
            if let [lhs, rhs] = args[..] {
                let folded = self.pool.fold_binary(op, lhs, rhs);
                self.stack.push(folded);
                return Ok(());
            }
        }
        if tag == NodeTag::Neg {
            if let [value] = args[..] {
                let folded = self.pool.fold_neg(value);
                self.stack.push(folded);
                return Ok(());
            }
        }
        if tag == NodeTag::Apply {
            let mut args = args.into_iter();
            let callee = args.next().unwrap_or(NodeId::NONE);
            let applied = self.pool.apply_late(callee, args.collect());
            self.stack.push(applied);
            return Ok(());
        }

        let node = self.pool.interior(tag, args);
        self.stack.push(node);
        Ok(())
    }

    /// Fold a lambda literal: its body is partially folded under a frame
    /// where the parameters are bound only by the initializer slots, so
    /// enclosing bindings are captured now while the parameters stay
    /// symbolic. A changed body means a new node, re-interned; the pooled
    /// original is never mutated.
    fn fold_lambda(&mut self, id: NodeId) -> Result<NodeId, Diagnostic> {
        let Some(parts) = self.pool.lambda_parts(id) else {
            return Ok(id);
        };

        self.env.enter("<lambda>", None)?;
        for (offset, &param) in parts.pattern.iter().enumerate() {
            let name = self.pool.ident_name(param).unwrap_or_default().to_string();
            let nid = parts.inits.get(offset).copied().unwrap_or(NodeId::NONE);
            self.env.add(&name, Word::Val { offset, nid });
        }
        let body = self.fold_single(parts.body);
        self.env.exit();
        let body = body?;

        if body == parts.body {
            return Ok(id);
        }
        let names = self.pool.interior(NodeTag::List, parts.names);
        let pattern = self.pool.interior(NodeTag::List, parts.pattern);
        let inits = self.pool.interior(NodeTag::List, parts.inits);
        Ok(self
            .pool
            .interior(NodeTag::Lambda, vec![names, body, pattern, inits]))
    }

    /// Immediate lambda application with the lambda's full declared
    /// parameter count. Binds available operands to parameters in source
    /// order; a full binding folds the body, a partial binding curries by
    /// producing a residual lambda over the still-unbound parameters.
    fn apply(&mut self, lam_id: NodeId, span: Option<Span>) -> Result<(), Diagnostic> {
        let parts = self
            .pool
            .lambda_parts(lam_id)
            .ok_or_else(|| Diagnostic::new_assert("apply target is not a lambda"))?;

        let declared = parts.names.len();
        let bound_now = declared.min(self.stack.top_len());
        let mut args = Vec::with_capacity(bound_now);
        for _ in 0..bound_now {
            args.push(self.stack.pop().expect("operand count checked"));
        }

        // Fill the position-aligned initializer slots: previously closed
        // values stay, freshly bound arguments take the next free slots.
        let mut inits = parts.inits.clone();
        inits.resize(parts.pattern.len(), NodeId::NONE);
        let mut next_arg = 0;
        for slot in inits.iter_mut() {
            if slot.is_none() {
                if next_arg < args.len() {
                    *slot = args[next_arg];
                }
                next_arg += 1;
            }
        }

        if bound_now == declared {
            // Full application: inline the body under a bound frame.
            self.env.enter("<lambda>", span)?;
            for (offset, &param) in parts.pattern.iter().enumerate() {
                let param_name = self.pool.ident_name(param).unwrap_or_default().to_string();
                self.env.add(
                    &param_name,
                    Word::Val {
                        offset,
                        nid: inits[offset],
                    },
                );
            }
            let result = self.fold_single(parts.body);
            self.env.exit();
            self.stack.push(result?);
            return Ok(());
        }

        // Partial application: a smaller lambda closing over the bound
        // values as initializers. Patched slots mean a new node, never a
        // mutation of the interned one.
        let residual_names: Vec<NodeId> = parts
            .pattern
            .iter()
            .zip(inits.iter())
            .filter(|(_, init)| init.is_none())
            .map(|(&param, _)| param)
            .collect();
        let names_list = self.pool.interior(NodeTag::List, residual_names);
        let pattern_list = self.pool.interior(NodeTag::List, parts.pattern.clone());
        let inits_list = self.pool.interior(NodeTag::List, inits);
        let residual = self.pool.interior(
            NodeTag::Lambda,
            vec![names_list, parts.body, pattern_list, inits_list],
        );
        self.stack.push(residual);
        Ok(())
    }
}
