//! Printer that reconstructs Strand source text from a finished node pool.
//!
//! A pure function over the serialized pool plus a lexicon: literals render
//! directly, the structural forms each have a dedicated renderer, and any
//! other tag is reverse-mapped through the lexicon (then the builtin table)
//! to prefix-call syntax. A tag that matches nothing and has no children is
//! printed as a bare identifier; otherwise an explicit `/* TAG */`
//! placeholder marks the lossy spot.


use serde::{Deserialize, Serialize};

use crate::lexer::quote_text;
use crate::lexicon::{self, Lexicon, TokenClass};
use crate::pool::{AstPool, NodeId, NodeTag, PoolNode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnparseOptions {
    /// Render everything on a single line.
    #[serde(default)]
    pub compact: bool,

    #[serde(default = "default_indent")]
    pub indent_size: usize,
}

fn default_indent() -> usize {
    2
}

impl Default for UnparseOptions {
    fn default() -> Self {
        UnparseOptions {
            compact: false,
            indent_size: default_indent(),
        }
    }
}

/// Reconstruct source text from a pool and the lexicon of its dialect.
pub fn unparse(pool: &AstPool, lexicon: &Lexicon, options: &UnparseOptions) -> String {
    let mut printer = Printer {
        pool,
        lexicon,
        options,
        buffer: String::new(),
        indent: 0,
    };
    printer.render_program(pool.root());
    printer.buffer
}

struct Printer<'a> {
    pool: &'a AstPool,
    lexicon: &'a Lexicon,
    options: &'a UnparseOptions,

    /// Buffer for generated code.
    buffer: String,

    /// Number of indentation steps the next line is prefixed with.
    indent: usize,
}

impl Printer<'_> {
    fn push(&mut self, snippet: &str) {
        self.buffer.push_str(snippet);
    }

    /// A soft line break: a space in compact mode.
    fn new_line(&mut self) {
        if self.options.compact {
            self.buffer.push(' ');
        } else {
            self.buffer.push('\n');
            self.buffer
                .push_str(&" ".repeat(self.indent * self.options.indent_size));
        }
    }

    fn children(&self, node: &PoolNode) -> Vec<NodeId> {
        node.elts.iter().filter_map(|e| e.as_node().copied()).collect()
    }

    fn text_of(&self, id: NodeId) -> Option<&str> {
        let node = self.pool.get(id)?;
        node.elts.first()?.as_text().map(|s| s.as_str())
    }

    fn render_program(&mut self, root: NodeId) {
        let groups = match self.pool.get(root) {
            Some(prog) if prog.tag == NodeTag::Prog => {
                let exprs = self.children(prog);
                match exprs.first().and_then(|&e| self.pool.get(e)) {
                    Some(exprs) => self.children(exprs),
                    None => vec![],
                }
            }
            // Tolerate partial pools: render whatever the root is.
            Some(_) => {
                self.render(root);
                return;
            }
            None => vec![],
        };

        let count = groups.len();
        for (i, group) in groups.into_iter().enumerate() {
            self.render(group);
            if i + 1 < count {
                self.push(".");
                self.new_line();
            }
        }
        self.push("..");
    }

    fn render(&mut self, id: NodeId) {
        let Some(node) = self.pool.get(id) else {
            self.push("/* missing */");
            return;
        };
        let node = node.clone();
        let children = self.children(&node);

        match &node.tag {
            NodeTag::Num | NodeTag::Ident => {
                let text = self.text_of(id).unwrap_or_default().to_string();
                self.push(&text);
            }
            NodeTag::Str => {
                let text = self.text_of(id).unwrap_or_default();
                let quoted = quote_text(text);
                self.push(&quoted);
            }
            NodeTag::Bool => {
                let value = node.elts.first().and_then(|e| e.as_bool().copied());
                self.push(if value == Some(true) { "true" } else { "false" });
            }
            NodeTag::Null => self.push("null"),

            NodeTag::List => {
                self.push("[");
                self.render_spaced(&children);
                self.push("]");
            }

            NodeTag::Record => {
                self.push("{");
                for (i, &binding) in children.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.render(binding);
                }
                self.push("}");
            }

            NodeTag::Binding => {
                // String keys print unquoted.
                let key = children
                    .first()
                    .and_then(|&k| self.text_of(k))
                    .unwrap_or_default()
                    .to_string();
                self.push(&key);
                self.push(": ");
                if let Some(&value) = children.get(1) {
                    self.render(value);
                }
            }

            NodeTag::Paren => {
                self.push("(");
                self.render_spaced(&children);
                self.push(")");
            }

            NodeTag::Exprs | NodeTag::Prog => {
                self.render_spaced(&children);
            }

            NodeTag::Lambda => {
                self.push("<");
                let names = children
                    .first()
                    .and_then(|&n| self.pool.get(n))
                    .map(|n| self.children(n))
                    .unwrap_or_default();
                for (i, &name) in names.iter().enumerate() {
                    if i > 0 {
                        self.push(" ");
                    }
                    self.render(name);
                }
                self.push(": ");
                if let Some(&body) = children.get(1) {
                    self.render(body);
                }
                self.push(">");
            }

            NodeTag::Apply => {
                let lexeme = self
                    .lexeme_for(&NodeTag::Apply)
                    .unwrap_or("apply")
                    .to_string();
                self.push(&lexeme);
                for &child in &children {
                    self.push(" ");
                    self.render(child);
                }
            }

            NodeTag::Let => {
                self.push("let ");
                if let Some((&name, rest)) = children.split_first() {
                    self.render(name);
                    let (params, body) = rest.split_at(rest.len().saturating_sub(1));
                    for &param in params {
                        self.push(" ");
                        self.render(param);
                    }
                    self.push(" = ");
                    if let Some(&body) = body.first() {
                        self.render(body);
                    }
                }
            }

            NodeTag::If => {
                self.push("if ");
                if let Some(&cond) = children.first() {
                    self.render(cond);
                }
                self.push(" then ");
                if let Some(&then) = children.get(1) {
                    self.render(then);
                }
                self.push(" else ");
                if let Some(&els) = children.get(2) {
                    self.render(els);
                }
            }

            NodeTag::Case => {
                self.push("case ");
                if let Some((&subject, arms)) = children.split_first() {
                    self.render(subject);
                    self.push(" of");
                    self.indent += 1;
                    for &arm in arms {
                        self.new_line();
                        self.render(arm);
                        self.push(".");
                    }
                    self.indent -= 1;
                    self.new_line();
                    self.push("end");
                }
            }

            NodeTag::Of => {
                if let Some(&pattern) = children.first() {
                    self.render(pattern);
                }
                self.push(": ");
                if let Some(&value) = children.get(1) {
                    self.render(value);
                }
            }

            NodeTag::Neg => {
                self.push("-");
                if let Some(&value) = children.first() {
                    self.render(value);
                }
            }

            NodeTag::Error => {
                let message = self.text_of(id).unwrap_or_default().to_string();
                self.push("/* error: ");
                self.push(&message);
                self.push(" */");
            }

            tag @ (NodeTag::Add
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
            | NodeTag::Or) => {
                let tag = tag.clone();
                self.render_operator(&tag, &children);
            }

            NodeTag::Dialect(_) => {
                self.render_call(&node.tag, &children);
            }
        }
    }

    fn render_spaced(&mut self, children: &[NodeId]) {
        for (i, &child) in children.iter().enumerate() {
            if i > 0 {
                self.push(" ");
            }
            self.render(child);
        }
    }

    fn lexeme_for(&self, tag: &NodeTag) -> Option<&str> {
        self.lexicon
            .lexeme_for_tag(tag)
            .map(|(lexeme, _)| lexeme)
            .or_else(|| lexicon::builtin_lexeme(tag))
    }

    fn render_operator(&mut self, tag: &NodeTag, children: &[NodeId]) {
        if let Some((lexeme, token_class)) = self.lexicon.lexeme_for_tag(tag) {
            let lexeme = lexeme.to_string();
            if token_class == TokenClass::Operator && children.len() == 2 {
                self.render(children[0]);
                self.push(&format!(" {lexeme} "));
                self.render(children[1]);
            } else {
                self.push(&lexeme);
                for &child in children {
                    self.push(" ");
                    self.render(child);
                }
            }
            return;
        }

        // The punctuation operators have fixed spellings.
        let symbol = match tag {
            NodeTag::Mul => Some("*"),
            NodeTag::Pow => Some("^"),
            NodeTag::Sub => Some("-"),
            _ => None,
        };
        if let (Some(symbol), 2) = (symbol, children.len()) {
            self.render(children[0]);
            self.push(&format!(" {symbol} "));
            self.render(children[1]);
            return;
        }

        self.render_call(tag, children);
    }

    /// Prefix-call syntax for lexicon- and builtin-named tags; bare
    /// identifier for unknown zero-child tags; a placeholder otherwise.
    fn render_call(&mut self, tag: &NodeTag, children: &[NodeId]) {
        if let Some(lexeme) = self.lexeme_for(tag) {
            let lexeme = lexeme.to_string();
            self.push(&lexeme);
            for &child in children {
                self.push(" ");
                self.render(child);
            }
            return;
        }

        if children.is_empty() {
            let name = tag.name().to_string();
            self.push(&name);
            return;
        }

        let placeholder = format!("/* {} */", tag.name());
        self.push(&placeholder);
    }
}
