//! The node pool: a flat, append-only store of all AST nodes for one parse
//! session, addressed by integer id.
//!
//! Nodes are hash-consed: two structurally identical nodes (same tag, same
//! interned children) always resolve to the same [NodeId] within a session.
//! Node elements are indices, not pointers; no node is ever freed
//! individually.

mod build;
#[cfg(test)]
mod test;

pub(crate) use build::BinOp;
pub(crate) use build::render_num;

use std::collections::HashMap;
use std::str::FromStr;

use enum_as_inner::EnumAsInner;
use indexmap::IndexMap;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Index into the node pool. Id 0 is the reserved "absent" sentinel and
/// never indexes a real node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node kinds. The fixed vocabulary is a closed enum so that folder and
/// unparser dispatch is an exhaustive `match`; tags contributed by a caller
/// lexicon land in [NodeTag::Dialect].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Prog,
    Exprs,
    List,
    Record,
    Binding,
    Paren,
    Lambda,
    Apply,
    Let,
    If,
    Case,
    Of,

    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,

    Ident,
    Num,
    Str,
    Bool,
    Null,
    Error,

    Dialect(String),
}

impl NodeTag {
    pub fn name(&self) -> &str {
        match self {
            NodeTag::Prog => "PROG",
            NodeTag::Exprs => "EXPRS",
            NodeTag::List => "LIST",
            NodeTag::Record => "RECORD",
            NodeTag::Binding => "BINDING",
            NodeTag::Paren => "PAREN",
            NodeTag::Lambda => "LAMBDA",
            NodeTag::Apply => "APPLY",
            NodeTag::Let => "LET",
            NodeTag::If => "IF",
            NodeTag::Case => "CASE",
            NodeTag::Of => "OF",
            NodeTag::Neg => "NEG",
            NodeTag::Add => "ADD",
            NodeTag::Sub => "SUB",
            NodeTag::Mul => "MUL",
            NodeTag::Div => "DIV",
            NodeTag::Mod => "MOD",
            NodeTag::Pow => "POW",
            NodeTag::Concat => "CONCAT",
            NodeTag::Eq => "EQ",
            NodeTag::Ne => "NE",
            NodeTag::Lt => "LT",
            NodeTag::Gt => "GT",
            NodeTag::Le => "LE",
            NodeTag::Ge => "GE",
            NodeTag::And => "AND",
            NodeTag::Or => "OR",
            NodeTag::Ident => "IDENT",
            NodeTag::Num => "NUM",
            NodeTag::Str => "STR",
            NodeTag::Bool => "BOOL",
            NodeTag::Null => "NULL",
            NodeTag::Error => "ERROR",
            NodeTag::Dialect(name) => name,
        }
    }
}

impl std::fmt::Display for NodeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PROG" => NodeTag::Prog,
            "EXPRS" => NodeTag::Exprs,
            "LIST" => NodeTag::List,
            "RECORD" => NodeTag::Record,
            "BINDING" => NodeTag::Binding,
            "PAREN" => NodeTag::Paren,
            "LAMBDA" => NodeTag::Lambda,
            "APPLY" => NodeTag::Apply,
            "LET" => NodeTag::Let,
            "IF" => NodeTag::If,
            "CASE" => NodeTag::Case,
            "OF" => NodeTag::Of,
            "NEG" => NodeTag::Neg,
            "ADD" => NodeTag::Add,
            "SUB" => NodeTag::Sub,
            "MUL" => NodeTag::Mul,
            "DIV" => NodeTag::Div,
            "MOD" => NodeTag::Mod,
            "POW" => NodeTag::Pow,
            "CONCAT" => NodeTag::Concat,
            "EQ" => NodeTag::Eq,
            "NE" => NodeTag::Ne,
            "LT" => NodeTag::Lt,
            "GT" => NodeTag::Gt,
            "LE" => NodeTag::Le,
            "GE" => NodeTag::Ge,
            "AND" => NodeTag::And,
            "OR" => NodeTag::Or,
            "IDENT" => NodeTag::Ident,
            "NUM" => NodeTag::Num,
            "STR" => NodeTag::Str,
            "BOOL" => NodeTag::Bool,
            "NULL" => NodeTag::Null,
            "ERROR" => NodeTag::Error,
            other => NodeTag::Dialect(other.to_string()),
        })
    }
}

impl Serialize for NodeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for NodeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("tag parsing is infallible"))
    }
}

/// One slot of a node's ordered element sequence: either a child node id
/// (interior nodes) or a primitive (leaf nodes). Numbers are carried as
/// canonical decimal strings; `Int` holds only the `from`/`to` coordinates
/// of `ERROR` nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
pub enum Element {
    Node(NodeId),
    Text(String),
    Bool(bool),
    Int(u32),
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Element::Node(id) => serializer.serialize_u32(id.get()),
            Element::Text(s) => serializer.serialize_str(s),
            Element::Bool(b) => serializer.serialize_bool(*b),
            Element::Int(i) => serializer.serialize_u32(*i),
        }
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ElementVisitor;

        impl Visitor<'_> for ElementVisitor {
            type Value = Element;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a node id, string, or boolean")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Element, E> {
                Ok(Element::Node(NodeId(v as u32)))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Element, E> {
                Ok(Element::Node(NodeId(v as u32)))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Element, E> {
                Ok(Element::Text(v.to_string()))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Element, E> {
                Ok(Element::Bool(v))
            }
        }

        deserializer.deserialize_any(ElementVisitor)
    }
}

/// A tagged node. Equality and hashing are structural; the pool uses the
/// node value itself as the interning key, so there is no stringly key to
/// collide across element boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub tag: NodeTag,
    pub elements: Vec<Element>,
}

impl Node {
    pub fn new(tag: NodeTag, elements: Vec<Element>) -> Self {
        Node { tag, elements }
    }

    pub fn interior(tag: NodeTag, children: Vec<NodeId>) -> Self {
        Node {
            tag,
            elements: children.into_iter().map(Element::Node).collect(),
        }
    }

    /// Child node ids, skipping primitive elements.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.elements.iter().filter_map(|e| e.as_node().copied())
    }
}

/// Decomposed view of a `LAMBDA` node: unbound parameter names, body,
/// full formal pattern, and position-aligned initializers (0 = unbound).
pub(crate) struct LambdaParts {
    pub names: Vec<NodeId>,
    pub body: NodeId,
    pub pattern: Vec<NodeId>,
    pub inits: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct NodePool {
    /// Slot 0 is a placeholder for the `NONE` sentinel.
    nodes: Vec<Node>,
    index: HashMap<Node, NodeId>,
    coords: HashMap<NodeId, Span>,
}

impl NodePool {
    pub fn new() -> Self {
        NodePool {
            nodes: vec![Node::new(NodeTag::Null, vec![])],
            index: HashMap::new(),
            coords: HashMap::new(),
        }
    }

    /// Intern a node, returning the id of the existing entry when an equal
    /// structure was seen before.
    pub fn intern(&mut self, node: Node) -> NodeId {
        self.intern_spanned(node, None)
    }

    pub fn intern_spanned(&mut self, node: Node, span: Option<Span>) -> NodeId {
        if let Some(id) = self.index.get(&node) {
            return *id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.index.insert(node.clone(), id);
        self.nodes.push(node);
        if let Some(span) = span {
            self.coords.insert(id, span);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn coord(&self, id: NodeId) -> Option<Span> {
        self.coords.get(&id).copied()
    }

    pub fn num(&mut self, text: &str) -> NodeId {
        self.intern(Node::new(NodeTag::Num, vec![Element::Text(text.to_string())]))
    }

    pub fn string(&mut self, text: &str) -> NodeId {
        self.intern(Node::new(NodeTag::Str, vec![Element::Text(text.to_string())]))
    }

    pub fn ident(&mut self, name: &str, span: Option<Span>) -> NodeId {
        self.intern_spanned(
            Node::new(NodeTag::Ident, vec![Element::Text(name.to_string())]),
            span,
        )
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.intern(Node::new(NodeTag::Bool, vec![Element::Bool(value)]))
    }

    pub fn null(&mut self) -> NodeId {
        self.intern(Node::new(NodeTag::Null, vec![]))
    }

    pub fn interior(&mut self, tag: NodeTag, children: Vec<NodeId>) -> NodeId {
        self.intern(Node::interior(tag, children))
    }

    /// Build an `ERROR` node carrying the message and source coordinates.
    pub fn error(&mut self, diagnostic: &Diagnostic) -> NodeId {
        let span = diagnostic.span.unwrap_or_default();
        self.intern(Node::new(
            NodeTag::Error,
            vec![
                Element::Text(diagnostic.message.clone()),
                Element::Int(span.start),
                Element::Int(span.end()),
            ],
        ))
    }

    pub fn ident_name(&self, id: NodeId) -> Option<&str> {
        let node = self.node(id);
        if node.tag != NodeTag::Ident {
            return None;
        }
        node.elements.first()?.as_text().map(|s| s.as_str())
    }

    /// Resolve an id through `PAREN` wrappers to the wrapped node.
    pub fn deref_paren(&self, id: NodeId) -> NodeId {
        let mut id = id;
        loop {
            let node = self.node(id);
            if node.tag == NodeTag::Paren && node.elements.len() == 1 {
                if let Some(inner) = node.elements[0].as_node() {
                    id = *inner;
                    continue;
                }
            }
            return id;
        }
    }

    /// The numeric value of a `NUM` leaf, looking through parentheses.
    pub fn numeric_value(&self, id: NodeId) -> Option<f64> {
        let node = self.node(self.deref_paren(id));
        if node.tag != NodeTag::Num {
            return None;
        }
        node.elements.first()?.as_text()?.parse().ok()
    }

    /// A leaf literal's raw value, looking through parentheses. Used by
    /// `eq`/`ne` identity comparison and `concat` folding.
    pub fn leaf_value(&self, id: NodeId) -> Option<(&NodeTag, Option<&Element>)> {
        let node = self.node(self.deref_paren(id));
        match node.tag {
            NodeTag::Num | NodeTag::Str | NodeTag::Bool | NodeTag::Null => {
                Some((&node.tag, node.elements.first()))
            }
            _ => None,
        }
    }

    pub fn lambda_parts(&self, id: NodeId) -> Option<LambdaParts> {
        let node = self.node(self.deref_paren(id));
        if node.tag != NodeTag::Lambda || node.elements.len() != 4 {
            return None;
        }
        let list = |e: &Element| -> Option<Vec<NodeId>> {
            Some(self.node(*e.as_node()?).children().collect())
        };
        Some(LambdaParts {
            names: list(&node.elements[0])?,
            body: *node.elements[1].as_node()?,
            pattern: list(&node.elements[2])?,
            inits: self
                .node(*node.elements[3].as_node()?)
                .elements
                .iter()
                .map(|init| *init.as_node().unwrap_or(&NodeId::NONE))
                .collect(),
        })
    }

    /// Serialize the pool, keeping only nodes reachable from `root`. Ids
    /// are stable; unreachable parse debris (folded-away operands, error
    /// recovery leftovers) is dropped.
    pub fn into_ast_pool(self, root: NodeId) -> AstPool {
        let mut reachable = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            if id.is_none() || (id.0 as usize) >= self.nodes.len() || seen[id.0 as usize] {
                continue;
            }
            seen[id.0 as usize] = true;
            reachable.push(id);
            work.extend(self.node(id).children());
        }
        reachable.sort();

        let mut nodes = IndexMap::new();
        for id in reachable {
            let node = &self.nodes[id.0 as usize];
            nodes.insert(
                id.0.to_string(),
                PoolNode {
                    tag: node.tag.clone(),
                    elts: node.elements.clone(),
                },
            );
        }
        AstPool { nodes, root }
    }
}

/// The serializable wire shape of a finished parse:
/// `{ "<id>": { "tag": …, "elts": […] }, …, "root": <id> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstPool {
    #[serde(flatten)]
    nodes: IndexMap<String, PoolNode>,
    root: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolNode {
    pub tag: NodeTag,
    pub elts: Vec<Element>,
}

impl AstPool {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&PoolNode> {
        self.nodes.get(&id.get().to_string())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PoolNode)> {
        self.nodes
            .iter()
            .map(|(id, node)| (NodeId(id.parse().unwrap_or(0)), node))
    }
}

/// Working area for assembling composite nodes. A stack of stacks: entering
/// a bracketed construct opens a fresh frame so inner item counting cannot
/// be corrupted by outer in-flight operands.
#[derive(Debug)]
pub(crate) struct OperandStack {
    frames: Vec<Vec<NodeId>>,
}

impl OperandStack {
    pub fn new() -> Self {
        OperandStack {
            frames: vec![Vec::new()],
        }
    }

    pub fn enter(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn exit(&mut self) -> Vec<NodeId> {
        debug_assert!(self.frames.len() > 1, "exiting the base operand frame");
        self.frames.pop().unwrap_or_default()
    }

    pub fn push(&mut self, id: NodeId) {
        self.frames
            .last_mut()
            .expect("operand stack has a base frame")
            .push(id);
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.frames.last_mut()?.pop()
    }

    pub fn top_len(&self) -> usize {
        self.frames.last().map(Vec::len).unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.frames.push(Vec::new());
    }
}
