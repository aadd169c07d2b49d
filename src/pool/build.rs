//! Constant-folding node builders.
//!
//! Every binary operator and `neg` goes through these: when the operands
//! are already literal, the result is computed eagerly and only the folded
//! leaf is interned; otherwise an operator node over the unevaluated
//! operands is produced for later resolution.
//!
//! Numeric semantics are IEEE-754 doubles: `pow` is `f64::powf`, `mod` is
//! the `%` remainder (sign of the dividend), `div` is `/` (division by
//! zero yields an infinity).

use super::{Element, Node, NodeId, NodePool, NodeTag};

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    /// Binding strength; ties bind left.
    pub fn precedence(self) -> u8 {
        use BinOp::*;
        match self {
            Or => 1,
            And => 2,
            Eq | Ne => 3,
            Lt | Gt | Le | Ge => 4,
            Concat | Add | Sub => 5,
            Mul | Div | Mod => 6,
            Pow => 7,
        }
    }

    pub fn tag(self) -> NodeTag {
        use BinOp::*;
        match self {
            Or => NodeTag::Or,
            And => NodeTag::And,
            Eq => NodeTag::Eq,
            Ne => NodeTag::Ne,
            Lt => NodeTag::Lt,
            Gt => NodeTag::Gt,
            Le => NodeTag::Le,
            Ge => NodeTag::Ge,
            Concat => NodeTag::Concat,
            Add => NodeTag::Add,
            Sub => NodeTag::Sub,
            Mul => NodeTag::Mul,
            Div => NodeTag::Div,
            Mod => NodeTag::Mod,
            Pow => NodeTag::Pow,
        }
    }

    pub fn from_tag(tag: &NodeTag) -> Option<BinOp> {
        use BinOp::*;
        Some(match tag {
            NodeTag::Or => Or,
            NodeTag::And => And,
            NodeTag::Eq => Eq,
            NodeTag::Ne => Ne,
            NodeTag::Lt => Lt,
            NodeTag::Gt => Gt,
            NodeTag::Le => Le,
            NodeTag::Ge => Ge,
            NodeTag::Concat => Concat,
            NodeTag::Add => Add,
            NodeTag::Sub => Sub,
            NodeTag::Mul => Mul,
            NodeTag::Div => Div,
            NodeTag::Mod => Mod,
            NodeTag::Pow => Pow,
            _ => return None,
        })
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use BinOp::*;
        f.write_str(match self {
            Sub => "-",
            Pow => "^",
            Mul => "*",
            Or => "or",
            And => "and",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Gt => "gt",
            Le => "le",
            Ge => "ge",
            Concat => "concat",
            Add => "add",
            Div => "div",
            Mod => "mod",
        })
    }
}

/// Canonical decimal rendering of a folded numeric result: integral values
/// drop the fraction, everything else uses the shortest round-trip form.
pub(crate) fn render_num(v: f64) -> String {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl NodePool {
    /// Build (or fold) a binary operator application.
    pub fn fold_binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        use BinOp::*;

        if let (Some(l), Some(r)) = (self.numeric_value(lhs), self.numeric_value(rhs)) {
            let text = match op {
                Add => Some(render_num(l + r)),
                Sub => Some(render_num(l - r)),
                Mul => Some(render_num(l * r)),
                Div => Some(render_num(l / r)),
                Mod => Some(render_num(l % r)),
                Pow => Some(render_num(l.powf(r))),
                _ => None,
            };
            if let Some(text) = text {
                return self.num(&text);
            }
            let truth = match op {
                Lt => Some(l < r),
                Gt => Some(l > r),
                Le => Some(l <= r),
                Ge => Some(l >= r),
                _ => None,
            };
            if let Some(truth) = truth {
                return self.boolean(truth);
            }
        }

        if matches!(op, Eq | Ne) {
            let l = self.leaf_value(lhs).map(|(t, e)| (t.clone(), e.cloned()));
            let r = self.leaf_value(rhs).map(|(t, e)| (t.clone(), e.cloned()));
            if let (Some(l), Some(r)) = (l, r) {
                let same = l == r;
                return self.boolean(if op == Eq { same } else { !same });
            }
        }

        if op == Concat {
            if let (Some(l), Some(r)) = (self.leaf_text(lhs), self.leaf_text(rhs)) {
                let joined = format!("{l}{r}");
                return self.string(&joined);
            }
        }

        // Subtraction has no node of its own: `a - b` is `ADD(a, NEG(b))`.
        if op == Sub {
            let neg = self.fold_neg(rhs);
            return self.interior(NodeTag::Add, vec![lhs, neg]);
        }

        self.interior(op.tag(), vec![lhs, rhs])
    }

    /// Build (or fold) a numeric negation.
    pub fn fold_neg(&mut self, value: NodeId) -> NodeId {
        if let Some(v) = self.numeric_value(value) {
            let text = render_num(-v);
            return self.num(&text);
        }
        self.interior(NodeTag::Neg, vec![value])
    }

    /// Construct an `APPLY` node without evaluating: used when the callee
    /// is not statically known to be a lambda at parse time.
    pub fn apply_late(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(callee);
        children.extend(args);
        self.interior(NodeTag::Apply, children)
    }

    fn leaf_text(&self, id: NodeId) -> Option<String> {
        let (tag, element) = self.leaf_value(id)?;
        Some(match (tag, element) {
            (_, Some(Element::Text(s))) => s.clone(),
            (_, Some(Element::Bool(b))) => b.to_string(),
            (NodeTag::Null, None) => "null".to_string(),
            _ => return None,
        })
    }
}
