#![cfg(test)]

use super::*;

fn leaf_text(pool: &NodePool, id: NodeId) -> String {
    pool.node(id)
        .elements
        .first()
        .and_then(|e| e.as_text())
        .cloned()
        .unwrap_or_default()
}

#[test]
fn interning_is_idempotent() {
    let mut pool = NodePool::new();

    let a = pool.num("1");
    let b = pool.num("1");
    assert_eq!(a, b);

    let c = pool.num("2");
    assert_ne!(a, c);

    // interior nodes dedupe through their children
    let l1 = pool.interior(NodeTag::List, vec![a, c]);
    let l2 = pool.interior(NodeTag::List, vec![b, c]);
    assert_eq!(l1, l2);
}

#[test]
fn interning_distinguishes_tags_and_arity() {
    let mut pool = NodePool::new();
    let one = pool.num("1");

    let list = pool.interior(NodeTag::List, vec![one]);
    let paren = pool.interior(NodeTag::Paren, vec![one]);
    assert_ne!(list, paren);

    let pair = pool.interior(NodeTag::List, vec![one, one]);
    assert_ne!(list, pair);
}

#[test]
fn first_coord_wins() {
    let mut pool = NodePool::new();
    let span = crate::span::Span::new(3, 4);

    let a = pool.ident("x", Some(span));
    let b = pool.ident("x", Some(crate::span::Span::new(9, 1)));
    assert_eq!(a, b);
    assert_eq!(pool.coord(a), Some(span));
}

#[test]
fn fold_add() {
    let mut pool = NodePool::new();
    let lhs = pool.num("123");
    let rhs = pool.num("456");

    let folded = pool.fold_binary(BinOp::Add, lhs, rhs);
    let node = pool.node(folded);
    assert_eq!(node.tag, NodeTag::Num);
    assert_eq!(node.elements, vec![Element::Text("579".to_string())]);
}

#[test]
fn fold_numeric_semantics() {
    let mut pool = NodePool::new();

    let two = pool.num("2");
    let ten = pool.num("10");
    let pow = pool.fold_binary(BinOp::Pow, two, ten);
    assert_eq!(leaf_text(&pool, pow), "1024");

    // remainder keeps the sign of the dividend
    let neg_seven = pool.num("-7");
    let three = pool.num("3");
    let rem = pool.fold_binary(BinOp::Mod, neg_seven, three);
    assert_eq!(leaf_text(&pool, rem), "-1");

    // division by zero follows the doubles
    let one = pool.num("1");
    let zero = pool.num("0");
    let div = pool.fold_binary(BinOp::Div, one, zero);
    assert_eq!(leaf_text(&pool, div), "inf");

    let half = pool.num(".5");
    let sum = pool.fold_binary(BinOp::Add, half, half);
    assert_eq!(leaf_text(&pool, sum), "1");
}

#[test]
fn fold_sub_is_add_of_negation() {
    let mut pool = NodePool::new();
    let two = pool.num("2");
    let five = pool.num("5");
    let folded = pool.fold_binary(BinOp::Sub, two, five);
    assert_eq!(leaf_text(&pool, folded), "-3");

    // with a non-constant operand the shape is ADD(lhs, NEG(rhs))
    let x = pool.ident("x", None);
    let sub = pool.fold_binary(BinOp::Sub, two, x);
    let node = pool.node(sub).clone();
    assert_eq!(node.tag, NodeTag::Add);
    let rhs = node.children().nth(1).unwrap();
    assert_eq!(pool.node(rhs).tag, NodeTag::Neg);
}

#[test]
fn fold_comparisons() {
    let mut pool = NodePool::new();
    let two = pool.num("2");
    let three = pool.num("3");

    let lt = pool.fold_binary(BinOp::Lt, two, three);
    assert_eq!(pool.node(lt).elements, vec![Element::Bool(true)]);

    let a = pool.string("a");
    let b = pool.string("b");
    let eq = pool.fold_binary(BinOp::Eq, a, b);
    assert_eq!(pool.node(eq).elements, vec![Element::Bool(false)]);
    let eq_same = pool.fold_binary(BinOp::Eq, a, a);
    assert_eq!(pool.node(eq_same).elements, vec![Element::Bool(true)]);

    // eq compares raw leaf values, so a number never equals its text
    let one = pool.num("1");
    let one_str = pool.string("1");
    let cross = pool.fold_binary(BinOp::Ne, one, one_str);
    assert_eq!(pool.node(cross).elements, vec![Element::Bool(true)]);
}

#[test]
fn fold_concat_joins_leaf_text() {
    let mut pool = NodePool::new();
    let a = pool.string("n: ");
    let b = pool.num("3");
    let folded = pool.fold_binary(BinOp::Concat, a, b);
    let node = pool.node(folded);
    assert_eq!(node.tag, NodeTag::Str);
    assert_eq!(node.elements, vec![Element::Text("n: 3".to_string())]);
}

#[test]
fn fold_through_parentheses() {
    let mut pool = NodePool::new();
    let five = pool.num("5");
    let paren = pool.interior(NodeTag::Paren, vec![five]);
    let two = pool.num("2");

    let folded = pool.fold_binary(BinOp::Mul, paren, two);
    assert_eq!(leaf_text(&pool, folded), "10");
}

#[test]
fn unfoldable_operands_stay_symbolic() {
    let mut pool = NodePool::new();
    let x = pool.ident("x", None);
    let two = pool.num("2");
    let node_id = pool.fold_binary(BinOp::Mul, x, two);
    let node = pool.node(node_id);
    assert_eq!(node.tag, NodeTag::Mul);
    assert_eq!(
        node.elements,
        vec![Element::Node(x), Element::Node(two)]
    );
}

#[test]
fn render_num_is_canonical_decimal() {
    assert_eq!(render_num(579.0), "579");
    assert_eq!(render_num(0.5), "0.5");
    assert_eq!(render_num(-3.0), "-3");
    assert_eq!(render_num(-0.0), "0");
    assert_eq!(render_num(f64::INFINITY), "inf");
    assert_eq!(render_num(1e16), "10000000000000000");
}

#[test]
fn serialization_keeps_only_reachable_nodes() {
    let mut pool = NodePool::new();
    let garbage = pool.num("123");
    let keep = pool.num("579");
    let exprs = pool.interior(NodeTag::Exprs, vec![keep]);
    let prog = pool.interior(NodeTag::Prog, vec![exprs]);

    let ast = pool.into_ast_pool(prog);
    assert_eq!(ast.len(), 3);
    assert!(ast.get(garbage).is_none());
    assert_eq!(ast.get(keep).unwrap().tag, NodeTag::Num);
    assert_eq!(ast.root(), prog);
}

#[test]
fn pool_wire_shape() {
    let mut pool = NodePool::new();
    let value = pool.boolean(true);
    let exprs = pool.interior(NodeTag::Exprs, vec![value]);
    let prog = pool.interior(NodeTag::Prog, vec![exprs]);
    let ast = pool.into_ast_pool(prog);

    let json = serde_json::to_value(&ast).unwrap();
    assert_eq!(json["root"], serde_json::json!(prog.get()));
    assert_eq!(json["1"]["tag"], serde_json::json!("BOOL"));
    assert_eq!(json["1"]["elts"], serde_json::json!([true]));
    assert_eq!(json["2"]["elts"], serde_json::json!([1]));

    let back: AstPool = serde_json::from_value(json).unwrap();
    assert_eq!(back.get(value).unwrap().elts, vec![Element::Bool(true)]);
    assert_eq!(
        back.get(exprs).unwrap().elts,
        vec![Element::Node(value)]
    );
}

#[test]
fn operand_stack_frames_are_isolated() {
    let mut stack = OperandStack::new();
    stack.push(NodeId(7));

    stack.enter();
    stack.push(NodeId(8));
    stack.push(NodeId(9));
    assert_eq!(stack.top_len(), 2);

    let inner = stack.exit();
    assert_eq!(inner, vec![NodeId(8), NodeId(9)]);
    assert_eq!(stack.top_len(), 1);
    assert_eq!(stack.pop(), Some(NodeId(7)));
    assert_eq!(stack.pop(), None);
}
