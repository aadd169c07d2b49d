#![cfg(test)]

use insta::assert_snapshot;

use super::*;
use crate::lexicon::LexEntry;
use crate::pool::{AstPool, Element, NodeId, NodeTag, PoolNode};

fn test_lexicon() -> Lexicon {
    let mut lexicon = Lexicon::new();
    lexicon.insert("and", LexEntry::operator(NodeTag::And));
    lexicon.insert("or", LexEntry::operator(NodeTag::Or));
    lexicon.insert("eq", LexEntry::operator(NodeTag::Eq));
    lexicon.insert("lt", LexEntry::operator(NodeTag::Lt));
    lexicon.insert("div", LexEntry::operator(NodeTag::Div));
    lexicon.insert("fill", LexEntry::function(NodeTag::Dialect("FILL".into()), 1));
    lexicon
}

#[track_caller]
fn parse_pool(source: &str) -> AstPool {
    parse(source, &test_lexicon()).unwrap_or_else(|e| panic!("{e}"))
}

#[track_caller]
fn node(pool: &AstPool, id: NodeId) -> &PoolNode {
    pool.get(id).unwrap_or_else(|| panic!("missing node {id:?}"))
}

fn children(n: &PoolNode) -> Vec<NodeId> {
    n.elts.iter().filter_map(|e| e.as_node().copied()).collect()
}

/// The folded results of the program's top-level expression groups.
#[track_caller]
fn groups(pool: &AstPool) -> Vec<NodeId> {
    let prog = node(pool, pool.root());
    assert_eq!(prog.tag, NodeTag::Prog);
    let exprs = node(pool, children(prog)[0]);
    assert_eq!(exprs.tag, NodeTag::Exprs);
    children(exprs)
}

#[track_caller]
fn single_group(pool: &AstPool) -> NodeId {
    let groups = groups(pool);
    assert_eq!(groups.len(), 1, "expected one expression group");
    groups[0]
}

fn text_of(pool: &AstPool, id: NodeId) -> String {
    node(pool, id)
        .elts
        .first()
        .and_then(|e| e.as_text())
        .cloned()
        .unwrap_or_default()
}

fn all_tags(pool: &AstPool) -> Vec<String> {
    pool.iter().map(|(_, n)| n.tag.to_string()).collect()
}

#[test]
fn parse_number_program() {
    let pool = parse_pool("123..");
    let num = single_group(&pool);
    assert_eq!(node(&pool, num).tag, NodeTag::Num);
    assert_eq!(text_of(&pool, num), "123");
}

#[test]
fn parse_literal_programs() {
    for (source, tag) in [
        ("'abc'..", NodeTag::Str),
        ("true..", NodeTag::Bool),
        ("null..", NodeTag::Null),
        (".5..", NodeTag::Num),
    ] {
        let pool = parse_pool(source);
        assert_eq!(node(&pool, single_group(&pool)).tag, tag, "{source}");
    }
}

#[test]
fn empty_program() {
    let pool = parse_pool("..");
    assert_eq!(groups(&pool).len(), 0);
}

#[test]
fn function_word_folds_constants() {
    let pool = parse_pool("add 123 456..");
    let num = single_group(&pool);
    assert_eq!(node(&pool, num).tag, NodeTag::Num);
    assert_eq!(text_of(&pool, num), "579");

    // no residual ADD, 123 or 456 anywhere in the final pool
    assert!(!all_tags(&pool).contains(&"ADD".to_string()));
    for (_, n) in pool.iter() {
        assert_ne!(n.elts, vec![Element::Text("123".to_string())]);
        assert_ne!(n.elts, vec![Element::Text("456".to_string())]);
    }
}

#[test]
fn infix_operators_fold_with_precedence() {
    let pool = parse_pool("2 * 3 ^ 2..");
    assert_eq!(text_of(&pool, single_group(&pool)), "18");

    let pool = parse_pool("10 - 2 * 3..");
    assert_eq!(text_of(&pool, single_group(&pool)), "4");

    // ties bind left
    let pool = parse_pool("8 - 3 - 2..");
    assert_eq!(text_of(&pool, single_group(&pool)), "3");
}

#[test]
fn unary_minus() {
    let pool = parse_pool("-5..");
    assert_eq!(text_of(&pool, single_group(&pool)), "-5");

    // unary minus binds tighter than the power operator
    let pool = parse_pool("-2 ^ 2..");
    assert_eq!(text_of(&pool, single_group(&pool)), "4");
}

#[test]
fn lexicon_operator_words() {
    let pool = parse_pool("2 lt 3..");
    let result = node(&pool, single_group(&pool));
    assert_eq!(result.tag, NodeTag::Bool);
    assert_eq!(result.elts, vec![Element::Bool(true)]);

    let pool = parse_pool("1 div 0..");
    assert_eq!(text_of(&pool, single_group(&pool)), "inf");

    // `and` has no folding rule: the node stays symbolic
    let pool = parse_pool("true and false..");
    assert_eq!(node(&pool, single_group(&pool)).tag, NodeTag::And);
}

#[test]
fn builtin_primitives_fold() {
    let pool = parse_pool("pow 2 10..");
    assert_eq!(text_of(&pool, single_group(&pool)), "1024");

    let pool = parse_pool("mod (0 - 7) 3..");
    assert_eq!(text_of(&pool, single_group(&pool)), "-1");

    let pool = parse_pool("concat 'a' 'b'..");
    let result = node(&pool, single_group(&pool));
    assert_eq!(result.tag, NodeTag::Str);
    assert_eq!(result.elts, vec![Element::Text("ab".to_string())]);
}

#[test]
fn dialect_words_build_tagged_calls() {
    let pool = parse_pool("fill 10..");
    let call = node(&pool, single_group(&pool));
    assert_eq!(call.tag, NodeTag::Dialect("FILL".to_string()));
    let arg = children(call)[0];
    assert_eq!(text_of(&pool, arg), "10");
}

#[test]
fn hash_consing_shares_repeated_subtrees() {
    let pool = parse_pool("[1 1 1]..");
    let list = node(&pool, single_group(&pool));
    assert_eq!(list.tag, NodeTag::List);
    let items = children(list);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0], items[1]);
    assert_eq!(items[1], items[2]);

    let num_count = pool
        .iter()
        .filter(|(_, n)| n.tag == NodeTag::Num)
        .count();
    assert_eq!(num_count, 1);
}

#[test]
fn lists_records_and_parens() {
    let pool = parse_pool("{k: 1, j: [1 2]}..");
    let record = node(&pool, single_group(&pool));
    assert_eq!(record.tag, NodeTag::Record);
    let bindings = children(record);
    assert_eq!(bindings.len(), 2);

    let first = node(&pool, bindings[0]);
    assert_eq!(first.tag, NodeTag::Binding);
    assert_eq!(text_of(&pool, children(first)[0]), "k");

    let second = node(&pool, bindings[1]);
    let list = node(&pool, children(second)[1]);
    assert_eq!(list.tag, NodeTag::List);
    assert_eq!(children(list).len(), 2);

    let pool = parse_pool("(5)..");
    let paren = node(&pool, single_group(&pool));
    assert_eq!(paren.tag, NodeTag::Paren);
    assert_eq!(text_of(&pool, children(paren)[0]), "5");
}

#[test]
fn lambda_literal_shape() {
    let pool = parse_pool("<a b: add a b>..");
    let lambda = node(&pool, single_group(&pool));
    assert_eq!(lambda.tag, NodeTag::Lambda);
    assert_eq!(lambda.elts.len(), 4);

    let parts = children(lambda);
    let names = node(&pool, parts[0]);
    assert_eq!(names.tag, NodeTag::List);
    let name_ids = children(names);
    assert_eq!(name_ids.len(), 2);
    assert_eq!(text_of(&pool, name_ids[0]), "a");
    assert_eq!(text_of(&pool, name_ids[1]), "b");

    // the prefix body partially folds: `add a b` becomes one ADD node
    // over the still-symbolic parameters
    let body = node(&pool, parts[1]);
    assert_eq!(body.tag, NodeTag::Add);
    let operands = children(body);
    assert_eq!(text_of(&pool, operands[0]), "a");
    assert_eq!(text_of(&pool, operands[1]), "b");

    // fresh lambdas carry only empty initializer slots
    let inits = node(&pool, parts[3]);
    assert_eq!(
        inits.elts,
        vec![
            Element::Node(NodeId::NONE),
            Element::Node(NodeId::NONE)
        ]
    );
}

#[test]
fn nested_lambda_captures_enclosing_parameters() {
    // applying the outer lambda patches the captured `a` into the inner
    // body before the inner lambda escapes
    let pool = parse_pool("let g = <a: <b: add a b>> . g 7..");
    let groups = groups(&pool);

    let inner = node(&pool, groups[1]);
    assert_eq!(inner.tag, NodeTag::Lambda);

    let body = node(&pool, children(inner)[1]);
    assert_eq!(body.tag, NodeTag::Add);
    let operands = children(body);
    assert_eq!(text_of(&pool, operands[0]), "7");
    assert_eq!(text_of(&pool, operands[1]), "b");
}

#[test]
fn late_bound_apply_stays_symbolic() {
    let pool = parse_pool("apply (<a b: add a b>) [10 20]..");
    let apply = node(&pool, single_group(&pool));
    assert_eq!(apply.tag, NodeTag::Apply);

    let args = children(apply);
    assert_eq!(args.len(), 2);

    let callee = node(&pool, args[0]);
    assert_eq!(callee.tag, NodeTag::Paren);
    assert_eq!(node(&pool, children(callee)[0]).tag, NodeTag::Lambda);

    let list = node(&pool, args[1]);
    assert_eq!(list.tag, NodeTag::List);
    let items = children(list);
    assert_eq!(text_of(&pool, items[0]), "10");
    assert_eq!(text_of(&pool, items[1]), "20");
}

#[test]
fn let_value_binding_applies_lambda() {
    let pool = parse_pool("let g = <a b: add a b> . g 10 20..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 2);
    assert_eq!(node(&pool, groups[0]).tag, NodeTag::Let);
    assert_eq!(text_of(&pool, groups[1]), "30");
}

#[test]
fn partial_application_binds_leading_parameters() {
    let pool = parse_pool("let g = <a b: add a b> . g 10..");
    let groups = groups(&pool);
    let residual = node(&pool, groups[1]);
    assert_eq!(residual.tag, NodeTag::Lambda);

    let parts = children(residual);

    // only `b` is still unbound
    let names = children(node(&pool, parts[0]));
    assert_eq!(names.len(), 1);
    assert_eq!(text_of(&pool, names[0]), "b");

    // the full pattern is retained
    let pattern = children(node(&pool, parts[2]));
    assert_eq!(pattern.len(), 2);

    // initializers are position-aligned: `a` closed over 10, `b` empty
    let inits = node(&pool, parts[3]);
    assert_eq!(inits.elts.len(), 2);
    let bound = inits.elts[0].as_node().copied().unwrap();
    assert_eq!(text_of(&pool, bound), "10");
    assert_eq!(inits.elts[1], Element::Node(NodeId::NONE));
}

#[test]
fn residual_lambda_completes_later() {
    let pool = parse_pool("let g = <a b: add a b> . let h = g 10 . h 5..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 3);
    assert_eq!(text_of(&pool, groups[2]), "15");
}

#[test]
fn named_function_inlines_at_call_sites() {
    let pool = parse_pool("let f x = add x 1 . f 41..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 2);

    let def = node(&pool, groups[0]);
    assert_eq!(def.tag, NodeTag::Let);
    assert_eq!(text_of(&pool, children(def)[0]), "f");

    assert_eq!(text_of(&pool, groups[1]), "42");
}

#[test]
fn arity_error_names_the_function() {
    let pool = parse_pool("let f a b = add a b . f 1..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 2);

    let error = node(&pool, groups[1]);
    assert_eq!(error.tag, NodeTag::Error);
    let message = error.elts[0].as_text().unwrap();
    assert!(message.contains("`f`"), "message: {message}");
    assert!(message.contains('2'), "message: {message}");
}

#[test]
fn recursion_guard_is_fatal() {
    let err = parse("let f x = f x . f 1..", &test_lexicon()).unwrap_err();
    let Error::Compile { diagnostics } = err else {
        panic!("expected a compile error");
    };
    assert_eq!(diagnostics[0].code(), "E0006");
    assert!(diagnostics[0].message().contains("recursion"));
}

#[test]
fn missing_terminator_is_a_hard_error() {
    for source in ["add 1 2", "add 1 2.", "", "[1 2"] {
        let err = parse(source, &test_lexicon()).unwrap_err();
        let Error::Compile { diagnostics } = err else {
            panic!("expected a compile error for {source:?}");
        };
        assert!(
            diagnostics[0].message().contains("end of program"),
            "{source:?}: {}",
            diagnostics[0].message()
        );
    }
}

#[test]
fn strict_mode_rejects_unknown_identifiers() {
    let options = ParseOptions {
        resolution: ResolutionMode::Strict,
    };
    let pool = parse_with_options("mystery 1..", &test_lexicon(), &options).unwrap();
    let error = node(&pool, single_group(&pool));
    assert_eq!(error.tag, NodeTag::Error);
    assert!(error.elts[0].as_text().unwrap().contains("mystery"));
}

#[test]
fn permissive_mode_keeps_unknown_identifiers() {
    let pool = parse_pool("mystery 1..");
    let group = node(&pool, single_group(&pool));
    assert_eq!(group.tag, NodeTag::Exprs);
    let terms = children(group);
    assert_eq!(node(&pool, terms[0]).tag, NodeTag::Ident);
    assert_eq!(text_of(&pool, terms[0]), "mystery");
    assert_eq!(text_of(&pool, terms[1]), "1");
}

#[test]
fn syntax_errors_recover_at_the_next_dot() {
    let pool = parse_pool("] junk 1. add 2 3..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 2);

    let error = node(&pool, groups[0]);
    assert_eq!(error.tag, NodeTag::Error);
    // ERROR nodes carry their source coordinates inline
    assert!(matches!(error.elts[1], Element::Int(0)));
    assert!(matches!(error.elts[2], Element::Int(1)));

    assert_eq!(text_of(&pool, groups[1]), "5");
}

#[test]
fn if_expression_structure() {
    let pool = parse_pool("if true then 1 else 2..");
    let if_node = node(&pool, single_group(&pool));
    assert_eq!(if_node.tag, NodeTag::If);
    let parts = children(if_node);
    assert_eq!(node(&pool, parts[0]).tag, NodeTag::Bool);
    assert_eq!(text_of(&pool, parts[1]), "1");
    assert_eq!(text_of(&pool, parts[2]), "2");
}

#[test]
fn case_expression_structure() {
    let pool = parse_pool("case x of 1: 'one'. else: 'other'. end..");
    let case = node(&pool, single_group(&pool));
    assert_eq!(case.tag, NodeTag::Case);

    let parts = children(case);
    assert_eq!(parts.len(), 3);
    assert_eq!(text_of(&pool, parts[0]), "x");

    let arm = node(&pool, parts[1]);
    assert_eq!(arm.tag, NodeTag::Of);
    assert_eq!(text_of(&pool, children(arm)[0]), "1");

    let catch_all = node(&pool, parts[2]);
    assert_eq!(text_of(&pool, children(catch_all)[0]), "else");
}

#[test]
fn interpolation_folds_to_a_string() {
    let pool = parse_pool("`n: ${add 1 2}!`..");
    let result = node(&pool, single_group(&pool));
    assert_eq!(result.tag, NodeTag::Str);
    assert_eq!(result.elts, vec![Element::Text("n: 3!".to_string())]);
}

#[test]
fn interpolation_with_free_variables_stays_symbolic() {
    let pool = parse_pool("`v = ${x}`..");
    let result = node(&pool, single_group(&pool));
    assert_eq!(result.tag, NodeTag::Concat);
}

#[test]
fn multiple_groups_in_one_program() {
    let pool = parse_pool("1. 2. add 1 2..");
    let groups = groups(&pool);
    assert_eq!(groups.len(), 3);
    assert_eq!(text_of(&pool, groups[2]), "3");
}

#[test]
fn pool_json_shape() {
    let pool = parse_pool("add 123 456..");
    // ids 1..3 were the source operands, folded away before serialization
    let json = serde_json::to_string(&pool).unwrap();
    assert_snapshot!(
        json,
        @r#"{"4":{"tag":"NUM","elts":["579"]},"5":{"tag":"EXPRS","elts":[4]},"6":{"tag":"PROG","elts":[5]},"root":6}"#
    );
}
