// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Language semantics: laziness, scoping, dispatch and special variables

use approx::assert_relative_eq;
use polyscad::geometry::CsgOp;
use polyscad::{
    render, CsgTree, EvalConfig, EvalError, Evaluator, Interpreter, Program, Registry, Resolver, Value,
    WarningKind,
};
use std::sync::Arc;

fn echoes(source: &str) -> Vec<String> {
    render(source).unwrap().1.echoes
}

fn eval_error(source: &str) -> EvalError {
    eval_error_with(source, EvalConfig::default())
}

fn eval_error_with(source: &str, config: EvalConfig) -> EvalError {
    let program = Program::from_source(source, None, &Resolver::default()).unwrap();
    let mut tree = CsgTree::new();
    Interpreter::new(config)
        .evaluate(&program, &mut tree)
        .unwrap_err()
}

fn global(source: &str, name: &str) -> Option<Value> {
    let program = Program::from_source(source, None, &Resolver::default()).unwrap();
    let mut tree = CsgTree::new();
    let config = EvalConfig::default();
    let mut evaluator = Evaluator::new(Arc::new(Registry::new()), &config, &program, &mut tree);
    evaluator.run().unwrap();
    evaluator.lookup_global(name).unwrap()
}

#[test]
fn test_variable_is_evaluated_once() {
    let source = r#"
        function noisy() = echo("computing") 1;
        x = noisy();
        a = x;
        b = x;
        echo(a + b);
    "#;
    assert_eq!(echoes(source), vec![r#"ECHO: "computing""#, "ECHO: 2"]);
}

#[test]
fn test_unused_variable_is_never_evaluated() {
    let source = r#"
        function noisy() = echo("computing") 1;
        unused = noisy();
        echo("done");
    "#;
    assert_eq!(echoes(source), vec![r#"ECHO: "done""#]);
}

#[test]
fn test_forward_reference() {
    assert_eq!(echoes("echo(b); b = a * 2; a = 5;"), vec!["ECHO: 10"]);
}

#[test]
fn test_forward_reference_through_function() {
    assert_eq!(
        global("b = foo(2); function foo(x) = x * a; a = 5;", "b"),
        Some(Value::Number(10.0))
    );
}

#[test]
fn test_first_assignment_wins() {
    let (_, evaluation) = render("a = 1; a = 2; echo(a);").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 1"]);
    assert_eq!(evaluation.warnings.len(), 1);
    assert_eq!(evaluation.warnings[0].kind, WarningKind::Redefinition);
}

#[test]
fn test_missing_parameter_is_undef() {
    assert_eq!(echoes("module m(a) { echo(a); } m();"), vec!["ECHO: undef"]);
}

#[test]
fn test_missing_function_argument_is_undef() {
    assert_eq!(echoes("function xx(a, b) = b; echo(xx(1));"), vec!["ECHO: undef"]);
}

#[test]
fn test_default_sees_earlier_parameters() {
    assert_eq!(
        echoes("function f(a, b = a + 1) = [a, b]; echo(f(3));"),
        vec!["ECHO: [3, 4]"]
    );
}

#[test]
fn test_self_reference_is_circular() {
    match eval_error("a = a + 1; echo(a);") {
        EvalError::CircularDefinition { name, chain } => {
            assert_eq!(name, "a");
            assert_eq!(chain, vec!["a".to_string(), "a".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_mutual_reference_is_circular() {
    assert!(matches!(
        eval_error("a = b; b = a; echo(a);"),
        EvalError::CircularDefinition { .. }
    ));
}

#[test]
fn test_unknown_names() {
    assert!(matches!(eval_error("echo(nope);"), EvalError::UnknownVariable { .. }));
    assert!(matches!(eval_error("echo(nope(1));"), EvalError::UnknownFunction { .. }));
    assert!(matches!(eval_error("nope();"), EvalError::UnknownModule { .. }));
}

#[test]
fn test_undef_is_a_value() {
    assert_eq!(echoes("a = undef; echo(is_undef(a));"), vec!["ECHO: true"]);
}

#[test]
fn test_special_variable_reaches_primitive() {
    let (tree, evaluation) = render("circle(r = 2, $fn = 6);").unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    match &root.op {
        CsgOp::Circle { fragments, r, .. } => {
            assert_eq!(*fragments, 6);
            assert_eq!(*r, 2.0);
        }
        other => panic!("unexpected op: {:?}", other),
    }
}

#[test]
fn test_special_variable_propagates_through_callers() {
    let source = r#"
        module inner() { echo($fn); }
        module outer() { inner(); }
        outer($fn = 12);
        inner();
    "#;
    assert_eq!(echoes(source), vec!["ECHO: 12", "ECHO: 0"]);
}

#[test]
fn test_special_variable_is_dynamic_not_lexical() {
    let source = r#"
        $fa = 1;
        function get() = $fa;
        module m() { echo(get()); }
        m($fa = 7);
    "#;
    assert_eq!(echoes(source), vec!["ECHO: 7"]);
}

#[test]
fn test_for_iterates_every_combination() {
    let (tree, evaluation) = render("for (x = [0:2], y = [1, 2]) translate([x, y, 0]) cube(1);").unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert_eq!(root.op, CsgOp::Union);
    assert_eq!(root.children.len(), 6);
}

#[test]
fn test_range_cardinality_and_reiteration() {
    assert_eq!(echoes("for (i = [0:4]) echo(i);").len(), 5);
    assert_eq!(echoes("for (i = [0:2:9]) echo(i);").len(), 5);

    let source = "r = [0:2]; for (i = r) echo(i); for (i = r) echo(i);";
    assert_eq!(
        echoes(source),
        vec!["ECHO: 0", "ECHO: 1", "ECHO: 2", "ECHO: 0", "ECHO: 1", "ECHO: 2"]
    );
}

#[test]
fn test_loop_over_undef_runs_zero_times() {
    assert_eq!(
        echoes("for (i = undef) echo(i); echo([for (i = undef) i]);"),
        vec!["ECHO: []"]
    );
    assert_eq!(echoes("for (i = 4) echo(i);"), vec!["ECHO: 4"]);
}

#[test]
fn test_trigonometry_in_degrees() {
    let Some(Value::Number(x)) = global("x = sin(30) + cos(60) + tan(45);", "x") else {
        panic!("expected a number");
    };
    assert_relative_eq!(x, 2.0, epsilon = 1e-12);
}

#[test]
fn test_loop_body_sees_fresh_variable_each_iteration() {
    let source = "for (i = [1:3]) { j = i * 10; echo(j); }";
    assert_eq!(echoes(source), vec!["ECHO: 10", "ECHO: 20", "ECHO: 30"]);
}

#[test]
fn test_children_count_and_selection() {
    let source = r#"
        module pick(i) { echo($children); children(i); }
        pick(1) { cube(1); sphere(2); cylinder(h = 1, r = 1); }
    "#;
    let (tree, evaluation) = render(source).unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 3"]);
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Sphere { .. }));
}

#[test]
fn test_children_out_of_range_warns() {
    let (_, evaluation) = render("module m() { children(5); } m() cube(1);").unwrap();
    assert!(evaluation.geometry.is_none());
    assert_eq!(evaluation.warnings[0].kind, WarningKind::IndexOutOfRange);
}

#[test]
fn test_recursion_limit() {
    let config = EvalConfig {
        max_recursion_depth: 20,
        ..EvalConfig::default()
    };
    match eval_error_with("function f(n) = f(n + 1); echo(f(0));", config) {
        EvalError::RecursionLimit { name, limit } => {
            assert_eq!(name, "f");
            assert_eq!(limit, 20);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_bounded_recursion() {
    assert_eq!(
        echoes("function fact(n) = n <= 1 ? 1 : n * fact(n - 1); echo(fact(5));"),
        vec!["ECHO: 120"]
    );
}

#[test]
fn test_deep_function_recursion_below_limit() {
    let source = "function f(n) = n <= 0 ? 0 : 1 + f(n - 1); echo(f(900));";
    assert_eq!(echoes(source), vec!["ECHO: 900"]);
}

#[test]
fn test_deep_module_recursion_below_limit() {
    let source = "module m(n) { if (n > 0) m(n - 1); else cube(1); } m(400);";
    let (tree, evaluation) = render(source).unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Cube { .. }));
}

#[test]
fn test_deep_recursion_on_small_thread_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| echoes("function f(n) = n <= 0 ? 0 : 1 + f(n - 1); echo(f(950));"))
        .unwrap();
    assert_eq!(handle.join().unwrap(), vec!["ECHO: 950"]);
}

#[test]
fn test_scopes_grow_per_evaluation_only() {
    let program = Program::from_source("for (i = [1:50]) cube(i);", None, &Resolver::default()).unwrap();
    let config = EvalConfig::default();
    let mut counts = Vec::new();
    for _ in 0..2 {
        let mut tree = CsgTree::new();
        let mut evaluator = Evaluator::new(Arc::new(Registry::new()), &config, &program, &mut tree);
        evaluator.run().unwrap();
        counts.push(evaluator.scope_count());
    }
    // one scope per iteration stays alive until the evaluator is dropped
    assert!(counts[0] > 50);
    assert_eq!(counts[0], counts[1]);
}

#[test]
fn test_disable_modifier_drops_subtree() {
    let (tree, evaluation) = render("*cube(1); sphere(1);").unwrap();
    assert_eq!(tree.len(), 1);
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Sphere { .. }));
}

#[test]
fn test_other_modifiers_warn() {
    let (tree, evaluation) = render("#cube(1);").unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(evaluation.warnings[0].kind, WarningKind::Unsupported);
}

#[test]
fn test_assert() {
    assert!(render("assert(1 + 1 == 2); cube(1);").is_ok());
    match eval_error(r#"x = 3; assert(x > 5, "x too small");"#) {
        EvalError::AssertionFailed { message, .. } => assert_eq!(message, "x too small"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_user_module_shadows_builtin() {
    let source = "module cube(s) { sphere(s); } cube(3);";
    let (tree, evaluation) = render(source).unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Sphere { r, .. } if r == 3.0));
}

#[test]
fn test_user_function_shadows_builtin() {
    assert_eq!(echoes("function abs(x) = 42; echo(abs(-1));"), vec!["ECHO: 42"]);
}

#[test]
fn test_variables_and_functions_are_separate_namespaces() {
    let source = "f = 5; function f(x) = x * 2; echo(f, f(4));";
    assert_eq!(echoes(source), vec!["ECHO: 5, 8"]);
}

#[test]
fn test_function_value_in_variable_is_callable() {
    let source = "double = function(x) x * 2; echo(double(21));";
    assert_eq!(echoes(source), vec!["ECHO: 42"]);
}

#[test]
fn test_builtin_rejects_children() {
    assert!(matches!(
        eval_error("cube(1) sphere(1);"),
        EvalError::UnexpectedChildren { .. }
    ));
}

#[test]
fn test_unknown_parameter_warns() {
    let (_, evaluation) = render("module m(a) { echo(a); } m(b = 2);").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: undef"]);
    assert_eq!(evaluation.warnings[0].kind, WarningKind::UnknownParameter);
}

#[test]
fn test_let_statement_scopes_bindings() {
    assert_eq!(
        echoes("let (a = 2, b = a * 3) { echo(b); }"),
        vec!["ECHO: 6"]
    );
}

#[test]
fn test_difference_tree() {
    let source = "difference() { cube(10, center = true); sphere(6); }";
    let (tree, evaluation) = render(source).unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert_eq!(root.op, CsgOp::Difference);
    assert_eq!(root.children.len(), 2);
}

#[test]
fn test_top_level_value_lookup() {
    assert_eq!(
        global("size = [1, 2] * 3;", "size"),
        Some(Value::Vector(vec![Value::Number(3.0), Value::Number(6.0)]))
    );
    assert_eq!(global("x = 1;", "missing"), None);
}
