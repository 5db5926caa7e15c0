// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Caller-registered overrides and the native call environment

use polyscad::geometry::{BooleanOp, CsgOp};
use polyscad::{
    parse_expression, CsgTree, EvalConfig, EvalError, EvalResult, Evaluation, Interpreter, NativeCall,
    Override, Program, Registry, Resolver, Value,
};
use std::sync::Arc;

fn run(registry: Registry, source: &str) -> EvalResult<(CsgTree, Evaluation)> {
    let program = Program::from_source(source, None, &Resolver::default()).unwrap();
    let mut tree = CsgTree::new();
    let evaluation = Interpreter::with_registry(registry, EvalConfig::default()).evaluate(&program, &mut tree)?;
    Ok((tree, evaluation))
}

fn hull(call: &mut NativeCall<'_, '_>) -> EvalResult<Value> {
    let children = call.instantiate_children()?;
    if children.is_empty() {
        return Ok(Value::Undef);
    }
    Ok(Value::Geometry(call.backend().boolean(BooleanOp::Union, &children)?))
}

fn depth(call: &mut NativeCall<'_, '_>) -> EvalResult<Value> {
    Ok(Value::Number(call.ambient_depth() as f64))
}

#[test]
fn test_native_module_fills_missing_builtin() {
    let source = "hull() { cube(1); translate([5, 0, 0]) cube(1); }";
    assert!(matches!(
        run(Registry::new(), source),
        Err(EvalError::UnknownModule { .. })
    ));

    let mut registry = Registry::new();
    registry.register_native("hull", hull);
    let (tree, evaluation) = run(registry, source).unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert_eq!(root.op, CsgOp::Union);
    assert_eq!(root.children.len(), 2);
}

#[test]
fn test_value_override_replaces_file_variable() {
    let mut registry = Registry::new();
    registry.register_value("size", 10.0);
    let (tree, evaluation) = run(registry, "size = 1; cube(size);").unwrap();
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Cube { size, .. } if size == [10.0, 10.0, 10.0]));
}

#[test]
fn test_value_override_does_not_replace_parameters() {
    let mut registry = Registry::new();
    registry.register_value("a", 10.0);
    let (_, evaluation) = run(registry, "module m(a) { echo(a); } m(3); echo(a);").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 3", "ECHO: 10"]);
}

#[test]
fn test_expression_override_is_lazy() {
    let mut registry = Registry::new();
    let expr = parse_expression("[1, 2] * 2").unwrap();
    registry.register("v", Override::Expression(Arc::new(expr)));
    let (_, evaluation) = run(registry, "echo(v);").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: [2, 4]"]);
}

#[test]
fn test_native_override_beats_user_definition() {
    let mut registry = Registry::new();
    registry.register_native("twice", |call: &mut NativeCall<'_, '_>| {
        let n = call.args().get(0).and_then(Value::as_number).unwrap_or(0.0);
        Ok(Value::Number(n * 100.0))
    });
    let (_, evaluation) = run(registry, "function twice(x) = x * 2; echo(twice(3));").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 300"]);
}

#[test]
fn test_native_reads_call_site_environment() {
    let mut registry = Registry::new();
    registry.register_native("peek", |call: &mut NativeCall<'_, '_>| {
        Ok(call.var("a")?.unwrap_or_default())
    });
    registry.register_native("fn_seen", |call: &mut NativeCall<'_, '_>| {
        Ok(call.var("$fn")?.unwrap_or_default())
    });

    let source = r#"
        function f(a) = peek();
        module m() { echo(fn_seen()); }
        echo(f(4));
        m($fn = 9);
    "#;
    let (_, evaluation) = run(registry, source).unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 4", "ECHO: 9"]);
}

#[test]
fn test_ambient_environments_nest() {
    let mut registry = Registry::new();
    registry.register_native("depth", depth);
    registry.register_native("wrap", hull);

    let source = "echo(depth()); wrap() { echo(depth()); cube(1); }";
    let (_, evaluation) = run(registry, source).unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 1", "ECHO: 2"]);
}

#[test]
fn test_ambient_environment_restored_after_error() {
    let mut registry = Registry::new();
    registry.register_native("boom", |call: &mut NativeCall<'_, '_>| {
        Err(EvalError::Native {
            name: call.name().to_string(),
            message: "exploded".to_string(),
        })
    });
    registry.register_native("survive", |call: &mut NativeCall<'_, '_>| {
        let failed = call.call_function("boom", Vec::new()).is_err();
        Ok(Value::Vector(vec![
            Value::Bool(failed),
            Value::Number(call.ambient_depth() as f64),
        ]))
    });

    let (_, evaluation) = run(registry, "echo(survive());").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: [true, 1]"]);
}

#[test]
fn test_native_error_aborts_evaluation() {
    let mut registry = Registry::new();
    registry.register_native("boom", |_: &mut NativeCall<'_, '_>| {
        Err(EvalError::Native {
            name: "boom".to_string(),
            message: "exploded".to_string(),
        })
    });
    match run(registry, "x = boom(); cube(x);") {
        Err(EvalError::Native { message, .. }) => assert_eq!(message, "exploded"),
        other => panic!("unexpected result: {:?}", other.map(|(_, e)| e.echoes)),
    }
}

#[test]
fn test_native_calls_user_function() {
    let mut registry = Registry::new();
    registry.register_native("apply_sq", |call: &mut NativeCall<'_, '_>| {
        let n = call.args().get(0).cloned().unwrap_or_default();
        call.call_function("sq", vec![n])
    });
    let (_, evaluation) = run(registry, "function sq(x) = x * x; echo(apply_sq(7));").unwrap();
    assert_eq!(evaluation.echoes, vec!["ECHO: 49"]);
}
