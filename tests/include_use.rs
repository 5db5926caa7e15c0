// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! `include` and `use` against real files

use anyhow::Result;
use polyscad::geometry::CsgOp;
use polyscad::{render_file, CsgTree, EvalConfig, EvalError, Interpreter, Program, ResolveError, Resolver};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, source: &str) -> Result<()> {
    fs::write(dir.join(name), source)?;
    Ok(())
}

#[test]
fn test_include_instantiates_in_place() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "module peg() { cylinder(h = 2, r = 1); }\ncube(1);\n")?;
    write(dir.path(), "main.scad", "include <lib.scad>\npeg();\n")?;

    let (tree, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert_eq!(root.op, CsgOp::Union);
    assert_eq!(root.children.len(), 2);

    let nodes = tree.nodes();
    assert!(matches!(nodes[root.children[0] as usize].op, CsgOp::Cube { .. }));
    assert!(matches!(nodes[root.children[1] as usize].op, CsgOp::Cylinder { .. }));
    Ok(())
}

#[test]
fn test_use_imports_definitions_only() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "module peg() { cylinder(h = 2, r = 1); }\ncube(1);\necho(\"lib\");\n")?;
    write(dir.path(), "main.scad", "use <lib.scad>\npeg();\n")?;

    let (tree, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Cylinder { .. }));
    assert!(evaluation.echoes.is_empty());
    Ok(())
}

#[test]
fn test_used_function_sees_its_own_file_variables() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "x = 3;\nfunction getx() = x;\n")?;
    write(dir.path(), "main.scad", "use <lib.scad>\necho(getx());\n")?;

    let (_, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    assert_eq!(evaluation.echoes, vec!["ECHO: 3"]);
    Ok(())
}

#[test]
fn test_used_variables_are_not_visible() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "x = 3;\n")?;
    write(dir.path(), "main.scad", "use <lib.scad>\necho(x);\n")?;

    let program = Program::load(dir.path().join("main.scad"), &Resolver::default())?;
    let mut tree = CsgTree::new();
    let err = Interpreter::default().evaluate(&program, &mut tree).unwrap_err();
    assert!(matches!(err, EvalError::UnknownVariable { .. }));
    Ok(())
}

#[test]
fn test_includer_value_wins() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "size = 2;\ncube(size);\n")?;
    write(dir.path(), "main.scad", "size = 5;\ninclude <lib.scad>\n")?;

    let (tree, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Cube { size, .. } if size == [5.0, 5.0, 5.0]));
    Ok(())
}

#[test]
fn test_included_variables_stay_in_the_include() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "inc.scad", "x = 1;\ny = 3;\necho(x);\n")?;
    write(dir.path(), "main.scad", "x = 2;\ninclude <inc.scad>\necho(x);\n")?;

    let (_, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    assert_eq!(evaluation.echoes, vec!["ECHO: 2", "ECHO: 2"]);

    write(dir.path(), "leak.scad", "echo(y);\ninclude <inc.scad>\n")?;
    let program = Program::load(dir.path().join("leak.scad"), &Resolver::default())?;
    let mut tree = CsgTree::new();
    let err = Interpreter::default().evaluate(&program, &mut tree).unwrap_err();
    assert!(matches!(err, EvalError::UnknownVariable { ref name, .. } if name == "y"));
    Ok(())
}

#[test]
fn test_library_found_on_search_path() -> Result<()> {
    let project = TempDir::new()?;
    let library = TempDir::new()?;
    write(library.path(), "shapes.scad", "module ball() { sphere(1); }\n")?;
    write(project.path(), "main.scad", "use <shapes.scad>\nball();\n")?;

    let config = EvalConfig::default().with_include_path(library.path());
    let (tree, evaluation) = render_file(project.path().join("main.scad"), config)?;
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Sphere { .. }));
    Ok(())
}

#[test]
fn test_missing_file_fails_before_evaluation() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "main.scad", "echo(\"start\");\ninclude <missing.scad>\n")?;

    let err = Program::load(dir.path().join("main.scad"), &Resolver::default()).unwrap_err();
    match err {
        ResolveError::FileNotFound { path, searched } => {
            assert_eq!(path, "missing.scad");
            assert_eq!(searched.len(), 1);
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[test]
fn test_include_cycle_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "a.scad", "include <b.scad>\n")?;
    write(dir.path(), "b.scad", "include <a.scad>\n")?;

    let err = Program::load(dir.path().join("a.scad"), &Resolver::default()).unwrap_err();
    assert!(matches!(err, ResolveError::IncludeCycle { ref chain } if chain.len() == 3));
    Ok(())
}

#[test]
fn test_mutual_use_is_allowed() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "a.scad", "use <b.scad>\nfunction fa() = 1;\necho(fb());\n")?;
    write(dir.path(), "b.scad", "use <a.scad>\nfunction fb() = 2;\n")?;

    let (_, evaluation) = render_file(dir.path().join("a.scad"), EvalConfig::default())?;
    assert_eq!(evaluation.echoes, vec!["ECHO: 2"]);
    Ok(())
}

#[test]
fn test_same_file_used_twice_is_loaded_once() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "lib.scad", "function one() = 1;\n")?;
    write(dir.path(), "mid.scad", "use <lib.scad>\nfunction two() = one() + 1;\n")?;
    write(dir.path(), "main.scad", "use <lib.scad>\nuse <mid.scad>\necho(one() + two());\n")?;

    let program = Program::load(dir.path().join("main.scad"), &Resolver::default())?;
    assert_eq!(program.dependency_count(), 2);

    let mut tree = CsgTree::new();
    let evaluation = Interpreter::default().evaluate(&program, &mut tree)?;
    assert_eq!(evaluation.echoes, vec!["ECHO: 3"]);
    Ok(())
}

#[test]
fn test_use_does_not_reexport_imports() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "b.scad", "function fb() = 1;\n")?;
    write(dir.path(), "a.scad", "use <b.scad>\nfunction fa() = fb();\n")?;
    write(dir.path(), "main.scad", "use <a.scad>\necho(fa());\necho(fb());\n")?;

    let program = Program::load(dir.path().join("main.scad"), &Resolver::default())?;
    let mut tree = CsgTree::new();
    let failure = Interpreter::default()
        .evaluate_with_output(&program, &mut tree)
        .unwrap_err();
    assert_eq!(failure.echoes, vec!["ECHO: 1"]);
    assert!(matches!(failure.error, EvalError::UnknownFunction { ref name, .. } if name == "fb"));
    Ok(())
}

#[test]
fn test_use_exports_definitions_of_included_files() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "parts.scad", "module peg() { cylinder(h = 2, r = 1); }\n")?;
    write(dir.path(), "lib.scad", "include <parts.scad>\nmodule post() { peg(); }\n")?;
    write(dir.path(), "main.scad", "use <lib.scad>\npeg();\n")?;

    let (tree, evaluation) = render_file(dir.path().join("main.scad"), EvalConfig::default())?;
    let root = tree.node(evaluation.geometry.unwrap()).unwrap();
    assert!(matches!(root.op, CsgOp::Cylinder { .. }));
    Ok(())
}
