// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyscad
//!
//! A lazily-evaluated OpenSCAD language interpreter. Programs are parsed into
//! an AST, `include`/`use` dependencies are resolved up front, and evaluation
//! drives a pluggable [`GeometryBackend`]. The bundled [`CsgTree`] backend
//! records the CSG tree instead of computing meshes.

pub mod ast;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod geometry;
pub mod interpreter;
pub mod io;

pub use config::EvalConfig;
pub use error::{EvalError, EvalResult, ParseError, ResolveError, Warning, WarningKind};
pub use eval::{Evaluator, NativeCall, Override, Registry, Value};
pub use geometry::{CsgTree, GeometryBackend, GeometryHandle};
pub use interpreter::{Evaluation, Failure, Interpreter};
pub use io::{parse_expression, parse_scad, Program, Resolver};

use anyhow::Result;
use std::path::Path;

/// Evaluate a standalone SCAD script into a fresh [`CsgTree`]
pub fn render(source: &str) -> Result<(CsgTree, Evaluation)> {
    let interpreter = Interpreter::default();
    let program = Program::from_source(source, None, &interpreter.resolver())?;
    let mut tree = CsgTree::new();
    let evaluation = interpreter.evaluate(&program, &mut tree)?;
    Ok((tree, evaluation))
}

/// Evaluate a SCAD file, resolving its dependencies with `config`
pub fn render_file(path: impl AsRef<Path>, config: EvalConfig) -> Result<(CsgTree, Evaluation)> {
    let interpreter = Interpreter::new(config);
    let program = Program::load(path, &interpreter.resolver())?;
    let mut tree = CsgTree::new();
    let evaluation = interpreter.evaluate(&program, &mut tree)?;
    Ok((tree, evaluation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cube() {
        let (tree, evaluation) = render("cube([10, 10, 10]);").unwrap();
        assert_eq!(tree.len(), 1);
        assert!(evaluation.geometry.is_some());
        assert!(evaluation.warnings.is_empty());
    }

    #[test]
    fn test_echo_output() {
        let (_, evaluation) = render("x = 3; echo(x * 2);").unwrap();
        assert_eq!(evaluation.echoes, vec!["ECHO: 6".to_string()]);
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(render("cube(;").is_err());
    }
}
