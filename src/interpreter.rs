// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Interpreter API

use crate::config::EvalConfig;
use crate::error::{EvalError, EvalResult, Warning};
use crate::eval::{Evaluator, Registry};
use crate::geometry::{BooleanOp, CsgTree, GeometryBackend, GeometryHandle};
use crate::io::{Program, Resolver};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of evaluating one program
#[derive(Debug, Clone, Default, Serialize)]
pub struct Evaluation {
    /// Union of the top-level geometry, `None` if nothing was instantiated
    pub geometry: Option<GeometryHandle>,
    pub warnings: Vec<Warning>,
    /// `ECHO: ...` lines in evaluation order
    pub echoes: Vec<String>,
}

/// Evaluation error with the output produced before it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Failure {
    pub error: EvalError,
    pub warnings: Vec<Warning>,
    pub echoes: Vec<String>,
}

/// Evaluates programs against a frozen override registry
#[derive(Debug, Clone)]
pub struct Interpreter {
    registry: Arc<Registry>,
    config: EvalConfig,
}

impl Interpreter {
    pub fn new(config: EvalConfig) -> Self {
        Self::with_registry(Registry::new(), config)
    }

    /// Take ownership of `registry`; it cannot change afterwards
    pub fn with_registry(registry: Registry, config: EvalConfig) -> Self {
        tracing::debug!("interpreter created with {} overrides", registry.len());
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Resolver searching the configured include paths
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.config.include_paths.clone())
    }

    /// Evaluate `program`, driving `backend`
    pub fn evaluate(&self, program: &Program, backend: &mut dyn GeometryBackend) -> EvalResult<Evaluation> {
        self.evaluate_with_output(program, backend).map_err(|failure| failure.error)
    }

    /// Like [`Interpreter::evaluate`], but a failure keeps the echoes and
    /// warnings collected up to the error
    pub fn evaluate_with_output(
        &self,
        program: &Program,
        backend: &mut dyn GeometryBackend,
    ) -> Result<Evaluation, Failure> {
        let mut evaluator = Evaluator::new(Arc::clone(&self.registry), &self.config, program, backend);
        match Self::finish(&mut evaluator) {
            Ok(geometry) => {
                let (warnings, echoes) = evaluator.take_output();
                Ok(Evaluation {
                    geometry,
                    warnings,
                    echoes,
                })
            }
            Err(error) => {
                let (warnings, echoes) = evaluator.take_output();
                tracing::debug!(
                    "evaluation failed after {} echoes and {} warnings: {}",
                    echoes.len(),
                    warnings.len(),
                    error
                );
                Err(Failure {
                    error,
                    warnings,
                    echoes,
                })
            }
        }
    }

    fn finish(evaluator: &mut Evaluator<'_>) -> EvalResult<Option<GeometryHandle>> {
        let handles = evaluator.run()?;
        tracing::debug!(
            "evaluation finished: {} top-level objects, {} scopes",
            handles.len(),
            evaluator.scope_count()
        );

        Ok(match handles.len() {
            0 => None,
            1 => handles.first().copied(),
            _ => Some(evaluator.backend_mut().boolean(BooleanOp::Union, &handles)?),
        })
    }

    /// Evaluate independent programs in parallel, each into its own [`CsgTree`]
    pub fn evaluate_batch(&self, programs: &[Program]) -> Vec<(Result<Evaluation, Failure>, CsgTree)> {
        programs
            .par_iter()
            .map(|program| {
                let mut tree = CsgTree::new();
                let result = self.evaluate_with_output(program, &mut tree);
                (result, tree)
            })
            .collect()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CsgOp;

    fn program(source: &str) -> Program {
        Program::from_source(source, None, &Resolver::default()).unwrap()
    }

    #[test]
    fn test_single_object_is_not_wrapped() {
        let mut tree = CsgTree::new();
        let result = Interpreter::default()
            .evaluate(&program("cube(2);"), &mut tree)
            .unwrap();
        let root = result.geometry.unwrap();
        assert!(matches!(tree.node(root).unwrap().op, CsgOp::Cube { .. }));
    }

    #[test]
    fn test_top_level_objects_are_unioned() {
        let mut tree = CsgTree::new();
        let result = Interpreter::default()
            .evaluate(&program("cube(1); sphere(1);"), &mut tree)
            .unwrap();
        let root = tree.node(result.geometry.unwrap()).unwrap();
        assert_eq!(root.op, CsgOp::Union);
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn test_empty_program() {
        let mut tree = CsgTree::new();
        let result = Interpreter::default().evaluate(&program("x = 1;"), &mut tree).unwrap();
        assert!(result.geometry.is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_batch_uses_separate_trees() {
        let programs = vec![program("cube(1);"), program("cube(1); cube(2);"), program("nope();")];
        let results = Interpreter::default().evaluate_batch(&programs);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1.len(), 1);
        assert_eq!(results[1].1.len(), 3);
        assert!(results[2].0.is_err());
    }

    #[test]
    fn test_failure_keeps_output() {
        let mut tree = CsgTree::new();
        let source = r#"echo("before"); x = undef_name + 1; echo(x);"#;
        let failure = Interpreter::default()
            .evaluate_with_output(&program(source), &mut tree)
            .unwrap_err();
        assert_eq!(failure.echoes, vec![r#"ECHO: "before""#]);
        assert!(matches!(failure.error, EvalError::UnknownVariable { .. }));
        assert_eq!(failure.to_string(), failure.error.to_string());
    }

    #[test]
    fn test_batch_failure_keeps_warnings() {
        let programs = vec![program("a = 1; a = 2; nope();")];
        let results = Interpreter::default().evaluate_batch(&programs);
        let failure = results[0].0.as_ref().unwrap_err();
        assert_eq!(failure.warnings.len(), 1);
        assert!(matches!(failure.error, EvalError::UnknownModule { .. }));
    }

    #[test]
    fn test_batch_deep_recursion() {
        let source = "function f(n) = n <= 0 ? 0 : 1 + f(n - 1); echo(f(900));";
        let programs = vec![program(source), program(source)];
        for (result, _) in Interpreter::default().evaluate_batch(&programs) {
            assert_eq!(result.unwrap().echoes, vec!["ECHO: 900"]);
        }
    }
}
