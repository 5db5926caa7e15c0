// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error and warning types shared by the parser, resolver and evaluator

use crate::ast::Position;
use crate::geometry::BackendError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed source. Parsing of the file stops at the first error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}{line}:{column}: expected {}, found {found}", file_prefix(.file), expected_list(.expected))]
pub struct ParseError {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
    pub expected: Vec<String>,
    pub found: String,
}

impl ParseError {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

fn file_prefix(file: &Option<PathBuf>) -> String {
    match file {
        Some(path) => format!("{}:", path.display()),
        None => String::new(),
    }
}

fn expected_list(expected: &[String]) -> String {
    match expected {
        [] => "valid syntax".to_string(),
        [one] => one.clone(),
        _ => format!("one of {}", expected.join(", ")),
    }
}

/// Failure to locate or load an `include`/`use` target
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("file not found: <{path}> (searched {})", searched_list(.searched))]
    FileNotFound { path: String, searched: Vec<PathBuf> },

    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("include cycle: {}", cycle_list(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn searched_list(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "nothing".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn cycle_list(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Fatal evaluation errors. Cloneable so a failed thunk can replay its error.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{position}: unknown variable '{name}'")]
    UnknownVariable { name: String, position: Position },

    #[error("{position}: unknown function '{name}'")]
    UnknownFunction { name: String, position: Position },

    #[error("{position}: unknown module '{name}'")]
    UnknownModule { name: String, position: Position },

    #[error("circular definition of '{name}': {}", .chain.join(" -> "))]
    CircularDefinition { name: String, chain: Vec<String> },

    #[error("{position}: assertion failed: {message}")]
    AssertionFailed { message: String, position: Position },

    #[error("{position}: module '{name}' does not accept children")]
    UnexpectedChildren { name: String, position: Position },

    #[error("{position}: cannot call a value of type {found}")]
    NotCallable { found: String, position: Position },

    #[error("recursion limit of {limit} exceeded in '{name}'")]
    RecursionLimit { name: String, limit: usize },

    #[error("{name}: {message}")]
    Native { name: String, message: String },

    #[error("geometry backend: {0}")]
    Collaborator(#[from] BackendError),
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Non-fatal diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    Redefinition,
    UnknownParameter,
    TooManyArguments,
    AmbiguousParameters,
    TypeMismatch,
    IndexOutOfRange,
    Unsupported,
    Deprecated,
    IgnoredValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub position: Option<Position>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => f.write_str(&self.message),
        }
    }
}
