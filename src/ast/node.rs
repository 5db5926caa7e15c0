// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! AST Node definitions
//!
//! Nodes are immutable once parsed. Everything a closure can capture
//! (assignment right-hand sides, definitions, child blocks) sits behind an
//! `Arc`, so evaluation shares nodes instead of copying them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Source location of a node (1-based)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A parsed `.scad` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: Option<PathBuf>,
    pub statements: Arc<[Statement]>,
}

impl SourceFile {
    /// `include`/`use` directives anywhere in the file, in source order
    pub fn directives(&self) -> Vec<(DirectiveKind, &str, Position)> {
        let mut found = Vec::new();
        collect_directives(&self.statements, &mut found);
        found
    }
}

/// Which directive brought a file in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveKind {
    Include,
    Use,
}

fn collect_directives<'a>(
    statements: &'a [Statement],
    found: &mut Vec<(DirectiveKind, &'a str, Position)>,
) {
    for stmt in statements {
        match &stmt.kind {
            StatementKind::Include(path) => {
                found.push((DirectiveKind::Include, path.as_str(), stmt.pos))
            }
            StatementKind::Use(path) => found.push((DirectiveKind::Use, path.as_str(), stmt.pos)),
            StatementKind::Block(body) => collect_directives(body, found),
            StatementKind::ModuleDef(def) => collect_directives(&def.body, found),
            StatementKind::Instantiate(call) => collect_directives(&call.children, found),
            StatementKind::If { then, otherwise, .. } => {
                collect_directives(then, found);
                if let Some(otherwise) = otherwise {
                    collect_directives(otherwise, found);
                }
            }
            StatementKind::For { body, .. }
            | StatementKind::Let { body, .. }
            | StatementKind::Echo { body, .. }
            | StatementKind::Assert { body, .. } => collect_directives(body, found),
            StatementKind::Modified { statement, .. } => {
                collect_directives(std::slice::from_ref(statement.as_ref()), found)
            }
            _ => {}
        }
    }
}

/// Statement node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub pos: Position,
}

impl Statement {
    pub fn new(kind: StatementKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    /// True for statements that are declared rather than instantiated
    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Assignment { .. }
                | StatementKind::FunctionDef(_)
                | StatementKind::ModuleDef(_)
                | StatementKind::Include(_)
                | StatementKind::Use(_)
        )
    }

    /// True for statements that count as a child of a module call
    pub fn is_instantiable(&self) -> bool {
        !self.is_declaration() && !matches!(self.kind, StatementKind::Empty)
    }
}

/// Types of statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    Empty,
    Block(Arc<[Statement]>),
    Assignment {
        name: String,
        value: Arc<Expr>,
    },
    FunctionDef(Arc<FunctionDef>),
    ModuleDef(Arc<ModuleDef>),
    Instantiate(ModuleCall),
    If {
        condition: Expr,
        then: Arc<[Statement]>,
        otherwise: Option<Arc<[Statement]>>,
    },
    For {
        bindings: Vec<Binding>,
        body: Arc<[Statement]>,
        intersection: bool,
    },
    Let {
        bindings: Vec<Binding>,
        body: Arc<[Statement]>,
    },
    Echo {
        args: Vec<Argument>,
        body: Arc<[Statement]>,
    },
    Assert {
        args: Vec<Argument>,
        body: Arc<[Statement]>,
    },
    Modified {
        modifier: Modifier,
        statement: Box<Statement>,
    },
    Include(String),
    Use(String),
}

/// `!`, `#`, `%` and `*` prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    Root,
    Highlight,
    Background,
    Disable,
}

impl Modifier {
    pub fn symbol(&self) -> char {
        match self {
            Modifier::Root => '!',
            Modifier::Highlight => '#',
            Modifier::Background => '%',
            Modifier::Disable => '*',
        }
    }
}

/// `name(args) children`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCall {
    pub name: String,
    pub args: Vec<Argument>,
    pub children: Arc<[Statement]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Arc<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Arc<[Statement]>,
    pub pos: Position,
}

/// Anonymous `function (params) expr`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionLiteral {
    pub params: Vec<Parameter>,
    pub body: Arc<Expr>,
}

/// Declared parameter with optional default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Arc<Expr>>,
}

/// Call-site argument, positional when `name` is `None`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Arc<Expr>,
}

/// `name = expr` in `for`, `let` and list comprehensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: Arc<Expr>,
}

/// Expression node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Undef,
    Bool(bool),
    Number(f64),
    Str(String),
    Ident(String),
    Vector(Vec<ListElement>),
    Range {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        end: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Argument>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    Function(Arc<FunctionLiteral>),
    Let {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    Echo {
        args: Vec<Argument>,
        body: Option<Box<Expr>>,
    },
    Assert {
        args: Vec<Argument>,
        body: Option<Box<Expr>>,
    },
}

/// Element of a vector literal or list comprehension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListElement {
    Expr(Expr),
    For {
        bindings: Vec<Binding>,
        body: Box<ListElement>,
    },
    ForC {
        init: Vec<Binding>,
        condition: Box<Expr>,
        update: Vec<Binding>,
        body: Box<ListElement>,
    },
    Each(Box<ListElement>),
    If {
        condition: Box<Expr>,
        then: Box<ListElement>,
        otherwise: Option<Box<ListElement>>,
    },
    Let {
        bindings: Vec<Binding>,
        body: Box<ListElement>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
        }
    }
}
