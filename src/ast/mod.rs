// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Abstract Syntax Tree module
//!
//! Defines the AST produced by the OpenSCAD parser

mod node;

pub use node::{
    Argument, BinaryOp, Binding, DirectiveKind, Expr, ExprKind, FunctionDef, FunctionLiteral, ListElement,
    Modifier, ModuleCall, ModuleDef, Parameter, Position, SourceFile, Statement, StatementKind,
    UnaryOp,
};
