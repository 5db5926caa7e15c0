// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Operator semantics
//!
//! `None` means the operation is undefined for the operand types; the
//! evaluator turns that into `undef` plus a warning.

use super::value::Value;
use crate::ast::{BinaryOp, UnaryOp};

pub fn unary(op: UnaryOp, operand: &Value) -> Option<Value> {
    match op {
        UnaryOp::Not => Some(Value::Bool(!operand.is_truthy())),
        UnaryOp::Plus => match operand {
            Value::Number(_) | Value::Vector(_) => Some(operand.clone()),
            _ => None,
        },
        UnaryOp::Neg => negate(operand),
    }
}

fn negate(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(Value::Number(-n)),
        Value::Vector(items) => items
            .iter()
            .map(negate)
            .collect::<Option<Vec<_>>>()
            .map(Value::Vector),
        _ => None,
    }
}

/// Every binary operator except the short-circuiting `||` and `&&`
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match op {
        BinaryOp::Or => Some(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        BinaryOp::And => Some(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Eq => Some(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Some(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, lhs, rhs),
        BinaryOp::Add => elementwise(lhs, rhs, |a, b| a + b),
        BinaryOp::Sub => elementwise(lhs, rhs, |a, b| a - b),
        BinaryOp::Mul => multiply(lhs, rhs),
        BinaryOp::Div => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Some(Value::Number(a / b)),
            (Value::Vector(_), Value::Number(_)) => map_vector(lhs, &|v| binary(BinaryOp::Div, v, rhs)),
            (Value::Number(_), Value::Vector(_)) => map_vector(rhs, &|v| binary(BinaryOp::Div, lhs, v)),
            _ => None,
        },
        BinaryOp::Mod => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Some(Value::Number(a % b)),
            _ => None,
        },
        BinaryOp::Pow => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Some(Value::Number(a.powf(*b))),
            _ => None,
        },
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b)?,
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Bool(a), Value::Number(b)) => (*a as u8 as f64).partial_cmp(b)?,
        (Value::Number(a), Value::Bool(b)) => a.partial_cmp(&(*b as u8 as f64))?,
        _ => return None,
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Some(Value::Bool(result))
}

/// `+`/`-` on numbers and, recursively, on vectors of equal shape
fn elementwise(lhs: &Value, rhs: &Value, f: fn(f64, f64) -> f64) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Some(Value::Number(f(*a, *b))),
        (Value::Vector(a), Value::Vector(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| elementwise(x, y, f))
            .collect::<Option<Vec<_>>>()
            .map(Value::Vector),
        _ => None,
    }
}

fn map_vector(vector: &Value, f: &dyn Fn(&Value) -> Option<Value>) -> Option<Value> {
    match vector {
        Value::Vector(items) => items
            .iter()
            .map(f)
            .collect::<Option<Vec<_>>>()
            .map(Value::Vector),
        _ => None,
    }
}

fn multiply(lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Some(Value::Number(a * b)),
        (Value::Vector(_), Value::Number(_)) => map_vector(lhs, &|v| multiply(v, rhs)),
        (Value::Number(_), Value::Vector(_)) => map_vector(rhs, &|v| multiply(lhs, v)),
        (Value::Vector(a), Value::Vector(b)) => {
            let a_matrix = as_matrix(a);
            let b_matrix = as_matrix(b);
            match (a_matrix, b_matrix) {
                // matrix * matrix
                (Some(m), Some(n)) => mat_mul(&m, &n),
                // matrix * vector
                (Some(m), None) => {
                    let v = lhs_numbers(b)?;
                    m.iter().map(|row| dot(row, &v)).collect::<Option<Vec<_>>>().map(numbers)
                }
                // vector * matrix
                (None, Some(n)) => {
                    let v = lhs_numbers(a)?;
                    if v.len() != n.len() {
                        return None;
                    }
                    let cols = n.first()?.len();
                    (0..cols)
                        .map(|c| {
                            let column: Vec<f64> = n.iter().map(|row| row[c]).collect();
                            dot(&v, &column)
                        })
                        .collect::<Option<Vec<_>>>()
                        .map(numbers)
                }
                // dot product
                (None, None) => {
                    let x = lhs_numbers(a)?;
                    let y = lhs_numbers(b)?;
                    dot(&x, &y).map(Value::Number)
                }
            }
        }
        _ => None,
    }
}

fn lhs_numbers(items: &[Value]) -> Option<Vec<f64>> {
    items.iter().map(Value::as_number).collect()
}

fn numbers(values: Vec<f64>) -> Value {
    Value::Vector(values.into_iter().map(Value::Number).collect())
}

/// Rectangular, non-empty numeric matrix
fn as_matrix(rows: &[Value]) -> Option<Vec<Vec<f64>>> {
    let matrix: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.as_numbers())
        .collect::<Option<Vec<_>>>()?;
    let width = matrix.first()?.len();
    if width == 0 || matrix.iter().any(|r| r.len() != width) {
        return None;
    }
    Some(matrix)
}

fn dot(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Option<Value> {
    if a.first()?.len() != b.len() {
        return None;
    }
    let cols = b.first()?.len();
    let rows = a
        .iter()
        .map(|row| {
            let products: Vec<Value> = (0..cols)
                .map(|c| Value::Number(row.iter().zip(b).map(|(x, brow)| x * brow[c]).sum()))
                .collect();
            Value::Vector(products)
        })
        .collect();
    Some(Value::Vector(rows))
}

/// Why an index expression produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFailure {
    OutOfRange,
    TypeMismatch,
}

pub fn index(target: &Value, index: &Value) -> Result<Value, IndexFailure> {
    let Value::Number(i) = index else {
        return Err(IndexFailure::TypeMismatch);
    };
    if !i.is_finite() || *i < 0.0 {
        return Err(IndexFailure::OutOfRange);
    }
    let i = i.floor() as usize;

    match target {
        Value::Vector(items) => items.get(i).cloned().ok_or(IndexFailure::OutOfRange),
        Value::Str(s) => s
            .chars()
            .nth(i)
            .map(|c| Value::Str(c.to_string()))
            .ok_or(IndexFailure::OutOfRange),
        _ => Err(IndexFailure::TypeMismatch),
    }
}
