// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Runtime values

use super::environment::ScopeId;
use super::native::NativeFn;
use crate::ast::FunctionLiteral;
use crate::geometry::GeometryHandle;
use std::fmt;
use std::sync::Arc;

/// Result of forcing an expression
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undef,
    Bool(bool),
    Number(f64),
    Str(String),
    Vector(Vec<Value>),
    Range(RangeValue),
    Function(Callable),
    Geometry(GeometryHandle),
}

/// `[start : step : end]`, iterated lazily
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub start: f64,
    pub step: f64,
    pub end: f64,
}

impl RangeValue {
    pub fn new(start: f64, step: f64, end: f64) -> Self {
        Self { start, step, end }
    }

    /// Number of elements the range yields
    pub fn len(&self) -> usize {
        if !(self.start.is_finite() && self.step.is_finite() && self.end.is_finite()) {
            return 0;
        }
        if self.step == 0.0 {
            return 0;
        }
        let span = (self.end - self.start) / self.step;
        if span < 0.0 {
            return 0;
        }
        // tolerate accumulated error at the upper bound
        (span + 1e-9).floor() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            range: *self,
            index: 0,
            len: self.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeIter {
    range: RangeValue,
    index: usize,
    len: usize,
}

impl Iterator for RangeIter {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.index >= self.len {
            return None;
        }
        let value = self.range.start + self.index as f64 * self.range.step;
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.index;
        (left, Some(left))
    }
}

/// Something that can be applied to arguments
#[derive(Clone)]
pub enum Callable {
    /// Function literal together with the scope it closed over
    Closure {
        def: Arc<FunctionLiteral>,
        scope: ScopeId,
    },
    Native { name: String, call: NativeFn },
}

impl Value {
    pub fn number(n: impl Into<f64>) -> Self {
        Value::Number(n.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undef => "undef",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Vector(_) => "vector",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Geometry(_) => "geometry",
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undef => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Vector(v) => !v.is_empty(),
            Value::Range(_) | Value::Function(_) | Value::Geometry(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric vector of any length
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        self.as_vector()?.iter().map(Value::as_number).collect()
    }

    /// Elements produced when used as a `for` source
    ///
    /// Vectors yield their elements, ranges their steps, strings their
    /// characters. `undef` yields nothing; anything else iterates once over
    /// itself.
    pub fn into_iter_values(self) -> ValueIter {
        match self {
            Value::Undef => ValueIter::Once(None),
            Value::Vector(v) => ValueIter::Vector(v.into_iter()),
            Value::Range(r) => ValueIter::Range(r.iter()),
            Value::Str(s) => ValueIter::Chars(s.chars().collect::<Vec<_>>().into_iter()),
            other => ValueIter::Once(Some(other)),
        }
    }

    /// `echo()` rendering: like `str()` but strings are quoted
    pub fn to_echo_string(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

pub enum ValueIter {
    Vector(std::vec::IntoIter<Value>),
    Range(RangeIter),
    Chars(std::vec::IntoIter<char>),
    Once(Option<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Vector(it) => it.next(),
            ValueIter::Range(it) => it.next().map(Value::Number),
            ValueIter::Chars(it) => it.next().map(|c| Value::Str(c.to_string())),
            ValueIter::Once(value) => value.take(),
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// `%g`-style number formatting with six significant digits
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.5e}", n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if !(-5..6).contains(&exponent) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let decimals = (5 - exponent).max(0) as usize;
    trim_fraction(&format!("{:.*}", decimals, n)).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => f.write_str("undef"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Vector(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.to_echo_string())?;
                }
                f.write_str("]")
            }
            Value::Range(r) => write!(
                f,
                "[{} : {} : {}]",
                format_number(r.start),
                format_number(r.step),
                format_number(r.end)
            ),
            Value::Function(Callable::Closure { def, .. }) => {
                let params: Vec<_> = def.params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "function({})", params.join(", "))
            }
            Value::Function(Callable::Native { name, .. }) => write!(f, "function {}", name),
            Value::Geometry(handle) => write!(f, "<geometry #{}>", handle.id()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undef, Value::Undef) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Geometry(a), Value::Geometry(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => match (a, b) {
                (Callable::Closure { def: d1, scope: s1 }, Callable::Closure { def: d2, scope: s2 }) => {
                    Arc::ptr_eq(d1, d2) && s1 == s2
                }
                (Callable::Native { call: c1, .. }, Callable::Native { call: c2, .. }) => {
                    Arc::ptr_eq(c1, c2)
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Vector(v)
    }
}

impl From<GeometryHandle> for Value {
    fn from(h: GeometryHandle) -> Self {
        Value::Geometry(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-2.25), "-2.25");
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(1234567.0), "1.23457e+06");
        assert_eq!(format_number(0.0000001), "1e-07");
        assert_eq!(format_number(100000.0), "100000");
    }

    #[test]
    fn test_display_nested() {
        let v = Value::Vector(vec![
            Value::Number(1.0),
            Value::string("a"),
            Value::Vector(vec![Value::Undef, Value::Bool(true)]),
        ]);
        assert_eq!(v.to_string(), "[1, \"a\", [undef, true]]");
        assert_eq!(Value::string("a").to_string(), "a");
        assert_eq!(Value::string("a").to_echo_string(), "\"a\"");
    }

    #[test]
    fn test_range_cardinality() {
        assert_eq!(RangeValue::new(0.0, 1.0, 3.0).len(), 4);
        assert_eq!(RangeValue::new(0.0, 0.1, 1.0).len(), 11);
        assert_eq!(RangeValue::new(0.0, 2.0, 5.0).len(), 3);
        assert_eq!(RangeValue::new(5.0, 1.0, 0.0).len(), 0);
        assert_eq!(RangeValue::new(0.0, 0.0, 5.0).len(), 0);
        assert_eq!(RangeValue::new(3.0, -1.0, 0.0).iter().collect::<Vec<_>>(), vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_iteration_sources() {
        let chars: Vec<_> = Value::string("ab").into_iter_values().collect();
        assert_eq!(chars, vec![Value::string("a"), Value::string("b")]);

        let once: Vec<_> = Value::Number(7.0).into_iter_values().collect();
        assert_eq!(once, vec![Value::Number(7.0)]);

        assert_eq!(Value::Undef.into_iter_values().count(), 0);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undef.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(!Value::Vector(vec![]).is_truthy());
    }
}
