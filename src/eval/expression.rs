// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Expression evaluation

use super::environment::ScopeId;
use super::evaluator::{Evaluator, STACK_GROW_SIZE, STACK_RED_ZONE};
use super::operators::{self, IndexFailure};
use super::value::{Callable, RangeValue, Value};
use crate::ast::{BinaryOp, Expr, ExprKind, ListElement, Position};
use crate::error::{EvalError, EvalResult, WarningKind};
use std::sync::Arc;

impl<'b> Evaluator<'b> {
    /// Evaluate `expr`, resolving free names in `scope`
    ///
    /// The native stack is extended on demand, so recursion is bounded by
    /// the configured depth rather than by the size of the calling thread.
    pub fn evaluate(&mut self, expr: &Expr, scope: ScopeId) -> EvalResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.evaluate_inner(expr, scope))
    }

    fn evaluate_inner(&mut self, expr: &Expr, scope: ScopeId) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Undef => Ok(Value::Undef),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Ident(name) => self.lookup_value(name, scope, expr.pos),

            ExprKind::Vector(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    self.collect_element(element, scope, &mut items)?;
                }
                Ok(Value::Vector(items))
            }

            ExprKind::Range { start, step, end } => self.range(start, step.as_deref(), end, scope, expr.pos),

            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand, scope)?;
                match operators::unary(*op, &value) {
                    Some(result) => Ok(result),
                    None => {
                        self.warn(
                            WarningKind::TypeMismatch,
                            format!("unary {:?} is undefined for {}", op, value.type_name()),
                            Some(expr.pos),
                        );
                        Ok(Value::Undef)
                    }
                }
            }

            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                if self.evaluate(lhs, scope)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.evaluate(rhs, scope)?.is_truthy()))
            }

            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                if !self.evaluate(lhs, scope)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.evaluate(rhs, scope)?.is_truthy()))
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.evaluate(lhs, scope)?;
                let right = self.evaluate(rhs, scope)?;
                match operators::binary(*op, &left, &right) {
                    Some(result) => Ok(result),
                    None => {
                        self.warn(
                            WarningKind::TypeMismatch,
                            format!(
                                "undefined operation ({} {} {})",
                                left.type_name(),
                                op.symbol(),
                                right.type_name()
                            ),
                            Some(expr.pos),
                        );
                        Ok(Value::Undef)
                    }
                }
            }

            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition, scope)?.is_truthy() {
                    self.evaluate(then, scope)
                } else {
                    self.evaluate(otherwise, scope)
                }
            }

            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Ident(name) => self.call_function_named(name, args, scope, expr.pos),
                _ => match self.evaluate(callee, scope)? {
                    Value::Function(callable) => {
                        let pending = self.pending_args(args, scope);
                        self.apply_callable(&callable, "function literal", pending, scope, expr.pos)
                    }
                    other => Err(EvalError::NotCallable {
                        found: other.type_name().to_string(),
                        position: expr.pos,
                    }),
                },
            },

            ExprKind::Index { target, index } => {
                let target = self.evaluate(target, scope)?;
                let index = self.evaluate(index, scope)?;
                match operators::index(&target, &index) {
                    Ok(value) => Ok(value),
                    Err(IndexFailure::OutOfRange) => {
                        self.warn(
                            WarningKind::IndexOutOfRange,
                            format!("index {} out of bounds for {}", index, target.type_name()),
                            Some(expr.pos),
                        );
                        Ok(Value::Undef)
                    }
                    Err(IndexFailure::TypeMismatch) => {
                        self.warn(
                            WarningKind::TypeMismatch,
                            format!("cannot index {} with {}", target.type_name(), index.type_name()),
                            Some(expr.pos),
                        );
                        Ok(Value::Undef)
                    }
                }
            }

            ExprKind::Member { target, name } => {
                let target = self.evaluate(target, scope)?;
                Ok(self.member(target, name, expr.pos))
            }

            ExprKind::Function(def) => Ok(Value::Function(Callable::Closure {
                def: Arc::clone(def),
                scope,
            })),

            ExprKind::Let { bindings, body } => {
                let inner = self.bind_sequential(bindings, scope);
                self.evaluate(body, inner)
            }

            ExprKind::Echo { args, body } => {
                self.echo(args, scope)?;
                match body {
                    Some(body) => self.evaluate(body, scope),
                    None => Ok(Value::Undef),
                }
            }

            ExprKind::Assert { args, body } => {
                self.check_assert(args, scope, expr.pos)?;
                match body {
                    Some(body) => self.evaluate(body, scope),
                    None => Ok(Value::Undef),
                }
            }
        }
    }

    fn range(
        &mut self,
        start: &Expr,
        step: Option<&Expr>,
        end: &Expr,
        scope: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        let begin = self.evaluate(start, scope)?;
        let step = match step {
            Some(step) => Some(self.evaluate(step, scope)?),
            None => None,
        };
        let finish = self.evaluate(end, scope)?;

        let (Some(a), Some(b)) = (begin.as_number(), finish.as_number()) else {
            self.warn(
                WarningKind::TypeMismatch,
                format!("range bounds must be numbers, got {} and {}", begin.type_name(), finish.type_name()),
                Some(pos),
            );
            return Ok(Value::Undef);
        };

        let range = match step {
            None if a > b => {
                self.warn(
                    WarningKind::Deprecated,
                    format!(
                        "[{0}:{1}] with begin greater than end is deprecated, iterating [{1}:{0}]",
                        crate::eval::format_number(a),
                        crate::eval::format_number(b)
                    ),
                    Some(pos),
                );
                RangeValue::new(b, 1.0, a)
            }
            None => RangeValue::new(a, 1.0, b),
            Some(step) => match step.as_number() {
                Some(s) => RangeValue::new(a, s, b),
                None => {
                    self.warn(
                        WarningKind::TypeMismatch,
                        format!("range step must be a number, got {}", step.type_name()),
                        Some(pos),
                    );
                    return Ok(Value::Undef);
                }
            },
        };
        Ok(Value::Range(range))
    }

    fn member(&mut self, target: Value, name: &str, pos: Position) -> Value {
        let found = match (&target, name) {
            (Value::Vector(items), "x") => items.first().cloned(),
            (Value::Vector(items), "y") => items.get(1).cloned(),
            (Value::Vector(items), "z") => items.get(2).cloned(),
            (Value::Range(r), "begin") => Some(Value::Number(r.start)),
            (Value::Range(r), "step") => Some(Value::Number(r.step)),
            (Value::Range(r), "end") => Some(Value::Number(r.end)),
            _ => None,
        };
        found.unwrap_or_else(|| {
            self.warn(
                WarningKind::TypeMismatch,
                format!("{} has no member '{}'", target.type_name(), name),
                Some(pos),
            );
            Value::Undef
        })
    }

    /// Append the values produced by one list element to `out`
    fn collect_element(&mut self, element: &ListElement, scope: ScopeId, out: &mut Vec<Value>) -> EvalResult<()> {
        match element {
            ListElement::Expr(expr) => out.push(self.evaluate(expr, scope)?),

            ListElement::For { bindings, body } => {
                self.for_each(bindings, scope, &mut |eval: &mut Self, inner: ScopeId| {
                    eval.collect_element(body, inner, out)
                })?;
            }

            ListElement::ForC {
                init,
                condition,
                update,
                body,
            } => {
                let mut state: Vec<(String, Value)> = Vec::with_capacity(init.len());
                for binding in init {
                    let visible = self.scope_with(scope, &state);
                    let value = self.evaluate(&binding.value, visible)?;
                    assign(&mut state, &binding.name, value);
                }

                loop {
                    let iteration = self.scope_with(scope, &state);
                    if !self.evaluate(condition, iteration)?.is_truthy() {
                        break;
                    }
                    self.collect_element(body, iteration, out)?;

                    let mut next = Vec::with_capacity(update.len());
                    for binding in update {
                        next.push((binding.name.clone(), self.evaluate(&binding.value, iteration)?));
                    }
                    for (name, value) in next {
                        assign(&mut state, &name, value);
                    }
                }
            }

            ListElement::Each(inner) => {
                let mut produced = Vec::new();
                self.collect_element(inner, scope, &mut produced)?;
                for value in produced {
                    match value {
                        Value::Vector(_) | Value::Range(_) | Value::Str(_) => out.extend(value.into_iter_values()),
                        other => out.push(other),
                    }
                }
            }

            ListElement::If {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition, scope)?.is_truthy() {
                    self.collect_element(then, scope, out)?;
                } else if let Some(otherwise) = otherwise {
                    self.collect_element(otherwise, scope, out)?;
                }
            }

            ListElement::Let { bindings, body } => {
                let inner = self.bind_sequential(bindings, scope);
                self.collect_element(body, inner, out)?;
            }
        }
        Ok(())
    }
}

fn assign(state: &mut Vec<(String, Value)>, name: &str, value: Value) {
    match state.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value,
        None => state.push((name.to_string(), value)),
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::Value;
    use crate::geometry::CsgTree;
    use crate::io::{Program, Resolver};
    use crate::{EvalConfig, Evaluator, Registry};
    use std::sync::Arc;

    /// Value of `result` after running `source`
    fn eval_result(source: &str) -> Value {
        let program = Program::from_source(source, None, &Resolver::default()).unwrap();
        let mut tree = CsgTree::new();
        let config = EvalConfig::default();
        let mut evaluator = Evaluator::new(Arc::new(Registry::new()), &config, &program, &mut tree);
        evaluator.run().unwrap();
        evaluator.lookup_global("result").unwrap().unwrap()
    }

    fn numbers(items: &[f64]) -> Value {
        Value::Vector(items.iter().map(|n| Value::Number(*n)).collect())
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval_result("result = 1 + 2 * 3 ^ 2;"), Value::Number(19.0));
        assert_eq!(eval_result("result = -2 ^ 2;"), Value::Number(-4.0));
        assert_eq!(eval_result("result = 7 % 4 == 3 && !false;"), Value::Bool(true));
    }

    #[test]
    fn test_short_circuit_skips_unknown_names() {
        assert_eq!(eval_result("result = true || missing;"), Value::Bool(true));
        assert_eq!(eval_result("result = false && missing;"), Value::Bool(false));
    }

    #[test]
    fn test_list_comprehensions() {
        assert_eq!(eval_result("result = [for (i = [1:3]) i * i];"), numbers(&[1.0, 4.0, 9.0]));
        assert_eq!(
            eval_result("result = [for (i = [0:5]) if (i % 2 == 0) i];"),
            numbers(&[0.0, 2.0, 4.0])
        );
        assert_eq!(
            eval_result("result = [for (i = [1:2], j = [10, 20]) i + j];"),
            numbers(&[11.0, 21.0, 12.0, 22.0])
        );
        assert_eq!(
            eval_result("result = [each [1, 2], let (x = 3) x, each [4:5]];"),
            numbers(&[1.0, 2.0, 3.0, 4.0, 5.0])
        );
    }

    #[test]
    fn test_c_style_for() {
        assert_eq!(
            eval_result("result = [for (i = 0, acc = 1; i < 4; i = i + 1, acc = acc * 2) acc];"),
            numbers(&[1.0, 2.0, 4.0, 8.0])
        );
    }

    #[test]
    fn test_member_access_and_indexing() {
        assert_eq!(eval_result("v = [4, 5, 6]; result = v.y + v[2];"), Value::Number(11.0));
        assert_eq!(eval_result("r = [1:2:9]; result = r.end;"), Value::Number(9.0));
        assert_eq!(eval_result("result = \"hello\"[1];"), Value::string("e"));
        assert_eq!(eval_result("result = [1, 2][5];"), Value::Undef);
    }

    #[test]
    fn test_function_literals_close_over_scope() {
        let source = "
            k = 3;
            scale_by = function(x) x * k;
            result = scale_by(5);
        ";
        assert_eq!(eval_result(source), Value::Number(15.0));
        assert_eq!(eval_result("result = (function(a, b = 2) a + b)(1);"), Value::Number(3.0));
    }

    #[test]
    fn test_let_is_sequential() {
        assert_eq!(eval_result("result = let (a = 2, b = a * 10) a + b;"), Value::Number(22.0));
    }

    #[test]
    fn test_reversed_range_is_swapped() {
        assert_eq!(eval_result("result = [for (i = [3:1]) i];"), numbers(&[1.0, 2.0, 3.0]));
    }
}
