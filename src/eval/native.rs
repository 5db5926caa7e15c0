// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Calling convention for builtins and native overrides

use super::environment::{ChildBlock, ScopeId};
use super::evaluator::Evaluator;
use super::value::Value;
use crate::ast::Position;
use crate::error::{EvalResult, WarningKind};
use crate::geometry::{GeometryBackend, GeometryHandle, Resolution};
use std::sync::Arc;

/// Native callable, usable as a function and as a module
pub type NativeFn = Arc<dyn Fn(&mut NativeCall<'_, '_>) -> EvalResult<Value> + Send + Sync>;

/// Forced call-site arguments in source order, `$` arguments excluded
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    items: Vec<(Option<String>, Value)>,
}

impl Arguments {
    pub fn new(items: Vec<(Option<String>, Value)>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Value)> {
        self.items.iter().map(|(name, value)| (name.as_deref(), value))
    }

    pub fn positional(&self) -> impl Iterator<Item = &Value> {
        self.items
            .iter()
            .filter(|(name, _)| name.is_none())
            .map(|(_, value)| value)
    }

    /// The `index`th positional argument
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional().nth(index)
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, value)| value)
    }
}

static UNDEF: Value = Value::Undef;

/// Arguments matched against a declared parameter list
#[derive(Debug, Clone, Default)]
pub struct BoundArguments {
    slots: Vec<(&'static str, Option<Value>)>,
}

impl BoundArguments {
    /// Value of `name`, `undef` when not supplied
    pub fn get(&self, name: &str) -> &Value {
        self.slots
            .iter()
            .find(|(param, _)| *param == name)
            .and_then(|(_, value)| value.as_ref())
            .unwrap_or(&UNDEF)
    }

    pub fn is_set(&self, name: &str) -> bool {
        !self.get(name).is_undef()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).as_number()
    }

    pub fn number_or(&self, name: &str, default: f64) -> f64 {
        self.number(name).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Value::Undef => default,
            other => other.is_truthy(),
        }
    }
}

/// One invocation of a native callable
///
/// Gives access to the forced arguments, the child block written at the call
/// site, the ambient environment of the call and the geometry backend.
pub struct NativeCall<'e, 'b> {
    eval: &'e mut Evaluator<'b>,
    name: String,
    args: Arguments,
    children: Option<ChildBlock>,
    scope: ScopeId,
    pos: Position,
}

impl<'e, 'b> NativeCall<'e, 'b> {
    pub(crate) fn new(
        eval: &'e mut Evaluator<'b>,
        name: &str,
        args: Arguments,
        children: Option<ChildBlock>,
        scope: ScopeId,
        pos: Position,
    ) -> Self {
        Self {
            eval,
            name: name.to_string(),
            args,
            children,
            scope,
            pos,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position {
        self.pos
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    /// Match the arguments against `params`, warning about leftovers
    pub fn bind(&mut self, params: &[&'static str]) -> BoundArguments {
        let mut slots: Vec<(&'static str, Option<Value>)> =
            params.iter().map(|p| (*p, None)).collect();
        let mut problems = Vec::new();
        let mut next = 0;

        for (name, value) in self.args.iter() {
            match name {
                Some(name) => match slots.iter_mut().find(|(param, _)| *param == name) {
                    Some(slot) => slot.1 = Some(value.clone()),
                    None => problems.push((
                        WarningKind::UnknownParameter,
                        format!("{}: unknown parameter '{}'", self.name, name),
                    )),
                },
                None => {
                    if next < slots.len() {
                        if slots[next].1.is_none() {
                            slots[next].1 = Some(value.clone());
                        }
                        next += 1;
                    } else {
                        problems.push((
                            WarningKind::TooManyArguments,
                            format!("{}: too many unnamed arguments", self.name),
                        ));
                    }
                }
            }
        }

        for (kind, message) in problems {
            self.warn(kind, message);
        }
        BoundArguments { slots }
    }

    /// Read a binding from the currently evaluating environment
    ///
    /// Resolves like an identifier at the call site, `$` variables included.
    /// Returns `None` for names that are not bound anywhere.
    pub fn var(&mut self, name: &str) -> EvalResult<Option<Value>> {
        self.eval.ambient_var(name)
    }

    /// Number of ambient environments currently pushed
    pub fn ambient_depth(&self) -> usize {
        self.eval.ambient_depth()
    }

    /// Tessellation settings in effect for this call
    pub fn resolution(&mut self) -> EvalResult<Resolution> {
        let defaults = Resolution::default();
        let fn_ = self.special_number("$fn", defaults.fn_)?;
        let fa = self.special_number("$fa", defaults.fa)?;
        let fs = self.special_number("$fs", defaults.fs)?;
        Ok(Resolution::new(fn_, fa, fs))
    }

    fn special_number(&mut self, name: &str, default: f64) -> EvalResult<f64> {
        Ok(self
            .var(name)?
            .and_then(|v| v.as_number())
            .unwrap_or(default))
    }

    /// Number of statements in the call-site child block
    pub fn children_count(&self) -> usize {
        self.children.as_ref().map_or(0, ChildBlock::count)
    }

    pub fn has_children(&self) -> bool {
        self.children_count() > 0
    }

    /// Instantiate the call-site child block
    pub fn instantiate_children(&mut self) -> EvalResult<Vec<GeometryHandle>> {
        match self.children.clone() {
            Some(block) => self.eval.instantiate_block(&block, None, self.scope),
            None => Ok(Vec::new()),
        }
    }

    /// Children of the enclosing user module, for `children()`
    pub(crate) fn frame(&self) -> Option<ChildBlock> {
        self.eval.frame_of(self.scope)
    }

    pub(crate) fn instantiate_frame(
        &mut self,
        frame: &ChildBlock,
        selection: Option<&[usize]>,
    ) -> EvalResult<Vec<GeometryHandle>> {
        self.eval.instantiate_block(frame, selection, self.scope)
    }

    pub fn backend(&mut self) -> &mut dyn GeometryBackend {
        self.eval.backend_mut()
    }

    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.eval.warn(kind, message, Some(self.pos));
    }

    /// Call a function by name from the current environment
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        self.eval.call_function_values(name, args, self.scope, self.pos)
    }

    /// Apply a function value
    pub fn call_value(&mut self, function: &Value, args: Vec<Value>) -> EvalResult<Value> {
        self.eval.apply_value(function, args, self.scope, self.pos)
    }
}
