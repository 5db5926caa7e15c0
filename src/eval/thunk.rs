// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Deferred bindings

use super::environment::ScopeId;
use super::value::Value;
use crate::ast::Expr;
use crate::error::{EvalError, EvalResult};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Evaluation state of a thunk
///
/// Transitions `Unforced -> Forcing -> Forced | Failed` exactly once.
#[derive(Debug)]
pub enum ThunkState {
    Unforced { expr: Arc<Expr>, scope: ScopeId },
    Forcing,
    Forced(Value),
    Failed(EvalError),
}

/// What the caller has to do to obtain the value
pub enum Pending {
    Ready(Value),
    Evaluate { expr: Arc<Expr>, scope: ScopeId },
    /// Already being forced further up the stack
    Cycle,
}

/// Shared handle to a deferred computation
#[derive(Debug, Clone)]
pub struct Thunk(Rc<RefCell<ThunkState>>);

impl Thunk {
    /// Defer `expr`, resolving free names in `scope`
    pub fn new(expr: Arc<Expr>, scope: ScopeId) -> Self {
        Self(Rc::new(RefCell::new(ThunkState::Unforced { expr, scope })))
    }

    pub fn forced(value: Value) -> Self {
        Self(Rc::new(RefCell::new(ThunkState::Forced(value))))
    }

    pub fn is_forced(&self) -> bool {
        matches!(*self.0.borrow(), ThunkState::Forced(_))
    }

    pub fn is_forcing(&self) -> bool {
        matches!(*self.0.borrow(), ThunkState::Forcing)
    }

    /// Claim the thunk for evaluation, moving it into `Forcing`
    pub fn begin(&self) -> EvalResult<Pending> {
        let mut state = self.0.borrow_mut();
        match std::mem::replace(&mut *state, ThunkState::Forcing) {
            ThunkState::Unforced { expr, scope } => Ok(Pending::Evaluate { expr, scope }),
            ThunkState::Forcing => Ok(Pending::Cycle),
            ThunkState::Forced(value) => {
                *state = ThunkState::Forced(value.clone());
                Ok(Pending::Ready(value))
            }
            ThunkState::Failed(err) => {
                *state = ThunkState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Record the outcome of the evaluation started by [`Thunk::begin`]
    pub fn finish(&self, result: &EvalResult<Value>) {
        let mut state = self.0.borrow_mut();
        *state = match result {
            Ok(value) => ThunkState::Forced(value.clone()),
            Err(err) => ThunkState::Failed(err.clone()),
        };
    }

    pub fn ptr_eq(&self, other: &Thunk) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
