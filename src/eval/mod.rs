// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Lazy evaluation of OpenSCAD programs

pub mod builtins;
pub mod environment;
mod evaluator;
mod expression;
pub mod native;
pub mod operators;
pub mod registry;
pub mod thunk;
pub mod value;

pub use environment::{ChildBlock, ScopeArena, ScopeId, ScopeKind};
pub use evaluator::Evaluator;
pub use native::{Arguments, BoundArguments, NativeCall, NativeFn};
pub use registry::{Override, Provenance, Registry};
pub use thunk::Thunk;
pub use value::{format_number, Callable, RangeValue, Value};
