// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Override registry
//!
//! Caller-supplied values and native callables that take priority over both
//! user definitions and builtins. The registry is filled before evaluation
//! and then frozen inside an [`Interpreter`](crate::Interpreter).

use super::native::{NativeCall, NativeFn};
use super::value::Value;
use crate::ast::Expr;
use crate::error::EvalResult;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// Where a resolved name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Override,
    UserDefined,
    Builtin,
}

/// A registered substitute
#[derive(Clone)]
pub enum Override {
    /// Replaces a file-level variable; callable if it holds a function
    Value(Value),
    /// Like `Value`, evaluated lazily in the global scope
    Expression(Arc<Expr>),
    /// Serves both the function and the module namespace
    Native(NativeFn),
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Override::Expression(e) => f.debug_tuple("Expression").field(e).finish(),
            Override::Native(_) => f.write_str("Native(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: AHashMap<String, Override>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, returning the entry it replaced
    pub fn register(&mut self, name: impl Into<String>, entry: Override) -> Option<Override> {
        let name = name.into();
        tracing::debug!("registering override '{}'", name);
        self.entries.insert(name, entry)
    }

    pub fn register_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.register(name, Override::Value(value.into()));
        self
    }

    pub fn register_native<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut NativeCall<'_, '_>) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.register(name, Override::Native(Arc::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Override> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Override)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let mut registry = Registry::new();
        registry.register_value("width", 10.0);
        assert!(registry.contains("width"));

        let previous = registry.register("width", Override::Value(Value::Number(12.0)));
        assert!(matches!(previous, Some(Override::Value(Value::Number(n))) if n == 10.0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_native_entries() {
        let mut registry = Registry::new();
        registry.register_native("answer", |_call| Ok(Value::Number(42.0)));
        assert!(matches!(registry.get("answer"), Some(Override::Native(_))));
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
