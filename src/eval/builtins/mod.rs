// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Builtin functions and modules
//!
//! Builtins are the lowest dispatch tier: a user definition or a registered
//! override of the same name always wins.

mod functions;
mod modules;

use super::native::{BoundArguments, NativeCall};
use super::value::Value;
use crate::error::EvalResult;
use ahash::AHashMap;
use std::sync::OnceLock;

pub type BuiltinFn = fn(&mut NativeCall<'_, '_>, &BoundArguments) -> EvalResult<Value>;

/// A native operation with a fixed parameter list
pub struct Builtin {
    pub name: &'static str,
    /// Positional order of the parameters
    pub params: &'static [&'static str],
    /// Accepts a child block
    pub children: bool,
    /// Reads its arguments directly instead of binding `params`
    pub variadic: bool,
    pub run: BuiltinFn,
}

impl Builtin {
    const fn function(name: &'static str, params: &'static [&'static str], run: BuiltinFn) -> Self {
        Self {
            name,
            params,
            children: false,
            variadic: false,
            run,
        }
    }

    const fn variadic(name: &'static str, run: BuiltinFn) -> Self {
        Self {
            name,
            params: &[],
            children: false,
            variadic: true,
            run,
        }
    }

    const fn primitive(name: &'static str, params: &'static [&'static str], run: BuiltinFn) -> Self {
        Self::function(name, params, run)
    }

    const fn operator(name: &'static str, params: &'static [&'static str], run: BuiltinFn) -> Self {
        Self {
            name,
            params,
            children: true,
            variadic: false,
            run,
        }
    }
}

type Table = AHashMap<&'static str, Builtin>;

static FUNCTIONS: OnceLock<Table> = OnceLock::new();
static MODULES: OnceLock<Table> = OnceLock::new();

fn index(builtins: Vec<Builtin>) -> Table {
    builtins.into_iter().map(|b| (b.name, b)).collect()
}

/// Builtin function named `name`
pub fn function(name: &str) -> Option<&'static Builtin> {
    FUNCTIONS.get_or_init(|| index(functions::table())).get(name)
}

/// Builtin module named `name`
pub fn module(name: &str) -> Option<&'static Builtin> {
    MODULES.get_or_init(|| index(modules::table())).get(name)
}

/// Names of every builtin function and module, sorted
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = functions::table()
        .iter()
        .chain(modules::table().iter())
        .map(|b| b.name)
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_separate_namespaces() {
        assert!(function("sin").is_some());
        assert!(module("sin").is_none());
        assert!(module("cube").is_some());
        assert!(function("cube").is_none());
    }

    #[test]
    fn test_no_hull_or_minkowski() {
        assert!(module("hull").is_none());
        assert!(module("minkowski").is_none());
    }

    #[test]
    fn test_children_flags() {
        assert!(module("translate").is_some_and(|b| b.children));
        assert!(module("cube").is_some_and(|b| !b.children));
        assert!(function("max").is_some_and(|b| b.variadic));
    }

    #[test]
    fn test_names_sorted() {
        let names = names();
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.contains(&"children"));
    }
}
