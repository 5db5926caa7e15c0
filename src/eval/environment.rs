// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scope arena
//!
//! Scopes live in one `Vec` and refer to each other by [`ScopeId`], so
//! closures can keep their defining scope alive without reference cycles.
//! Each scope has a lexical parent, and call scopes also record the scope of
//! their caller, which is only followed when resolving `$` names.
//!
//! Bindings are write-once per scope: the first definition of a name wins.
//! Every binding carries a sequence number; an include scope only sees the
//! bindings its includer made before the `include` directive.

use super::thunk::Thunk;
use crate::ast::{FunctionDef, ModuleDef, Statement};
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The global scope holding constants and special variable defaults
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    File,
    Include,
    Block,
    Call,
}

impl ScopeKind {
    /// Scopes where the override registry shadows local variables
    pub fn is_file_level(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::File | ScopeKind::Include)
    }
}

/// Named function together with the scope it was defined in
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub def: Arc<FunctionDef>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct UserModule {
    pub def: Arc<ModuleDef>,
    pub scope: ScopeId,
}

/// Statements passed to a module call, still unevaluated
#[derive(Debug, Clone)]
pub struct ChildBlock {
    pub statements: Arc<[Statement]>,
    /// Scope of the call site
    pub scope: ScopeId,
}

impl ChildBlock {
    /// Indices of the statements that count as children
    pub fn instantiable(&self) -> Vec<usize> {
        self.statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_instantiable())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.statements.iter().filter(|s| s.is_instantiable()).count()
    }
}

#[derive(Debug, Clone)]
struct Bound<T> {
    seq: usize,
    item: T,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub caller: Option<ScopeId>,
    /// Bindings of the parent with a sequence number at or above this are hidden
    pub horizon: Option<usize>,
    pub frame: Option<ChildBlock>,
    /// Source file of a file or include scope
    pub origin: Option<PathBuf>,
    variables: AHashMap<String, Bound<Thunk>>,
    functions: AHashMap<String, Bound<UserFunction>>,
    modules: AHashMap<String, Bound<UserModule>>,
    next_seq: usize,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            caller: None,
            horizon: None,
            frame: None,
            origin: None,
            variables: AHashMap::new(),
            functions: AHashMap::new(),
            modules: AHashMap::new(),
            next_seq: 0,
        }
    }

    fn bump(&mut self) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

fn visible(seq: usize, limit: Option<usize>) -> bool {
    limit.map_or(true, |horizon| seq < horizon)
}

fn insert<T>(map: &mut AHashMap<String, Bound<T>>, seq: usize, name: &str, item: T) -> bool {
    if map.contains_key(name) {
        return false;
    }
    map.insert(name.to_string(), Bound { seq, item });
    true
}

/// All scopes created during one evaluation
///
/// Scopes are never reclaimed while the evaluation runs: thunks, function
/// values and child frames refer to scopes by id, and any of them may outlive
/// the call that created its scope. Memory therefore grows with the number of
/// calls, loop iterations and blocks executed, and is released only when the
/// owning [`Evaluator`](super::Evaluator) is dropped. Every evaluation starts
/// from a fresh arena.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    overrides: AHashMap<String, Thunk>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new(AHashMap::new())
    }
}

impl ScopeArena {
    /// Create an arena holding only the global scope
    ///
    /// `overrides` are consulted at every file-level scope before its own
    /// variables, and last of all when the chain is exhausted.
    pub fn new(overrides: AHashMap<String, Thunk>) -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, None)],
            overrides,
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn child(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.push(Scope::new(kind, Some(parent)))
    }

    /// Scope for a call: lexical parent, dynamic caller, optional children frame
    pub fn call_scope(
        &mut self,
        parent: ScopeId,
        caller: ScopeId,
        frame: Option<ChildBlock>,
    ) -> ScopeId {
        let mut scope = Scope::new(ScopeKind::Call, Some(parent));
        scope.caller = Some(caller);
        scope.frame = frame;
        self.push(scope)
    }

    /// Block evaluated on behalf of `caller` but resolving names in `parent`
    pub fn detached_block(&mut self, parent: ScopeId, caller: ScopeId) -> ScopeId {
        let mut scope = Scope::new(ScopeKind::Block, Some(parent));
        scope.caller = Some(caller);
        self.push(scope)
    }

    /// Scope for an included file, seeing only what `includer` has bound so far
    pub fn include_scope(&mut self, includer: ScopeId, origin: Option<PathBuf>) -> ScopeId {
        let mut scope = Scope::new(ScopeKind::Include, Some(includer));
        scope.horizon = Some(self.scopes[includer.0].next_seq);
        scope.origin = origin;
        self.push(scope)
    }

    /// Scope for a top-level or `use`d file, hanging directly off the global scope
    pub fn file_scope(&mut self, origin: Option<PathBuf>) -> ScopeId {
        let mut scope = Scope::new(ScopeKind::File, Some(ScopeId::ROOT));
        scope.origin = origin;
        self.push(scope)
    }

    /// Source file whose directives are resolved relative to `scope`
    pub fn origin_of(&self, scope: ScopeId) -> Option<&Path> {
        self.walk_lexical(scope, |rec, _| match rec.kind {
            ScopeKind::File | ScopeKind::Include => Some(rec.origin.as_deref()),
            _ => None,
        })
        .flatten()
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        self.scopes.push(scope);
        ScopeId(self.scopes.len() - 1)
    }

    /// Bind a variable; returns `false` if the name was already bound here
    pub fn define_var(&mut self, scope: ScopeId, name: &str, thunk: Thunk) -> bool {
        let rec = &mut self.scopes[scope.0];
        let seq = rec.next_seq;
        let added = insert(&mut rec.variables, seq, name, thunk);
        if added {
            rec.bump();
        }
        added
    }

    pub fn define_function(&mut self, scope: ScopeId, name: &str, function: UserFunction) -> bool {
        let rec = &mut self.scopes[scope.0];
        let seq = rec.next_seq;
        let added = insert(&mut rec.functions, seq, name, function);
        if added {
            rec.bump();
        }
        added
    }

    pub fn define_module(&mut self, scope: ScopeId, name: &str, module: UserModule) -> bool {
        let rec = &mut self.scopes[scope.0];
        let seq = rec.next_seq;
        let added = insert(&mut rec.modules, seq, name, module);
        if added {
            rec.bump();
        }
        added
    }

    /// True if `name` is bound directly in `scope`
    pub fn has_var(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope.0].variables.contains_key(name)
    }

    /// Resolve a variable, returning the thunk and the scope that holds it
    ///
    /// Plain names follow the lexical chain. `$` names follow the caller
    /// link wherever one exists and the lexical parent otherwise.
    pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, Thunk)> {
        let special = name.starts_with('$');
        let mut current = Some(scope);
        let mut limit = None;

        while let Some(id) = current {
            let rec = &self.scopes[id.0];
            if rec.kind.is_file_level() {
                if let Some(thunk) = self.overrides.get(name) {
                    return Some((id, thunk.clone()));
                }
            }
            if let Some(bound) = rec.variables.get(name) {
                if visible(bound.seq, limit) {
                    return Some((id, bound.item.clone()));
                }
            }

            match (special, rec.caller) {
                (true, Some(caller)) => {
                    limit = None;
                    current = Some(caller);
                }
                _ => {
                    limit = rec.horizon;
                    current = rec.parent;
                }
            }
        }

        self.overrides
            .get(name)
            .map(|thunk| (ScopeId::ROOT, thunk.clone()))
    }

    pub fn lookup_function(&self, scope: ScopeId, name: &str) -> Option<UserFunction> {
        self.walk_lexical(scope, |rec, limit| {
            rec.functions
                .get(name)
                .filter(|b| visible(b.seq, limit))
                .map(|b| b.item.clone())
        })
    }

    pub fn lookup_module(&self, scope: ScopeId, name: &str) -> Option<UserModule> {
        self.walk_lexical(scope, |rec, limit| {
            rec.modules
                .get(name)
                .filter(|b| visible(b.seq, limit))
                .map(|b| b.item.clone())
        })
    }

    fn walk_lexical<'a, T>(
        &'a self,
        scope: ScopeId,
        mut find: impl FnMut(&'a Scope, Option<usize>) -> Option<T>,
    ) -> Option<T> {
        let mut current = Some(scope);
        let mut limit = None;
        while let Some(id) = current {
            let rec = &self.scopes[id.0];
            if let Some(found) = find(rec, limit) {
                return Some(found);
            }
            limit = rec.horizon;
            current = rec.parent;
        }
        None
    }

    /// Nearest children frame on the lexical chain
    pub fn frame(&self, scope: ScopeId) -> Option<&ChildBlock> {
        self.walk_lexical(scope, |rec, _| rec.frame.as_ref())
    }

    /// Whether `scope` is the file scope `file` or an include nested in it
    pub fn belongs_to_file(&self, scope: ScopeId, file: ScopeId) -> bool {
        let mut current = scope;
        loop {
            if current == file {
                return true;
            }
            let rec = &self.scopes[current.0];
            match (rec.kind, rec.parent) {
                (ScopeKind::Include, Some(parent)) => current = parent,
                _ => return false,
            }
        }
    }

    /// Functions and modules bound directly in `scope`, in definition order
    pub fn exports(&self, scope: ScopeId) -> (Vec<(String, UserFunction)>, Vec<(String, UserModule)>) {
        let rec = &self.scopes[scope.0];

        let mut functions: Vec<_> = rec.functions.iter().collect();
        functions.sort_by_key(|(_, b)| b.seq);
        let mut modules: Vec<_> = rec.modules.iter().collect();
        modules.sort_by_key(|(_, b)| b.seq);

        (
            functions
                .into_iter()
                .map(|(name, b)| (name.clone(), b.item.clone()))
                .collect(),
            modules
                .into_iter()
                .map(|(name, b)| (name.clone(), b.item.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;

    fn value_of(arena: &ScopeArena, scope: ScopeId, name: &str) -> Option<f64> {
        let (_, thunk) = arena.lookup_var(scope, name)?;
        match thunk.begin() {
            Ok(crate::eval::thunk::Pending::Ready(Value::Number(n))) => Some(n),
            _ => None,
        }
    }

    #[test]
    fn test_first_definition_wins() {
        let mut arena = ScopeArena::default();
        let file = arena.file_scope(None);
        assert!(arena.define_var(file, "a", Thunk::forced(Value::Number(1.0))));
        assert!(!arena.define_var(file, "a", Thunk::forced(Value::Number(2.0))));
        assert_eq!(value_of(&arena, file, "a"), Some(1.0));
    }

    #[test]
    fn test_child_scope_shadows() {
        let mut arena = ScopeArena::default();
        let file = arena.file_scope(None);
        arena.define_var(file, "a", Thunk::forced(Value::Number(1.0)));
        let block = arena.child(file, ScopeKind::Block);
        arena.define_var(block, "a", Thunk::forced(Value::Number(5.0)));

        assert_eq!(value_of(&arena, block, "a"), Some(5.0));
        assert_eq!(value_of(&arena, file, "a"), Some(1.0));
    }

    #[test]
    fn test_include_horizon() {
        let mut arena = ScopeArena::default();
        let main = arena.file_scope(None);
        arena.define_var(main, "before", Thunk::forced(Value::Number(1.0)));
        let inc = arena.include_scope(main, Some(PathBuf::from("/lib/part.scad")));
        arena.define_var(main, "after", Thunk::forced(Value::Number(2.0)));

        assert_eq!(value_of(&arena, inc, "before"), Some(1.0));
        assert!(arena.lookup_var(inc, "after").is_none());
        let block = arena.child(inc, ScopeKind::Block);
        assert_eq!(arena.origin_of(block), Some(Path::new("/lib/part.scad")));
        assert_eq!(arena.origin_of(main), None);
    }

    #[test]
    fn test_include_belongs_to_its_file() {
        let mut arena = ScopeArena::default();
        let lib = arena.file_scope(Some(PathBuf::from("/lib/a.scad")));
        let inc = arena.include_scope(lib, Some(PathBuf::from("/lib/part.scad")));
        let nested = arena.include_scope(inc, Some(PathBuf::from("/lib/bolt.scad")));
        let other = arena.file_scope(Some(PathBuf::from("/lib/b.scad")));
        let block = arena.child(lib, ScopeKind::Block);

        assert!(arena.belongs_to_file(lib, lib));
        assert!(arena.belongs_to_file(nested, lib));
        assert!(!arena.belongs_to_file(other, lib));
        assert!(!arena.belongs_to_file(block, lib));
    }

    #[test]
    fn test_special_variables_follow_caller() {
        let mut arena = ScopeArena::default();
        let definition = arena.file_scope(None);
        let call_site = arena.child(definition, ScopeKind::Block);
        arena.define_var(call_site, "$fn", Thunk::forced(Value::Number(6.0)));
        arena.define_var(call_site, "local", Thunk::forced(Value::Number(3.0)));

        let callee = arena.call_scope(definition, call_site, None);
        assert_eq!(value_of(&arena, callee, "$fn"), Some(6.0));
        // plain names stay lexical
        assert!(arena.lookup_var(callee, "local").is_none());
    }

    #[test]
    fn test_overrides_shadow_file_level() {
        let mut overrides = AHashMap::new();
        overrides.insert("size".to_string(), Thunk::forced(Value::Number(9.0)));
        let mut arena = ScopeArena::new(overrides);
        let file = arena.file_scope(None);
        arena.define_var(file, "size", Thunk::forced(Value::Number(1.0)));
        let block = arena.child(file, ScopeKind::Block);
        arena.define_var(block, "size", Thunk::forced(Value::Number(2.0)));

        assert_eq!(value_of(&arena, file, "size"), Some(9.0));
        assert_eq!(value_of(&arena, block, "size"), Some(2.0));
    }
}
