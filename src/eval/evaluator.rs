// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Statement evaluator - turns a program into geometry backend calls
//!
//! Blocks run in two phases. Every assignment, definition and directive of a
//! block is bound first, then the remaining statements are instantiated in
//! source order, so code may refer to names defined further down.

use super::builtins::{self, Builtin};
use super::environment::{ChildBlock, ScopeArena, ScopeId, ScopeKind, UserFunction, UserModule};
use super::native::{Arguments, BoundArguments, NativeCall, NativeFn};
use super::registry::{Override, Provenance, Registry};
use super::thunk::{Pending, Thunk};
use super::value::{Callable, Value};
use crate::ast::{Argument, Binding, Expr, ModuleCall, Modifier, Parameter, Position, SourceFile, Statement, StatementKind};
use crate::config::EvalConfig;
use crate::error::{EvalError, EvalResult, ResolveError, Warning, WarningKind};
use crate::geometry::{BooleanOp, GeometryBackend, GeometryHandle};
use crate::io::Program;
use ahash::AHashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Remaining stack below which evaluation switches to a fresh segment
pub(super) const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment
pub(super) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Argument as written at a call site, not yet forced
pub(super) struct PendingArg {
    pub name: Option<String>,
    pub thunk: Thunk,
}

impl PendingArg {
    fn value(value: Value) -> Self {
        Self {
            name: None,
            thunk: Thunk::forced(value),
        }
    }
}

/// Geometry-producing work left over from the declaration phase
struct IncludedFile {
    file: Arc<SourceFile>,
    scope: ScopeId,
    nested: Declared,
}

/// Included files of a block, keyed by the index of their directive
type Declared = AHashMap<usize, IncludedFile>;

/// Resolved function name
enum FunctionTarget {
    Override(Callable),
    UserDefined(UserFunction),
    /// Variable holding a function value
    Variable(Callable),
    Builtin(&'static Builtin),
}

impl FunctionTarget {
    fn provenance(&self) -> Provenance {
        match self {
            FunctionTarget::Override(_) => Provenance::Override,
            FunctionTarget::UserDefined(_) | FunctionTarget::Variable(_) => Provenance::UserDefined,
            FunctionTarget::Builtin(_) => Provenance::Builtin,
        }
    }
}

/// Resolved module name
enum ModuleTarget {
    Override(NativeFn),
    UserDefined(UserModule),
    Builtin(&'static Builtin),
}

impl ModuleTarget {
    fn provenance(&self) -> Provenance {
        match self {
            ModuleTarget::Override(_) => Provenance::Override,
            ModuleTarget::UserDefined(_) => Provenance::UserDefined,
            ModuleTarget::Builtin(_) => Provenance::Builtin,
        }
    }
}

enum NativeTarget {
    Builtin(&'static Builtin),
    Override(NativeFn),
}

/// Evaluates one program against one geometry backend
pub struct Evaluator<'b> {
    pub(super) scopes: ScopeArena,
    registry: Arc<Registry>,
    backend: &'b mut dyn GeometryBackend,
    program: &'b Program,
    max_depth: usize,
    /// Scopes of the native calls currently executing, innermost last
    ambient: Vec<ScopeId>,
    /// Names of the thunks currently being forced
    forcing: Vec<String>,
    depth: usize,
    warnings: Vec<Warning>,
    echoes: Vec<String>,
    used: AHashMap<PathBuf, ScopeId>,
    including: Vec<PathBuf>,
    main_scope: Option<ScopeId>,
}

impl<'b> Evaluator<'b> {
    pub fn new(
        registry: Arc<Registry>,
        config: &EvalConfig,
        program: &'b Program,
        backend: &'b mut dyn GeometryBackend,
    ) -> Self {
        let overrides = registry
            .iter()
            .filter_map(|(name, entry)| match entry {
                Override::Value(value) => Some((name.to_string(), Thunk::forced(value.clone()))),
                Override::Expression(expr) => {
                    Some((name.to_string(), Thunk::new(Arc::clone(expr), ScopeId::ROOT)))
                }
                Override::Native(_) => None,
            })
            .collect();

        let mut scopes = ScopeArena::new(overrides);
        let specials = &config.specials;
        let globals = [
            ("PI", Value::Number(std::f64::consts::PI)),
            ("$fn", Value::Number(specials.fn_)),
            ("$fa", Value::Number(specials.fa)),
            ("$fs", Value::Number(specials.fs)),
            ("$t", Value::Number(specials.t)),
            ("$preview", Value::Bool(specials.preview)),
        ];
        for (name, value) in globals {
            scopes.define_var(ScopeId::ROOT, name, Thunk::forced(value));
        }

        Self {
            scopes,
            registry,
            backend,
            program,
            max_depth: config.max_recursion_depth,
            ambient: Vec::new(),
            forcing: Vec::new(),
            depth: 0,
            warnings: Vec::new(),
            echoes: Vec::new(),
            used: AHashMap::new(),
            including: Vec::new(),
            main_scope: None,
        }
    }

    /// Evaluate the main file, returning its top-level geometry
    pub fn run(&mut self) -> EvalResult<Vec<GeometryHandle>> {
        let main = Arc::clone(self.program.main());
        let scope = self.scopes.file_scope(main.path.clone());
        self.main_scope = Some(scope);
        tracing::debug!(
            "evaluating {} ({} statements)",
            main.path
                .as_ref()
                .map_or_else(|| "<source>".to_string(), |p| p.display().to_string()),
            main.statements.len()
        );
        self.run_block(&main.statements, scope)
    }

    /// Force a top-level variable of the main file after [`Evaluator::run`]
    pub fn lookup_global(&mut self, name: &str) -> EvalResult<Option<Value>> {
        let Some(scope) = self.main_scope else {
            return Ok(None);
        };
        match self.scopes.lookup_var(scope, name) {
            Some((_, thunk)) => self.force(&thunk, name).map(Some),
            None => Ok(None),
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn echoes(&self) -> &[String] {
        &self.echoes
    }

    /// Move out the accumulated warnings and echo lines
    pub fn take_output(&mut self) -> (Vec<Warning>, Vec<String>) {
        (std::mem::take(&mut self.warnings), std::mem::take(&mut self.echoes))
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn ambient_depth(&self) -> usize {
        self.ambient.len()
    }

    pub fn backend_mut(&mut self) -> &mut dyn GeometryBackend {
        &mut *self.backend
    }

    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>, position: Option<Position>) {
        let warning = Warning {
            kind,
            message: message.into(),
            position,
        };
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    // ---- thunks and variables ----

    pub(super) fn force(&mut self, thunk: &Thunk, name: &str) -> EvalResult<Value> {
        match thunk.begin()? {
            Pending::Ready(value) => Ok(value),
            Pending::Cycle => {
                let start = self.forcing.iter().rposition(|n| n == name).unwrap_or(0);
                let mut chain = self.forcing[start..].to_vec();
                chain.push(name.to_string());
                Err(EvalError::CircularDefinition {
                    name: name.to_string(),
                    chain,
                })
            }
            Pending::Evaluate { expr, scope } => {
                self.forcing.push(name.to_string());
                let result = self.evaluate(&expr, scope);
                self.forcing.pop();
                thunk.finish(&result);
                result
            }
        }
    }

    pub(super) fn lookup_value(&mut self, name: &str, scope: ScopeId, pos: Position) -> EvalResult<Value> {
        if name == "$children" {
            return Ok(Value::Number(self.children_count(scope) as f64));
        }
        match self.scopes.lookup_var(scope, name) {
            Some((_, thunk)) => self.force(&thunk, name),
            None => Err(EvalError::UnknownVariable {
                name: name.to_string(),
                position: pos,
            }),
        }
    }

    fn children_count(&self, scope: ScopeId) -> usize {
        self.scopes.frame(scope).map_or(0, ChildBlock::count)
    }

    /// Run `f` with `scope` pushed as the ambient environment
    fn with_ambient<T>(&mut self, scope: ScopeId, f: impl FnOnce(&mut Self) -> T) -> T {
        self.ambient.push(scope);
        let result = f(self);
        self.ambient.pop();
        result
    }

    /// Resolve `name` in the innermost ambient environment
    pub(crate) fn ambient_var(&mut self, name: &str) -> EvalResult<Option<Value>> {
        let Some(&scope) = self.ambient.last() else {
            return Ok(None);
        };
        if name == "$children" {
            return Ok(Some(Value::Number(self.children_count(scope) as f64)));
        }
        match self.scopes.lookup_var(scope, name) {
            Some((_, thunk)) => self.force(&thunk, name).map(Some),
            None => Ok(None),
        }
    }

    // ---- blocks ----

    pub(super) fn run_block(&mut self, statements: &[Statement], scope: ScopeId) -> EvalResult<Vec<GeometryHandle>> {
        let declared = self.declare(statements, scope)?;
        self.instantiate_all(statements, scope, &declared)
    }

    fn declare(&mut self, statements: &[Statement], scope: ScopeId) -> EvalResult<Declared> {
        let mut included = Declared::new();

        for (index, stmt) in statements.iter().enumerate() {
            match &stmt.kind {
                StatementKind::Assignment { name, value } => {
                    if self.shadowed_by_includer(scope, name) {
                        tracing::debug!("'{}' already set by the including file", name);
                        continue;
                    }
                    let thunk = Thunk::new(Arc::clone(value), scope);
                    if !self.scopes.define_var(scope, name, thunk) {
                        self.warn(
                            WarningKind::Redefinition,
                            format!("'{}' is already assigned in this scope, later assignment ignored", name),
                            Some(stmt.pos),
                        );
                    }
                }
                StatementKind::FunctionDef(def) => {
                    let function = UserFunction {
                        def: Arc::clone(def),
                        scope,
                    };
                    if !self.scopes.define_function(scope, &def.name, function) {
                        self.warn(
                            WarningKind::Redefinition,
                            format!("function '{}' is already defined in this scope", def.name),
                            Some(stmt.pos),
                        );
                    }
                }
                StatementKind::ModuleDef(def) => {
                    let module = UserModule {
                        def: Arc::clone(def),
                        scope,
                    };
                    if !self.scopes.define_module(scope, &def.name, module) {
                        self.warn(
                            WarningKind::Redefinition,
                            format!("module '{}' is already defined in this scope", def.name),
                            Some(stmt.pos),
                        );
                    }
                }
                StatementKind::Include(path) => {
                    let file = self.include(path, scope)?;
                    included.insert(index, file);
                }
                StatementKind::Use(path) => self.use_file(path, scope)?,
                _ => {}
            }
        }

        Ok(included)
    }

    /// An included file does not rebind variables its includer already set
    fn shadowed_by_includer(&self, scope: ScopeId, name: &str) -> bool {
        if self.scopes.get(scope).kind != ScopeKind::Include {
            return false;
        }
        match self.scopes.lookup_var(scope, name) {
            Some((holder, _)) => holder != scope && holder != ScopeId::ROOT,
            None => false,
        }
    }

    fn include(&mut self, path: &str, scope: ScopeId) -> EvalResult<IncludedFile> {
        let (target, file) = self.program.lookup(self.scopes.origin_of(scope), path)?;
        if self.including.contains(&target) {
            let mut chain = self.including.clone();
            chain.push(target);
            return Err(ResolveError::IncludeCycle { chain }.into());
        }
        tracing::debug!("including {}", target.display());

        let inner = self.scopes.include_scope(scope, Some(target.clone()));
        self.including.push(target);
        let nested = self.declare(&file.statements, inner);
        self.including.pop();
        let nested = nested?;

        self.export(inner, scope, false);
        Ok(IncludedFile {
            file,
            scope: inner,
            nested,
        })
    }

    fn use_file(&mut self, path: &str, scope: ScopeId) -> EvalResult<()> {
        let (target, file) = self.program.lookup(self.scopes.origin_of(scope), path)?;
        let used = match self.used.get(&target) {
            Some(&used) => used,
            None => {
                tracing::debug!("using {}", target.display());
                let used = self.scopes.file_scope(Some(target.clone()));
                self.used.insert(target, used);
                // top-level geometry of a used file is never instantiated
                self.declare(&file.statements, used)?;
                used
            }
        };
        self.export(used, scope, true);
        Ok(())
    }

    /// Make the functions and modules of `from` callable from `into`
    ///
    /// With `own_only`, names that `from` itself imported through `use` stay
    /// private to it; only its own definitions and those of its includes pass.
    fn export(&mut self, from: ScopeId, into: ScopeId, own_only: bool) {
        let (functions, modules) = self.scopes.exports(from);
        for (name, function) in functions {
            if own_only && !self.scopes.belongs_to_file(function.scope, from) {
                continue;
            }
            if !self.scopes.define_function(into, &name, function) {
                tracing::debug!("function '{}' already defined, not imported", name);
            }
        }
        for (name, module) in modules {
            if own_only && !self.scopes.belongs_to_file(module.scope, from) {
                continue;
            }
            if !self.scopes.define_module(into, &name, module) {
                tracing::debug!("module '{}' already defined, not imported", name);
            }
        }
    }

    fn instantiate_all(
        &mut self,
        statements: &[Statement],
        scope: ScopeId,
        declared: &Declared,
    ) -> EvalResult<Vec<GeometryHandle>> {
        let mut handles = Vec::new();
        for (index, stmt) in statements.iter().enumerate() {
            if let Some(included) = declared.get(&index) {
                let file = Arc::clone(&included.file);
                handles.extend(self.instantiate_all(&file.statements, included.scope, &included.nested)?);
            } else if stmt.is_instantiable() {
                handles.extend(self.instantiate(stmt, scope)?);
            }
        }
        Ok(handles)
    }

    /// Instantiate a single statement
    pub fn instantiate(&mut self, stmt: &Statement, scope: ScopeId) -> EvalResult<Vec<GeometryHandle>> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.instantiate_inner(stmt, scope))
    }

    fn instantiate_inner(&mut self, stmt: &Statement, scope: ScopeId) -> EvalResult<Vec<GeometryHandle>> {
        match &stmt.kind {
            StatementKind::Instantiate(call) => self.call_module(call, scope, stmt.pos),

            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                let branch = if self.evaluate(condition, scope)?.is_truthy() {
                    Some(then)
                } else {
                    otherwise.as_ref()
                };
                match branch {
                    Some(body) => {
                        let inner = self.scopes.child(scope, ScopeKind::Block);
                        self.run_block(body, inner)
                    }
                    None => Ok(Vec::new()),
                }
            }

            StatementKind::For {
                bindings,
                body,
                intersection: false,
            } => {
                let mut handles = Vec::new();
                self.for_each(bindings, scope, &mut |eval: &mut Self, inner: ScopeId| {
                    handles.extend(eval.run_block(body, inner)?);
                    Ok(())
                })?;
                Ok(handles)
            }

            StatementKind::For {
                bindings,
                body,
                intersection: true,
            } => {
                let mut parts = Vec::new();
                self.for_each(bindings, scope, &mut |eval: &mut Self, inner: ScopeId| {
                    let handles = eval.run_block(body, inner)?;
                    parts.extend(eval.combine(BooleanOp::Union, handles)?);
                    Ok(())
                })?;
                Ok(self.combine(BooleanOp::Intersection, parts)?.into_iter().collect())
            }

            StatementKind::Let { bindings, body } => {
                let bound = self.bind_sequential(bindings, scope);
                let inner = self.scopes.child(bound, ScopeKind::Block);
                self.run_block(body, inner)
            }

            StatementKind::Echo { args, body } => {
                self.echo(args, scope)?;
                let inner = self.scopes.child(scope, ScopeKind::Block);
                self.run_block(body, inner)
            }

            StatementKind::Assert { args, body } => {
                self.check_assert(args, scope, stmt.pos)?;
                let inner = self.scopes.child(scope, ScopeKind::Block);
                self.run_block(body, inner)
            }

            StatementKind::Modified { modifier, statement } => match modifier {
                Modifier::Disable => Ok(Vec::new()),
                other => {
                    self.warn(
                        WarningKind::Unsupported,
                        format!("modifier '{}' is not supported, subtree rendered normally", other.symbol()),
                        Some(stmt.pos),
                    );
                    self.instantiate(statement, scope)
                }
            },

            StatementKind::Block(body) => {
                let inner = self.scopes.child(scope, ScopeKind::Block);
                self.run_block(body, inner)
            }

            StatementKind::Empty
            | StatementKind::Assignment { .. }
            | StatementKind::FunctionDef(_)
            | StatementKind::ModuleDef(_)
            | StatementKind::Include(_)
            | StatementKind::Use(_) => Ok(Vec::new()),
        }
    }

    /// Single handle for `handles`, joined with `op` when there are several
    fn combine(&mut self, op: BooleanOp, handles: Vec<GeometryHandle>) -> EvalResult<Option<GeometryHandle>> {
        match handles.len() {
            0 => Ok(None),
            1 => Ok(handles.into_iter().next()),
            _ => Ok(Some(self.backend.boolean(op, &handles)?)),
        }
    }

    /// Run `body` once per combination of loop values
    ///
    /// Each binding nests inside the previous one and every iteration gets a
    /// fresh scope holding the already forced loop variable.
    pub(super) fn for_each(
        &mut self,
        bindings: &[Binding],
        scope: ScopeId,
        body: &mut dyn FnMut(&mut Self, ScopeId) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let Some((first, rest)) = bindings.split_first() else {
            let inner = self.scopes.child(scope, ScopeKind::Block);
            return body(self, inner);
        };

        let source = self.evaluate(&first.value, scope)?;
        for item in source.into_iter_values() {
            let inner = self.scopes.child(scope, ScopeKind::Block);
            self.scopes.define_var(inner, &first.name, Thunk::forced(item));
            if rest.is_empty() {
                body(self, inner)?;
            } else {
                self.for_each(rest, inner, body)?;
            }
        }
        Ok(())
    }

    /// Chain of scopes, each binding one name lazily in terms of the previous
    pub(super) fn bind_sequential(&mut self, bindings: &[Binding], scope: ScopeId) -> ScopeId {
        let mut current = scope;
        for binding in bindings {
            let inner = self.scopes.child(current, ScopeKind::Block);
            self.scopes
                .define_var(inner, &binding.name, Thunk::new(Arc::clone(&binding.value), current));
            current = inner;
        }
        current
    }

    /// Scope holding already evaluated `vars`
    pub(super) fn scope_with(&mut self, parent: ScopeId, vars: &[(String, Value)]) -> ScopeId {
        let inner = self.scopes.child(parent, ScopeKind::Block);
        for (name, value) in vars {
            self.scopes.define_var(inner, name, Thunk::forced(value.clone()));
        }
        inner
    }

    pub(super) fn echo(&mut self, args: &[Argument], scope: ScopeId) -> EvalResult<()> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.evaluate(&arg.value, scope)?;
            parts.push(match &arg.name {
                Some(name) => format!("{} = {}", name, value.to_echo_string()),
                None => value.to_echo_string(),
            });
        }
        let line = format!("ECHO: {}", parts.join(", "));
        tracing::info!("{}", line);
        self.echoes.push(line);
        Ok(())
    }

    pub(super) fn check_assert(&mut self, args: &[Argument], scope: ScopeId, pos: Position) -> EvalResult<()> {
        let holds = match argument(args, 0, "condition") {
            Some(condition) => self.evaluate(condition, scope)?.is_truthy(),
            None => false,
        };
        if holds {
            return Ok(());
        }

        let message = match argument(args, 1, "message") {
            Some(message) => self.evaluate(message, scope)?.to_string(),
            None => "condition is false".to_string(),
        };
        Err(EvalError::AssertionFailed { message, position: pos })
    }

    // ---- dispatch ----

    pub(super) fn pending_args(&self, args: &[Argument], scope: ScopeId) -> Vec<PendingArg> {
        args.iter()
            .map(|arg| PendingArg {
                name: arg.name.clone(),
                thunk: Thunk::new(Arc::clone(&arg.value), scope),
            })
            .collect()
    }

    fn resolve_module(&self, name: &str, scope: ScopeId) -> Option<ModuleTarget> {
        if let Some(Override::Native(f)) = self.registry.get(name) {
            return Some(ModuleTarget::Override(Arc::clone(f)));
        }
        if let Some(module) = self.scopes.lookup_module(scope, name) {
            return Some(ModuleTarget::UserDefined(module));
        }
        builtins::module(name).map(ModuleTarget::Builtin)
    }

    fn resolve_function(&mut self, name: &str, scope: ScopeId, pos: Position) -> EvalResult<Option<FunctionTarget>> {
        match self.registry.get(name).cloned() {
            Some(Override::Native(call)) => {
                return Ok(Some(FunctionTarget::Override(Callable::Native {
                    name: name.to_string(),
                    call,
                })));
            }
            Some(_) => {
                if let Value::Function(callable) = self.lookup_value(name, ScopeId::ROOT, pos)? {
                    return Ok(Some(FunctionTarget::Override(callable)));
                }
            }
            None => {}
        }

        if let Some(function) = self.scopes.lookup_function(scope, name) {
            return Ok(Some(FunctionTarget::UserDefined(function)));
        }

        if let Some((_, thunk)) = self.scopes.lookup_var(scope, name) {
            if !thunk.is_forcing() {
                if let Value::Function(callable) = self.force(&thunk, name)? {
                    return Ok(Some(FunctionTarget::Variable(callable)));
                }
            }
        }

        Ok(builtins::function(name).map(FunctionTarget::Builtin))
    }

    fn call_module(&mut self, call: &ModuleCall, scope: ScopeId, pos: Position) -> EvalResult<Vec<GeometryHandle>> {
        let Some(target) = self.resolve_module(&call.name, scope) else {
            return Err(EvalError::UnknownModule {
                name: call.name.clone(),
                position: pos,
            });
        };
        tracing::trace!("module '{}' resolved as {:?}", call.name, target.provenance());

        let args = self.pending_args(&call.args, scope);
        let children = ChildBlock {
            statements: Arc::clone(&call.children),
            scope,
        };

        let value = match target {
            ModuleTarget::UserDefined(module) => {
                return self.call_user_module(&call.name, &module, args, children, scope, pos);
            }
            ModuleTarget::Override(f) => {
                tracing::debug!("module '{}' dispatched to override", call.name);
                self.call_native(NativeTarget::Override(f), &call.name, args, Some(children), scope, pos)?
            }
            ModuleTarget::Builtin(builtin) => {
                if !builtin.children && children.count() > 0 {
                    return Err(EvalError::UnexpectedChildren {
                        name: call.name.clone(),
                        position: pos,
                    });
                }
                self.call_native(NativeTarget::Builtin(builtin), &call.name, args, Some(children), scope, pos)?
            }
        };
        Ok(self.geometry_of(&call.name, value, pos))
    }

    /// Handles carried by a value returned from a native module
    fn geometry_of(&mut self, name: &str, value: Value, pos: Position) -> Vec<GeometryHandle> {
        let mut handles = Vec::new();
        let mut stack = vec![value];
        while let Some(value) = stack.pop() {
            match value {
                Value::Geometry(handle) => handles.push(handle),
                Value::Vector(items) => stack.extend(items.into_iter().rev()),
                Value::Undef => {}
                other => self.warn(
                    WarningKind::IgnoredValue,
                    format!("module '{}' produced a {}, ignored", name, other.type_name()),
                    Some(pos),
                ),
            }
        }
        handles
    }

    pub(super) fn call_function_named(
        &mut self,
        name: &str,
        args: &[Argument],
        scope: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        let pending = self.pending_args(args, scope);
        self.dispatch_function(name, pending, scope, pos)
    }

    fn dispatch_function(&mut self, name: &str, args: Vec<PendingArg>, scope: ScopeId, pos: Position) -> EvalResult<Value> {
        let Some(target) = self.resolve_function(name, scope, pos)? else {
            return Err(EvalError::UnknownFunction {
                name: name.to_string(),
                position: pos,
            });
        };
        tracing::trace!("function '{}' resolved as {:?}", name, target.provenance());

        match target {
            FunctionTarget::Override(callable) | FunctionTarget::Variable(callable) => {
                self.apply_callable(&callable, name, args, scope, pos)
            }
            FunctionTarget::UserDefined(function) => {
                let def = Arc::clone(&function.def);
                self.call_user_function(name, &def.params, &def.body, function.scope, args, scope, pos)
            }
            FunctionTarget::Builtin(builtin) => {
                self.call_native(NativeTarget::Builtin(builtin), name, args, None, scope, pos)
            }
        }
    }

    pub(super) fn apply_callable(
        &mut self,
        callable: &Callable,
        name: &str,
        args: Vec<PendingArg>,
        caller: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        match callable {
            Callable::Closure { def, scope } => {
                self.call_user_function(name, &def.params, &def.body, *scope, args, caller, pos)
            }
            Callable::Native { name, call } => {
                self.call_native(NativeTarget::Override(Arc::clone(call)), name, args, None, caller, pos)
            }
        }
    }

    /// Call a function by name with already forced positional arguments
    pub(crate) fn call_function_values(
        &mut self,
        name: &str,
        args: Vec<Value>,
        scope: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        let pending = args.into_iter().map(PendingArg::value).collect();
        self.dispatch_function(name, pending, scope, pos)
    }

    /// Apply a function value to already forced positional arguments
    pub(crate) fn apply_value(
        &mut self,
        function: &Value,
        args: Vec<Value>,
        scope: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        match function {
            Value::Function(callable) => {
                let pending = args.into_iter().map(PendingArg::value).collect();
                self.apply_callable(callable, "function literal", pending, scope, pos)
            }
            other => Err(EvalError::NotCallable {
                found: other.type_name().to_string(),
                position: pos,
            }),
        }
    }

    fn enter(&mut self, name: &str) -> EvalResult<()> {
        if self.depth >= self.max_depth {
            return Err(EvalError::RecursionLimit {
                name: name.to_string(),
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn call_user_function(
        &mut self,
        name: &str,
        params: &[Parameter],
        body: &Expr,
        def_scope: ScopeId,
        args: Vec<PendingArg>,
        caller: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        self.enter(name)?;
        let scope = self.scopes.call_scope(def_scope, caller, None);
        self.bind_parameters(name, params, args, scope, pos);
        let result = self.evaluate(body, scope);
        self.depth -= 1;
        result
    }

    fn call_user_module(
        &mut self,
        name: &str,
        module: &UserModule,
        args: Vec<PendingArg>,
        children: ChildBlock,
        caller: ScopeId,
        pos: Position,
    ) -> EvalResult<Vec<GeometryHandle>> {
        self.enter(name)?;
        let scope = self.scopes.call_scope(module.scope, caller, Some(children));
        self.bind_parameters(name, &module.def.params, args, scope, pos);
        let body = Arc::clone(&module.def.body);
        let result = self.run_block(&body, scope);
        self.depth -= 1;
        result
    }

    /// Bind call-site arguments in the callee scope
    ///
    /// `$` arguments become special variables of the callee. Missing
    /// parameters take their default, evaluated lazily in the callee scope,
    /// or `undef`.
    fn bind_parameters(&mut self, name: &str, params: &[Parameter], args: Vec<PendingArg>, scope: ScopeId, pos: Position) {
        let ordinary: Vec<&Parameter> = params.iter().filter(|p| !p.name.starts_with('$')).collect();
        let mut next = 0;

        for arg in args {
            match arg.name {
                Some(arg_name) if arg_name.starts_with('$') => {
                    self.scopes.define_var(scope, &arg_name, arg.thunk);
                }
                Some(arg_name) => {
                    if !params.iter().any(|p| p.name == arg_name) {
                        self.warn(
                            WarningKind::UnknownParameter,
                            format!("{}: unknown parameter '{}'", name, arg_name),
                            Some(pos),
                        );
                    } else if !self.scopes.define_var(scope, &arg_name, arg.thunk) {
                        self.warn(
                            WarningKind::Redefinition,
                            format!("{}: parameter '{}' supplied more than once", name, arg_name),
                            Some(pos),
                        );
                    }
                }
                None => match ordinary.get(next) {
                    Some(param) => {
                        next += 1;
                        self.scopes.define_var(scope, &param.name, arg.thunk);
                    }
                    None => self.warn(
                        WarningKind::TooManyArguments,
                        format!("{}: too many unnamed arguments", name),
                        Some(pos),
                    ),
                },
            }
        }

        for param in params {
            if self.scopes.has_var(scope, &param.name) {
                continue;
            }
            if param.name.starts_with('$') {
                let inherited = self
                    .scopes
                    .lookup_var(scope, &param.name)
                    .is_some_and(|(holder, _)| holder != ScopeId::ROOT);
                if inherited {
                    continue;
                }
            }
            let thunk = match &param.default {
                Some(default) => Thunk::new(Arc::clone(default), scope),
                None => Thunk::forced(Value::Undef),
            };
            self.scopes.define_var(scope, &param.name, thunk);
        }
    }

    fn call_native(
        &mut self,
        target: NativeTarget,
        name: &str,
        args: Vec<PendingArg>,
        children: Option<ChildBlock>,
        caller: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        self.enter(name)?;
        let result = self.run_native(target, name, args, children, caller, pos);
        self.depth -= 1;
        result
    }

    fn run_native(
        &mut self,
        target: NativeTarget,
        name: &str,
        args: Vec<PendingArg>,
        children: Option<ChildBlock>,
        caller: ScopeId,
        pos: Position,
    ) -> EvalResult<Value> {
        let scope = self.scopes.call_scope(caller, caller, None);

        let mut forced = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.force(&arg.thunk, arg.name.as_deref().unwrap_or(name))?;
            match arg.name {
                Some(special) if special.starts_with('$') => {
                    self.scopes.define_var(scope, &special, Thunk::forced(value));
                }
                other => forced.push((other, value)),
            }
        }
        let arguments = Arguments::new(forced);

        self.with_ambient(scope, |eval| {
            let mut call = NativeCall::new(eval, name, arguments, children, scope, pos);
            match target {
                NativeTarget::Builtin(builtin) => {
                    let bound = if builtin.variadic {
                        BoundArguments::default()
                    } else {
                        call.bind(builtin.params)
                    };
                    (builtin.run)(&mut call, &bound)
                }
                NativeTarget::Override(f) => f(&mut call),
            }
        })
    }

    /// Instantiate a child block on behalf of `caller`
    ///
    /// With a selection only the listed children (indices into the
    /// instantiable statements) are instantiated, in the order given.
    pub(crate) fn instantiate_block(
        &mut self,
        block: &ChildBlock,
        selection: Option<&[usize]>,
        caller: ScopeId,
    ) -> EvalResult<Vec<GeometryHandle>> {
        let scope = self.scopes.detached_block(block.scope, caller);
        let statements = Arc::clone(&block.statements);
        let declared = self.declare(&statements, scope)?;

        let Some(selection) = selection else {
            return self.instantiate_all(&statements, scope, &declared);
        };

        let instantiable = block.instantiable();
        let mut handles = Vec::new();
        for &index in selection {
            match instantiable.get(index) {
                Some(&position) => handles.extend(self.instantiate(&statements[position], scope)?),
                None => self.warn(
                    WarningKind::IndexOutOfRange,
                    format!("children({}) out of range, {} children available", index, instantiable.len()),
                    None,
                ),
            }
        }
        Ok(handles)
    }

    pub(crate) fn frame_of(&self, scope: ScopeId) -> Option<ChildBlock> {
        self.scopes.frame(scope).cloned()
    }
}

/// Argument at positional `index` or named `name`
fn argument<'a>(args: &'a [Argument], index: usize, name: &str) -> Option<&'a Expr> {
    args.iter()
        .find(|arg| arg.name.as_deref() == Some(name))
        .or_else(|| args.iter().filter(|arg| arg.name.is_none()).nth(index))
        .map(|arg| arg.value.as_ref())
}
