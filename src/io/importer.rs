// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! SCAD file importer and `include`/`use` resolution

use crate::ast::{DirectiveKind, SourceFile};
use crate::error::ResolveError;
use ahash::AHashMap;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Import a .scad file and parse it into an AST
pub fn import_scad_file(path: &str) -> Result<SourceFile> {
    let source = fs::read_to_string(path)
        .context(format!("Failed to read SCAD file: {}", path))?;

    super::parse_scad(&source, Some(Path::new(path)))
        .context(format!("Failed to parse SCAD file: {}", path))
}

/// Locates `include`/`use` targets
///
/// A directive is looked up relative to the directory of the file containing
/// it, then under each search root in order.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    roots: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find the file named by a directive written in `from`
    pub fn resolve(&self, path: &str, from: Option<&Path>) -> Result<PathBuf, ResolveError> {
        let requested = Path::new(path);
        let mut searched = Vec::new();

        if requested.is_absolute() {
            if requested.is_file() {
                return Ok(canonical(requested));
            }
            searched.push(requested.to_path_buf());
        } else {
            let local = from.and_then(Path::parent).map(Path::to_path_buf);
            for dir in local.iter().chain(self.roots.iter()) {
                let candidate = dir.join(requested);
                if candidate.is_file() {
                    tracing::debug!("resolved <{}> to {}", path, candidate.display());
                    return Ok(canonical(&candidate));
                }
                searched.push(candidate);
            }
        }

        Err(ResolveError::FileNotFound {
            path: path.to_string(),
            searched,
        })
    }

    /// Read and parse a resolved file
    pub fn load(&self, path: &Path) -> Result<SourceFile, ResolveError> {
        let source = fs::read_to_string(path).map_err(|err| ResolveError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(super::parse_scad(&source, Some(path))?)
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Root file plus every file it transitively includes or uses
///
/// All referenced files are resolved and parsed up front, so evaluation never
/// touches the filesystem and a missing file fails before anything runs.
#[derive(Debug, Clone)]
pub struct Program {
    main: Arc<SourceFile>,
    files: AHashMap<PathBuf, Arc<SourceFile>>,
    links: AHashMap<(Option<PathBuf>, String), PathBuf>,
}

impl Program {
    /// Parse `source` and load everything it references
    pub fn from_source(source: &str, origin: Option<&Path>, resolver: &Resolver) -> Result<Self, ResolveError> {
        let main = super::parse_scad(source, origin)?;
        Self::from_ast(main, resolver)
    }

    /// Load a program from disk
    pub fn load(path: impl AsRef<Path>, resolver: &Resolver) -> Result<Self, ResolveError> {
        let path = canonical(path.as_ref());
        let main = resolver.load(&path)?;
        Self::from_ast(main, resolver)
    }

    /// Wrap an already parsed file, loading its dependencies
    pub fn from_ast(main: SourceFile, resolver: &Resolver) -> Result<Self, ResolveError> {
        let mut program = Self {
            main: Arc::new(main),
            files: AHashMap::new(),
            links: AHashMap::new(),
        };

        let main = Arc::clone(&program.main);
        let mut stack: Vec<PathBuf> = main.path.iter().cloned().collect();
        program.preload(&main, resolver, &mut stack)?;
        Ok(program)
    }

    fn preload(
        &mut self,
        file: &SourceFile,
        resolver: &Resolver,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), ResolveError> {
        for (kind, directive, _) in file.directives() {
            let key = (file.path.clone(), directive.to_string());
            if self.links.contains_key(&key) {
                continue;
            }

            let target = resolver.resolve(directive, file.path.as_deref())?;
            if kind == DirectiveKind::Include && stack.contains(&target) {
                let mut chain = stack.clone();
                chain.push(target);
                return Err(ResolveError::IncludeCycle { chain });
            }
            self.links.insert(key, target.clone());

            if self.files.contains_key(&target) {
                continue;
            }
            let loaded = Arc::new(resolver.load(&target)?);
            self.files.insert(target.clone(), Arc::clone(&loaded));

            // only include edges can form a cycle; a used file gets its own scope
            let mut nested = match kind {
                DirectiveKind::Include => stack.clone(),
                DirectiveKind::Use => Vec::new(),
            };
            nested.push(target);
            self.preload(&loaded, resolver, &mut nested)?;
        }
        Ok(())
    }

    pub fn main(&self) -> &Arc<SourceFile> {
        &self.main
    }

    /// Number of files besides the main one
    pub fn dependency_count(&self) -> usize {
        self.files.len()
    }

    /// The file a directive in `from` refers to
    pub fn lookup(&self, from: Option<&Path>, directive: &str) -> Result<(PathBuf, Arc<SourceFile>), ResolveError> {
        let key = (from.map(Path::to_path_buf), directive.to_string());
        self.links
            .get(&key)
            .and_then(|path| self.files.get(path).map(|file| (path.clone(), Arc::clone(file))))
            .ok_or_else(|| ResolveError::FileNotFound {
                path: directive.to_string(),
                searched: Vec::new(),
            })
    }
}
