// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Interpreter configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default file name looked up by [`EvalConfig::load`]
pub const CONFIG_FILE: &str = "polyscad.toml";

/// Initial values of the special variables seeded into the global scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialDefaults {
    #[serde(rename = "fn")]
    pub fn_: f64,
    pub fa: f64,
    pub fs: f64,
    pub t: f64,
    pub preview: bool,
}

impl Default for SpecialDefaults {
    fn default() -> Self {
        Self {
            fn_: 0.0,
            fa: 12.0,
            fs: 2.0,
            t: 0.0,
            preview: false,
        }
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Library roots searched for `include`/`use` after the including file's directory
    pub include_paths: Vec<PathBuf>,
    /// Maximum nesting of user function and module calls
    pub max_recursion_depth: usize,
    /// Special variable defaults
    pub specials: SpecialDefaults,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            max_recursion_depth: 1000,
            specials: SpecialDefaults::default(),
        }
    }
}

impl EvalConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: EvalConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// `OPENSCADPATH` appends library roots, `POLYSCAD_MAX_DEPTH` replaces the recursion limit
    pub fn apply_env(&mut self) {
        if let Some(paths) = std::env::var_os("OPENSCADPATH") {
            self.include_paths
                .extend(std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()));
        }

        if let Ok(depth) = std::env::var("POLYSCAD_MAX_DEPTH") {
            match depth.parse() {
                Ok(depth) => self.max_recursion_depth = depth,
                Err(_) => tracing::warn!("ignoring invalid POLYSCAD_MAX_DEPTH: {}", depth),
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.max_recursion_depth, 1000);
        assert_eq!(config.specials.fa, 12.0);
        assert!(config.include_paths.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE);

        let config = EvalConfig {
            max_recursion_depth: 64,
            ..EvalConfig::default()
        }
        .with_include_path("/opt/scad/lib");
        config.save(&path)?;

        let loaded = EvalConfig::from_file(&path)?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "max_recursion_depth = 10\n\n[specials]\nfn = 24\n")?;

        let loaded = EvalConfig::from_file(&path)?;
        assert_eq!(loaded.max_recursion_depth, 10);
        assert_eq!(loaded.specials.fn_, 24.0);
        assert_eq!(loaded.specials.fs, 2.0);
        Ok(())
    }
}
