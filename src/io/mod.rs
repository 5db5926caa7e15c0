// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! I/O module - parsing and include/use resolution

mod importer;
mod parser;

pub use importer::{import_scad_file, Program, Resolver};
pub use parser::{parse_expression, parse_scad};
