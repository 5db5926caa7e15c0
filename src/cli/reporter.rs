// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use crate::error::{Warning, WarningKind};
use crate::interpreter::Evaluation;
use colored::*;
use std::time::Duration;

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Echo lines as OpenSCAD prints them
    pub fn report_echoes(echoes: &[String]) {
        for line in echoes {
            println!("{}", line);
        }
    }

    pub fn report_warnings(warnings: &[Warning]) {
        for warning in warnings {
            eprintln!(
                "{} {} {}",
                "WARNING:".yellow().bold(),
                format!("[{}]", Self::kind_label(warning.kind)).bright_black(),
                warning
            );
        }
    }

    /// Summary after a render
    pub fn report_render(file: &str, evaluation: &Evaluation, nodes: usize, duration: Duration) {
        eprintln!("\n{}", "━".repeat(60).bright_black());
        eprintln!("{} {}", "Rendered:".bold(), file.cyan());
        eprintln!("  {} {}", "CSG nodes:".bright_black(), nodes.to_string().cyan());
        let warnings = evaluation.warnings.len().to_string();
        eprintln!(
            "  {} {}",
            "Warnings:".bright_black(),
            if evaluation.warnings.is_empty() { warnings.green() } else { warnings.yellow() }
        );
        eprintln!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(duration).yellow()
        );
        eprintln!("{}", "━".repeat(60).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "ERROR:".red().bold(), message);
    }

    /// Report info
    pub fn report_info(message: &str) {
        eprintln!("{} {}", "info:".bright_blue(), message);
    }

    fn kind_label(kind: WarningKind) -> &'static str {
        match kind {
            WarningKind::Redefinition => "redefinition",
            WarningKind::UnknownParameter => "unknown-parameter",
            WarningKind::TooManyArguments => "too-many-arguments",
            WarningKind::AmbiguousParameters => "ambiguous-parameters",
            WarningKind::TypeMismatch => "type-mismatch",
            WarningKind::IndexOutOfRange => "index-out-of-range",
            WarningKind::Unsupported => "unsupported",
            WarningKind::Deprecated => "deprecated",
            WarningKind::IgnoredValue => "ignored-value",
        }
    }

    /// Format duration for display
    fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(
            Reporter::format_duration(Duration::from_micros(500)),
            "500µs"
        );
        assert_eq!(
            Reporter::format_duration(Duration::from_millis(5)),
            "5.00ms"
        );
        assert_eq!(Reporter::format_duration(Duration::from_secs(2)), "2.00s");
    }

    #[test]
    fn test_kind_labels_are_distinct() {
        let kinds = [
            WarningKind::Redefinition,
            WarningKind::UnknownParameter,
            WarningKind::TooManyArguments,
            WarningKind::AmbiguousParameters,
            WarningKind::TypeMismatch,
            WarningKind::IndexOutOfRange,
            WarningKind::Unsupported,
            WarningKind::Deprecated,
            WarningKind::IgnoredValue,
        ];
        let mut labels: Vec<_> = kinds.iter().map(|k| Reporter::kind_label(*k)).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), kinds.len());
    }
}
