// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyscad CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use polyscad::cli::Reporter;
use polyscad::eval::builtins;
use polyscad::{parse_expression, CsgTree, EvalConfig, Interpreter, Override, Program, Registry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyscad")]
#[command(about = "Polyscad - lazily-evaluated OpenSCAD interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./polyscad.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a SCAD file and print its CSG tree
    Render {
        /// Input SCAD file
        input: PathBuf,

        /// Output file for the CSG tree (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Additional library search path
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,

        /// Override a variable, e.g. -D 'size=[1,2,3]'
        #[arg(short = 'D', long = "define", value_name = "NAME=EXPR")]
        define: Vec<String>,

        /// Emit the tree, warnings and echoes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate several SCAD files in parallel and report failures
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,
    },

    /// Parse SCAD file and output AST as JSON
    Parse {
        /// Input SCAD file
        input: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List builtin functions and modules
    Builtins,

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        Reporter::report_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "polyscad=debug" } else { "polyscad=error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            input,
            output,
            include,
            define,
            json,
        } => render_command(&input, output.as_deref(), with_paths(config, include), &define, json, cli.verbose),
        Commands::Check { inputs, include } => check_command(&inputs, with_paths(config, include)),
        Commands::Parse { input, output } => parse_command(&input, output.as_deref(), cli.verbose),
        Commands::Builtins => {
            for name in builtins::names() {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Version => {
            println!("Polyscad v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EvalConfig> {
    match path {
        Some(path) => {
            let mut config = EvalConfig::from_file(path)?;
            config.apply_env();
            Ok(config)
        }
        None => EvalConfig::load(),
    }
}

fn with_paths(mut config: EvalConfig, include: Vec<PathBuf>) -> EvalConfig {
    // command line roots are searched first
    let mut paths = include;
    paths.append(&mut config.include_paths);
    config.include_paths = paths;
    config
}

fn parse_defines(defines: &[String]) -> Result<Registry> {
    let mut registry = Registry::new();
    for define in defines {
        let Some((name, source)) = define.split_once('=') else {
            bail!("invalid define '{}', expected NAME=EXPR", define);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("invalid define '{}', empty name", define);
        }
        let expr = parse_expression(source).with_context(|| format!("in define '{}'", name))?;
        registry.register(name, Override::Expression(Arc::new(expr)));
    }
    Ok(registry)
}

fn render_command(
    input: &Path,
    output: Option<&Path>,
    config: EvalConfig,
    defines: &[String],
    json: bool,
    verbose: bool,
) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }

    let interpreter = Interpreter::with_registry(parse_defines(defines)?, config);
    let start = Instant::now();
    let program = Program::load(input, &interpreter.resolver())?;
    if verbose {
        Reporter::report_info(&format!(
            "loaded {} with {} dependencies",
            input.display(),
            program.dependency_count()
        ));
    }

    let mut tree = CsgTree::new();
    let evaluation = match interpreter.evaluate_with_output(&program, &mut tree) {
        Ok(evaluation) => evaluation,
        Err(failure) => {
            Reporter::report_echoes(&failure.echoes);
            Reporter::report_warnings(&failure.warnings);
            return Err(failure.error.into());
        }
    };
    let elapsed = start.elapsed();

    let text = if json {
        let geometry = evaluation
            .geometry
            .map(|root| tree.to_json(root))
            .unwrap_or(serde_json::Value::Null);
        let report = serde_json::json!({
            "geometry": geometry,
            "warnings": evaluation.warnings,
            "echoes": evaluation.echoes,
        });
        serde_json::to_string_pretty(&report)?
    } else {
        Reporter::report_echoes(&evaluation.echoes);
        Reporter::report_warnings(&evaluation.warnings);
        evaluation.geometry.map(|root| tree.render(root)).unwrap_or_default()
    };

    match output {
        Some(path) => std::fs::write(path, &text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", text),
    }

    if verbose {
        Reporter::report_render(&input.display().to_string(), &evaluation, tree.len(), elapsed);
    }
    Ok(())
}

fn check_command(inputs: &[PathBuf], config: EvalConfig) -> Result<()> {
    let interpreter = Interpreter::new(config);
    let resolver = interpreter.resolver();

    let mut programs = Vec::with_capacity(inputs.len());
    let mut names = Vec::with_capacity(inputs.len());
    let mut failed = 0;
    for input in inputs {
        match Program::load(input, &resolver) {
            Ok(program) => {
                programs.push(program);
                names.push(input);
            }
            Err(err) => {
                Reporter::report_error(&format!("{}: {}", input.display(), err));
                failed += 1;
            }
        }
    }

    for (name, (result, _)) in names.iter().zip(interpreter.evaluate_batch(&programs)) {
        match result {
            Ok(evaluation) => {
                Reporter::report_warnings(&evaluation.warnings);
                println!("{}: ok ({} warnings)", name.display(), evaluation.warnings.len());
            }
            Err(failure) => {
                Reporter::report_warnings(&failure.warnings);
                Reporter::report_error(&format!("{}: {}", name.display(), failure));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed", failed, inputs.len());
    }
    Ok(())
}

fn parse_command(input: &Path, output: Option<&Path>, verbose: bool) -> Result<()> {
    let ast = polyscad::io::import_scad_file(&input.to_string_lossy())?;
    let json = serde_json::to_string_pretty(&ast)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            if verbose {
                Reporter::report_info(&format!("AST written to {}", path.display()));
            }
        }
        None => println!("{}", json),
    }
    Ok(())
}
