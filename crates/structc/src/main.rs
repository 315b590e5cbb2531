//! structc - C struct layout compiler
//!
//! Usage: structc [OPTIONS] <input>

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process;
use structc::common::DiagnosticReporter;
use structc::driver::{Compilation, Pipeline};
use structc::exec::ExecConfig;
use structc::frontend::FrontendConfig;
use structc::types::{DataModel, LayoutConfig, DEFAULT_MAX_TYPE_DEPTH};
use tracing::info;

/// Target data model
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Default)]
enum Target {
    /// 4-byte int, 8-byte long and pointers
    #[default]
    Lp64,
    /// Motorola 68000: 4-byte int, long and pointers, word alignment
    M68k,
}

impl From<Target> for DataModel {
    fn from(target: Target) -> Self {
        match target {
            Target::Lp64 => DataModel::Lp64,
            Target::M68k => DataModel::M68k,
        }
    }
}

#[derive(ClapParser, Debug)]
#[command(name = "structc")]
#[command(version)]
#[command(about = "C compiler front half with struct layout and member resolution", long_about = None)]
struct Args {
    /// Input C source file
    #[arg(required = true)]
    input: PathBuf,

    /// Write the IR text to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target data model
    #[arg(short, long, value_enum, default_value = "lp64")]
    target: Target,

    /// Deepest accepted type nesting
    #[arg(long, default_value_t = DEFAULT_MAX_TYPE_DEPTH)]
    max_type_depth: usize,

    /// Optimization level (0 disables the IR passes)
    #[arg(short = 'O', long, default_value = "0")]
    optimize: u8,

    /// Dump tokens (for debugging)
    #[arg(long)]
    dump_tokens: bool,

    /// Dump AST (for debugging)
    #[arg(long)]
    dump_ast: bool,

    /// Dump IR
    #[arg(long)]
    dump_ir: bool,

    /// Print the layout of every struct
    #[arg(long)]
    dump_layout: bool,

    /// Run `main` on the IR interpreter
    #[arg(long)]
    run: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Compile (and optionally run) the input; returns the process exit code
fn run(args: &Args) -> Result<i32> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let filename = args.input.display().to_string();

    let mut reporter = DiagnosticReporter::new();
    let file_id = reporter.add_file(&filename, &source);

    let config = FrontendConfig {
        layout: LayoutConfig::new(args.target.into()).with_max_type_depth(args.max_type_depth),
        dump_tokens: args.dump_tokens,
        dump_ast: args.dump_ast,
    };
    let pipeline = Pipeline::new(config).with_optimize_level(args.optimize);

    let compilation = match pipeline.compile_source(&source, &filename) {
        Ok(compilation) => compilation,
        Err(e) => {
            reporter.report_error(file_id, &e);
            return Ok(1);
        }
    };

    emit(args, &compilation)?;

    if args.run {
        match compilation.run("main", ExecConfig::default()) {
            Ok(result) => {
                info!(result, "program exited");
                return Ok(result as i32);
            }
            Err(e) => {
                reporter.report_error(file_id, &e);
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn emit(args: &Args, compilation: &Compilation) -> Result<()> {
    if args.dump_layout {
        print!("{}", compilation.layout_dump());
    }
    if args.dump_ir {
        eprintln!("=== IR ===");
        eprintln!("{}", compilation.module);
        eprintln!("=== End IR ===\n");
    }
    if let Some(path) = &args.output {
        fs::write(path, compilation.module.to_string())
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!(output = %path.display(), "wrote IR");
    }
    Ok(())
}
