use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ferro_compiler::build_context;
use ferro_compiler_diagnostics::{build_diagnostic_message, WarningCategory};
use ferro_compiler_parser::parse_source;
use ferro_compiler_semantic::{LanguageExtensions, Semantics};
use tracing::Level;

/// Ferro compiler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file to compile
    #[arg(short, long)]
    input: PathBuf,

    /// Print the symbol table after analysis
    #[arg(long)]
    dump_symbols: bool,

    /// Directory module files are written to and read from
    #[arg(long, value_name = "DIR")]
    module_dir: Option<PathBuf>,

    /// Inline used modules into written module files
    #[arg(long)]
    hermetic_module_files: bool,

    /// Treat warnings as errors
    #[arg(long)]
    warnings_as_errors: bool,

    /// Stop emitting messages after this many errors
    #[arg(long, value_name = "N")]
    max_errors: Option<usize>,

    /// Enable a language extension (parallel, offload, simd)
    #[arg(long = "enable-extension", value_name = "NAME")]
    extensions: Vec<LanguageExtensions>,

    /// Suppress a warning category by name
    #[arg(long = "suppress-warning", value_name = "CATEGORY")]
    suppressed_warnings: Vec<WarningCategory>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).init();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("could not read '{}'", args.input.display()))?;

    let parsed = parse_source(&source);
    if !parsed.diagnostics.is_empty() {
        for diagnostic in &parsed.diagnostics {
            eprint!("{}", build_diagnostic_message(&source, diagnostic, true));
        }
        return Ok(ExitCode::FAILURE);
    }
    let mut program = parsed.program;

    let mut options = ferro_compiler::CompilerOptions {
        warnings_are_errors: args.warnings_as_errors,
        max_errors: args.max_errors.unwrap_or(usize::MAX),
        module_directory: args.module_dir,
        hermetic_module_files: args.hermetic_module_files,
        ..Default::default()
    };
    for extension in args.extensions {
        options.features.enable(extension);
    }
    for category in args.suppressed_warnings {
        options.features.suppress_warning(category);
    }

    let mut ctx = build_context(&options);
    let mut semantics = Semantics::new(&mut ctx, &mut program);
    let ok = semantics.perform();
    semantics
        .emit_messages(&source, &mut std::io::stderr().lock(), true)
        .context("could not write diagnostics")?;
    if args.dump_symbols {
        print!("{}", semantics.dump_symbols());
    }
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
