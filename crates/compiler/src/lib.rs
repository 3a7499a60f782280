//! Ferro compiler library

use std::path::{Path, PathBuf};

use ferro_compiler_diagnostics::Diagnostic;
use ferro_compiler_parser::{parse_source, Program};
use ferro_compiler_semantic::{
    DefaultKinds, LanguageFeatures, Semantics, SemanticsContext, TargetCharacteristics,
};

/// Result type for compilation operations
pub type Result<T> = std::result::Result<T, CompilerError>;

/// Errors that can occur during compilation
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("could not read '{}'", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("{} parse error(s)", .0.len())]
    ParseErrors(Vec<Diagnostic>),
    #[error("{} semantic error(s)", .0.len())]
    SemanticErrors(Vec<Diagnostic>),
}

impl CompilerError {
    /// The diagnostics behind a parse or semantic failure
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Io(..) => &[],
            Self::ParseErrors(diagnostics) | Self::SemanticErrors(diagnostics) => diagnostics,
        }
    }
}

/// Options for compilation
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub features: LanguageFeatures,
    pub default_kinds: DefaultKinds,
    pub target: TargetCharacteristics,
    pub warnings_are_errors: bool,
    /// Stop emitting messages once this many errors have been rendered
    pub max_errors: usize,
    /// Directory module files are written to and read from
    pub module_directory: Option<PathBuf>,
    /// Inline used modules into written module files
    pub hermetic_module_files: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            features: LanguageFeatures::default(),
            default_kinds: DefaultKinds::default(),
            target: TargetCharacteristics::default(),
            warnings_are_errors: false,
            max_errors: usize::MAX,
            module_directory: None,
            hermetic_module_files: false,
        }
    }
}

/// A successfully analyzed program with the context that checked it
pub struct CompilerOutput {
    pub program: Program,
    pub context: SemanticsContext,
    /// Warnings the analysis produced
    pub warnings: Vec<Diagnostic>,
}

/// Build the semantics context a compilation runs in
pub fn build_context(options: &CompilerOptions) -> SemanticsContext {
    let mut ctx = SemanticsContext::new(
        options.features.clone(),
        options.default_kinds,
        options.target.clone(),
    )
    .with_warnings_as_errors(options.warnings_are_errors)
    .with_max_errors(options.max_errors)
    .with_hermetic_module_files(options.hermetic_module_files);
    if let Some(dir) = &options.module_directory {
        ctx = ctx.with_module_directory(dir.clone());
    }
    ctx
}

/// Compile Ferro source text through parsing and semantic analysis
pub fn compile_source(source: &str, options: CompilerOptions) -> Result<CompilerOutput> {
    let parsed = parse_source(source);
    if !parsed.diagnostics.is_empty() {
        return Err(CompilerError::ParseErrors(parsed.diagnostics));
    }
    let mut program = parsed.program;
    let mut ctx = build_context(&options);
    let ok = Semantics::new(&mut ctx, &mut program).perform();
    if !ok {
        ctx.sink_mut().sort_by_position();
        return Err(CompilerError::SemanticErrors(ctx.sink().all().to_vec()));
    }
    let warnings = ctx.sink().warnings().into_iter().cloned().collect();
    Ok(CompilerOutput {
        program,
        context: ctx,
        warnings,
    })
}

/// Compile a `.fer` file
pub fn compile_file(path: &Path, options: CompilerOptions) -> Result<CompilerOutput> {
    let source = std::fs::read_to_string(path)
        .map_err(|error| CompilerError::Io(path.to_path_buf(), error))?;
    compile_source(&source, options)
}
