//! Common test utilities for the semantic integration tests
//!
//! Everything here runs the full [`Semantics`] pipeline the way the
//! compiler driver does: parse, build a context, `perform`. The target is
//! pinned so layout and link names come out the same on every host.

use ferro_compiler_parser::ast::{Program, SymbolId};
use ferro_compiler_parser::parse_source;
use ferro_compiler_semantic::{
    DefaultKinds, LanguageFeatures, ScopeId, Semantics, SemanticsContext, TargetCharacteristics,
};

/// Parse `source`, failing the test on any parse diagnostic
pub fn parse_clean(source: &str) -> Program {
    let output = parse_source(source);
    assert!(
        output.diagnostics.is_empty(),
        "unexpected parse errors: {:?}",
        output.diagnostics
    );
    output.program
}

/// A 16-byte-vector target with underscored link names
pub fn test_target() -> TargetCharacteristics {
    TargetCharacteristics {
        vector_width: Some(16),
        underscoring: true,
    }
}

pub fn test_context(features: LanguageFeatures) -> SemanticsContext {
    SemanticsContext::new(features, DefaultKinds::default(), test_target())
}

/// Run the full pipeline with default features
pub fn analyze(source: &str) -> (SemanticsContext, bool) {
    analyze_in(source, test_context(LanguageFeatures::default()))
}

/// Run the full pipeline through an already configured context
pub fn analyze_in(source: &str, mut ctx: SemanticsContext) -> (SemanticsContext, bool) {
    let mut program = parse_clean(source);
    let ok = Semantics::new(&mut ctx, &mut program).perform();
    (ctx, ok)
}

/// Scope with the given name, anywhere in the tree
#[track_caller]
pub fn scope_named(ctx: &SemanticsContext, name: &str) -> ScopeId {
    ctx.scopes
        .iter()
        .find(|(_, scope)| scope.name == name)
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no scope named '{name}'"))
}

/// Symbol `name` in the scope named `scope`
#[track_caller]
pub fn symbol_in(ctx: &SemanticsContext, scope: &str, name: &str) -> SymbolId {
    ctx.scope(scope_named(ctx, scope))
        .find_symbol(name)
        .unwrap_or_else(|| panic!("no symbol '{name}' in scope '{scope}'"))
}

#[track_caller]
pub fn assert_clean(ctx: &SemanticsContext, ok: bool) {
    assert!(ok, "expected analysis to succeed: {:?}", ctx.sink().all());
    assert!(
        ctx.sink().all().is_empty(),
        "expected no diagnostics: {:?}",
        ctx.sink().all()
    );
}

#[track_caller]
pub fn assert_error(ctx: &SemanticsContext, fragment: &str) {
    assert!(
        ctx.sink()
            .errors()
            .iter()
            .any(|diagnostic| diagnostic.message.contains(fragment)),
        "no error containing {fragment:?}, diagnostics were: {:?}",
        ctx.sink().all()
    );
}

#[track_caller]
pub fn assert_warning(ctx: &SemanticsContext, fragment: &str) {
    assert!(
        ctx.sink()
            .warnings()
            .iter()
            .any(|diagnostic| diagnostic.message.contains(fragment)),
        "no warning containing {fragment:?}, diagnostics were: {:?}",
        ctx.sink().all()
    );
}
