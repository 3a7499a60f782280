//! # Statement Checkers
//!
//! Pass 2 over the execution parts: each file here holds one [`Checker`]
//! enforcing the statement-level rules for its corner of the language.
//! [`statement_checkers`] composes them into the visitor the driver runs
//! after the expression pass; the extension checkers are built separately
//! so the driver can gate each walk on its language feature.

mod assignment;
mod call;
mod case;
mod data;
mod do_forall;
mod extensions;
mod if_arith;
mod misc;
mod return_stop;

pub use assignment::AssignmentChecker;
pub use call::CallChecker;
pub use case::CaseChecker;
pub use data::DataChecker;
pub use do_forall::DoForallChecker;
pub use extensions::{OffloadChecker, ParallelChecker, SimdChecker};
pub use if_arith::IfChecker;
pub use misc::MiscChecker;
pub use return_stop::ReturnStopChecker;

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{Expr, Spanned};

use crate::context::SemanticsContext;
use crate::expr::{expr_rank, expr_type};
use crate::visitor::CheckerVisitor;

/// The composed pass 2 visitor
pub fn statement_checkers() -> CheckerVisitor {
    CheckerVisitor::new()
        .register(AssignmentChecker)
        .register(DoForallChecker)
        .register(IfChecker)
        .register(CaseChecker)
        .register(CallChecker)
        .register(ReturnStopChecker)
        .register(DataChecker)
        .register(MiscChecker)
}

pub fn parallel_checkers() -> CheckerVisitor {
    CheckerVisitor::new().register(ParallelChecker)
}

pub fn offload_checkers() -> CheckerVisitor {
    CheckerVisitor::new().register(OffloadChecker)
}

pub fn simd_checkers() -> CheckerVisitor {
    CheckerVisitor::new().register(SimdChecker::default())
}

/// Require a scalar LOGICAL expression, as IF conditions, DO WHILE
/// conditions, and FORALL masks do
pub(super) fn check_logical_condition(
    ctx: &mut SemanticsContext,
    expr: &Spanned<Expr>,
    what: &str,
) {
    let ty = expr_type(ctx, expr);
    let rank = expr_rank(ctx, expr);
    if ty.is_some_and(|ty| !ty.is_logical()) || rank.is_some_and(|rank| rank > 0) {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            format!("{what} must be a scalar LOGICAL expression"),
            expr.span(),
        );
    }
}

/// Require a scalar integer expression, as loop limits and steps do
pub(super) fn check_scalar_integer(ctx: &mut SemanticsContext, expr: &Spanned<Expr>, what: &str) {
    let ty = expr_type(ctx, expr);
    let rank = expr_rank(ctx, expr);
    if ty.is_some_and(|ty| !ty.is_integer()) || rank.is_some_and(|rank| rank > 0) {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            format!("{what} must be a scalar integer expression"),
            expr.span(),
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use ferro_compiler_parser::ast::{Block, ProgramUnit};
    use ferro_compiler_parser::parse_source;

    use crate::canonicalize::{canonicalize_do, canonicalize_extensions};
    use crate::check_expressions::ExprChecker;
    use crate::context::SemanticsContext;
    use crate::features::{DefaultKinds, LanguageExtensions, LanguageFeatures, TargetCharacteristics};
    use crate::resolve_names::resolve_names;
    use crate::rewrite::rewrite_function_refs;
    use crate::scope::ScopeId;
    use crate::visitor::CheckerVisitor;

    fn unit_execution(unit: &ProgramUnit) -> Option<(&str, &Block)> {
        match unit {
            ProgramUnit::Main(main) => Some((
                main.name.as_ref().map_or("", |name| name.as_str()),
                &main.body.execution,
            )),
            ProgramUnit::Function(function) => {
                Some((function.name.as_str(), &function.body.execution))
            }
            ProgramUnit::Subroutine(subroutine) => {
                Some((subroutine.name.as_str(), &subroutine.body.execution))
            }
            ProgramUnit::Module(_) | ProgramUnit::BlockData(_) => None,
        }
    }

    fn scope_named(ctx: &SemanticsContext, name: &str) -> ScopeId {
        ctx.scopes
            .iter()
            .find(|(_, scope)| scope.name == name)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no scope named '{name}'"))
    }

    fn walk_units(
        ctx: &mut SemanticsContext,
        units: &[ProgramUnit],
        visitor: &mut CheckerVisitor,
    ) -> bool {
        let mut ok = true;
        for unit in units {
            if let Some((name, execution)) = unit_execution(unit) {
                let scope = scope_named(ctx, name);
                ok &= visitor.walk(ctx, scope, execution);
            }
        }
        ok
    }

    /// Run the front half of the pipeline and both checking passes, plus
    /// any extension walks the features enable
    pub fn analyze_with(source: &str, features: LanguageFeatures) -> SemanticsContext {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut program = output.program;
        let mut ctx =
            SemanticsContext::new(features, DefaultKinds::default(), TargetCharacteristics::default());
        let ok = canonicalize_do(&mut ctx, &mut program)
            && canonicalize_extensions(&mut ctx, &mut program)
            && resolve_names(&mut ctx, &mut program)
            && rewrite_function_refs(&ctx, &mut program);
        if !ok {
            return ctx;
        }
        let mut pass1 = CheckerVisitor::new().register(ExprChecker);
        if !walk_units(&mut ctx, &program.units, &mut pass1) {
            return ctx;
        }
        if !walk_units(&mut ctx, &program.units, &mut super::statement_checkers()) {
            return ctx;
        }
        for (extension, mut visitor) in [
            (LanguageExtensions::PARALLEL, super::parallel_checkers()),
            (LanguageExtensions::OFFLOAD, super::offload_checkers()),
            (LanguageExtensions::SIMD, super::simd_checkers()),
        ] {
            if ctx.features.is_enabled(extension) {
                walk_units(&mut ctx, &program.units, &mut visitor);
            }
        }
        ctx
    }

    pub fn analyze(source: &str) -> SemanticsContext {
        analyze_with(source, LanguageFeatures::default())
    }

    #[track_caller]
    pub fn assert_error(ctx: &SemanticsContext, fragment: &str) {
        assert!(
            ctx.sink()
                .errors()
                .iter()
                .any(|diagnostic| diagnostic.message.contains(fragment)),
            "no error containing {fragment:?}: {:?}",
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
            "no warning containing {fragment:?}: {:?}",
            ctx.sink().all()
        );
    }

    #[track_caller]
    pub fn assert_quiet(ctx: &SemanticsContext) {
        assert!(ctx.sink().is_empty(), "{:?}", ctx.sink().all());
    }
}
