//! SELECT CASE checks: the selector must be a scalar of a discrete
//! category, case values must be constants of that category, no two cases
//! may overlap, and DEFAULT may appear at most once.

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode};
use ferro_compiler_parser::ast::{CaseConstruct, CaseValue, Expr, Spanned};

use crate::context::SemanticsContext;
use crate::expr::{expr_rank, expr_type, fold_constant};
use crate::scope::ScopeId;
use crate::types::{ConstValue, TypeDesc};
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct CaseChecker;

impl Checker for CaseChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![(NodeKind::CaseConstruct, Phase::Enter)]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        if let NodeRef::Case(construct) = node {
            self.check_case(ctx, scope, construct);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Category {
    Integer,
    Character,
    Logical,
}

/// Comparable constant; logical values map onto 0 and 1
#[derive(Clone, PartialEq, PartialOrd)]
enum CaseKey {
    Int(i64),
    Str(String),
}

struct CaseInterval {
    lower: Option<CaseKey>,
    upper: Option<CaseKey>,
    span: SimpleSpan<usize>,
}

impl CaseChecker {
    fn check_case(&self, ctx: &mut SemanticsContext, scope: ScopeId, construct: &CaseConstruct) {
        let selector = selector_category(ctx, construct);
        let mut seen: Vec<CaseInterval> = Vec::new();
        let mut default: Option<SimpleSpan<usize>> = None;
        for arm in &construct.arms {
            let Some(values) = &arm.values else {
                match default {
                    Some(previous) => {
                        let diagnostic = Diagnostic::error(
                            DiagnosticCode::DuplicateDefaultCase,
                            "CASE DEFAULT may appear only once in a SELECT CASE".to_string(),
                        )
                        .with_location(arm.span)
                        .with_related_span(previous, "Earlier CASE DEFAULT here".to_string());
                        ctx.add_diagnostic(diagnostic);
                    }
                    None => default = Some(arm.span),
                }
                continue;
            };
            for value in values {
                match value {
                    CaseValue::Single(expr) => {
                        if let Some(key) = case_key(ctx, scope, selector, expr) {
                            let interval = CaseInterval {
                                lower: Some(key.clone()),
                                upper: Some(key),
                                span: expr.span(),
                            };
                            note_interval(ctx, &mut seen, interval);
                        }
                    }
                    CaseValue::Range(lower, upper) => {
                        if selector == Some(Category::Logical) {
                            ctx.error(
                                DiagnosticCode::TypeMismatch,
                                "CASE range is not allowed for a LOGICAL selector".to_string(),
                                arm.span,
                            );
                            continue;
                        }
                        let span = match (lower, upper) {
                            (Some(low), Some(high)) => {
                                SimpleSpan::from(low.span().start..high.span().end)
                            }
                            (Some(low), None) => low.span(),
                            (None, Some(high)) => high.span(),
                            (None, None) => arm.span,
                        };
                        let lower = lower.as_ref().map(|expr| case_key(ctx, scope, selector, expr));
                        let upper = upper.as_ref().map(|expr| case_key(ctx, scope, selector, expr));
                        match (lower, upper) {
                            (Some(None), _) | (_, Some(None)) => {}
                            (lower, upper) => {
                                let interval = CaseInterval {
                                    lower: lower.flatten(),
                                    upper: upper.flatten(),
                                    span,
                                };
                                note_interval(ctx, &mut seen, interval);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn selector_category(ctx: &mut SemanticsContext, construct: &CaseConstruct) -> Option<Category> {
    if expr_rank(ctx, &construct.selector).is_some_and(|rank| rank > 0) {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            "SELECT CASE expression must be scalar".to_string(),
            construct.selector.span(),
        );
    }
    match expr_type(ctx, &construct.selector)? {
        TypeDesc::Integer { .. } => Some(Category::Integer),
        TypeDesc::Character { .. } => Some(Category::Character),
        TypeDesc::Logical { .. } => Some(Category::Logical),
        TypeDesc::Real { .. } | TypeDesc::Derived(_) => {
            ctx.error(
                DiagnosticCode::InvalidOperandType,
                "SELECT CASE expression must be INTEGER, CHARACTER, or LOGICAL".to_string(),
                construct.selector.span(),
            );
            None
        }
    }
}

/// Fold one case value and check it against the selector category
fn case_key(
    ctx: &mut SemanticsContext,
    scope: ScopeId,
    selector: Option<Category>,
    expr: &Spanned<Expr>,
) -> Option<CaseKey> {
    let Some(value) = fold_constant(ctx, scope, expr) else {
        ctx.error(
            DiagnosticCode::NonConstantExpression,
            "CASE value must be a constant expression".to_string(),
            expr.span(),
        );
        return None;
    };
    let (category, key) = match value {
        ConstValue::Int(n) => (Category::Integer, CaseKey::Int(n)),
        ConstValue::Logical(b) => (Category::Logical, CaseKey::Int(b as i64)),
        ConstValue::Char(s) => (Category::Character, CaseKey::Str(s)),
        ConstValue::Real(_) => {
            ctx.error(
                DiagnosticCode::TypeMismatch,
                "CASE value must be INTEGER, CHARACTER, or LOGICAL".to_string(),
                expr.span(),
            );
            return None;
        }
    };
    if selector.is_some_and(|selector| selector != category) {
        ctx.error(
            DiagnosticCode::TypeMismatch,
            "CASE value type does not match the SELECT CASE expression".to_string(),
            expr.span(),
        );
        return None;
    }
    Some(key)
}

fn note_interval(ctx: &mut SemanticsContext, seen: &mut Vec<CaseInterval>, interval: CaseInterval) {
    if let Some(previous) = seen.iter().find(|previous| overlaps(previous, &interval)) {
        let diagnostic = Diagnostic::error(
            DiagnosticCode::OverlappingCase,
            "CASE value overlaps an earlier case".to_string(),
        )
        .with_location(interval.span)
        .with_related_span(previous.span, "Earlier case here".to_string());
        ctx.add_diagnostic(diagnostic);
    }
    seen.push(interval);
}

fn overlaps(a: &CaseInterval, b: &CaseInterval) -> bool {
    lower_at_most(&a.lower, &b.upper) && lower_at_most(&b.lower, &a.upper)
}

/// `lower <= upper`, where a missing bound is unbounded on its side
fn lower_at_most(lower: &Option<CaseKey>, upper: &Option<CaseKey>) -> bool {
    match (lower, upper) {
        (None, _) | (_, None) => true,
        (Some(lower), Some(upper)) => lower <= upper,
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_disjoint_cases_are_quiet() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 2\n\
             select case (n)\n\
             case (1)\n\
             y = 1\n\
             case (2, 4:6)\n\
             y = 2\n\
             case default\n\
             y = 0\n\
             end select\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_duplicate_value_overlaps() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 1\n\
             select case (n)\n\
             case (3)\n\
             y = 1\n\
             case (3)\n\
             y = 2\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value overlaps an earlier case");
    }

    #[test]
    fn test_overlapping_ranges() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 1\n\
             select case (n)\n\
             case (1:5)\n\
             y = 1\n\
             case (3:8)\n\
             y = 2\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value overlaps an earlier case");
    }

    #[test]
    fn test_open_range_overlap() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 1\n\
             select case (n)\n\
             case (:5)\n\
             y = 1\n\
             case (2)\n\
             y = 2\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value overlaps an earlier case");
    }

    #[test]
    fn test_real_selector_is_rejected() {
        let ctx = analyze(
            "program p\n\
             real x\n\
             x = 1.0\n\
             select case (x)\n\
             case default\n\
             x = 0.0\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "SELECT CASE expression must be INTEGER, CHARACTER, or LOGICAL");
    }

    #[test]
    fn test_value_type_must_match_selector() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 1\n\
             select case (n)\n\
             case ('a')\n\
             y = 1\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value type does not match the SELECT CASE expression");
    }

    #[test]
    fn test_duplicate_default() {
        let ctx = analyze(
            "program p\n\
             integer n, y\n\
             n = 1\n\
             select case (n)\n\
             case default\n\
             y = 0\n\
             case default\n\
             y = 1\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE DEFAULT may appear only once in a SELECT CASE");
    }

    #[test]
    fn test_non_constant_case_value() {
        let ctx = analyze(
            "program p\n\
             integer n, m, y\n\
             n = 1\n\
             m = 2\n\
             select case (n)\n\
             case (m)\n\
             y = 1\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value must be a constant expression");
    }

    #[test]
    fn test_logical_selector_rejects_ranges() {
        let ctx = analyze(
            "program p\n\
             logical q\n\
             integer y\n\
             q = .true.\n\
             select case (q)\n\
             case (.false.:.true.)\n\
             y = 1\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE range is not allowed for a LOGICAL selector");
    }

    #[test]
    fn test_character_cases() {
        let ctx = analyze(
            "program p\n\
             character(4) :: cmd\n\
             integer y\n\
             cmd = 'stop'\n\
             select case (cmd)\n\
             case ('go')\n\
             y = 1\n\
             case ('stop')\n\
             y = 2\n\
             case ('stop')\n\
             y = 3\n\
             end select\n\
             end program\n",
        );
        assert_error(&ctx, "CASE value overlaps an earlier case");
    }
}
