//! Assignment checks: the target must be a definable variable, the value
//! must be convertible to its type and conformable with its rank, and
//! defining an active loop index variable is fatal.

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{Expr, Spanned, Stmt, Variable};

use crate::context::SemanticsContext;
use crate::expr::{expr_rank, expr_type};
use crate::mod_file::is_opaque_builtin_type;
use crate::scope::ScopeId;
use crate::symbol::SymbolDetails;
use crate::types::{describe_type, TypeDesc};
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct AssignmentChecker;

impl Checker for AssignmentChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![(NodeKind::Assignment, Phase::Enter)]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        _scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        if let NodeRef::Stmt(stmt) = node {
            if let Stmt::Assignment { target, value } = &stmt.value {
                check_assignment(ctx, target, value);
            }
        }
    }
}

/// Statement-level assignment rules, shared with the FORALL checker
pub(super) fn check_assignment(
    ctx: &mut SemanticsContext,
    target: &Variable,
    value: &Spanned<Expr>,
) {
    let Some(id) = target.name.symbol else {
        return;
    };
    let ultimate = ctx.ultimate(id);
    if ctx.symbol(ultimate).is_named_constant() {
        ctx.error(
            DiagnosticCode::InvalidAssignment,
            format!(
                "Named constant '{}' may not be assigned",
                target.name.as_str()
            ),
            target.name.span,
        );
        return;
    }
    if !matches!(ctx.symbol(ultimate).details, SymbolDetails::Object(_)) {
        ctx.error(
            DiagnosticCode::InvalidAssignment,
            format!("'{}' is not a variable", target.name.as_str()),
            target.name.span,
        );
        return;
    }
    ctx.check_index_var_redefine(id, target.name.span);
    ctx.note_defined(id);
    if ctx.has_error(id) {
        return;
    }

    let target_type = ctx.symbol(ultimate).type_desc().copied();
    if let Some(TypeDesc::Derived(type_symbol)) = target_type {
        let type_symbol = ctx.ultimate(type_symbol);
        if is_opaque_builtin_type(&ctx.symbol(type_symbol).name) {
            let type_name = ctx.symbol(type_symbol).name.clone();
            ctx.error(
                DiagnosticCode::InvalidAssignment,
                format!("Assignment to an object of opaque type '{type_name}' is not allowed"),
                target.name.span,
            );
            return;
        }
    }

    let value_type = expr_type(ctx, value);
    if let (Some(to), Some(from)) = (&target_type, &value_type) {
        if !assignment_compatible(ctx, to, from) {
            let message = format!(
                "Value of type {} cannot be assigned to target of type {}",
                describe_type(from, &ctx.symbols),
                describe_type(to, &ctx.symbols)
            );
            ctx.error(DiagnosticCode::TypeMismatch, message, value.span());
        }
    }

    let target_rank = if target.subscripts.is_some() {
        0
    } else {
        ctx.symbol(ultimate)
            .object()
            .map_or(0, |object| object.rank())
    };
    if let Some(value_rank) = expr_rank(ctx, value) {
        if value_rank > 0 && value_rank != target_rank {
            ctx.error(
                DiagnosticCode::RankMismatch,
                format!(
                    "Value of rank {value_rank} cannot be assigned to a target of rank {target_rank}"
                ),
                value.span(),
            );
        }
    }
}

fn assignment_compatible(ctx: &SemanticsContext, target: &TypeDesc, value: &TypeDesc) -> bool {
    match (target, value) {
        (TypeDesc::Derived(to), TypeDesc::Derived(from)) => {
            ctx.ultimate(*to) == ctx.ultimate(*from)
        }
        _ => {
            (target.is_numeric() && value.is_numeric())
                || (target.is_character() && value.is_character())
                || (target.is_logical() && value.is_logical())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_plain_assignments_are_quiet() {
        let ctx = analyze(
            "program p\n\
             integer i\n\
             real x\n\
             i = 2\n\
             x = i + 1\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_named_constant_target() {
        let ctx = analyze(
            "program p\n\
             integer, parameter :: n = 3\n\
             n = 4\n\
             end program\n",
        );
        assert_error(&ctx, "Named constant 'n' may not be assigned");
    }

    #[test]
    fn test_subprogram_target() {
        let ctx = analyze(
            "program p\n\
             call s\n\
             s = 1\n\
             end program\n\
             subroutine s\n\
             end subroutine\n",
        );
        assert_error(&ctx, "'s' is not a variable");
    }

    #[test]
    fn test_character_value_for_integer_target() {
        let ctx = analyze(
            "program p\n\
             integer i\n\
             i = 'a'\n\
             end program\n",
        );
        assert_error(
            &ctx,
            "Value of type CHARACTER(1) cannot be assigned to target of type INTEGER(4)",
        );
    }

    #[test]
    fn test_logical_value_for_integer_target() {
        let ctx = analyze(
            "program p\n\
             integer i\n\
             i = .true.\n\
             end program\n",
        );
        assert_error(&ctx, "cannot be assigned to target of type INTEGER(4)");
    }

    #[test]
    fn test_rank_mismatch() {
        let ctx = analyze(
            "program p\n\
             integer a(3), b(3, 3)\n\
             a = b\n\
             end program\n",
        );
        assert_error(&ctx, "Value of rank 2 cannot be assigned to a target of rank 1");
    }

    #[test]
    fn test_scalar_broadcast_is_allowed() {
        let ctx = analyze(
            "program p\n\
             integer a(3)\n\
             a = 0\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_derived_type_mismatch() {
        let ctx = analyze(
            "program p\n\
             type point\n\
             integer x\n\
             end type\n\
             type speed\n\
             integer v\n\
             end type\n\
             type(point) :: a\n\
             type(speed) :: b\n\
             a = b\n\
             end program\n",
        );
        assert_error(
            &ctx,
            "Value of type TYPE(speed) cannot be assigned to target of type TYPE(point)",
        );
    }

    #[test]
    fn test_opaque_builtin_type_target() {
        let ctx = analyze(
            "program p\n\
             type __builtin_lock_type\n\
             integer __count\n\
             end type\n\
             type(__builtin_lock_type) :: lk, mirror\n\
             lk = mirror\n\
             end program\n",
        );
        assert_error(
            &ctx,
            "Assignment to an object of opaque type '__builtin_lock_type' is not allowed",
        );
    }

    #[test]
    fn test_same_derived_type_is_allowed() {
        let ctx = analyze(
            "program p\n\
             type point\n\
             integer x\n\
             end type\n\
             type(point) :: a, b\n\
             a = b\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }
}
