//! RETURN placement and STOP code checks.

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{Expr, Spanned, Stmt};

use crate::context::SemanticsContext;
use crate::expr::{expr_rank, expr_type, fold_int_expr};
use crate::scope::ScopeId;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct ReturnStopChecker;

impl Checker for ReturnStopChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![(NodeKind::Return, Phase::Enter), (NodeKind::Stop, Phase::Enter)]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        let NodeRef::Stmt(stmt) = node else { return };
        match &stmt.value {
            Stmt::Return => check_return(ctx),
            Stmt::Stop { code: Some(code) } => check_stop_code(ctx, scope, code),
            _ => {}
        }
    }
}

fn check_return(ctx: &mut SemanticsContext) {
    // Locate the enclosing unit from the statement position rather than the
    // walked scope, so RETURN inside internal constructs still resolves.
    let Some(span) = ctx.location() else { return };
    let unit = ctx.scopes.enclosing_unit(ctx.find_scope(span.start));
    if !ctx.scopes.scope(unit).kind.allows_return() {
        ctx.error(
            DiagnosticCode::MisplacedStatement,
            "RETURN may only appear in a function or subroutine".to_string(),
            span,
        );
    }
}

fn check_stop_code(ctx: &mut SemanticsContext, scope: ScopeId, code: &Spanned<Expr>) {
    let ty = expr_type(ctx, code);
    let rank = expr_rank(ctx, code);
    if rank.is_some_and(|rank| rank > 0)
        || ty.is_some_and(|ty| !ty.is_integer() && !ty.is_character())
    {
        ctx.error(
            DiagnosticCode::InvalidStopCode,
            "STOP code must be a scalar INTEGER or CHARACTER expression".to_string(),
            code.span(),
        );
        return;
    }
    if ty.is_some_and(|ty| ty.is_integer()) {
        if let Some(n) = fold_int_expr(ctx, scope, code) {
            if n < 0 {
                ctx.error(
                    DiagnosticCode::InvalidStopCode,
                    format!("STOP code ({n}) must not be negative"),
                    code.span(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_return_in_subroutine_is_quiet() {
        let ctx = analyze(
            "subroutine s(n)\n\
             integer n\n\
             if (n > 0) return\n\
             n = 1\n\
             end subroutine\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_return_in_main_program() {
        let ctx = analyze(
            "program p\n\
             return\n\
             end program\n",
        );
        assert_error(&ctx, "RETURN may only appear in a function or subroutine");
    }

    #[test]
    fn test_stop_codes_are_quiet() {
        let ctx = analyze(
            "program p\n\
             integer n\n\
             n = 1\n\
             if (n > 4) then\n\
             stop 7\n\
             end if\n\
             stop 'done'\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_negative_stop_code() {
        let ctx = analyze(
            "program p\n\
             stop -1\n\
             end program\n",
        );
        assert_error(&ctx, "STOP code (-1) must not be negative");
    }

    #[test]
    fn test_logical_stop_code() {
        let ctx = analyze(
            "program p\n\
             stop .true.\n\
             end program\n",
        );
        assert_error(&ctx, "STOP code must be a scalar INTEGER or CHARACTER expression");
    }

    #[test]
    fn test_array_stop_code() {
        let ctx = analyze(
            "program p\n\
             integer codes(3)\n\
             stop codes\n\
             end program\n",
        );
        assert_error(&ctx, "STOP code must be a scalar INTEGER or CHARACTER expression");
    }
}
