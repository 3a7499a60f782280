//! IF condition checks for both the block construct and the one-line
//! statement form, plus the three-way arithmetic IF.

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{Expr, Spanned, Stmt};

use crate::checkers::check_logical_condition;
use crate::context::SemanticsContext;
use crate::expr::{expr_rank, expr_type};
use crate::scope::ScopeId;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct IfChecker;

impl Checker for IfChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::IfConstruct, Phase::Enter),
            (NodeKind::IfStmt, Phase::Enter),
            (NodeKind::ArithIf, Phase::Enter),
        ]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        _scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        match node {
            NodeRef::If(construct) => {
                for arm in &construct.arms {
                    check_logical_condition(ctx, &arm.cond, "IF condition");
                }
            }
            NodeRef::Stmt(stmt) => match &stmt.value {
                Stmt::IfStmt { cond, .. } => check_logical_condition(ctx, cond, "IF condition"),
                Stmt::ArithIf { expr, .. } => check_arith_if(ctx, expr),
                _ => {}
            },
            _ => {}
        }
    }
}

fn check_arith_if(ctx: &mut SemanticsContext, expr: &Spanned<Expr>) {
    let ty = expr_type(ctx, expr);
    let rank = expr_rank(ctx, expr);
    if ty.is_some_and(|ty| !ty.is_numeric()) || rank.is_some_and(|rank| rank > 0) {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            "Arithmetic IF expression must be a scalar numeric expression".to_string(),
            expr.span(),
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_logical_conditions_are_quiet() {
        let ctx = analyze(
            "program p\n\
             integer n\n\
             n = 1\n\
             if (n > 0) then\n\
             n = 2\n\
             else if (n < 0) then\n\
             n = 3\n\
             end if\n\
             if (n == 2) n = 4\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_integer_block_condition() {
        let ctx = analyze(
            "program p\n\
             integer n\n\
             n = 1\n\
             if (n) then\n\
             n = 2\n\
             end if\n\
             end program\n",
        );
        assert_error(&ctx, "IF condition must be a scalar LOGICAL expression");
    }

    #[test]
    fn test_integer_statement_condition() {
        let ctx = analyze(
            "program p\n\
             integer n\n\
             n = 1\n\
             if (n + 1) n = 2\n\
             end program\n",
        );
        assert_error(&ctx, "IF condition must be a scalar LOGICAL expression");
    }

    #[test]
    fn test_array_condition() {
        let ctx = analyze(
            "program p\n\
             logical flags(4)\n\
             integer n\n\
             if (flags) then\n\
             n = 1\n\
             end if\n\
             end program\n",
        );
        assert_error(&ctx, "IF condition must be a scalar LOGICAL expression");
    }

    #[test]
    fn test_arith_if_logical_expression() {
        let ctx = analyze(
            "program p\n\
             logical q\n\
             q = .true.\n\
             if (q) 10, 20, 30\n\
             10 continue\n\
             20 continue\n\
             30 continue\n\
             end program\n",
        );
        assert_error(&ctx, "Arithmetic IF expression must be a scalar numeric expression");
    }

    #[test]
    fn test_arith_if_numeric_is_quiet() {
        let ctx = analyze(
            "program p\n\
             integer n\n\
             n = -1\n\
             if (n) 10, 20, 30\n\
             10 continue\n\
             20 continue\n\
             30 continue\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }
}
