//! ENTRY placement and assigned-GOTO variable checks.

use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode};
use ferro_compiler_parser::ast::{Name, Stmt};

use crate::context::SemanticsContext;
use crate::scope::ScopeId;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct MiscChecker;

impl Checker for MiscChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::Entry, Phase::Enter),
            (NodeKind::AssignLabel, Phase::Enter),
            (NodeKind::AssignedGoto, Phase::Enter),
        ]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        _scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        let NodeRef::Stmt(stmt) = node else { return };
        match &stmt.value {
            Stmt::Entry { .. } => {
                if ctx.construct_depth() > 0 {
                    ctx.error(
                        DiagnosticCode::MisplacedEntry,
                        "ENTRY may not appear within an executable construct".to_string(),
                        stmt.span,
                    );
                }
            }
            Stmt::AssignLabel { var, .. } => {
                check_goto_variable(ctx, var);
                if let Some(id) = var.symbol {
                    ctx.check_index_var_redefine(id, var.span);
                    ctx.note_defined(id);
                }
            }
            Stmt::AssignedGoto { var, .. } => check_goto_variable(ctx, var),
            _ => {}
        }
    }
}

/// The variable of ASSIGN and assigned GOTO must be a default-kind integer
/// scalar variable.
fn check_goto_variable(ctx: &mut SemanticsContext, name: &Name) {
    let Some(id) = name.symbol else { return };
    let ultimate = ctx.ultimate(id);
    let symbol = ctx.symbol(ultimate);
    let decl_span = symbol.span;
    let ok = match symbol.object() {
        Some(object) if !symbol.is_named_constant() => {
            let Some(decl_type) = &object.decl_type else { return };
            object.rank() == 0 && decl_type.is_default_integer(&ctx.default_kinds)
        }
        _ => false,
    };
    if !ok {
        let diagnostic = Diagnostic::error(
            DiagnosticCode::InvalidAssignedGoto,
            format!("'{}' must be a default integer scalar variable", name.as_str()),
        )
        .with_location(name.span)
        .with_related_span(decl_span, format!("Declaration of '{}'", name.as_str()));
        ctx.add_diagnostic(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_assigned_goto_is_quiet() {
        let ctx = analyze(
            "program p\n\
             integer target\n\
             assign 10 to target\n\
             goto target (10, 20)\n\
             10 continue\n\
             20 continue\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_entry_inside_construct() {
        let ctx = analyze(
            "subroutine s(n)\n\
             integer n\n\
             do n = 1, 3\n\
             entry inner(n)\n\
             end do\n\
             end subroutine\n",
        );
        assert_error(&ctx, "ENTRY may not appear within an executable construct");
    }

    #[test]
    fn test_assign_to_real_variable() {
        let ctx = analyze(
            "program p\n\
             real x\n\
             assign 10 to x\n\
             10 continue\n\
             end program\n",
        );
        assert_error(&ctx, "'x' must be a default integer scalar variable");
    }

    #[test]
    fn test_assigned_goto_through_array() {
        let ctx = analyze(
            "program p\n\
             integer marks(2)\n\
             goto marks (10, 20)\n\
             10 continue\n\
             20 continue\n\
             end program\n",
        );
        assert_error(&ctx, "'marks' must be a default integer scalar variable");
    }

    #[test]
    fn test_assign_to_do_variable() {
        let ctx = analyze(
            "program p\n\
             integer i\n\
             do i = 1, 3\n\
             assign 10 to i\n\
             end do\n\
             10 continue\n\
             end program\n",
        );
        assert_error(&ctx, "Cannot redefine DO variable 'i'");
    }
}
