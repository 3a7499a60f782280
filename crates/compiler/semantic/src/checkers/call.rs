//! CALL statement checks: the callee must be a subroutine, argument counts
//! must match explicit interfaces, and actual arguments are treated as
//! possibly defined by the call.

use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode};
use ferro_compiler_parser::ast::{Expr, Stmt};

use crate::context::SemanticsContext;
use crate::scope::ScopeId;
use crate::symbol::{SymbolDetails, SymbolFlags};
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct CallChecker;

enum Callee {
    Function,
    Subroutine { dummy_count: usize },
    Intrinsic,
    Other,
}

impl Checker for CallChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![(NodeKind::Call, Phase::Enter)]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        _scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        let NodeRef::Stmt(stmt) = node else { return };
        let Stmt::Call { name, args } = &stmt.value else { return };

        if let Some(id) = name.symbol {
            let ultimate = ctx.ultimate(id);
            let symbol = ctx.symbol(ultimate);
            let flags = symbol.flags;
            let decl_span = symbol.span;
            let callee = match &symbol.details {
                SymbolDetails::Subprogram(sub) if sub.is_function => Callee::Function,
                SymbolDetails::Subprogram(sub) => Callee::Subroutine {
                    dummy_count: sub.dummy_args.len(),
                },
                SymbolDetails::Intrinsic => Callee::Intrinsic,
                _ => Callee::Other,
            };
            match callee {
                Callee::Function => ctx.error(
                    DiagnosticCode::InvalidFunctionCall,
                    format!("Cannot call function '{}' like a subroutine", name.as_str()),
                    name.span,
                ),
                Callee::Intrinsic => ctx.error(
                    DiagnosticCode::InvalidFunctionCall,
                    format!("Cannot call intrinsic function '{}' like a subroutine", name.as_str()),
                    name.span,
                ),
                Callee::Other => ctx.error(
                    DiagnosticCode::InvalidFunctionCall,
                    format!("'{}' is not a subroutine", name.as_str()),
                    name.span,
                ),
                Callee::Subroutine { dummy_count } => {
                    // Implicitly declared externals have no known interface.
                    if !flags.contains(SymbolFlags::IMPLICIT) && dummy_count != args.len() {
                        let diagnostic = Diagnostic::error(
                            DiagnosticCode::InvalidFunctionCall,
                            format!(
                                "Actual argument count ({}) does not match dummy argument count ({dummy_count})",
                                args.len()
                            ),
                        )
                        .with_location(name.span)
                        .with_related_span(
                            decl_span,
                            format!("Declaration of '{}'", name.as_str()),
                        );
                        ctx.add_diagnostic(diagnostic);
                    }
                }
            }
        }

        for arg in args {
            if let Expr::Named(arg_name) = arg.value() {
                if let Some(arg_id) = arg_name.symbol {
                    ctx.warn_index_var_redefine(arg_id, arg.span());
                    ctx.note_defined(arg_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet, assert_warning};

    #[test]
    fn test_matching_call_is_quiet() {
        let ctx = analyze(
            "subroutine swap(a, b)\n\
             integer a, b, t\n\
             t = a\n\
             a = b\n\
             b = t\n\
             end subroutine\n\
             program p\n\
             integer x, y\n\
             x = 1\n\
             y = 2\n\
             call swap(x, y)\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_calling_a_function() {
        let ctx = analyze(
            "function f(n)\n\
             integer f, n\n\
             f = n\n\
             end function\n\
             program p\n\
             call f(3)\n\
             end program\n",
        );
        assert_error(&ctx, "Cannot call function 'f' like a subroutine");
    }

    #[test]
    fn test_argument_count_mismatch() {
        let ctx = analyze(
            "subroutine s(a, b)\n\
             integer a, b\n\
             a = b\n\
             end subroutine\n\
             program p\n\
             call s(1)\n\
             end program\n",
        );
        assert_error(&ctx, "Actual argument count (1) does not match dummy argument count (2)");
    }

    #[test]
    fn test_calling_a_variable() {
        let ctx = analyze(
            "program p\n\
             integer x\n\
             x = 1\n\
             call x\n\
             end program\n",
        );
        assert_error(&ctx, "'x' is not a subroutine");
    }

    #[test]
    fn test_implicit_external_call_is_quiet() {
        let ctx = analyze(
            "program p\n\
             call helper(1, 2)\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_index_variable_as_actual_argument() {
        let ctx = analyze(
            "program p\n\
             integer i, total\n\
             total = 0\n\
             do i = 1, 3\n\
             call bump(total, i)\n\
             end do\n\
             end program\n",
        );
        assert_warning(&ctx, "Possible redefinition of DO variable 'i'");
    }
}
