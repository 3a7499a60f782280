//! DATA statements in the execution part are validated in place; the
//! initializer images themselves are compiled later, once for the whole
//! program, so a statement checked here is expanded against a scratch
//! image map and the result thrown away.

use ferro_compiler_parser::ast::Stmt;

use crate::context::SemanticsContext;
use crate::data_init;
use crate::scope::ScopeId;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct DataChecker;

impl Checker for DataChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![(NodeKind::Data, Phase::Enter)]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        let NodeRef::Stmt(stmt) = node else { return };
        let Stmt::Data(data) = &stmt.value else { return };
        let mut images = data_init::ImageMap::default();
        data_init::expand_data_stmt(ctx, scope, data, &mut images);
    }
}

#[cfg(test)]
mod tests {
    use crate::checkers::testing::{analyze, assert_error, assert_quiet};

    #[test]
    fn test_execution_part_data_is_quiet() {
        let ctx = analyze(
            "program p\n\
             integer a(2), n\n\
             n = 1\n\
             data a /1, 2/\n\
             end program\n",
        );
        assert_quiet(&ctx);
    }

    #[test]
    fn test_execution_part_count_mismatch() {
        let ctx = analyze(
            "program p\n\
             integer a(3), n\n\
             n = 1\n\
             data a /1, 2/\n\
             end program\n",
        );
        assert_error(&ctx, "DATA statement set has more objects than values");
    }

    #[test]
    fn test_implied_do_variable_shadows_do_variable() {
        let ctx = analyze(
            "program p\n\
             integer a(3), i\n\
             do i = 1, 3\n\
             data (a(i), i = 1, 3) /1, 2, 3/\n\
             end do\n\
             end program\n",
        );
        assert_error(&ctx, "Cannot redefine DO variable 'i'");
    }

    #[test]
    fn test_entity_initializer_collision() {
        let ctx = analyze(
            "program p\n\
             integer :: n = 5\n\
             integer m\n\
             m = 0\n\
             data n /2/\n\
             end program\n",
        );
        assert_error(&ctx, "'n' is initialized more than once");
    }
}
