//! # Expression Checks
//!
//! Pass 1 over the execution parts: every expression is checked for
//! operand legality, rank conformance, and subscript correctness, and
//! constant subexpressions are folded so impossible arithmetic surfaces
//! here. Statement-level requirements (which statements want which types
//! where) belong to the pass 2 checkers.

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{BinaryOp, Expr, Spanned, Stmt, UnaryOp, Variable};

use crate::context::SemanticsContext;
use crate::expr::{self, expr_rank, expr_type, fold_constant};
use crate::scope::ScopeId;
use crate::symbol::SymbolDetails;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct ExprChecker;

impl Checker for ExprChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        use NodeKind::*;
        [
            Assignment,
            IfStmt,
            ArithIf,
            Call,
            Stop,
            Print,
            ForallStmt,
            Data,
            IfConstruct,
            DoConstruct,
            ForallConstruct,
            CaseConstruct,
        ]
        .into_iter()
        .map(|kind| (kind, Phase::Enter))
        .collect()
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        _phase: Phase,
    ) {
        match node {
            NodeRef::Stmt(stmt) => self.check_stmt(ctx, scope, &stmt.value),
            NodeRef::If(c) => {
                for arm in &c.arms {
                    self.examine(ctx, scope, &arm.cond);
                }
            }
            NodeRef::Do(c) => {
                if let Some(control) = &c.control {
                    self.check_loop_control(ctx, scope, control);
                }
            }
            NodeRef::Forall(c) => {
                for header in &c.headers {
                    self.examine(ctx, scope, &header.lower);
                    self.examine(ctx, scope, &header.upper);
                    if let Some(step) = &header.step {
                        self.examine(ctx, scope, step);
                    }
                }
                if let Some(mask) = &c.mask {
                    self.examine(ctx, scope, mask);
                }
            }
            NodeRef::Case(c) => {
                self.examine(ctx, scope, &c.selector);
                for arm in &c.arms {
                    if let Some(values) = &arm.values {
                        for value in values {
                            match value {
                                ferro_compiler_parser::ast::CaseValue::Single(expr) => {
                                    self.check_expr(ctx, scope, expr);
                                }
                                ferro_compiler_parser::ast::CaseValue::Range(lower, upper) => {
                                    if let Some(lower) = lower {
                                        self.check_expr(ctx, scope, lower);
                                    }
                                    if let Some(upper) = upper {
                                        self.check_expr(ctx, scope, upper);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

impl ExprChecker {
    fn check_stmt(&self, ctx: &mut SemanticsContext, scope: ScopeId, stmt: &Stmt) {
        match stmt {
            Stmt::Assignment { target, value } => {
                self.check_variable(ctx, scope, target);
                self.examine(ctx, scope, value);
            }
            Stmt::IfStmt { cond, .. } => self.examine(ctx, scope, cond),
            Stmt::ArithIf { expr, .. } => self.examine(ctx, scope, expr),
            Stmt::Call { args, .. } => {
                for arg in args {
                    self.examine(ctx, scope, arg);
                }
            }
            Stmt::Stop { code: Some(code) } => self.examine(ctx, scope, code),
            Stmt::Print { items } => {
                for item in items {
                    self.examine(ctx, scope, item);
                }
            }
            Stmt::ForallStmt {
                headers,
                mask,
                target,
                value,
            } => {
                for header in headers {
                    self.examine(ctx, scope, &header.lower);
                    self.examine(ctx, scope, &header.upper);
                    if let Some(step) = &header.step {
                        self.examine(ctx, scope, step);
                    }
                }
                if let Some(mask) = mask {
                    self.examine(ctx, scope, mask);
                }
                self.check_variable(ctx, scope, target);
                self.examine(ctx, scope, value);
            }
            Stmt::Data(data) => {
                // Objects only; values are folded by the DATA checker
                for set in &data.sets {
                    for object in &set.objects {
                        self.check_data_object(ctx, scope, object);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_loop_control(
        &self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        control: &ferro_compiler_parser::ast::LoopControl,
    ) {
        use ferro_compiler_parser::ast::LoopControl;
        match control {
            LoopControl::Counted {
                lower, upper, step, ..
            } => {
                self.examine(ctx, scope, lower);
                self.examine(ctx, scope, upper);
                if let Some(step) = step {
                    self.examine(ctx, scope, step);
                }
            }
            LoopControl::While(cond) => self.examine(ctx, scope, cond),
        }
    }

    fn check_data_object(
        &self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        object: &ferro_compiler_parser::ast::DataObject,
    ) {
        use ferro_compiler_parser::ast::DataObject;
        match object {
            DataObject::Variable(variable) => self.check_variable(ctx, scope, variable),
            DataObject::ImpliedDo(implied) => {
                for nested in &implied.objects {
                    self.check_data_object(ctx, scope, nested);
                }
                self.examine(ctx, scope, &implied.lower);
                self.examine(ctx, scope, &implied.upper);
                if let Some(step) = &implied.step {
                    self.examine(ctx, scope, step);
                }
            }
        }
    }

    /// Check an expression tree, then fold it to surface constant
    /// arithmetic errors
    fn examine(&self, ctx: &mut SemanticsContext, scope: ScopeId, expr: &Spanned<Expr>) {
        self.check_expr(ctx, scope, expr);
        fold_constant(ctx, scope, expr);
    }

    fn check_variable(&self, ctx: &mut SemanticsContext, scope: ScopeId, variable: &Variable) {
        if let Some(subscripts) = &variable.subscripts {
            self.check_subscripts(ctx, scope, &variable.name, subscripts);
        }
    }

    fn check_subscripts(
        &self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        name: &ferro_compiler_parser::ast::Name,
        subscripts: &[Spanned<Expr>],
    ) {
        if let Some(id) = name.symbol {
            let ultimate = ctx.ultimate(id);
            if let Some(object) = ctx.symbol(ultimate).object() {
                let rank = object.rank();
                if subscripts.len() != rank {
                    ctx.error(
                        DiagnosticCode::InvalidSubscript,
                        format!(
                            "Reference to '{}' has {} subscripts but rank is {rank}",
                            name.as_str(),
                            subscripts.len()
                        ),
                        name.span,
                    );
                }
            }
        }
        for subscript in subscripts {
            self.examine(ctx, scope, subscript);
            if let Some(ty) = expr_type(ctx, subscript) {
                if !ty.is_integer() {
                    ctx.error(
                        DiagnosticCode::InvalidSubscript,
                        "Subscript must be an integer expression".to_string(),
                        subscript.span(),
                    );
                }
            }
        }
    }

    fn check_expr(&self, ctx: &mut SemanticsContext, scope: ScopeId, expr: &Spanned<Expr>) {
        match expr.value() {
            Expr::IntLiteral(_)
            | Expr::RealLiteral(_)
            | Expr::LogicalLiteral(_)
            | Expr::CharLiteral(_)
            | Expr::Named(_) => {}
            Expr::FunctionRef { name, args } => {
                for arg in args {
                    self.check_expr(ctx, scope, arg);
                }
                self.check_function_ref(ctx, name, args.len(), expr.span());
            }
            Expr::ArrayElement { name, subscripts } => {
                self.check_subscripts(ctx, scope, name, subscripts);
            }
            Expr::Unary { op, operand } => {
                self.check_expr(ctx, scope, operand);
                if let Some(ty) = expr_type(ctx, operand) {
                    let ok = match op {
                        UnaryOp::Plus | UnaryOp::Negate => ty.is_numeric(),
                        UnaryOp::Not => ty.is_logical(),
                    };
                    if !ok {
                        let wanted = match op {
                            UnaryOp::Plus | UnaryOp::Negate => "numeric",
                            UnaryOp::Not => "LOGICAL",
                        };
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!("Operand of unary {} must be {wanted}", unary_symbol(*op)),
                            operand.span(),
                        );
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                self.check_expr(ctx, scope, lhs);
                self.check_expr(ctx, scope, rhs);
                self.check_binary(ctx, *op, lhs, rhs, expr.span());
            }
            Expr::Paren(inner) => self.check_expr(ctx, scope, inner),
        }
    }

    fn check_function_ref(
        &self,
        ctx: &mut SemanticsContext,
        name: &ferro_compiler_parser::ast::Name,
        arg_count: usize,
        span: chumsky::span::SimpleSpan<usize>,
    ) {
        let Some(id) = name.symbol else {
            return;
        };
        let ultimate = ctx.ultimate(id);
        match &ctx.symbol(ultimate).details {
            SymbolDetails::Intrinsic => {
                if let Some(info) = expr::intrinsic(name.as_str()) {
                    if arg_count < info.min_args {
                        ctx.error(
                            DiagnosticCode::InvalidFunctionCall,
                            format!("Too few arguments for intrinsic '{}'", name.as_str()),
                            span,
                        );
                    } else if info.max_args.is_some_and(|max| arg_count > max) {
                        ctx.error(
                            DiagnosticCode::InvalidFunctionCall,
                            format!("Too many arguments for intrinsic '{}'", name.as_str()),
                            span,
                        );
                    }
                }
            }
            SymbolDetails::Subprogram(details) if !details.is_function => {
                ctx.error(
                    DiagnosticCode::InvalidFunctionCall,
                    format!(
                        "Subroutine '{}' may not appear in an expression",
                        name.as_str()
                    ),
                    span,
                );
            }
            SymbolDetails::Object(_) => {
                // scalars that could have been functions were rewritten
                // during resolution, so whatever is left is a misuse
                ctx.error(
                    DiagnosticCode::InvalidFunctionCall,
                    format!("'{}' is neither an array nor a function", name.as_str()),
                    span,
                );
            }
            _ => {}
        }
    }

    fn check_binary(
        &self,
        ctx: &mut SemanticsContext,
        op: BinaryOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        span: chumsky::span::SimpleSpan<usize>,
    ) {
        let lhs_type = expr_type(ctx, lhs);
        let rhs_type = expr_type(ctx, rhs);
        if let (Some(l), Some(r)) = (&lhs_type, &rhs_type) {
            match op {
                BinaryOp::Pow
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Add
                | BinaryOp::Sub => {
                    if !l.is_numeric() || !r.is_numeric() {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!("Operands of {} must be numeric", op.symbol()),
                            span,
                        );
                    }
                }
                BinaryOp::Concat => {
                    if !l.is_character() || !r.is_character() {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!("Operands of {} must be CHARACTER", op.symbol()),
                            span,
                        );
                    }
                }
                BinaryOp::Eq | BinaryOp::Ne => {
                    if l.is_logical() && r.is_logical() {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            "LOGICAL operands must be compared with .EQV. or .NEQV.".to_string(),
                            span,
                        );
                    } else if !comparable(l, r) {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!("Operands of {} are not comparable", op.symbol()),
                            span,
                        );
                    }
                }
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    if !comparable(l, r) {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!(
                                "Operands of {} must be numeric or CHARACTER",
                                op.symbol()
                            ),
                            span,
                        );
                    }
                }
                BinaryOp::And | BinaryOp::Or | BinaryOp::Eqv | BinaryOp::Neqv => {
                    if !l.is_logical() || !r.is_logical() {
                        ctx.error(
                            DiagnosticCode::InvalidOperandType,
                            format!("Operands of {} must be LOGICAL", op.symbol()),
                            span,
                        );
                    }
                }
            }
        }

        let lhs_rank = expr_rank(ctx, lhs);
        let rhs_rank = expr_rank(ctx, rhs);
        if let (Some(l), Some(r)) = (lhs_rank, rhs_rank) {
            if l > 0 && r > 0 && l != r {
                ctx.error(
                    DiagnosticCode::RankMismatch,
                    format!("Operands of {} have ranks {l} and {r}", op.symbol()),
                    span,
                );
            }
        }
    }
}

const fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Plus => "+",
        UnaryOp::Negate => "-",
        UnaryOp::Not => ".NOT.",
    }
}

const fn comparable(l: &crate::types::TypeDesc, r: &crate::types::TypeDesc) -> bool {
    (l.is_numeric() && r.is_numeric()) || (l.is_character() && r.is_character())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve_names::resolve_names;
    use crate::rewrite::rewrite_function_refs;
    use crate::visitor::CheckerVisitor;
    use ferro_compiler_parser::ast::ProgramUnit;
    use ferro_compiler_parser::parse_source;

    fn pass1(source: &str) -> SemanticsContext {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut program = output.program;
        let mut ctx = SemanticsContext::default();
        assert!(resolve_names(&mut ctx, &mut program));
        assert!(rewrite_function_refs(&ctx, &mut program));
        let mut visitor = CheckerVisitor::new().register(ExprChecker);
        for unit in &program.units {
            let ProgramUnit::Main(main) = unit else {
                continue;
            };
            let name = main.name.as_ref().map_or("", |n| n.as_str());
            let scope = ctx
                .scopes
                .iter()
                .find(|(_, s)| s.name == name)
                .map(|(id, _)| id)
                .unwrap_or_else(|| panic!("no scope for '{name}'"));
            visitor.walk(&mut ctx, scope, &main.body.execution);
        }
        ctx
    }

    #[track_caller]
    fn assert_error(ctx: &SemanticsContext, fragment: &str) {
        assert!(
            ctx.sink()
                .errors()
                .iter()
                .any(|d| d.message.contains(fragment)),
            "no error containing {fragment:?}: {:?}",
            ctx.sink().all()
        );
    }

    #[test]
    fn test_clean_program_is_quiet() {
        let ctx = pass1(
            "program p\n\
             integer a(10), i\n\
             real x\n\
             i = 3\n\
             a(i) = i * 2\n\
             x = sqrt(0.5) + 0.5\n\
             i = int(x)\n\
             end program\n",
        );
        assert!(ctx.sink().is_empty(), "{:?}", ctx.sink().all());
    }

    #[test]
    fn test_subscript_count_mismatch() {
        let ctx = pass1(
            "program p\n\
             integer a(10)\n\
             a(1, 2) = 0\n\
             end program\n",
        );
        assert_error(&ctx, "has 2 subscripts but rank is 1");
    }

    #[test]
    fn test_non_integer_subscript() {
        let ctx = pass1(
            "program p\n\
             integer a(10)\n\
             a(1.5) = 0\n\
             end program\n",
        );
        assert_error(&ctx, "Subscript must be an integer expression");
    }

    #[test]
    fn test_logical_equality_is_rejected() {
        let ctx = pass1(
            "program p\n\
             logical a, b, c\n\
             a = .true.\n\
             b = .false.\n\
             c = a == b\n\
             end program\n",
        );
        assert_error(&ctx, "compared with .EQV. or .NEQV.");
    }

    #[test]
    fn test_not_on_integer_is_rejected() {
        let ctx = pass1(
            "program p\n\
             logical a\n\
             integer n\n\
             n = 1\n\
             a = .not. n\n\
             end program\n",
        );
        assert_error(&ctx, "Operand of unary .NOT. must be LOGICAL");
    }

    #[test]
    fn test_arithmetic_on_logical_is_rejected() {
        let ctx = pass1(
            "program p\n\
             logical a\n\
             integer n\n\
             a = .true.\n\
             n = a + 1\n\
             end program\n",
        );
        assert_error(&ctx, "Operands of + must be numeric");
    }

    #[test]
    fn test_rank_mismatch() {
        let ctx = pass1(
            "program p\n\
             integer a(10), b(10, 10)\n\
             a = a + b\n\
             end program\n",
        );
        assert_error(&ctx, "have ranks 1 and 2");
    }

    #[test]
    fn test_intrinsic_argument_counts() {
        let ctx = pass1(
            "program p\n\
             integer n\n\
             n = max(1)\n\
             end program\n",
        );
        assert_error(&ctx, "Too few arguments for intrinsic 'max'");

        let ctx = pass1(
            "program p\n\
             integer n\n\
             n = abs(1, 2)\n\
             end program\n",
        );
        assert_error(&ctx, "Too many arguments for intrinsic 'abs'");
    }

    #[test]
    fn test_constant_division_by_zero() {
        let ctx = pass1(
            "program p\n\
             integer n\n\
             n = 1 / 0\n\
             end program\n",
        );
        assert_error(&ctx, "Division by zero");
    }
}
