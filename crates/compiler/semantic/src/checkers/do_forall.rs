//! DO and FORALL checks: control variables and limits must be scalar
//! integers, masks and DO WHILE conditions must be logical, and index
//! variables go in and out of play around each construct so redefinition
//! inside the body is caught.

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{
    DoConstruct, ForallConstruct, ForallHeader, LoopControl, Name, Statement, Stmt,
};

use crate::context::{ConstructKind, IndexVarKind, SemanticsContext};
use crate::scope::ScopeId;
use crate::symbol::SymbolDetails;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct DoForallChecker;

impl Checker for DoForallChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::DoConstruct, Phase::Enter),
            (NodeKind::DoConstruct, Phase::Leave),
            (NodeKind::ForallConstruct, Phase::Enter),
            (NodeKind::ForallConstruct, Phase::Leave),
            (NodeKind::ForallStmt, Phase::Enter),
            (NodeKind::Cycle, Phase::Enter),
            (NodeKind::Exit, Phase::Enter),
        ]
    }

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        _scope: ScopeId,
        node: NodeRef<'_>,
        phase: Phase,
    ) {
        match node {
            NodeRef::Do(construct) => self.check_do(ctx, construct, phase),
            NodeRef::Forall(construct) => self.check_forall(ctx, construct, phase),
            NodeRef::Stmt(stmt) => match &stmt.value {
                Stmt::ForallStmt { .. } => self.check_forall_stmt(ctx, stmt),
                Stmt::Cycle => check_placement(ctx, "CYCLE", stmt.span),
                Stmt::Exit => check_placement(ctx, "EXIT", stmt.span),
                _ => {}
            },
            _ => {}
        }
    }
}

impl DoForallChecker {
    fn check_do(&self, ctx: &mut SemanticsContext, construct: &DoConstruct, phase: Phase) {
        let Some(control) = &construct.control else {
            return;
        };
        match phase {
            Phase::Enter => match control {
                LoopControl::Counted {
                    var,
                    lower,
                    upper,
                    step,
                } => {
                    check_index_variable(ctx, var, "DO");
                    super::check_scalar_integer(ctx, lower, "DO limit");
                    super::check_scalar_integer(ctx, upper, "DO limit");
                    if let Some(step) = step {
                        super::check_scalar_integer(ctx, step, "DO step");
                    }
                    if let Some(id) = var.symbol {
                        ctx.activate_index_var(id, IndexVarKind::Do, construct.span);
                        ctx.note_defined(id);
                    }
                }
                LoopControl::While(cond) => {
                    super::check_logical_condition(ctx, cond, "DO WHILE condition");
                }
            },
            Phase::Leave => {
                if let LoopControl::Counted { var, .. } = control {
                    if let Some(id) = var.symbol {
                        ctx.deactivate_index_var(id, construct.span);
                    }
                }
            }
        }
    }

    fn check_forall(&self, ctx: &mut SemanticsContext, construct: &ForallConstruct, phase: Phase) {
        match phase {
            Phase::Enter => {
                for header in &construct.headers {
                    self.check_header(ctx, header, construct.span);
                }
                if let Some(mask) = &construct.mask {
                    super::check_logical_condition(ctx, mask, "FORALL mask");
                }
            }
            Phase::Leave => {
                for header in &construct.headers {
                    if let Some(id) = header.var.symbol {
                        ctx.deactivate_index_var(id, construct.span);
                    }
                }
            }
        }
    }

    /// The statement form, which owns its assignment as well; header
    /// variables are only in play across it
    fn check_forall_stmt(&self, ctx: &mut SemanticsContext, stmt: &Statement<Stmt>) {
        let Stmt::ForallStmt {
            headers,
            mask,
            target,
            value,
        } = &stmt.value
        else {
            return;
        };
        for header in headers {
            self.check_header(ctx, header, stmt.span);
        }
        if let Some(mask) = mask {
            super::check_logical_condition(ctx, mask, "FORALL mask");
        }
        super::assignment::check_assignment(ctx, target, value);
        for header in headers {
            if let Some(id) = header.var.symbol {
                ctx.deactivate_index_var(id, stmt.span);
            }
        }
    }

    fn check_header(
        &self,
        ctx: &mut SemanticsContext,
        header: &ForallHeader,
        span: SimpleSpan<usize>,
    ) {
        check_index_variable(ctx, &header.var, "FORALL");
        super::check_scalar_integer(ctx, &header.lower, "FORALL limit");
        super::check_scalar_integer(ctx, &header.upper, "FORALL limit");
        if let Some(step) = &header.step {
            super::check_scalar_integer(ctx, step, "FORALL step");
        }
        if let Some(id) = header.var.symbol {
            ctx.activate_index_var(id, IndexVarKind::Forall, span);
            ctx.note_defined(id);
        }
    }
}

fn check_placement(ctx: &mut SemanticsContext, what: &str, span: SimpleSpan<usize>) {
    if !ctx.in_construct(ConstructKind::Do) {
        ctx.error(
            DiagnosticCode::MisplacedStatement,
            format!("{what} may only appear within a DO construct"),
            span,
        );
    }
}

fn check_index_variable(ctx: &mut SemanticsContext, name: &Name, what: &str) {
    let Some(id) = name.symbol else {
        return;
    };
    let ultimate = ctx.ultimate(id);
    let symbol = ctx.symbol(ultimate);
    if symbol.is_named_constant() || !matches!(symbol.details, SymbolDetails::Object(_)) {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            format!("'{}' may not be used as a {what} variable", name.as_str()),
            name.span,
        );
        return;
    }
    let bad_type = symbol.type_desc().is_some_and(|ty| !ty.is_integer());
    let bad_rank = symbol.object().is_some_and(|object| object.rank() > 0);
    if bad_type || bad_rank {
        ctx.error(
            DiagnosticCode::InvalidOperandType,
            format!("{what} variable '{}' must be a scalar integer", name.as_str()),
            name.span,
        );
    }
}
