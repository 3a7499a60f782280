//! Checks for the PARALLEL, OFFLOAD, and SIMD extension regions. Each
//! extension gets its own visitor so these run as separate feature-gated
//! walks after the core statement checks.

use ferro_compiler_diagnostics::{DiagnosticCode, WarningCategory};
use ferro_compiler_parser::ast::Stmt;

use crate::context::{ConstructKind, SemanticsContext};
use crate::scope::ScopeId;
use crate::visitor::{Checker, NodeKind, NodeRef, Phase};

pub struct ParallelChecker;

impl Checker for ParallelChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::ParallelConstruct, Phase::Enter),
            (NodeKind::Stop, Phase::Enter),
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
            // Enter runs before the region is pushed, so the stack holds
            // only enclosing regions here.
            NodeRef::Parallel(construct) => {
                if ctx.in_construct(ConstructKind::Parallel) {
                    ctx.portability(
                        WarningCategory::NestedParallel,
                        DiagnosticCode::MisplacedStatement,
                        "PARALLEL region nested inside another PARALLEL region".to_string(),
                        construct.span,
                    );
                }
            }
            NodeRef::Stmt(stmt) => {
                if matches!(stmt.value, Stmt::Stop { .. })
                    && ctx.in_construct(ConstructKind::Parallel)
                {
                    ctx.error(
                        DiagnosticCode::MisplacedStatement,
                        "STOP is not allowed within a PARALLEL region".to_string(),
                        stmt.span,
                    );
                }
            }
            _ => {}
        }
    }
}

pub struct OffloadChecker;

impl Checker for OffloadChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::Print, Phase::Enter),
            (NodeKind::AssignLabel, Phase::Enter),
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
        if !ctx.in_construct(ConstructKind::Offload) {
            return;
        }
        match stmt.value {
            Stmt::Print { .. } => ctx.error(
                DiagnosticCode::MisplacedStatement,
                "PRINT is not allowed within an OFFLOAD region".to_string(),
                stmt.span,
            ),
            Stmt::AssignLabel { .. } => ctx.error(
                DiagnosticCode::MisplacedStatement,
                "ASSIGN is not allowed within an OFFLOAD region".to_string(),
                stmt.span,
            ),
            _ => {}
        }
    }
}

/// Tracks DO nesting per SIMD region so EXIT from the vectorized loop
/// itself can be told apart from EXIT out of a loop nested inside it.
#[derive(Default)]
pub struct SimdChecker {
    dos: Vec<u32>,
}

impl Checker for SimdChecker {
    fn claims(&self) -> Vec<(NodeKind, Phase)> {
        vec![
            (NodeKind::SimdConstruct, Phase::Enter),
            (NodeKind::SimdConstruct, Phase::Leave),
            (NodeKind::DoConstruct, Phase::Enter),
            (NodeKind::DoConstruct, Phase::Leave),
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
        match (node, phase) {
            (NodeRef::Simd(_), Phase::Enter) => {
                self.dos.push(0);
            }
            (NodeRef::Simd(_), Phase::Leave) => {
                self.dos.pop();
            }
            (NodeRef::Do(_), Phase::Enter) => {
                if let Some(depth) = self.dos.last_mut() {
                    *depth += 1;
                }
            }
            (NodeRef::Do(_), Phase::Leave) => {
                if let Some(depth) = self.dos.last_mut() {
                    *depth -= 1;
                }
            }
            (NodeRef::Stmt(stmt), Phase::Enter) => {
                if matches!(stmt.value, Stmt::Exit) && self.dos.last() == Some(&1) {
                    ctx.error(
                        DiagnosticCode::MisplacedStatement,
                        "EXIT may not leave a SIMD loop".to_string(),
                        stmt.span,
                    );
                }
            }
            _ => {}
        }
    }
}
