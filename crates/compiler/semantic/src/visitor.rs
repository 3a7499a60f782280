//! # Checker Framework
//!
//! Statement checks are organized as small [`Checker`]s, each claiming the
//! node kinds and phases it wants to see. A [`CheckerVisitor`] fans the
//! registered checkers out over an execution part in a single walk: enter
//! hooks fire top-down before a construct's body, leave hooks fire bottom-up
//! after it, and the context's construct stack is pushed and popped around
//! every construct body.
//!
//! A claim is exclusive. Registering two checkers for the same
//! `(NodeKind, Phase)` pair is a programming error and panics immediately,
//! not at walk time.

use rustc_hash::FxHashMap;

use ferro_compiler_parser::ast::{
    Block, CaseConstruct, Construct, DoConstruct, ExecPart, ForallConstruct, IfConstruct,
    OffloadConstruct, ParallelConstruct, SimdConstruct, Statement, Stmt,
};

use crate::context::{ConstructKind, SemanticsContext};
use crate::scope::ScopeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Assignment,
    IfStmt,
    ArithIf,
    Goto,
    AssignLabel,
    AssignedGoto,
    Call,
    Return,
    Stop,
    Continue,
    Cycle,
    Exit,
    Print,
    Entry,
    ForallStmt,
    LabelDo,
    Directive,
    Data,
    IfConstruct,
    DoConstruct,
    ForallConstruct,
    CaseConstruct,
    ParallelConstruct,
    OffloadConstruct,
    SimdConstruct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Enter,
    Leave,
}

/// Borrowed node handed to a checker
#[derive(Clone, Copy)]
pub enum NodeRef<'a> {
    Stmt(&'a Statement<Stmt>),
    If(&'a IfConstruct),
    Do(&'a DoConstruct),
    Forall(&'a ForallConstruct),
    Case(&'a CaseConstruct),
    Parallel(&'a ParallelConstruct),
    Offload(&'a OffloadConstruct),
    Simd(&'a SimdConstruct),
}

pub trait Checker {
    /// Node kinds and phases this checker wants to see
    fn claims(&self) -> Vec<(NodeKind, Phase)>;

    fn check(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        phase: Phase,
    );

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

const fn stmt_kind(stmt: &Stmt) -> NodeKind {
    match stmt {
        Stmt::Assignment { .. } => NodeKind::Assignment,
        Stmt::IfStmt { .. } => NodeKind::IfStmt,
        Stmt::ArithIf { .. } => NodeKind::ArithIf,
        Stmt::Goto(_) => NodeKind::Goto,
        Stmt::AssignLabel { .. } => NodeKind::AssignLabel,
        Stmt::AssignedGoto { .. } => NodeKind::AssignedGoto,
        Stmt::Call { .. } => NodeKind::Call,
        Stmt::Return => NodeKind::Return,
        Stmt::Stop { .. } => NodeKind::Stop,
        Stmt::Continue => NodeKind::Continue,
        Stmt::Cycle => NodeKind::Cycle,
        Stmt::Exit => NodeKind::Exit,
        Stmt::Print { .. } => NodeKind::Print,
        Stmt::Entry { .. } => NodeKind::Entry,
        Stmt::ForallStmt { .. } => NodeKind::ForallStmt,
        Stmt::LabelDo { .. } => NodeKind::LabelDo,
        Stmt::Directive(_) => NodeKind::Directive,
        Stmt::Data(_) => NodeKind::Data,
    }
}

#[derive(Default)]
pub struct CheckerVisitor {
    checkers: Vec<Box<dyn Checker>>,
    claims: FxHashMap<(NodeKind, Phase), usize>,
}

impl CheckerVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker for all the claims it makes.
    ///
    /// Panics if any claim is already taken.
    pub fn register<C: Checker + 'static>(mut self, checker: C) -> Self {
        let index = self.checkers.len();
        for claim in checker.claims() {
            if let Some(&previous) = self.claims.get(&claim) {
                panic!(
                    "{} and {} both claim {:?}",
                    self.checkers[previous].name(),
                    checker.name(),
                    claim
                );
            }
            self.claims.insert(claim, index);
        }
        self.checkers.push(Box::new(checker));
        self
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Walk an execution part, dispatching claimed nodes to their checkers.
    ///
    /// Returns true when no fatal diagnostic has been reported on the
    /// context, by this walk or earlier.
    pub fn walk(&mut self, ctx: &mut SemanticsContext, scope: ScopeId, block: &Block) -> bool {
        self.walk_block(ctx, scope, block);
        !ctx.any_fatal_error()
    }

    fn walk_block(&mut self, ctx: &mut SemanticsContext, scope: ScopeId, block: &Block) {
        for part in block {
            match part {
                ExecPart::Statement(stmt) => self.walk_stmt(ctx, scope, stmt),
                ExecPart::Construct(construct) => self.walk_construct(ctx, scope, construct),
            }
        }
    }

    fn walk_stmt(&mut self, ctx: &mut SemanticsContext, scope: ScopeId, stmt: &Statement<Stmt>) {
        let previous = ctx.location();
        ctx.set_location(stmt.span);
        let kind = stmt_kind(&stmt.value);
        self.dispatch(ctx, scope, NodeRef::Stmt(stmt), kind, Phase::Enter);
        if let Stmt::IfStmt { action, .. } = &stmt.value {
            self.walk_stmt(ctx, scope, action);
        }
        self.dispatch(ctx, scope, NodeRef::Stmt(stmt), kind, Phase::Leave);
        match previous {
            Some(span) => ctx.set_location(span),
            None => ctx.clear_location(),
        }
    }

    fn walk_construct(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        construct: &Construct,
    ) {
        match construct {
            Construct::If(c) => {
                self.dispatch(ctx, scope, NodeRef::If(c), NodeKind::IfConstruct, Phase::Enter);
                ctx.push_construct(ConstructKind::If, c.span);
                for arm in &c.arms {
                    self.walk_block(ctx, scope, &arm.block);
                }
                if let Some(else_block) = &c.else_block {
                    self.walk_block(ctx, scope, else_block);
                }
                ctx.pop_construct(ConstructKind::If);
                self.dispatch(ctx, scope, NodeRef::If(c), NodeKind::IfConstruct, Phase::Leave);
            }
            Construct::Do(c) => {
                self.dispatch(ctx, scope, NodeRef::Do(c), NodeKind::DoConstruct, Phase::Enter);
                ctx.push_construct(ConstructKind::Do, c.span);
                self.walk_block(ctx, scope, &c.body);
                ctx.pop_construct(ConstructKind::Do);
                self.dispatch(ctx, scope, NodeRef::Do(c), NodeKind::DoConstruct, Phase::Leave);
            }
            Construct::Forall(c) => {
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Forall(c),
                    NodeKind::ForallConstruct,
                    Phase::Enter,
                );
                ctx.push_construct(ConstructKind::Forall, c.span);
                self.walk_block(ctx, scope, &c.body);
                ctx.pop_construct(ConstructKind::Forall);
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Forall(c),
                    NodeKind::ForallConstruct,
                    Phase::Leave,
                );
            }
            Construct::Case(c) => {
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Case(c),
                    NodeKind::CaseConstruct,
                    Phase::Enter,
                );
                ctx.push_construct(ConstructKind::Case, c.span);
                for arm in &c.arms {
                    self.walk_block(ctx, scope, &arm.block);
                }
                ctx.pop_construct(ConstructKind::Case);
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Case(c),
                    NodeKind::CaseConstruct,
                    Phase::Leave,
                );
            }
            Construct::Parallel(c) => {
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Parallel(c),
                    NodeKind::ParallelConstruct,
                    Phase::Enter,
                );
                ctx.push_construct(ConstructKind::Parallel, c.span);
                self.walk_block(ctx, scope, &c.body);
                ctx.pop_construct(ConstructKind::Parallel);
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Parallel(c),
                    NodeKind::ParallelConstruct,
                    Phase::Leave,
                );
            }
            Construct::Offload(c) => {
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Offload(c),
                    NodeKind::OffloadConstruct,
                    Phase::Enter,
                );
                ctx.push_construct(ConstructKind::Offload, c.span);
                self.walk_block(ctx, scope, &c.body);
                ctx.pop_construct(ConstructKind::Offload);
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Offload(c),
                    NodeKind::OffloadConstruct,
                    Phase::Leave,
                );
            }
            Construct::Simd(c) => {
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Simd(c),
                    NodeKind::SimdConstruct,
                    Phase::Enter,
                );
                ctx.push_construct(ConstructKind::Simd, c.span);
                self.walk_block(ctx, scope, &c.body);
                ctx.pop_construct(ConstructKind::Simd);
                self.dispatch(
                    ctx,
                    scope,
                    NodeRef::Simd(c),
                    NodeKind::SimdConstruct,
                    Phase::Leave,
                );
            }
        }
    }

    fn dispatch(
        &mut self,
        ctx: &mut SemanticsContext,
        scope: ScopeId,
        node: NodeRef<'_>,
        kind: NodeKind,
        phase: Phase,
    ) {
        if let Some(&index) = self.claims.get(&(kind, phase)) {
            self.checkers[index].check(ctx, scope, node, phase);
        }
    }
}
