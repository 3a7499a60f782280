//! # Label Resolution
//!
//! Validates statement labels one program unit at a time: labels must fall
//! in `1..=99999`, be defined at most once per unit, and every label
//! referenced by a GOTO, arithmetic IF, ASSIGN, assigned GOTO, or labeled DO
//! must be defined somewhere in the same unit. Contained subprograms get
//! their own label space.

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode};
use ferro_compiler_parser::ast::{
    Block, Construct, ExecPart, Label, Program, ProgramUnit, Statement, Stmt,
};
use rustc_hash::FxHashMap;

use crate::context::SemanticsContext;

pub const MAX_LABEL: Label = 99999;

#[derive(Default)]
struct LabelTable {
    definitions: FxHashMap<Label, SimpleSpan<usize>>,
    references: Vec<(Label, SimpleSpan<usize>)>,
}

impl LabelTable {
    fn define(&mut self, ctx: &mut SemanticsContext, label: Label, span: SimpleSpan<usize>) {
        if !label_in_range(label) {
            ctx.error(
                DiagnosticCode::InvalidLabel,
                format!("Label {label} is out of range"),
                span,
            );
            return;
        }
        if let Some(previous) = self.definitions.get(&label) {
            ctx.add_diagnostic(
                Diagnostic::error(
                    DiagnosticCode::DuplicateLabel,
                    format!("Label {label} is already defined"),
                )
                .with_location(span)
                .with_related_span(*previous, format!("Previous definition of label {label}")),
            );
        } else {
            self.definitions.insert(label, span);
        }
    }

    fn refer(&mut self, ctx: &mut SemanticsContext, label: Label, span: SimpleSpan<usize>) {
        if !label_in_range(label) {
            ctx.error(
                DiagnosticCode::InvalidLabel,
                format!("Label {label} is out of range"),
                span,
            );
        } else {
            self.references.push((label, span));
        }
    }

    fn collect_block(&mut self, ctx: &mut SemanticsContext, block: &Block) {
        for part in block {
            match part {
                ExecPart::Statement(stmt) => self.collect_stmt(ctx, stmt),
                ExecPart::Construct(construct) => self.collect_construct(ctx, construct),
            }
        }
    }

    fn collect_construct(&mut self, ctx: &mut SemanticsContext, construct: &Construct) {
        match construct {
            Construct::If(if_construct) => {
                for arm in &if_construct.arms {
                    self.collect_block(ctx, &arm.block);
                }
                if let Some(else_block) = &if_construct.else_block {
                    self.collect_block(ctx, else_block);
                }
            }
            Construct::Do(do_construct) => self.collect_block(ctx, &do_construct.body),
            Construct::Forall(forall) => self.collect_block(ctx, &forall.body),
            Construct::Case(case) => {
                for arm in &case.arms {
                    self.collect_block(ctx, &arm.block);
                }
            }
            Construct::Parallel(region) => self.collect_block(ctx, &region.body),
            Construct::Offload(region) => self.collect_block(ctx, &region.body),
            Construct::Simd(simd) => self.collect_block(ctx, &simd.body),
        }
    }

    fn collect_stmt(&mut self, ctx: &mut SemanticsContext, stmt: &Statement<Stmt>) {
        if let Some(label) = stmt.label {
            self.define(ctx, label, stmt.span);
        }
        match &stmt.value {
            Stmt::Goto(label) => self.refer(ctx, *label, stmt.span),
            Stmt::ArithIf { labels, .. } => {
                for label in labels {
                    self.refer(ctx, *label, stmt.span);
                }
            }
            Stmt::AssignLabel { label, .. } => self.refer(ctx, *label, stmt.span),
            Stmt::AssignedGoto { labels, .. } => {
                for label in labels {
                    self.refer(ctx, *label, stmt.span);
                }
            }
            Stmt::LabelDo { terminal, .. } => self.refer(ctx, *terminal, stmt.span),
            Stmt::IfStmt { action, .. } => self.collect_stmt(ctx, action),
            _ => {}
        }
    }

    fn report_unresolved(&self, ctx: &mut SemanticsContext) {
        for (label, span) in &self.references {
            if !self.definitions.contains_key(label) {
                ctx.error(
                    DiagnosticCode::UnresolvedLabel,
                    format!("Label {label} was not found"),
                    *span,
                );
            }
        }
    }
}

fn label_in_range(label: Label) -> bool {
    (1..=MAX_LABEL).contains(&label)
}

fn validate_unit(ctx: &mut SemanticsContext, unit: &ProgramUnit) {
    let mut table = LabelTable::default();
    let (specs, execution, contains) = match unit {
        ProgramUnit::Main(main) => (&main.body.specs, &main.body.execution, &main.body.contains),
        ProgramUnit::Function(function) => (
            &function.body.specs,
            &function.body.execution,
            &function.body.contains,
        ),
        ProgramUnit::Subroutine(subroutine) => (
            &subroutine.body.specs,
            &subroutine.body.execution,
            &subroutine.body.contains,
        ),
        ProgramUnit::Module(module) => {
            for spec in &module.specs {
                if let Some(label) = spec.label {
                    table.define(ctx, label, spec.span);
                }
            }
            table.report_unresolved(ctx);
            for contained in &module.contains {
                validate_unit(ctx, contained);
            }
            return;
        }
        ProgramUnit::BlockData(block_data) => {
            for spec in &block_data.specs {
                if let Some(label) = spec.label {
                    table.define(ctx, label, spec.span);
                }
            }
            table.report_unresolved(ctx);
            return;
        }
    };
    for spec in specs {
        if let Some(label) = spec.label {
            table.define(ctx, label, spec.span);
        }
    }
    table.collect_block(ctx, execution);
    table.report_unresolved(ctx);
    for contained in contains {
        validate_unit(ctx, contained);
    }
}

/// Validate all labels in the program. Returns false when any label error
/// was reported.
pub fn validate_labels(ctx: &mut SemanticsContext, program: &Program) -> bool {
    for unit in &program.units {
        validate_unit(ctx, unit);
    }
    !ctx.any_fatal_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_compiler_parser::parse_source;

    fn validate(source: &str) -> SemanticsContext {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut ctx = SemanticsContext::default();
        validate_labels(&mut ctx, &output.program);
        ctx
    }

    #[test]
    fn test_resolved_labels_are_quiet() {
        let ctx = validate(
            "program p\n\
             integer i\n\
             do 10 i = 1, 3\n\
             10 continue\n\
             goto 20\n\
             20 continue\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
    }

    #[test]
    fn test_duplicate_label() {
        let ctx = validate(
            "program p\n\
             10 continue\n\
             10 continue\n\
             end program\n",
        );
        let errors = ctx.sink().errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("already defined"));
        assert!(!errors[0].related_spans.is_empty());
    }

    #[test]
    fn test_unresolved_goto() {
        let ctx = validate(
            "program p\n\
             goto 99\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().all()[0].message.contains("was not found"));
    }

    #[test]
    fn test_label_out_of_range() {
        let ctx = validate(
            "program p\n\
             goto 100000\n\
             end program\n",
        );
        assert!(ctx.sink().all()[0].message.contains("out of range"));
    }

    #[test]
    fn test_contained_units_have_own_label_space() {
        let ctx = validate(
            "program p\n\
             10 continue\n\
             contains\n\
             subroutine s\n\
             10 continue\n\
             goto 10\n\
             end subroutine\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
    }

    #[test]
    fn test_arith_if_references_checked() {
        let ctx = validate(
            "program p\n\
             integer i\n\
             if (i) 1, 2, 3\n\
             1 continue\n\
             2 continue\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().all()[0].message.contains("Label 3"));
    }
}
