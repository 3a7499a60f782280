//! # Statement Canonicalization
//!
//! Two rewrites run between label resolution and name resolution, both of
//! which turn flat statement sequences into nested constructs so later
//! passes only ever see structured trees:
//!
//! - `DO label` openers and their labeled terminal statements fold into
//!   [`DoConstruct`] nodes. Nested loops sharing one terminal close
//!   together, innermost first.
//! - Extension directives fold into their region constructs: `!$par
//!   parallel` pairs become [`ParallelConstruct`], `!$offload region` pairs
//!   become [`OffloadConstruct`], and `!$simd loop` attaches to the counted
//!   DO that follows it. Directives for disabled extensions are dropped
//!   with a warning.

use std::vec;

use chumsky::span::SimpleSpan;
use ferro_compiler_diagnostics::{DiagnosticCode, WarningCategory};
use ferro_compiler_parser::ast::{
    Block, Construct, Directive, DoConstruct, ExecPart, Label, LoopControl, OffloadConstruct,
    ParallelConstruct, Program, ProgramUnit, SimdConstruct, Statement, Stmt, UnitBody,
};

use crate::context::SemanticsContext;
use crate::features::LanguageExtensions;

// ===== DO loops =====

/// Fold `DO label` loops into DO constructs. Returns false when any loop
/// is malformed.
pub fn canonicalize_do(ctx: &mut SemanticsContext, program: &mut Program) -> bool {
    for unit in &mut program.units {
        each_body(unit, &mut |body| {
            let execution = std::mem::take(&mut body.execution);
            body.execution = DoFolder { ctx: &mut *ctx }.fold_block(execution);
        });
    }
    !ctx.any_fatal_error()
}

struct DoFolder<'a> {
    ctx: &'a mut SemanticsContext,
}

impl DoFolder<'_> {
    fn fold_block(&mut self, block: Block) -> Block {
        let mut out = Vec::with_capacity(block.len());
        let mut iter = block.into_iter();
        while let Some(part) = iter.next() {
            self.fold_part(part, &mut iter, &mut out);
        }
        out
    }

    /// Returns the label and end offset of a terminal statement consumed
    /// while folding, so enclosing loops sharing that terminal can close
    fn fold_part(
        &mut self,
        part: ExecPart,
        iter: &mut vec::IntoIter<ExecPart>,
        out: &mut Block,
    ) -> Option<(Label, usize)> {
        match part {
            ExecPart::Statement(stmt) if matches!(stmt.value, Stmt::LabelDo { .. }) => {
                let (construct, closed) = self.fold_label_do(stmt, iter);
                out.push(construct);
                closed
            }
            ExecPart::Statement(stmt) => {
                if let Stmt::IfStmt { action, .. } = &stmt.value {
                    if matches!(action.value, Stmt::LabelDo { .. }) {
                        self.ctx.error(
                            DiagnosticCode::MisplacedStatement,
                            "A DO statement may not be the action of a logical IF".to_string(),
                            action.span,
                        );
                    }
                }
                out.push(ExecPart::Statement(stmt));
                None
            }
            ExecPart::Construct(construct) => {
                out.push(ExecPart::Construct(self.fold_construct(construct)));
                None
            }
        }
    }

    fn fold_label_do(
        &mut self,
        opener: Statement<Stmt>,
        iter: &mut vec::IntoIter<ExecPart>,
    ) -> (ExecPart, Option<(Label, usize)>) {
        let Stmt::LabelDo { terminal, control } = opener.value else {
            unreachable!("fold_label_do called on a statement that is not a labeled DO");
        };
        let start = opener.span.start;
        let mut body: Block = Vec::new();
        let mut closed = None;
        while let Some(part) = iter.next() {
            if let ExecPart::Statement(stmt) = &part {
                if stmt.label == Some(terminal) {
                    let ExecPart::Statement(stmt) = part else {
                        unreachable!();
                    };
                    let end = stmt.span.end;
                    self.check_terminal(terminal, &stmt);
                    body.push(ExecPart::Statement(stmt));
                    closed = Some((terminal, end));
                    break;
                }
            }
            if let Some((label, end)) = self.fold_part(part, iter, &mut body) {
                if label == terminal {
                    closed = Some((label, end));
                    break;
                }
            }
        }
        let end = match closed {
            Some((_, end)) => end,
            None => {
                self.ctx.error(
                    DiagnosticCode::BadLoopTermination,
                    format!("Terminal statement of DO {terminal} was not found in this block"),
                    opener.span,
                );
                body.last().map_or(opener.span.end, part_end)
            }
        };
        let construct = Construct::Do(DoConstruct {
            control,
            body,
            span: SimpleSpan::from(start..end),
        });
        (ExecPart::Construct(construct), closed)
    }

    fn check_terminal(&mut self, label: Label, stmt: &Statement<Stmt>) {
        let transfers_control = matches!(
            stmt.value,
            Stmt::Goto(_)
                | Stmt::ArithIf { .. }
                | Stmt::AssignedGoto { .. }
                | Stmt::Return
                | Stmt::Stop { .. }
                | Stmt::Cycle
                | Stmt::Exit
                | Stmt::LabelDo { .. }
        );
        if transfers_control {
            self.ctx.error(
                DiagnosticCode::BadLoopTermination,
                format!("Statement labeled {label} may not terminate a DO loop"),
                stmt.span,
            );
        } else if !matches!(stmt.value, Stmt::Continue) {
            self.ctx.portability(
                WarningCategory::NonstandardDoTermination,
                DiagnosticCode::BadLoopTermination,
                format!("DO loop {label} should terminate with a CONTINUE statement"),
                stmt.span,
            );
        }
    }

    fn fold_construct(&mut self, construct: Construct) -> Construct {
        match construct {
            Construct::If(mut c) => {
                for arm in &mut c.arms {
                    arm.block = self.fold_block(std::mem::take(&mut arm.block));
                }
                if let Some(else_block) = c.else_block.take() {
                    c.else_block = Some(self.fold_block(else_block));
                }
                Construct::If(c)
            }
            Construct::Do(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Do(c)
            }
            Construct::Forall(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Forall(c)
            }
            Construct::Case(mut c) => {
                for arm in &mut c.arms {
                    arm.block = self.fold_block(std::mem::take(&mut arm.block));
                }
                Construct::Case(c)
            }
            Construct::Parallel(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Parallel(c)
            }
            Construct::Offload(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Offload(c)
            }
            Construct::Simd(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Simd(c)
            }
        }
    }
}

fn part_end(part: &ExecPart) -> usize {
    match part {
        ExecPart::Statement(stmt) => stmt.span.end,
        ExecPart::Construct(construct) => construct.span().end,
    }
}

// ===== Extension directives =====

#[derive(Clone, Copy, PartialEq, Eq)]
enum Region {
    Parallel,
    Offload,
}

impl Region {
    const fn opener(self) -> &'static str {
        match self {
            Self::Parallel => "!$par parallel",
            Self::Offload => "!$offload region",
        }
    }

    fn is_end(self, directive: &Directive) -> bool {
        match self {
            Self::Parallel => directive.is("par", &["end", "parallel"]),
            Self::Offload => directive.is("offload", &["end", "region"]),
        }
    }
}

/// Fold extension directives into region constructs. Returns false when a
/// directive of an enabled extension is malformed or unbalanced.
pub fn canonicalize_extensions(ctx: &mut SemanticsContext, program: &mut Program) -> bool {
    for unit in &mut program.units {
        each_body(unit, &mut |body| {
            let execution = std::mem::take(&mut body.execution);
            body.execution = ExtensionFolder { ctx: &mut *ctx }.fold_block(execution);
        });
    }
    !ctx.any_fatal_error()
}

struct ExtensionFolder<'a> {
    ctx: &'a mut SemanticsContext,
}

impl ExtensionFolder<'_> {
    fn fold_block(&mut self, block: Block) -> Block {
        let mut out = Vec::with_capacity(block.len());
        let mut iter = block.into_iter();
        while let Some(part) = iter.next() {
            self.fold_part(part, &mut iter, &mut out);
        }
        out
    }

    fn fold_part(&mut self, part: ExecPart, iter: &mut vec::IntoIter<ExecPart>, out: &mut Block) {
        match part {
            ExecPart::Statement(stmt) if matches!(stmt.value, Stmt::Directive(_)) => {
                let Stmt::Directive(directive) = stmt.value else {
                    unreachable!();
                };
                self.fold_directive(directive, iter, out);
            }
            ExecPart::Statement(stmt) => out.push(ExecPart::Statement(stmt)),
            ExecPart::Construct(construct) => {
                out.push(ExecPart::Construct(self.fold_construct(construct)));
            }
        }
    }

    fn fold_directive(
        &mut self,
        directive: Directive,
        iter: &mut vec::IntoIter<ExecPart>,
        out: &mut Block,
    ) {
        let span = directive.span;
        if directive.is("par", &["parallel"]) {
            if !self.enabled(LanguageExtensions::PARALLEL, &directive) {
                return;
            }
            let (body, end) = self.collect_region(Region::Parallel, span, iter);
            let end = end.unwrap_or_else(|| body.last().map_or(span.end, part_end));
            out.push(ExecPart::Construct(Construct::Parallel(ParallelConstruct {
                body,
                span: SimpleSpan::from(span.start..end),
            })));
        } else if directive.is("offload", &["region"]) {
            if !self.enabled(LanguageExtensions::OFFLOAD, &directive) {
                return;
            }
            let (body, end) = self.collect_region(Region::Offload, span, iter);
            let end = end.unwrap_or_else(|| body.last().map_or(span.end, part_end));
            out.push(ExecPart::Construct(Construct::Offload(OffloadConstruct {
                body,
                span: SimpleSpan::from(span.start..end),
            })));
        } else if directive.is("par", &["end", "parallel"])
            || directive.is("offload", &["end", "region"])
        {
            let region = if directive.sentinel == "par" {
                Region::Parallel
            } else {
                Region::Offload
            };
            let extension = if region == Region::Parallel {
                LanguageExtensions::PARALLEL
            } else {
                LanguageExtensions::OFFLOAD
            };
            if self.enabled(extension, &directive) {
                self.ctx.error(
                    DiagnosticCode::InvalidDirective,
                    format!("Directive has no matching '{}'", region.opener()),
                    span,
                );
            }
        } else if directive.is("simd", &["loop"]) {
            if !self.enabled(LanguageExtensions::SIMD, &directive) {
                return;
            }
            self.fold_simd(span, iter, out);
        } else {
            let known = match directive.sentinel.as_str() {
                "par" => Some(LanguageExtensions::PARALLEL),
                "offload" => Some(LanguageExtensions::OFFLOAD),
                "simd" => Some(LanguageExtensions::SIMD),
                _ => None,
            };
            match known {
                Some(extension) if self.ctx.features.is_enabled(extension) => {
                    self.ctx.error(
                        DiagnosticCode::InvalidDirective,
                        format!("Invalid '!${}' directive", directive.sentinel),
                        span,
                    );
                }
                _ => self.ignore(&directive),
            }
        }
    }

    /// True when the extension is enabled; otherwise drops the directive
    /// with a warning
    fn enabled(&mut self, extension: LanguageExtensions, directive: &Directive) -> bool {
        if self.ctx.features.is_enabled(extension) {
            true
        } else {
            self.ignore(directive);
            false
        }
    }

    fn ignore(&mut self, directive: &Directive) {
        let words = directive.words.join(" ");
        self.ctx.warn(
            WarningCategory::IgnoredDirective,
            DiagnosticCode::InvalidDirective,
            format!("Ignoring directive '!${} {}'", directive.sentinel, words),
            directive.span,
        );
    }

    fn collect_region(
        &mut self,
        region: Region,
        open_span: SimpleSpan<usize>,
        iter: &mut vec::IntoIter<ExecPart>,
    ) -> (Block, Option<usize>) {
        let mut body = Vec::new();
        while let Some(part) = iter.next() {
            if let ExecPart::Statement(stmt) = &part {
                if let Stmt::Directive(directive) = &stmt.value {
                    if region.is_end(directive) {
                        return (body, Some(stmt.span.end));
                    }
                }
            }
            self.fold_part(part, iter, &mut body);
        }
        self.ctx.error(
            DiagnosticCode::InvalidDirective,
            format!("'{}' region is never closed", region.opener()),
            open_span,
        );
        (body, None)
    }

    fn fold_simd(
        &mut self,
        span: SimpleSpan<usize>,
        iter: &mut vec::IntoIter<ExecPart>,
        out: &mut Block,
    ) {
        match iter.next() {
            Some(ExecPart::Construct(Construct::Do(do_construct)))
                if matches!(do_construct.control, Some(LoopControl::Counted { .. })) =>
            {
                let folded = self.fold_construct(Construct::Do(do_construct));
                let end = folded.span().end;
                out.push(ExecPart::Construct(Construct::Simd(SimdConstruct {
                    body: vec![ExecPart::Construct(folded)],
                    span: SimpleSpan::from(span.start..end),
                })));
            }
            next => {
                self.ctx.error(
                    DiagnosticCode::InvalidDirective,
                    "'!$simd loop' must be followed by a counted DO loop".to_string(),
                    span,
                );
                if let Some(part) = next {
                    self.fold_part(part, iter, out);
                }
            }
        }
    }

    fn fold_construct(&mut self, construct: Construct) -> Construct {
        match construct {
            Construct::If(mut c) => {
                for arm in &mut c.arms {
                    arm.block = self.fold_block(std::mem::take(&mut arm.block));
                }
                if let Some(else_block) = c.else_block.take() {
                    c.else_block = Some(self.fold_block(else_block));
                }
                Construct::If(c)
            }
            Construct::Do(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Do(c)
            }
            Construct::Forall(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Forall(c)
            }
            Construct::Case(mut c) => {
                for arm in &mut c.arms {
                    arm.block = self.fold_block(std::mem::take(&mut arm.block));
                }
                Construct::Case(c)
            }
            Construct::Parallel(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Parallel(c)
            }
            Construct::Offload(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Offload(c)
            }
            Construct::Simd(mut c) => {
                c.body = self.fold_block(std::mem::take(&mut c.body));
                Construct::Simd(c)
            }
        }
    }
}

/// Apply `f` to every unit body in the unit, contained subprograms included
pub(crate) fn each_body(unit: &mut ProgramUnit, f: &mut impl FnMut(&mut UnitBody)) {
    match unit {
        ProgramUnit::Main(main) => {
            f(&mut main.body);
            for contained in &mut main.body.contains {
                each_body(contained, f);
            }
        }
        ProgramUnit::Function(function) => {
            f(&mut function.body);
            for contained in &mut function.body.contains {
                each_body(contained, f);
            }
        }
        ProgramUnit::Subroutine(subroutine) => {
            f(&mut subroutine.body);
            for contained in &mut subroutine.body.contains {
                each_body(contained, f);
            }
        }
        ProgramUnit::Module(module) => {
            for contained in &mut module.contains {
                each_body(contained, f);
            }
        }
        ProgramUnit::BlockData(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_compiler_parser::parse_source;

    fn canonicalized(source: &str, ctx: &mut SemanticsContext) -> Program {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut program = output.program;
        canonicalize_do(ctx, &mut program);
        canonicalize_extensions(ctx, &mut program);
        program
    }

    fn main_execution(program: &Program) -> &Block {
        let ProgramUnit::Main(main) = &program.units[0] else {
            panic!("expected a main program");
        };
        &main.body.execution
    }

    #[test]
    fn test_label_do_folds_into_construct() {
        let mut ctx = SemanticsContext::default();
        let program = canonicalized(
            "program p\n\
             integer i, s\n\
             do 10 i = 1, 3\n\
             s = s + i\n\
             10 continue\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let execution = main_execution(&program);
        assert_eq!(execution.len(), 1);
        let ExecPart::Construct(Construct::Do(do_construct)) = &execution[0] else {
            panic!("expected a DO construct, got {:?}", execution[0]);
        };
        assert!(matches!(
            do_construct.control,
            Some(LoopControl::Counted { .. })
        ));
        assert_eq!(do_construct.body.len(), 2);
    }

    #[test]
    fn test_shared_terminal_closes_nested_loops() {
        let mut ctx = SemanticsContext::default();
        let program = canonicalized(
            "program p\n\
             integer i, j, s\n\
             do 10 i = 1, 3\n\
             do 10 j = 1, 3\n\
             s = s + j\n\
             10 continue\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let execution = main_execution(&program);
        assert_eq!(execution.len(), 1);
        let ExecPart::Construct(Construct::Do(outer)) = &execution[0] else {
            panic!("expected the outer DO construct");
        };
        assert_eq!(outer.body.len(), 1);
        let ExecPart::Construct(Construct::Do(inner)) = &outer.body[0] else {
            panic!("expected the inner DO construct");
        };
        assert_eq!(inner.body.len(), 2);
    }

    #[test]
    fn test_nonstandard_termination_warns() {
        let mut ctx = SemanticsContext::default();
        canonicalized(
            "program p\n\
             integer i, s\n\
             do 10 i = 1, 3\n\
             10 s = s + i\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let warnings = ctx.sink().warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("CONTINUE"));
    }

    #[test]
    fn test_branch_terminal_is_an_error() {
        let mut ctx = SemanticsContext::default();
        canonicalized(
            "program p\n\
             integer i\n\
             do 10 i = 1, 3\n\
             10 goto 10\n\
             end program\n",
            &mut ctx,
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("may not terminate a DO loop"));
    }

    #[test]
    fn test_terminal_outside_block_is_an_error() {
        let mut ctx = SemanticsContext::default();
        canonicalized(
            "program p\n\
             integer i\n\
             do 10 i = 1, 3\n\
             if (i > 1) then\n\
             10 continue\n\
             end if\n\
             end program\n",
            &mut ctx,
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0].message.contains("was not found"));
    }

    #[test]
    fn test_disabled_extension_directive_is_dropped_with_warning() {
        let mut ctx = SemanticsContext::default();
        let program = canonicalized(
            "program p\n\
             integer i\n\
             !$par parallel\n\
             i = 1\n\
             !$par end parallel\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        assert_eq!(ctx.sink().warnings().len(), 2);
        let execution = main_execution(&program);
        assert_eq!(execution.len(), 1);
        assert!(matches!(execution[0], ExecPart::Statement(_)));
    }

    #[test]
    fn test_parallel_region_folds_when_enabled() {
        let mut ctx = SemanticsContext::default();
        ctx.features.enable(LanguageExtensions::PARALLEL);
        let program = canonicalized(
            "program p\n\
             integer i\n\
             !$par parallel\n\
             i = 1\n\
             i = 2\n\
             !$par end parallel\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let execution = main_execution(&program);
        assert_eq!(execution.len(), 1);
        let ExecPart::Construct(Construct::Parallel(region)) = &execution[0] else {
            panic!("expected a parallel region, got {:?}", execution[0]);
        };
        assert_eq!(region.body.len(), 2);
    }

    #[test]
    fn test_unclosed_region_is_an_error() {
        let mut ctx = SemanticsContext::default();
        ctx.features.enable(LanguageExtensions::PARALLEL);
        canonicalized(
            "program p\n\
             integer i\n\
             !$par parallel\n\
             i = 1\n\
             end program\n",
            &mut ctx,
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0].message.contains("never closed"));
    }

    #[test]
    fn test_simd_attaches_to_following_do() {
        let mut ctx = SemanticsContext::default();
        ctx.features.enable(LanguageExtensions::SIMD);
        let program = canonicalized(
            "program p\n\
             integer i, s\n\
             !$simd loop\n\
             do 10 i = 1, 8\n\
             s = s + i\n\
             10 continue\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let execution = main_execution(&program);
        assert_eq!(execution.len(), 1);
        let ExecPart::Construct(Construct::Simd(simd)) = &execution[0] else {
            panic!("expected a SIMD construct, got {:?}", execution[0]);
        };
        assert_eq!(simd.body.len(), 1);
        assert!(matches!(
            simd.body[0],
            ExecPart::Construct(Construct::Do(_))
        ));
    }

    #[test]
    fn test_simd_without_loop_is_an_error() {
        let mut ctx = SemanticsContext::default();
        ctx.features.enable(LanguageExtensions::SIMD);
        canonicalized(
            "program p\n\
             integer i\n\
             !$simd loop\n\
             i = 1\n\
             end program\n",
            &mut ctx,
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("counted DO loop"));
    }

    #[test]
    fn test_unknown_sentinel_is_ignored_with_warning() {
        let mut ctx = SemanticsContext::default();
        canonicalized(
            "program p\n\
             !$acc kernels\n\
             end program\n",
            &mut ctx,
        );
        assert!(!ctx.any_fatal_error());
        let warnings = ctx.sink().warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("Ignoring directive"));
    }
}
