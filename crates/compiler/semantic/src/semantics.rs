//! # Semantics Driver
//!
//! [`Semantics`] owns the order of the analysis passes: builtin injection,
//! label validation, canonicalization, name resolution, function reference
//! rewriting, offsets, declaration checks, the two checking walks over the
//! execution parts, the feature-gated extension walks, and finally DATA
//! compilation, common block merging, and module file output. Each pass
//! runs only while no earlier pass has reported a fatal diagnostic, so a
//! pass can rely on the invariants of everything before it.

use std::io;

use ferro_compiler_diagnostics::{build_diagnostic_message, DiagnosticCode, WarningCategory};
use ferro_compiler_parser::ast::{Program, ProgramUnit, SymbolId, UnitBody};

use crate::canonicalize::{canonicalize_do, canonicalize_extensions};
use crate::check_declarations::check_declarations;
use crate::check_expressions::ExprChecker;
use crate::checkers::{offload_checkers, parallel_checkers, simd_checkers, statement_checkers};
use crate::context::SemanticsContext;
use crate::data_init::compile_data_initializations;
use crate::dump;
use crate::features::LanguageExtensions;
use crate::mod_file::{self, ModFileWriter};
use crate::offsets::compute_offsets;
use crate::resolve_labels::validate_labels;
use crate::resolve_names::resolve_names;
use crate::rewrite::rewrite_function_refs;
use crate::scope::ScopeKind;
use crate::visitor::CheckerVisitor;

pub struct Semantics<'a> {
    ctx: &'a mut SemanticsContext,
    program: &'a mut Program,
}

impl<'a> Semantics<'a> {
    pub fn new(ctx: &'a mut SemanticsContext, program: &'a mut Program) -> Self {
        Self { ctx, program }
    }

    /// Run every pass in order. Returns false as soon as one of them
    /// leaves a fatal diagnostic in the sink.
    pub fn perform(&mut self) -> bool {
        let _span =
            tracing::trace_span!("semantics", units = self.program.units.len()).entered();
        mod_file::inject_builtins(self.ctx, self.program);
        validate_labels(self.ctx, self.program)
            && canonicalize_do(self.ctx, self.program)
            && canonicalize_extensions(self.ctx, self.program)
            && resolve_names(self.ctx, self.program)
            && rewrite_function_refs(self.ctx, self.program)
            && compute_offsets(self.ctx)
            && check_declarations(self.ctx)
            && self.check_expressions()
            && self.check_statements()
            && self.check_extension_constructs()
            && self.warn_undefined_function_results()
            && compile_data_initializations(self.ctx)
            && self.process_common_blocks()
    }

    fn check_expressions(&mut self) -> bool {
        let mut visitor = CheckerVisitor::new().register(ExprChecker);
        walk_units(self.ctx, &self.program.units, &mut visitor)
    }

    fn check_statements(&mut self) -> bool {
        walk_units(self.ctx, &self.program.units, &mut statement_checkers())
    }

    fn check_extension_constructs(&mut self) -> bool {
        for (extension, mut visitor) in [
            (LanguageExtensions::PARALLEL, parallel_checkers()),
            (LanguageExtensions::OFFLOAD, offload_checkers()),
            (LanguageExtensions::SIMD, simd_checkers()),
        ] {
            if self.ctx.features.is_enabled(extension)
                && !walk_units(self.ctx, &self.program.units, &mut visitor)
            {
                return false;
            }
        }
        true
    }

    /// Warn about functions none of whose result variables is ever
    /// assigned. An ENTRY result counts for the whole subprogram, and
    /// functions read back from module files carry no bodies to judge.
    fn warn_undefined_function_results(&mut self) -> bool {
        let mut undefined = Vec::new();
        for (_, scope) in self.ctx.scopes.iter() {
            if scope.kind != ScopeKind::Subprogram || scope.is_module_file {
                continue;
            }
            let Some(symbol) = scope.symbol else {
                continue;
            };
            let Some(sub) = self.ctx.symbol(symbol).subprogram() else {
                continue;
            };
            if !sub.is_function {
                continue;
            }
            let mut results: Vec<SymbolId> = sub.result.into_iter().collect();
            for &entry in &sub.entries {
                if let Some(result) = self.ctx.symbol(entry).subprogram().and_then(|e| e.result) {
                    results.push(result);
                }
            }
            if results.is_empty() || results.iter().any(|&id| self.ctx.is_defined(id)) {
                continue;
            }
            let primary = self.ctx.symbol(results[0]);
            undefined.push((primary.name.clone(), self.ctx.symbol(symbol).span));
        }
        for (name, span) in undefined {
            self.ctx.warn(
                WarningCategory::UndefinedFunctionResult,
                DiagnosticCode::UndefinedFunctionResult,
                format!("Function result '{name}' is never defined"),
                span,
            );
        }
        !self.ctx.any_fatal_error()
    }

    /// Merge every common block appearance into the context-wide map,
    /// then render module files
    fn process_common_blocks(&mut self) -> bool {
        let commons: Vec<SymbolId> = self
            .ctx
            .scopes
            .iter()
            .filter(|(_, scope)| !scope.is_module_file)
            .flat_map(|(_, scope)| scope.common_blocks.values().copied())
            .collect();
        for common in commons {
            crate::common_blocks::map_common_block_and_check_conflicts(self.ctx, common);
        }
        !self.ctx.any_fatal_error() && ModFileWriter::new(self.ctx).write_all()
    }

    /// Render the recorded diagnostics against `source`, in source order,
    /// stopping once the error limit is reached
    pub fn emit_messages<W: io::Write>(
        &mut self,
        source: &str,
        writer: &mut W,
        with_color: bool,
    ) -> io::Result<()> {
        self.ctx.sink_mut().sort_by_position();
        let max_errors = self.ctx.max_errors();
        let mut errors = 0;
        for diagnostic in self.ctx.sink().iter() {
            if diagnostic.is_fatal() {
                errors += 1;
                if errors > max_errors {
                    writeln!(writer, "error: too many errors, stopping now")?;
                    break;
                }
            }
            write!(
                writer,
                "{}",
                build_diagnostic_message(source, diagnostic, with_color)
            )?;
        }
        Ok(())
    }

    pub fn dump_symbols(&self) -> String {
        dump::dump_symbols(self.ctx)
    }
}

/// Run a checking visitor over the execution part of every unit,
/// contained subprograms included
fn walk_units(
    ctx: &mut SemanticsContext,
    units: &[ProgramUnit],
    visitor: &mut CheckerVisitor,
) -> bool {
    let mut ok = true;
    for unit in units {
        match unit {
            ProgramUnit::Main(main) => ok &= walk_body(ctx, main.span.start, &main.body, visitor),
            ProgramUnit::Function(function) => {
                ok &= walk_body(ctx, function.span.start, &function.body, visitor);
            }
            ProgramUnit::Subroutine(subroutine) => {
                ok &= walk_body(ctx, subroutine.span.start, &subroutine.body, visitor);
            }
            ProgramUnit::Module(module) => ok &= walk_units(ctx, &module.contains, visitor),
            ProgramUnit::BlockData(_) => {}
        }
    }
    ok
}

fn walk_body(
    ctx: &mut SemanticsContext,
    offset: usize,
    body: &UnitBody,
    visitor: &mut CheckerVisitor,
) -> bool {
    let scope = ctx.find_scope(offset);
    let mut ok = visitor.walk(ctx, scope, &body.execution);
    ok &= walk_units(ctx, &body.contains, visitor);
    ok
}

#[cfg(test)]
mod tests {
    use ferro_compiler_parser::parse_source;

    use super::*;
    use crate::features::{DefaultKinds, LanguageFeatures};

    fn run(source: &str) -> (SemanticsContext, bool) {
        run_with(source, LanguageFeatures::default())
    }

    fn run_with(source: &str, features: LanguageFeatures) -> (SemanticsContext, bool) {
        let output = parse_source(source);
        assert!(
            output.diagnostics.is_empty(),
            "unexpected parse errors: {:?}",
            output.diagnostics
        );
        let mut program = output.program;
        let mut ctx = SemanticsContext::new(
            features,
            DefaultKinds::default(),
            crate::features::TargetCharacteristics::default(),
        );
        let ok = Semantics::new(&mut ctx, &mut program).perform();
        (ctx, ok)
    }

    #[test]
    fn test_clean_program_performs_quietly() {
        let (ctx, ok) = run(
            "program p\n\
             implicit none\n\
             integer :: i, total\n\
             total = 0\n\
             do i = 1, 10\n\
             total = total + i\n\
             end do\n\
             end program\n",
        );
        assert!(ok, "{:#?}", ctx.sink().all());
        assert!(ctx.sink().is_empty(), "{:#?}", ctx.sink().all());
    }

    #[test]
    fn test_resolution_errors_stop_the_pipeline() {
        let (ctx, ok) = run(
            "program p\n\
             implicit none\n\
             total = 1\n\
             end program\n",
        );
        assert!(!ok);
        assert_eq!(ctx.sink().error_count(), 1);
        assert!(ctx.sink().all()[0].message.contains("No explicit type"));
    }

    #[test]
    fn test_contained_subprograms_are_checked() {
        let (ctx, ok) = run(
            "module m\n\
             contains\n\
             subroutine s\n\
             integer, parameter :: n = 3\n\
             n = 4\n\
             end subroutine\n\
             end module\n",
        );
        assert!(!ok);
        assert!(ctx.sink().all()[0]
            .message
            .contains("Named constant 'n' may not be assigned"));
    }

    #[test]
    fn test_module_files_come_out_of_perform() {
        let (ctx, ok) = run(
            "module geom\n\
             integer, parameter :: sides = 3\n\
             end module\n",
        );
        assert!(ok, "{:#?}", ctx.sink().all());
        let text = ctx.module_files.get("geom").unwrap();
        assert!(text.contains("integer(4), parameter :: sides = 3"));
    }

    #[test]
    fn test_undefined_function_result_warning() {
        let (ctx, ok) = run(
            "real function f(x)\n\
             real :: x\n\
             end function\n",
        );
        assert!(ok, "{:#?}", ctx.sink().all());
        assert!(ctx.sink().warnings()[0]
            .message
            .contains("Function result 'f' is never defined"));
    }

    #[test]
    fn test_entry_result_definition_satisfies_the_host() {
        let (ctx, ok) = run(
            "integer function f(a)\n\
             integer :: a\n\
             integer :: e\n\
             entry e(a)\n\
             e = a\n\
             end function\n",
        );
        assert!(ok, "{:#?}", ctx.sink().all());
        assert!(ctx.sink().is_empty(), "{:#?}", ctx.sink().all());
    }

    #[test]
    fn test_emit_messages_sorts_and_cuts_off() {
        let (ctx, ok) = run(
            "program p\n\
             implicit none\n\
             b = 2\n\
             a = 1\n\
             end program\n",
        );
        assert!(!ok);
        let mut ctx = ctx.with_max_errors(1);
        let source = "program p\nimplicit none\nb = 2\na = 1\nend program\n";
        let mut program = parse_source(source).program;
        let mut rendered = Vec::new();
        Semantics::new(&mut ctx, &mut program)
            .emit_messages(source, &mut rendered, false)
            .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        let b_at = rendered.find("'b'").unwrap();
        assert!(rendered.contains("too many errors"), "{rendered}");
        assert!(!rendered.contains("'a'"), "{rendered}");
        assert!(b_at < rendered.find("too many errors").unwrap());
    }
}
