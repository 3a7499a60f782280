//! # Declaration Checks
//!
//! Whole-symbol-table checks that need resolution and layout to have
//! finished: storage-class conflicts and unused-variable warnings.

use ferro_compiler_diagnostics::{DiagnosticCode, WarningCategory};

use crate::context::SemanticsContext;
use crate::scope::ScopeKind;
use crate::symbol::SymbolFlags;

pub fn check_declarations(ctx: &mut SemanticsContext) -> bool {
    let scopes: Vec<_> = ctx.scopes.iter().map(|(id, _)| id).collect();
    for scope in scopes {
        let kind = ctx.scope(scope).kind;
        if ctx.scope(scope).is_module_file {
            continue;
        }
        if !matches!(
            kind,
            ScopeKind::MainProgram | ScopeKind::Subprogram | ScopeKind::Module | ScopeKind::BlockData
        ) {
            continue;
        }
        let symbols: Vec<_> = ctx.scope(scope).symbols().map(|(_, id)| id).collect();
        for id in symbols {
            let symbol = ctx.symbol(id);
            let Some(object) = symbol.object() else {
                continue;
            };
            let name = symbol.name.clone();
            let span = symbol.span;
            let flags = symbol.flags;
            let in_common = object.common.is_some();

            if in_common && flags.contains(SymbolFlags::DUMMY) {
                ctx.error(
                    DiagnosticCode::InvalidCommonObject,
                    format!("Dummy argument '{name}' may not be in COMMON"),
                    span,
                );
                continue;
            }
            if in_common && flags.contains(SymbolFlags::FUNCTION_RESULT) {
                ctx.error(
                    DiagnosticCode::InvalidCommonObject,
                    format!("Function result '{name}' may not be in COMMON"),
                    span,
                );
                continue;
            }

            // Module and block-data objects are reachable from other
            // units, so only locals get the unused warning
            let local = matches!(kind, ScopeKind::MainProgram | ScopeKind::Subprogram);
            let exempt = SymbolFlags::USED
                | SymbolFlags::DUMMY
                | SymbolFlags::COMPILER_CREATED
                | SymbolFlags::FUNCTION_RESULT
                | SymbolFlags::PARAMETER
                | SymbolFlags::EQUIVALENCED
                | SymbolFlags::DATA_INIT;
            if local && !in_common && !flags.intersects(exempt) {
                ctx.warn(
                    WarningCategory::UnusedVariable,
                    DiagnosticCode::UnusedVariable,
                    format!("Variable '{name}' is never used"),
                    span,
                );
            }
        }
    }
    !ctx.any_fatal_error()
}
