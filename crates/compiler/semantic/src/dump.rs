//! Text dump of the scope tree, for `--dump-symbols` and debugging.

use crate::context::SemanticsContext;
use crate::scope::{ScopeId, ScopeKind, GLOBAL_SCOPE};
use crate::symbol::{Symbol, SymbolDetails, SymbolFlags};
use crate::types::describe_type;

/// Render every scope reachable from the global scope, one line per
/// symbol, children indented under their parents
pub fn dump_symbols(ctx: &SemanticsContext) -> String {
    let mut out = String::new();
    dump_scope(ctx, GLOBAL_SCOPE, 0, &mut out);
    out
}

fn dump_scope(ctx: &SemanticsContext, scope: ScopeId, indent: usize, out: &mut String) {
    let data = ctx.scope(scope);
    let pad = "  ".repeat(indent);
    out.push_str(&pad);
    out.push_str(scope_label(data.kind));
    if !data.name.is_empty() {
        out.push_str(&format!(" {}", data.name));
    }
    out.push_str(&format!(" size={} alignment={}", data.size, data.alignment));
    if let Some((start, end)) = data.source_range() {
        out.push_str(&format!(" range={start}..{end}"));
    }
    if data.is_module_file {
        out.push_str(" (module file)");
    }
    out.push('\n');

    if data.implicit_none {
        out.push_str(&format!("{pad}  implicit none\n"));
    }
    for (name, id) in data.symbols() {
        out.push_str(&format!("{pad}  {name}"));
        dump_symbol(ctx, ctx.symbol(id), out);
        out.push('\n');
    }
    for (name, id) in &data.common_blocks {
        let shown = if name.is_empty() { "(blank)" } else { name.as_str() };
        out.push_str(&format!("{pad}  common /{shown}/"));
        if let Some(block) = ctx.symbol(*id).common_block() {
            let members: Vec<&str> = block
                .objects
                .iter()
                .map(|&member| ctx.symbol(member).name.as_str())
                .collect();
            out.push_str(&format!(" size={} ({})", block.size, members.join(", ")));
        }
        out.push('\n');
    }
    for set in &data.equivalence_sets {
        let names: Vec<&str> = set
            .iter()
            .map(|r| ctx.symbol(r.symbol).name.as_str())
            .collect();
        out.push_str(&format!("{pad}  equivalence ({})\n", names.join(", ")));
    }
    for &child in &data.children {
        dump_scope(ctx, child, indent + 1, out);
    }
}

const fn scope_label(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Global => "Global scope:",
        ScopeKind::IntrinsicModules => "Intrinsic modules:",
        ScopeKind::MainProgram => "MainProgram scope:",
        ScopeKind::Subprogram => "Subprogram scope:",
        ScopeKind::Module => "Module scope:",
        ScopeKind::BlockData => "BlockData scope:",
        ScopeKind::DerivedType => "DerivedType scope:",
    }
}

fn dump_symbol(ctx: &SemanticsContext, symbol: &Symbol, out: &mut String) {
    let flags: Vec<String> = symbol
        .flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if !flags.is_empty() {
        out.push_str(&format!(" ({})", flags.join(", ")));
    }
    match &symbol.details {
        SymbolDetails::Object(object) => {
            match &object.decl_type {
                Some(ty) => out.push_str(&format!(": {}", describe_type(ty, &ctx.symbols))),
                None => out.push_str(": untyped"),
            }
            if !object.shape.is_empty() {
                let dims: Vec<String> = object
                    .shape
                    .iter()
                    .map(|extent| format!("{}:{}", extent.lower, extent.upper))
                    .collect();
                out.push_str(&format!(" shape=({})", dims.join(",")));
            }
            out.push_str(&format!(" offset={} size={}", object.offset, object.size));
            if let Some(value) = &object.value {
                out.push_str(&format!(" value={value}"));
            }
            if let Some(common) = object.common {
                out.push_str(&format!(" in /{}/", ctx.symbol(common).name));
            }
            if object.init.is_some() && !symbol.flags.contains(SymbolFlags::PARAMETER) {
                out.push_str(" initialized");
            }
        }
        SymbolDetails::Subprogram(sub) => {
            let what = match (sub.is_function, sub.is_entry) {
                (true, true) => "function entry",
                (true, false) => "function",
                (false, true) => "subroutine entry",
                (false, false) => "subroutine",
            };
            let dummies: Vec<&str> = sub
                .dummy_args
                .iter()
                .map(|&id| ctx.symbol(id).name.as_str())
                .collect();
            out.push_str(&format!(": {what} ({})", dummies.join(", ")));
            if let Some(result) = sub.result {
                out.push_str(&format!(" result={}", ctx.symbol(result).name));
            }
        }
        SymbolDetails::MainProgram { .. } => out.push_str(": main program"),
        SymbolDetails::Module { .. } => out.push_str(": module"),
        SymbolDetails::BlockData { .. } => out.push_str(": block data"),
        SymbolDetails::DerivedType { .. } => out.push_str(": derived type"),
        SymbolDetails::CommonBlock(_) => out.push_str(": common block"),
        SymbolDetails::Use { target } => {
            let target = ctx.symbol(*target);
            let owner = &ctx.scope(target.owner).name;
            out.push_str(&format!(": use of {owner}::{}", target.name));
        }
        SymbolDetails::Intrinsic => out.push_str(": intrinsic"),
    }
}
