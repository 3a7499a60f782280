//! # Builtin Modules and Module Files
//!
//! Two kinds of modules reach a compilation without being part of its
//! source. Builtin modules ship as source text inside the compiler and are
//! compiled on first use into a scope root of their own, so `USE` can find
//! them in any program. Module files are the rendered form of modules
//! compiled earlier: [`ModFileWriter`] turns every module scope of a
//! finished compilation into `.fmod` text, and [`require_module`] reads such
//! text back by parsing and resolving it like ordinary source.
//!
//! Scopes built from module file text are flagged `is_module_file` and kept
//! out of the source offset index; their byte offsets belong to the module
//! file, not to the program being compiled.

use std::io;

use chumsky::span::SimpleSpan;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use ferro_compiler_diagnostics::DiagnosticCode;
use ferro_compiler_parser::ast::{Program, ProgramUnit, SymbolId};
use ferro_compiler_parser::parse_source;

use crate::context::SemanticsContext;
use crate::data_init;
use crate::resolve_names::resolve_names;
use crate::scope::{ScopeId, ScopeKind};
use crate::symbol::{Initializer, ObjectDetails, SymbolDetails, SymbolFlags};
use crate::types::{Extent, TypeDesc};

pub const BUILTIN_CORE_NAME: &str = "__ferro_builtins";
pub const BUILTIN_VECTOR_NAME: &str = "__ferro_vector";

/// First line of every module file; readers reject anything else
pub const MOD_FILE_HEADER: &str = "!fmod version 1";

pub const MOD_FILE_SUFFIX: &str = ".fmod";

const BUILTIN_CORE_SOURCE: &str = "\
module __ferro_builtins
integer, parameter :: __builtin_max_rank = 7
type __builtin_lock_type
integer :: __count
end type
end module
";

fn builtin_vector_source(vector_width: u32) -> String {
    let lanes = (vector_width / 4).max(1);
    format!(
        "module __ferro_vector\n\
         use __ferro_builtins\n\
         integer, parameter :: __builtin_vector_lanes = {lanes}\n\
         type vector4\n\
         real :: x\n\
         real :: y\n\
         real :: z\n\
         real :: w\n\
         end type\n\
         end module\n"
    )
}

/// Derived types from the builtin modules whose internals user code may
/// not touch
pub fn is_opaque_builtin_type(name: &str) -> bool {
    name.starts_with("__builtin_")
}

/// Compile the builtin modules this program may USE.
///
/// A program whose leading unit is itself a builtin module gets only the
/// builtins that module depends on, so compiling the builtin sources
/// through this same path does not recurse.
pub fn inject_builtins(ctx: &mut SemanticsContext, program: &Program) {
    let leading = match program.units.first() {
        Some(ProgramUnit::Module(module)) => Some(module.name.as_str()),
        _ => None,
    };
    match leading {
        Some(BUILTIN_CORE_NAME) => {}
        Some(BUILTIN_VECTOR_NAME) => {
            compile_builtin(ctx, BUILTIN_CORE_NAME, BUILTIN_CORE_SOURCE);
        }
        _ => {
            compile_builtin(ctx, BUILTIN_CORE_NAME, BUILTIN_CORE_SOURCE);
            if let Some(width) = ctx.target.vector_width {
                let source = builtin_vector_source(width);
                compile_builtin(ctx, BUILTIN_VECTOR_NAME, &source);
            }
        }
    }
}

/// Compile a builtin module from its embedded source, once.
///
/// Panics when the source does not compile; the builtin texts ship with the
/// compiler and a diagnostic from one is a compiler bug.
fn compile_builtin(ctx: &mut SemanticsContext, name: &str, source: &str) -> ScopeId {
    if let Some(scope) = ctx.builtin_module(name) {
        return scope;
    }
    let ok = compile_module_text(ctx, source);
    let scope = match (ok, ctx.compiled_module(name)) {
        (true, Some(scope)) => scope,
        _ => panic!("builtin module '{name}' failed to compile"),
    };
    ctx.register_builtin_module(SmolStr::new(name), scope);
    let root = ctx.intrinsic_modules_scope();
    ctx.scopes.reparent(scope, root);
    scope
}

/// Find or load the scope of a module for USE association.
///
/// Modules compiled from source in this context win, then builtin modules,
/// then the in-memory module file store, then `{name}.fmod` under the
/// module directory. Every failure is reported here, against `span`, so a
/// bad module file produces exactly one diagnostic.
pub fn require_module(
    ctx: &mut SemanticsContext,
    name: &str,
    span: SimpleSpan<usize>,
) -> Option<ScopeId> {
    if let Some(scope) = ctx.compiled_module(name) {
        return Some(scope);
    }
    if let Some(scope) = ctx.builtin_module(name) {
        return Some(scope);
    }
    let path = ctx
        .module_directory()
        .map(|dir| dir.join(format!("{name}{MOD_FILE_SUFFIX}")));
    let text = match (ctx.module_files.get(name), path) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!("Reading module file '{}'", path.display());
                text
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return missing_module(ctx, name, span);
            }
            Err(error) => {
                ctx.error(
                    DiagnosticCode::ModuleFileError,
                    format!("Module file '{}' is not readable: {error}", path.display()),
                    span,
                );
                return None;
            }
        },
        (None, None) => return missing_module(ctx, name, span),
    };
    if !text.starts_with(MOD_FILE_HEADER) {
        ctx.error(
            DiagnosticCode::ModuleFileError,
            format!("Module file for '{name}' has a bad header"),
            span,
        );
        return None;
    }
    if !compile_module_text(ctx, &text) {
        ctx.error(
            DiagnosticCode::ModuleFileError,
            format!("Module file for '{name}' is corrupt"),
            span,
        );
        return None;
    }
    let scope = ctx.compiled_module(name);
    if scope.is_none() {
        ctx.error(
            DiagnosticCode::ModuleFileError,
            format!("Module file for '{name}' does not define it"),
            span,
        );
    }
    scope
}

fn missing_module(ctx: &mut SemanticsContext, name: &str, span: SimpleSpan<usize>) -> Option<ScopeId> {
    ctx.error(
        DiagnosticCode::MissingModule,
        format!("Module '{name}' was not found"),
        span,
    );
    None
}

/// Parse and resolve module text into fresh scopes, flagged as module file
/// scopes. Returns false, with the sink restored, when the text produced
/// any diagnostic.
fn compile_module_text(ctx: &mut SemanticsContext, text: &str) -> bool {
    let sink_len = ctx.sink().len();
    let first_new_scope = ctx.scopes.len();
    // DATA statements already deferred belong to the program being
    // compiled; the module's own are expanded right away
    let saved_data = ctx.take_deferred_data();
    ctx.enter_module_file();

    let output = parse_source(text);
    let mut ok = output.diagnostics.is_empty();
    if ok {
        let mut program = output.program;
        resolve_names(ctx, &mut program);
        let module_data = ctx.take_deferred_data();
        data_init::compile_items(ctx, &module_data);
        ok = ctx.sink().len() == sink_len;
    }

    ctx.leave_module_file();
    for init in saved_data {
        ctx.defer_initialization(init.scope, init.data);
    }
    for index in first_new_scope..ctx.scopes.len() {
        ctx.scopes.scope_mut(ScopeId::from_usize(index)).is_module_file = true;
    }
    if !ok {
        ctx.sink_mut().truncate(sink_len);
    }
    ok
}

/// Renders the modules of a finished compilation into module file text.
///
/// Every module scope compiled from source lands in the context's module
/// file store, and on disk when a module directory is configured. Hermetic
/// mode inlines the text of transitively used modules ahead of the module
/// itself, so one file read resolves the whole dependency chain.
pub struct ModFileWriter<'a> {
    ctx: &'a mut SemanticsContext,
}

impl<'a> ModFileWriter<'a> {
    pub fn new(ctx: &'a mut SemanticsContext) -> Self {
        Self { ctx }
    }

    /// Render every module compiled from source. Returns false when a
    /// module file could not be written to the module directory.
    pub fn write_all(mut self) -> bool {
        let modules: Vec<ScopeId> = self
            .ctx
            .scopes
            .iter()
            .filter(|(_, scope)| scope.kind == ScopeKind::Module && !scope.is_module_file)
            .map(|(id, _)| id)
            .collect();
        let mut ok = true;
        for scope in modules {
            ok &= self.write_module(scope);
        }
        ok
    }

    fn write_module(&mut self, scope: ScopeId) -> bool {
        let name = self.ctx.scope(scope).name.clone();
        let mut text = String::from(MOD_FILE_HEADER);
        text.push('\n');
        if self.ctx.hermetic_module_files() {
            // Dependencies first, so each module's USE statements resolve
            // against text earlier in the same file
            for dep in self.transitive_uses(scope) {
                render_module(self.ctx, dep, &mut text);
            }
        }
        render_module(self.ctx, scope, &mut text);
        self.ctx.module_files.insert(name.clone(), text.clone());

        let path = match self.ctx.module_directory() {
            Some(dir) => dir.join(format!("{name}{MOD_FILE_SUFFIX}")),
            None => return true,
        };
        tracing::debug!("Writing module file '{}'", path.display());
        if let Err(error) = std::fs::write(&path, &text) {
            let span = self.module_span(scope);
            self.ctx.error(
                DiagnosticCode::ModuleFileError,
                format!("Could not write module file '{}': {error}", path.display()),
                span,
            );
            return false;
        }
        true
    }

    /// Module scopes this module USEs, directly or through other modules,
    /// dependencies before dependents. Builtin modules are left out; every
    /// compilation has them without a module file.
    fn transitive_uses(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        seen.insert(scope);
        self.visit_uses(scope, &mut seen, &mut order);
        order
    }

    fn visit_uses(&self, scope: ScopeId, seen: &mut FxHashSet<ScopeId>, order: &mut Vec<ScopeId>) {
        for dep in used_modules(self.ctx, scope) {
            if is_builtin_scope(self.ctx, dep) || !seen.insert(dep) {
                continue;
            }
            self.visit_uses(dep, seen, order);
            order.push(dep);
        }
    }

    fn module_span(&self, scope: ScopeId) -> SimpleSpan<usize> {
        self.ctx
            .scope(scope)
            .symbol
            .map_or_else(|| SimpleSpan::from(0..0), |id| self.ctx.symbol(id).span)
    }
}

/// Module scopes referenced by the USE associations of `scope`, in
/// declaration order without duplicates
fn used_modules(ctx: &SemanticsContext, scope: ScopeId) -> Vec<ScopeId> {
    let mut deps = Vec::new();
    for (_, id) in ctx.scope(scope).symbols() {
        if let SymbolDetails::Use { target } = &ctx.symbol(id).details {
            let owner = ctx.symbol(*target).owner;
            if ctx.scope(owner).kind == ScopeKind::Module && !deps.contains(&owner) {
                deps.push(owner);
            }
        }
    }
    deps
}

fn is_builtin_scope(ctx: &SemanticsContext, scope: ScopeId) -> bool {
    ctx.scope(scope)
        .parent
        .is_some_and(|parent| ctx.scope(parent).kind == ScopeKind::IntrinsicModules)
}

/// Render one module scope as module file text
fn render_module(ctx: &SemanticsContext, scope: ScopeId, out: &mut String) {
    let data = ctx.scope(scope);
    out.push_str(&format!("module {}\n", data.name));
    if data.implicit_none {
        out.push_str("implicit none\n");
    }
    for module in used_modules(ctx, scope) {
        out.push_str(&format!("use {}\n", ctx.scope(module).name));
    }
    for (name, id) in data.symbols() {
        let symbol = ctx.symbol(id);
        if symbol.flags.contains(SymbolFlags::COMPILER_CREATED) {
            continue;
        }
        match &symbol.details {
            SymbolDetails::Object(object) => {
                render_object_decl(ctx, name, object, symbol.flags, out);
            }
            SymbolDetails::DerivedType { scope: type_scope } => {
                render_derived_type(ctx, name, *type_scope, out);
            }
            _ => {}
        }
    }
    for (name, id) in &data.common_blocks {
        let Some(block) = ctx.symbol(*id).common_block() else {
            continue;
        };
        let members: Vec<&str> = block
            .objects
            .iter()
            .map(|&member| ctx.symbol(member).name.as_str())
            .collect();
        if name.is_empty() {
            out.push_str(&format!("common {}\n", members.join(", ")));
        } else {
            out.push_str(&format!("common /{name}/ {}\n", members.join(", ")));
        }
    }
    for set in &data.equivalence_sets {
        let refs: Vec<String> = set
            .iter()
            .map(|r| {
                let name = &ctx.symbol(r.symbol).name;
                if r.subscripts.is_empty() {
                    name.to_string()
                } else {
                    let subs: Vec<String> = r.subscripts.iter().map(i64::to_string).collect();
                    format!("{name}({})", subs.join(","))
                }
            })
            .collect();
        out.push_str(&format!("equivalence ({})\n", refs.join(", ")));
    }
    render_data_images(ctx, scope, out);
    let contained: Vec<SymbolId> = data
        .symbols()
        .filter_map(|(_, id)| match ctx.symbol(id).subprogram() {
            Some(sub) if !sub.is_entry => Some(id),
            _ => None,
        })
        .collect();
    if !contained.is_empty() {
        out.push_str("contains\n");
        for id in contained {
            render_subprogram(ctx, id, out);
        }
    }
    out.push_str("end module\n");
}

fn render_object_decl(
    ctx: &SemanticsContext,
    name: &str,
    object: &ObjectDetails,
    flags: SymbolFlags,
    out: &mut String,
) {
    let Some(decl_type) = object.decl_type else {
        return;
    };
    let mut line = render_type(ctx, &decl_type);
    if flags.contains(SymbolFlags::PARAMETER) {
        line.push_str(", parameter");
    }
    line.push_str(" :: ");
    line.push_str(name);
    if !object.shape.is_empty() {
        let dims: Vec<String> = object
            .shape
            .iter()
            .map(|extent| format!("{}:{}", extent.lower, extent.upper))
            .collect();
        line.push_str(&format!("({})", dims.join(",")));
    }
    if flags.contains(SymbolFlags::PARAMETER) {
        match &object.value {
            Some(value) => line.push_str(&format!(" = {value}")),
            // A parameter that never folded is only written after errors,
            // which never happens; skip it rather than write garbage
            None => return,
        }
    } else if let Some(Initializer::Scalar(value)) = &object.init {
        line.push_str(&format!(" = {value}"));
    }
    line.push('\n');
    out.push_str(&line);
}

fn render_type(ctx: &SemanticsContext, ty: &TypeDesc) -> String {
    match ty {
        TypeDesc::Integer { kind } => format!("integer({kind})"),
        TypeDesc::Real { kind } => format!("real({kind})"),
        TypeDesc::Logical { kind } => format!("logical({kind})"),
        TypeDesc::Character { len } => format!("character({len})"),
        TypeDesc::Derived(id) => format!("type({})", ctx.symbol(*id).name),
    }
}

fn render_derived_type(ctx: &SemanticsContext, name: &str, type_scope: ScopeId, out: &mut String) {
    out.push_str(&format!("type {name}\n"));
    for (component, id) in ctx.scope(type_scope).symbols() {
        if let Some(object) = ctx.symbol(id).object() {
            render_object_decl(ctx, component, object, SymbolFlags::empty(), out);
        }
    }
    out.push_str("end type\n");
}

/// Array initializers as DATA statements, one per object, each element
/// spelled with explicit subscripts so holes stay holes
fn render_data_images(ctx: &SemanticsContext, scope: ScopeId, out: &mut String) {
    for (name, id) in ctx.scope(scope).symbols() {
        let symbol = ctx.symbol(id);
        if symbol.flags.contains(SymbolFlags::COMPILER_CREATED) {
            continue;
        }
        let Some(object) = symbol.object() else {
            continue;
        };
        let Some(Initializer::Elements(elements)) = &object.init else {
            continue;
        };
        let mut objects = Vec::new();
        let mut values = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            if let Some(value) = element {
                objects.push(format!(
                    "{name}({})",
                    render_subscripts(&object.shape, index as u64)
                ));
                values.push(value.to_string());
            }
        }
        if !objects.is_empty() {
            out.push_str(&format!(
                "data {} /{}/\n",
                objects.join(", "),
                values.join(", ")
            ));
        }
    }
}

/// Subscripts of the element at `index` in array element order
fn render_subscripts(shape: &[Extent], index: u64) -> String {
    let mut remaining = index;
    let mut subs = Vec::with_capacity(shape.len());
    for extent in shape {
        let count = extent.count().max(1);
        subs.push((extent.lower + (remaining % count) as i64).to_string());
        remaining /= count;
    }
    subs.join(",")
}

fn render_subprogram(ctx: &SemanticsContext, id: SymbolId, out: &mut String) {
    let symbol = ctx.symbol(id);
    let Some(sub) = symbol.subprogram() else {
        return;
    };
    if sub.is_function {
        let mut line = String::new();
        if let Some(ty) = result_type(ctx, sub.result) {
            line.push_str(&render_type(ctx, &ty));
            line.push(' ');
        }
        line.push_str(&format!(
            "function {}({})",
            symbol.name,
            dummy_list(ctx, &sub.dummy_args)
        ));
        if let Some(result) = sub.result {
            let result_name = &ctx.symbol(result).name;
            if *result_name != symbol.name {
                line.push_str(&format!(" result({result_name})"));
            }
        }
        line.push('\n');
        out.push_str(&line);
    } else {
        out.push_str(&format!(
            "subroutine {}({})\n",
            symbol.name,
            dummy_list(ctx, &sub.dummy_args)
        ));
    }
    // Dummy declarations, for the host and every entry, give the rendered
    // interface its argument types
    let mut dummies: Vec<SymbolId> = Vec::new();
    for &dummy in &sub.dummy_args {
        if !dummies.contains(&dummy) {
            dummies.push(dummy);
        }
    }
    for &entry in &sub.entries {
        if let Some(entry_sub) = ctx.symbol(entry).subprogram() {
            for &dummy in &entry_sub.dummy_args {
                if !dummies.contains(&dummy) {
                    dummies.push(dummy);
                }
            }
        }
    }
    for dummy in dummies {
        if let Some(object) = ctx.symbol(dummy).object() {
            render_object_decl(
                ctx,
                &ctx.symbol(dummy).name,
                object,
                SymbolFlags::empty(),
                out,
            );
        }
    }
    // Entry result types ride on declarations of the result names, which
    // the reader merges back into the entry symbols
    for &entry in &sub.entries {
        let Some(entry_sub) = ctx.symbol(entry).subprogram() else {
            continue;
        };
        if let (Some(result), Some(ty)) = (entry_sub.result, result_type(ctx, entry_sub.result)) {
            out.push_str(&format!(
                "{} :: {}\n",
                render_type(ctx, &ty),
                ctx.symbol(result).name
            ));
        }
    }
    for &entry in &sub.entries {
        let entry_symbol = ctx.symbol(entry);
        let Some(entry_sub) = entry_symbol.subprogram() else {
            continue;
        };
        let mut line = format!(
            "entry {}({})",
            entry_symbol.name,
            dummy_list(ctx, &entry_sub.dummy_args)
        );
        if let Some(result) = entry_sub.result {
            let result_name = &ctx.symbol(result).name;
            if *result_name != entry_symbol.name {
                line.push_str(&format!(" result({result_name})"));
            }
        }
        line.push('\n');
        out.push_str(&line);
    }
    out.push_str(if sub.is_function {
        "end function\n"
    } else {
        "end subroutine\n"
    });
}

fn result_type(ctx: &SemanticsContext, result: Option<SymbolId>) -> Option<TypeDesc> {
    result
        .and_then(|id| ctx.symbol(id).object())
        .and_then(|object| object.decl_type)
}

fn dummy_list(ctx: &SemanticsContext, args: &[SymbolId]) -> String {
    let names: Vec<&str> = args
        .iter()
        .map(|&id| ctx.symbol(id).name.as_str())
        .collect();
    names.join(", ")
}
