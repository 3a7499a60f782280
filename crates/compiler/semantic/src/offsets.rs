//! # Storage Layout
//!
//! Assigns byte offsets and sizes to objects after name resolution. Local
//! objects are bump-allocated in declaration order with natural alignment,
//! common-block members are laid out from the start of their block, and
//! EQUIVALENCE sets overlay storage: members of a set share one address,
//! joining a common block when one of them is a member of it.

use chumsky::span::SimpleSpan;
use ferro_compiler_parser::ast::SymbolId;
use rustc_hash::FxHashSet;

use ferro_compiler_diagnostics::DiagnosticCode;

use crate::context::SemanticsContext;
use crate::scope::{EquivRef, ScopeId, ScopeKind};
use crate::symbol::{SymbolDetails, SymbolFlags};
use crate::types::{element_count, TypeDesc};

/// Compute sizes and offsets for every scope. Returns false when layout
/// reported a fatal error.
pub fn compute_offsets(ctx: &mut SemanticsContext) -> bool {
    let mut pass = OffsetPass {
        ctx,
        sized_types: FxHashSet::default(),
        in_progress: FxHashSet::default(),
    };
    let scopes: Vec<ScopeId> = pass.ctx.scopes.iter().map(|(id, _)| id).collect();
    for &scope in &scopes {
        if pass.ctx.scope(scope).kind == ScopeKind::DerivedType {
            pass.layout_derived_type(scope);
        }
    }
    for &scope in &scopes {
        if pass.ctx.scope(scope).kind != ScopeKind::DerivedType {
            pass.layout_scope(scope);
        }
    }
    !ctx.any_fatal_error()
}

fn align_to(offset: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        offset
    } else {
        (offset + alignment - 1) / alignment * alignment
    }
}

struct OffsetPass<'a> {
    ctx: &'a mut SemanticsContext,
    sized_types: FxHashSet<ScopeId>,
    in_progress: FxHashSet<ScopeId>,
}

impl OffsetPass<'_> {
    /// Size and alignment of one element of the symbol's type
    fn element_layout(&mut self, id: SymbolId) -> (u64, u64) {
        let decl_type = {
            let Some(object) = self.ctx.symbol(id).object() else {
                return (0, 1);
            };
            object.decl_type
        };
        let Some(ty) = decl_type else {
            return (0, 1);
        };
        match self.type_layout(&ty) {
            Some(layout) => layout,
            None => {
                let symbol = self.ctx.symbol(id);
                let name = symbol.name.clone();
                let span = symbol.span;
                self.ctx.error(
                    DiagnosticCode::ConflictingDeclaration,
                    format!("Component '{name}' gives its derived type infinite size"),
                    span,
                );
                (0, 1)
            }
        }
    }

    /// `None` means the type refers back to a derived type still being
    /// laid out
    fn type_layout(&mut self, ty: &TypeDesc) -> Option<(u64, u64)> {
        if let (Some(size), Some(alignment)) = (ty.size(), ty.alignment()) {
            return Some((size, alignment));
        }
        let TypeDesc::Derived(type_symbol) = ty else {
            return Some((0, 1));
        };
        let SymbolDetails::DerivedType { scope } = self.ctx.symbol(*type_symbol).details else {
            return Some((0, 1));
        };
        if self.in_progress.contains(&scope) {
            return None;
        }
        self.layout_derived_type(scope);
        let laid_out = self.ctx.scope(scope);
        Some((laid_out.size, laid_out.alignment.max(1)))
    }

    fn layout_derived_type(&mut self, scope: ScopeId) {
        if !self.sized_types.insert(scope) {
            return;
        }
        self.in_progress.insert(scope);
        let components: Vec<SymbolId> = self
            .ctx
            .scope(scope)
            .symbols()
            .map(|(_, id)| id)
            .collect();
        let mut offset = 0;
        let mut alignment = 1;
        for component in components {
            let (elem_size, elem_align) = self.element_layout(component);
            let count = self
                .ctx
                .symbol(component)
                .object()
                .map_or(1, |object| element_count(&object.shape));
            let size = elem_size * count;
            offset = align_to(offset, elem_align);
            if let Some(object) = self.ctx.symbol_mut(component).object_mut() {
                object.offset = offset;
                object.size = size;
            }
            offset += size;
            alignment = alignment.max(elem_align);
        }
        self.in_progress.remove(&scope);
        let tail = self.ctx.scope_mut(scope);
        tail.size = align_to(offset, alignment);
        tail.alignment = alignment;
    }

    fn layout_scope(&mut self, scope: ScopeId) {
        let symbols: Vec<SymbolId> = self
            .ctx
            .scope(scope)
            .symbols()
            .map(|(_, id)| id)
            .collect();

        // Sizes first: common layout and equivalence need them
        for &id in &symbols {
            if self.ctx.symbol(id).object().is_none() {
                continue;
            }
            let (elem_size, _) = self.element_layout(id);
            let count = self
                .ctx
                .symbol(id)
                .object()
                .map_or(1, |object| element_count(&object.shape));
            if let Some(object) = self.ctx.symbol_mut(id).object_mut() {
                object.size = elem_size * count;
            }
        }

        let mut placed: FxHashSet<SymbolId> = FxHashSet::default();
        self.layout_common_blocks(scope, &mut placed);
        self.apply_equivalences(scope, &mut placed);

        // Remaining locals, in declaration order
        let mut size = self.ctx.scope(scope).size;
        let mut alignment = self.ctx.scope(scope).alignment.max(1);
        for &id in &symbols {
            let symbol = self.ctx.symbol(id);
            let skip = symbol.object().is_none()
                || symbol.object().is_some_and(|object| object.common.is_some())
                || placed.contains(&id)
                || symbol
                    .flags
                    .intersects(SymbolFlags::PARAMETER | SymbolFlags::DUMMY);
            if skip {
                continue;
            }
            let (_, align) = self.element_layout(id);
            let object_size = self
                .ctx
                .symbol(id)
                .object()
                .map_or(0, |object| object.size);
            size = align_to(size, align);
            if let Some(object) = self.ctx.symbol_mut(id).object_mut() {
                object.offset = size;
            }
            size += object_size;
            alignment = alignment.max(align);
        }
        let laid_out = self.ctx.scope_mut(scope);
        laid_out.size = size;
        laid_out.alignment = alignment;
    }

    fn layout_common_blocks(&mut self, scope: ScopeId, placed: &mut FxHashSet<SymbolId>) {
        let blocks: Vec<SymbolId> = self
            .ctx
            .scope(scope)
            .common_blocks
            .values()
            .copied()
            .collect();
        for block in blocks {
            let members = self
                .ctx
                .symbol(block)
                .common_block()
                .map_or_else(Vec::new, |details| details.objects.clone());
            let mut offset = 0;
            for member in members {
                let (_, align) = self.element_layout(member);
                let size = self
                    .ctx
                    .symbol(member)
                    .object()
                    .map_or(0, |object| object.size);
                offset = align_to(offset, align);
                if let Some(object) = self.ctx.symbol_mut(member).object_mut() {
                    object.offset = offset;
                }
                offset += size;
                placed.insert(member);
            }
            if let Some(details) = self.ctx.symbol_mut(block).common_block_mut() {
                details.size = offset;
            }
        }
    }

    fn apply_equivalences(&mut self, scope: ScopeId, placed: &mut FxHashSet<SymbolId>) {
        let sets = self.ctx.scope(scope).equivalence_sets.clone();
        for set in sets {
            self.apply_equivalence_set(scope, &set, placed);
        }
    }

    fn apply_equivalence_set(
        &mut self,
        scope: ScopeId,
        set: &[EquivRef],
        placed: &mut FxHashSet<SymbolId>,
    ) {
        let mut resolved = Vec::with_capacity(set.len());
        for r in set {
            let Some(disp) = self.displacement(r) else {
                return;
            };
            let symbol = self.ctx.symbol(r.symbol);
            let Some(object) = symbol.object() else {
                let name = symbol.name.clone();
                self.ctx.error(
                    DiagnosticCode::InvalidEquivalence,
                    format!("'{name}' may not appear in EQUIVALENCE"),
                    r.span,
                );
                return;
            };
            resolved.push(ResolvedRef {
                symbol: r.symbol,
                disp,
                size: object.size,
                common: object.common,
                span: r.span,
            });
        }

        let mut common: Option<SymbolId> = None;
        for r in &resolved {
            match (common, r.common) {
                (Some(a), Some(b)) if a != b => {
                    let a_name = self.ctx.symbol(a).name.clone();
                    let b_name = self.ctx.symbol(b).name.clone();
                    self.ctx.error(
                        DiagnosticCode::InvalidEquivalence,
                        format!(
                            "EQUIVALENCE set may not join COMMON blocks /{a_name}/ and /{b_name}/"
                        ),
                        r.span,
                    );
                    return;
                }
                (None, Some(b)) => common = Some(b),
                _ => {}
            }
        }

        // The address every member of the set shares, relative to the
        // hosting storage (common block or scope)
        let anchor = match common {
            Some(_) => resolved.iter().find_map(|r| {
                r.common.is_some().then(|| {
                    let offset = self
                        .ctx
                        .symbol(r.symbol)
                        .object()
                        .map_or(0, |object| object.offset);
                    offset + r.disp
                })
            }),
            None => resolved.iter().find_map(|r| {
                placed.contains(&r.symbol).then(|| {
                    let offset = self
                        .ctx
                        .symbol(r.symbol)
                        .object()
                        .map_or(0, |object| object.offset);
                    offset + r.disp
                })
            }),
        };
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => {
                // Fresh storage unit at the end of the scope
                let max_disp = resolved.iter().map(|r| r.disp).max().unwrap_or(0);
                let align = resolved
                    .iter()
                    .map(|r| self.element_layout(r.symbol).1)
                    .max()
                    .unwrap_or(1);
                align_to(self.ctx.scope(scope).size, align) + max_disp
            }
        };

        for r in &resolved {
            if placed.contains(&r.symbol) || r.common.is_some() {
                let current = self
                    .ctx
                    .symbol(r.symbol)
                    .object()
                    .map_or(0, |object| object.offset);
                if current + r.disp != anchor {
                    let name = self.ctx.symbol(r.symbol).name.clone();
                    self.ctx.error(
                        DiagnosticCode::InvalidEquivalence,
                        format!("'{name}' is already fixed at a conflicting storage location"),
                        r.span,
                    );
                }
                continue;
            }
            if anchor < r.disp {
                match common {
                    Some(block) => {
                        let block_name = self.ctx.symbol(block).name.clone();
                        self.ctx.error(
                            DiagnosticCode::InvalidEquivalence,
                            format!(
                                "EQUIVALENCE cannot extend COMMON block /{block_name}/ backward"
                            ),
                            r.span,
                        );
                    }
                    None => {
                        let name = self.ctx.symbol(r.symbol).name.clone();
                        self.ctx.error(
                            DiagnosticCode::InvalidEquivalence,
                            format!("Storage of '{name}' cannot precede its storage unit"),
                            r.span,
                        );
                    }
                }
                continue;
            }
            let offset = anchor - r.disp;
            if let Some(object) = self.ctx.symbol_mut(r.symbol).object_mut() {
                object.offset = offset;
                object.common = common;
            }
            placed.insert(r.symbol);
            match common {
                Some(block) => {
                    let end = offset + r.size;
                    if let Some(details) = self.ctx.symbol_mut(block).common_block_mut() {
                        details.size = details.size.max(end);
                        if !details.objects.contains(&r.symbol) {
                            details.objects.push(r.symbol);
                        }
                    }
                }
                None => {
                    let end = offset + r.size;
                    let host = self.ctx.scope_mut(scope);
                    host.size = host.size.max(end);
                }
            }
        }
    }

    /// Byte displacement of the designated element within its object
    fn displacement(&mut self, r: &EquivRef) -> Option<u64> {
        let (shape, rank) = {
            let Some(object) = self.ctx.symbol(r.symbol).object() else {
                return Some(0);
            };
            (object.shape.clone(), object.rank())
        };
        if r.subscripts.is_empty() {
            return Some(0);
        }
        if r.subscripts.len() != rank {
            let name = self.ctx.symbol(r.symbol).name.clone();
            self.error_at(
                r.span,
                format!(
                    "'{name}' has {} subscripts in EQUIVALENCE but rank {rank}",
                    r.subscripts.len()
                ),
            );
            return None;
        }
        let (elem_size, _) = self.element_layout(r.symbol);
        let mut stride = elem_size;
        let mut disp = 0;
        for (subscript, extent) in r.subscripts.iter().zip(&shape) {
            if *subscript < extent.lower || *subscript > extent.upper {
                let name = self.ctx.symbol(r.symbol).name.clone();
                self.error_at(
                    r.span,
                    format!("Subscript out of range in EQUIVALENCE reference to '{name}'"),
                );
                return None;
            }
            disp += (*subscript - extent.lower) as u64 * stride;
            stride *= extent.count();
        }
        Some(disp)
    }

    fn error_at(&mut self, span: SimpleSpan<usize>, message: String) {
        self.ctx
            .error(DiagnosticCode::InvalidEquivalence, message, span);
    }
}

struct ResolvedRef {
    symbol: SymbolId,
    disp: u64,
    size: u64,
    common: Option<SymbolId>,
    span: SimpleSpan<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve_names::resolve_names;
    use crate::symbol::Symbol;
    use ferro_compiler_parser::parse_source;

    fn layout(source: &str) -> SemanticsContext {
        let output = parse_source(source);
        assert!(output.diagnostics.is_empty());
        let mut program = output.program;
        let mut ctx = SemanticsContext::default();
        assert!(resolve_names(&mut ctx, &mut program));
        compute_offsets(&mut ctx);
        ctx
    }

    fn find_symbol<'c>(ctx: &'c SemanticsContext, name: &str) -> &'c Symbol {
        ctx.scopes
            .iter()
            .find_map(|(id, _)| ctx.scope(id).find_symbol(name))
            .map(|id| ctx.symbol(id))
            .unwrap_or_else(|| panic!("no symbol '{name}'"))
    }

    #[test]
    fn test_locals_are_aligned() {
        let ctx = layout(
            "program p\n\
             integer(4) a\n\
             integer(8) b\n\
             character c\n\
             a = 1\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let a = find_symbol(&ctx, "a").object().unwrap();
        let b = find_symbol(&ctx, "b").object().unwrap();
        let c = find_symbol(&ctx, "c").object().unwrap();
        assert_eq!((a.offset, a.size), (0, 4));
        assert_eq!((b.offset, b.size), (8, 8));
        assert_eq!((c.offset, c.size), (16, 1));
    }

    #[test]
    fn test_array_size() {
        let ctx = layout(
            "program p\n\
             real a(10)\n\
             a(1) = 0.0\n\
             end program\n",
        );
        let a = find_symbol(&ctx, "a").object().unwrap();
        assert_eq!(a.size, 40);
    }

    #[test]
    fn test_derived_type_size_flows_into_objects() {
        let ctx = layout(
            "program p\n\
             type point\n\
             real x\n\
             real y\n\
             end type\n\
             type(point) a(4)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let a = find_symbol(&ctx, "a").object().unwrap();
        assert_eq!(a.size, 32);
        let x = find_symbol(&ctx, "x").object().unwrap();
        let y = find_symbol(&ctx, "y").object().unwrap();
        assert_eq!(x.offset, 0);
        assert_eq!(y.offset, 4);
    }

    #[test]
    fn test_common_block_layout() {
        let ctx = layout(
            "program p\n\
             integer a\n\
             real b(4)\n\
             common /blk/ a, b\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let a = find_symbol(&ctx, "a").object().unwrap();
        let b = find_symbol(&ctx, "b").object().unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 4);
        let block = ctx.symbol(a.common.unwrap()).common_block().unwrap();
        assert_eq!(block.size, 20);
    }

    #[test]
    fn test_equivalence_overlays_storage() {
        let ctx = layout(
            "program p\n\
             integer a(10), b\n\
             equivalence (a(3), b)\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let a = find_symbol(&ctx, "a").object().unwrap();
        let b = find_symbol(&ctx, "b").object().unwrap();
        assert_eq!(b.offset, a.offset + 8);
    }

    #[test]
    fn test_equivalence_joins_common_block() {
        let ctx = layout(
            "program p\n\
             integer a, b(2)\n\
             common /c/ a\n\
             equivalence (a, b(1))\n\
             end program\n",
        );
        assert!(!ctx.any_fatal_error());
        let a = find_symbol(&ctx, "a").object().unwrap();
        let b = find_symbol(&ctx, "b").object().unwrap();
        assert_eq!(b.offset, 0);
        assert_eq!(b.common, a.common);
        let block = ctx.symbol(a.common.unwrap()).common_block().unwrap();
        assert_eq!(block.size, 8);
    }

    #[test]
    fn test_equivalence_may_not_extend_common_backward() {
        let ctx = layout(
            "program p\n\
             integer a, b(2)\n\
             common /c/ a\n\
             equivalence (a, b(2))\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0].message.contains("backward"));
    }

    #[test]
    fn test_equivalence_may_not_join_two_commons() {
        let ctx = layout(
            "program p\n\
             integer a, b\n\
             common /x/ a\n\
             common /y/ b\n\
             equivalence (a, b)\n\
             end program\n",
        );
        assert!(ctx.any_fatal_error());
        assert!(ctx.sink().errors()[0]
            .message
            .contains("may not join COMMON blocks"));
    }
}
