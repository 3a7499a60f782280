//! # Common Block Merging
//!
//! Common blocks declared in different program units share storage by link
//! name, so their declarations have to be reconciled: the largest declared
//! size wins, and at most one block instance may carry static
//! initialization. The map in the context persists across files compiled
//! through the same context.

use ferro_compiler_diagnostics::{Diagnostic, DiagnosticCode, WarningCategory};
use ferro_compiler_parser::ast::SymbolId;
use indexmap::map::Entry;
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::context::SemanticsContext;
use crate::symbol::{Symbol, SymbolFlags};

/// External link name of a common block
pub fn common_link_name(name: Option<&str>, underscoring: bool) -> SmolStr {
    match name {
        Some(n) if underscoring => SmolStr::new(format!("{n}_")),
        Some(n) => SmolStr::new(n),
        None => SmolStr::new("__blnk__"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonBlockInfo {
    /// Instance with the largest size seen so far
    pub biggest: SymbolId,
    pub biggest_size: u64,
    /// Instance carrying static initialization, if any
    pub initialization: Option<SymbolId>,
}

/// What merging one more instance into the map found
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub first_appearance: bool,
    /// Another instance already initializes this block
    pub conflicting_initialization: Option<SymbolId>,
    /// `(this size, size recorded so far)` when they differ
    pub distinct_sizes: Option<(u64, u64)>,
}

#[derive(Debug, Default)]
pub struct CommonBlockMap {
    entries: IndexMap<SmolStr, CommonBlockInfo>,
}

impl CommonBlockMap {
    pub fn insert_or_merge(
        &mut self,
        link_name: SmolStr,
        common: SymbolId,
        size: u64,
        initialized: bool,
    ) -> MergeOutcome {
        match self.entries.entry(link_name) {
            Entry::Vacant(vacant) => {
                vacant.insert(CommonBlockInfo {
                    biggest: common,
                    biggest_size: size,
                    initialization: initialized.then_some(common),
                });
                MergeOutcome {
                    first_appearance: true,
                    ..MergeOutcome::default()
                }
            }
            Entry::Occupied(mut occupied) => {
                let info = occupied.get_mut();
                let mut outcome = MergeOutcome::default();
                if initialized {
                    match info.initialization {
                        Some(previous) if previous != common => {
                            outcome.conflicting_initialization = Some(previous);
                        }
                        _ => info.initialization = Some(common),
                    }
                }
                if size != info.biggest_size {
                    outcome.distinct_sizes = Some((size, info.biggest_size));
                    if size > info.biggest_size {
                        info.biggest = common;
                        info.biggest_size = size;
                    }
                }
                outcome
            }
        }
    }

    pub fn get(&self, link_name: &str) -> Option<&CommonBlockInfo> {
        self.entries.get(link_name)
    }

    /// Blocks in first-appearance order
    pub fn blocks(&self) -> impl Iterator<Item = (&SmolStr, &CommonBlockInfo)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merge one common block instance into the context-wide map and report
/// initialization conflicts and size disagreements
pub fn map_common_block_and_check_conflicts(ctx: &mut SemanticsContext, common: SymbolId) {
    let symbol = ctx.symbol(common);
    let name = symbol.name.clone();
    let span = symbol.span;
    let size = symbol.common_block().map_or(0, |details| details.size);
    let named = !name.is_empty();
    let link_name = common_link_name(
        named.then_some(name.as_str()),
        ctx.target.underscoring,
    );
    let initialized = common_block_is_initialized(ctx, common);

    let outcome = ctx
        .common_blocks
        .insert_or_merge(link_name, common, size, initialized);

    if let Some(previous) = outcome.conflicting_initialization {
        let previous_span = ctx.symbol(previous).span;
        ctx.add_diagnostic(
            Diagnostic::error(
                DiagnosticCode::CommonInitConflict,
                format!("Multiple initialization of COMMON block /{name}/"),
            )
            .with_location(span)
            .with_related_span(previous_span, "Previous initialization".to_string()),
        );
    }
    // Blank common may legitimately differ in size between units
    if named {
        if let Some((this_size, other_size)) = outcome.distinct_sizes {
            ctx.portability(
                WarningCategory::DistinctCommonSizes,
                DiagnosticCode::CommonSizeMismatch,
                format!(
                    "COMMON block /{name}/ is {this_size} bytes here but {other_size} bytes elsewhere"
                ),
                span,
            );
        }
    }
}

/// Whether any member of the block receives static initialization, directly
/// or through an EQUIVALENCE with an initialized object
fn common_block_is_initialized(ctx: &SemanticsContext, common: SymbolId) -> bool {
    let Some(details) = ctx.symbol(common).common_block() else {
        return false;
    };
    if details
        .objects
        .iter()
        .any(|&member| object_is_initialized(ctx.symbol(member)))
    {
        return true;
    }
    let owner = ctx.symbol(common).owner;
    ctx.scope(owner).equivalence_sets.iter().any(|set| {
        set.iter().any(|r| details.objects.contains(&r.symbol))
            && set.iter().any(|r| object_is_initialized(ctx.symbol(r.symbol)))
    })
}

fn object_is_initialized(symbol: &Symbol) -> bool {
    !symbol.flags.contains(SymbolFlags::COMPILER_CREATED)
        && (symbol.flags.contains(SymbolFlags::DATA_INIT)
            || symbol.object().is_some_and(|details| details.init.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> SymbolId {
        SymbolId::from_usize(n)
    }

    #[test]
    fn test_link_names() {
        assert_eq!(common_link_name(Some("blk"), true), "blk_");
        assert_eq!(common_link_name(Some("blk"), false), "blk");
        assert_eq!(common_link_name(None, true), "__blnk__");
        assert_eq!(common_link_name(None, false), "__blnk__");
    }

    #[test]
    fn test_size_authority_tracks_maximum() {
        let mut map = CommonBlockMap::default();
        let a = map.insert_or_merge(SmolStr::new("c_"), id(1), 16, false);
        assert!(a.first_appearance);

        // Larger instance takes over as size authority
        let b = map.insert_or_merge(SmolStr::new("c_"), id(2), 24, false);
        assert_eq!(b.distinct_sizes, Some((24, 16)));
        let info = map.get("c_").unwrap();
        assert_eq!(info.biggest, id(2));
        assert_eq!(info.biggest_size, 24);

        // Smaller instance still reports the mismatch but does not take over
        let c = map.insert_or_merge(SmolStr::new("c_"), id(3), 8, false);
        assert_eq!(c.distinct_sizes, Some((8, 24)));
        assert_eq!(map.get("c_").unwrap().biggest, id(2));
    }

    #[test]
    fn test_initialization_authority_stays_with_first() {
        let mut map = CommonBlockMap::default();
        map.insert_or_merge(SmolStr::new("c_"), id(1), 16, true);
        assert_eq!(map.get("c_").unwrap().initialization, Some(id(1)));

        // An uninitialized instance changes nothing
        let b = map.insert_or_merge(SmolStr::new("c_"), id(2), 16, false);
        assert_eq!(b.conflicting_initialization, None);

        // A second initializer conflicts and the authority is unchanged
        let c = map.insert_or_merge(SmolStr::new("c_"), id(3), 16, true);
        assert_eq!(c.conflicting_initialization, Some(id(1)));
        assert_eq!(map.get("c_").unwrap().initialization, Some(id(1)));
    }

    #[test]
    fn test_late_initialization_claims_authority() {
        let mut map = CommonBlockMap::default();
        map.insert_or_merge(SmolStr::new("c_"), id(1), 16, false);
        let b = map.insert_or_merge(SmolStr::new("c_"), id(2), 16, true);
        assert_eq!(b.conflicting_initialization, None);
        assert_eq!(map.get("c_").unwrap().initialization, Some(id(2)));
    }

    #[test]
    fn test_same_instance_reappearing_does_not_conflict() {
        let mut map = CommonBlockMap::default();
        map.insert_or_merge(SmolStr::new("c_"), id(1), 16, true);
        let again = map.insert_or_merge(SmolStr::new("c_"), id(1), 16, true);
        assert_eq!(again.conflicting_initialization, None);
    }
}
