//! # Scope Tree
//!
//! Scopes form a tree rooted at the global scope. Each scope owns an ordered
//! name-to-symbol map, its common block declarations, its equivalence sets,
//! and the source range it covers. Ranges only ever grow: statements seen
//! later widen the scope, never shrink it.

use indexmap::IndexMap;
use smol_str::SmolStr;

use ferro_compiler_parser::ast::SymbolId;
use index_vec::IndexVec;

index_vec::define_index_type! {
    pub struct ScopeId = u32;
}

/// The global scope is created first and always has index zero
pub const GLOBAL_SCOPE: ScopeId = ScopeId { _raw: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    /// Extra root holding compiled builtin modules, searched after the
    /// global scope
    IntrinsicModules,
    MainProgram,
    Subprogram,
    Module,
    BlockData,
    DerivedType,
}

impl ScopeKind {
    /// Scopes whose execution part may contain RETURN
    pub const fn allows_return(&self) -> bool {
        matches!(self, Self::Subprogram)
    }
}

/// Reference to one object of an equivalence set, with folded subscripts
#[derive(Debug, Clone, PartialEq)]
pub struct EquivRef {
    pub symbol: SymbolId,
    /// Constant subscripts of the designator, empty for a whole object
    pub subscripts: Vec<i64>,
    pub span: chumsky::span::SimpleSpan<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Symbol of the unit or type this scope belongs to
    pub symbol: Option<SymbolId>,
    /// Name of the unit, empty for the roots
    pub name: SmolStr,
    symbols: IndexMap<SmolStr, SymbolId>,
    pub common_blocks: IndexMap<SmolStr, SymbolId>,
    pub equivalence_sets: Vec<Vec<EquivRef>>,
    /// Byte range of source text covered by this scope
    source_range: Option<(usize, usize)>,
    /// Total byte size of the scope's static objects, from the offset pass
    pub size: u64,
    pub alignment: u64,
    /// True when the scope was built from a module file rather than from
    /// source being compiled now
    pub is_module_file: bool,
    pub implicit_none: bool,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, name: SmolStr) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            symbol: None,
            name,
            symbols: IndexMap::new(),
            common_blocks: IndexMap::new(),
            equivalence_sets: Vec::new(),
            source_range: None,
            size: 0,
            alignment: 1,
            is_module_file: false,
            implicit_none: false,
        }
    }

    /// Look up a name in this scope only
    pub fn find_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get(name).copied()
    }

    /// Bind a name; returns the previous binding if the name was taken
    pub fn insert_symbol(&mut self, name: SmolStr, symbol: SymbolId) -> Option<SymbolId> {
        self.symbols.insert(name, symbol)
    }

    /// Symbols in declaration order
    pub fn symbols(&self) -> impl Iterator<Item = (&SmolStr, SymbolId)> {
        self.symbols.iter().map(|(name, id)| (name, *id))
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub const fn source_range(&self) -> Option<(usize, usize)> {
        self.source_range
    }

    /// Widen the covered source range to include `start..end`
    pub fn extend_source_range(&mut self, start: usize, end: usize) {
        self.source_range = Some(match self.source_range {
            Some((s, e)) => (s.min(start), e.max(end)),
            None => (start, end),
        });
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.source_range
            .is_some_and(|(start, end)| start <= offset && offset < end)
    }
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: IndexVec<ScopeId, Scope>,
}

impl ScopeTree {
    /// Create a tree holding just the global scope
    pub fn new() -> Self {
        let mut scopes = IndexVec::new();
        let global = scopes.push(Scope::new(ScopeKind::Global, None, SmolStr::default()));
        debug_assert_eq!(global, GLOBAL_SCOPE);
        Self { scopes }
    }

    pub fn push_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeId,
        name: impl Into<SmolStr>,
    ) -> ScopeId {
        let id = self.scopes.push(Scope::new(kind, Some(parent), name.into()));
        self.scopes[parent].children.push(id);
        id
    }

    /// Add a second root beside the global scope
    pub fn push_root(&mut self, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope::new(kind, None, SmolStr::default()))
    }

    /// Move a scope under a different parent
    pub fn reparent(&mut self, child: ScopeId, new_parent: ScopeId) {
        if let Some(old) = self.scopes[child].parent {
            self.scopes[old].children.retain(|&id| id != child);
        }
        self.scopes[child].parent = Some(new_parent);
        self.scopes[new_parent].children.push(child);
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter_enumerated()
    }

    /// Walk from `scope` toward the root, inclusive
    pub fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |&id| self.scopes[id].parent)
    }

    /// Look up a name here or in any ancestor scope
    pub fn find_symbol_from(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.ancestors(scope)
            .find_map(|id| self.scopes[id].find_symbol(name))
    }

    /// Innermost program-unit ancestor: steps out of derived-type scopes
    pub fn enclosing_unit(&self, scope: ScopeId) -> ScopeId {
        self.ancestors(scope)
            .find(|&id| !matches!(self.scopes[id].kind, ScopeKind::DerivedType))
            .unwrap_or(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_construction_and_lookup() {
        let mut tree = ScopeTree::new();
        let main = tree.push_scope(ScopeKind::MainProgram, GLOBAL_SCOPE, "p");
        let inner = tree.push_scope(ScopeKind::Subprogram, main, "f");

        assert_eq!(tree.scope(main).parent, Some(GLOBAL_SCOPE));
        assert_eq!(tree.scope(GLOBAL_SCOPE).children, vec![main]);
        assert_eq!(tree.scope(main).children, vec![inner]);

        tree.scope_mut(main)
            .insert_symbol(SmolStr::new("x"), SymbolId::from_usize(7));
        // Host association sees the outer binding
        assert_eq!(
            tree.find_symbol_from(inner, "x"),
            Some(SymbolId::from_usize(7))
        );
        assert_eq!(tree.find_symbol_from(inner, "y"), None);
    }

    #[test]
    fn test_source_range_only_grows() {
        let mut tree = ScopeTree::new();
        let main = tree.push_scope(ScopeKind::MainProgram, GLOBAL_SCOPE, "p");
        let scope = tree.scope_mut(main);
        scope.extend_source_range(10, 20);
        scope.extend_source_range(15, 18);
        assert_eq!(scope.source_range(), Some((10, 20)));
        scope.extend_source_range(5, 30);
        assert_eq!(scope.source_range(), Some((5, 30)));
        assert!(scope.contains_offset(5));
        assert!(scope.contains_offset(29));
        assert!(!scope.contains_offset(30));
    }
}
