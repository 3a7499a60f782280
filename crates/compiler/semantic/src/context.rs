//! # Semantic Context
//!
//! [`SemanticsContext`] owns everything the passes share: the diagnostic
//! sink, the symbol arena, the scope tree with its offset index, the active
//! construct stack, active loop index variables, compiled module files, and
//! deferred DATA initializations. One context can outlive a single file; a
//! driver compiling several files through the same context accumulates
//! global symbols and common block knowledge across them.

use std::path::PathBuf;

use chumsky::span::SimpleSpan;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use ferro_compiler_diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticSink, WarningCategory,
};
use ferro_compiler_parser::ast::{DataStmt, SymbolId};

use crate::common_blocks::CommonBlockMap;
use crate::features::{DefaultKinds, LanguageFeatures, TargetCharacteristics};
use crate::scope::{Scope, ScopeId, ScopeKind, ScopeTree, GLOBAL_SCOPE};
use crate::scope_index::ScopeIndex;
use crate::symbol::{ultimate_symbol, Symbol};

/// What kind of construct put an index variable in play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVarKind {
    Do,
    Forall,
    ImpliedDo,
}

impl std::fmt::Display for IndexVarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Do => write!(f, "DO"),
            Self::Forall => write!(f, "FORALL"),
            Self::ImpliedDo => write!(f, "implied DO"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexVarInfo {
    kind: IndexVarKind,
    /// Where the variable was activated; deactivation must match
    span: SimpleSpan<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructKind {
    Do,
    If,
    Case,
    Forall,
    Parallel,
    Offload,
    Simd,
}

impl std::fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Do => write!(f, "DO"),
            Self::If => write!(f, "IF"),
            Self::Case => write!(f, "SELECT CASE"),
            Self::Forall => write!(f, "FORALL"),
            Self::Parallel => write!(f, "PARALLEL"),
            Self::Offload => write!(f, "OFFLOAD"),
            Self::Simd => write!(f, "SIMD"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstructNode {
    pub kind: ConstructKind,
    pub span: SimpleSpan<usize>,
}

/// A DATA statement whose compilation waits until the whole file checked out
#[derive(Debug, Clone)]
pub struct DeferredDataInit {
    pub scope: ScopeId,
    pub data: DataStmt,
}

pub struct SemanticsContext {
    pub features: LanguageFeatures,
    pub default_kinds: DefaultKinds,
    pub target: TargetCharacteristics,
    warnings_are_errors: bool,
    max_errors: usize,
    /// Directory module files are written to, when set
    module_directory: Option<PathBuf>,
    hermetic_module_files: bool,

    sink: DiagnosticSink,
    pub symbols: index_vec::IndexVec<SymbolId, Symbol>,
    pub scopes: ScopeTree,
    scope_index: ScopeIndex,
    /// Nonzero while compiling module file text, whose offsets refer to the
    /// module file rather than the user source
    module_file_depth: u32,

    construct_stack: Vec<ConstructNode>,
    index_vars: FxHashMap<SymbolId, IndexVarInfo>,
    error_symbols: FxHashSet<SymbolId>,
    defined_symbols: FxHashSet<SymbolId>,
    statement_location: Option<SimpleSpan<usize>>,

    /// Scope holding compiled builtin modules
    intrinsic_modules: Option<ScopeId>,
    /// Builtin module scopes by name, compiled on first use
    builtin_modules: FxHashMap<SmolStr, ScopeId>,
    /// Module scopes compiled from source or from module files
    compiled_modules: FxHashMap<SmolStr, ScopeId>,
    /// Rendered module file text by module name
    pub module_files: IndexMap<SmolStr, String>,

    pub common_blocks: CommonBlockMap,
    deferred_data: Vec<DeferredDataInit>,
    tmp_counter: u32,
}

impl Default for SemanticsContext {
    fn default() -> Self {
        Self::new(
            LanguageFeatures::default(),
            DefaultKinds::default(),
            TargetCharacteristics::default(),
        )
    }
}

impl SemanticsContext {
    pub fn new(
        features: LanguageFeatures,
        default_kinds: DefaultKinds,
        target: TargetCharacteristics,
    ) -> Self {
        Self {
            features,
            default_kinds,
            target,
            warnings_are_errors: false,
            max_errors: usize::MAX,
            module_directory: None,
            hermetic_module_files: false,
            sink: DiagnosticSink::new(),
            symbols: index_vec::IndexVec::new(),
            scopes: ScopeTree::new(),
            scope_index: ScopeIndex::new(),
            module_file_depth: 0,
            construct_stack: Vec::new(),
            index_vars: FxHashMap::default(),
            error_symbols: FxHashSet::default(),
            defined_symbols: FxHashSet::default(),
            statement_location: None,
            intrinsic_modules: None,
            builtin_modules: FxHashMap::default(),
            compiled_modules: FxHashMap::default(),
            module_files: IndexMap::new(),
            common_blocks: CommonBlockMap::default(),
            deferred_data: Vec::new(),
            tmp_counter: 0,
        }
    }

    pub fn with_warnings_as_errors(mut self, value: bool) -> Self {
        self.warnings_are_errors = value;
        self
    }

    pub fn with_max_errors(mut self, value: usize) -> Self {
        self.max_errors = value;
        self
    }

    pub fn with_module_directory(mut self, dir: PathBuf) -> Self {
        self.module_directory = Some(dir);
        self
    }

    pub fn with_hermetic_module_files(mut self, value: bool) -> Self {
        self.hermetic_module_files = value;
        self
    }

    pub const fn warnings_are_errors(&self) -> bool {
        self.warnings_are_errors
    }

    pub const fn max_errors(&self) -> usize {
        self.max_errors
    }

    pub fn module_directory(&self) -> Option<&std::path::Path> {
        self.module_directory.as_deref()
    }

    pub const fn hermetic_module_files(&self) -> bool {
        self.hermetic_module_files
    }

    // ===== Diagnostics =====

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut DiagnosticSink {
        &mut self.sink
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.sink.add(diagnostic);
    }

    pub fn error(&mut self, code: DiagnosticCode, message: String, span: SimpleSpan<usize>) {
        self.sink
            .add(Diagnostic::error(code, message).with_location(span));
    }

    /// Warning, dropped when its category is suppressed
    pub fn warn(
        &mut self,
        category: WarningCategory,
        code: DiagnosticCode,
        message: String,
        span: SimpleSpan<usize>,
    ) {
        if self.should_warn(category) {
            self.sink
                .add(Diagnostic::warning(category, code, message).with_location(span));
        }
    }

    /// Portability remark, dropped when its category is suppressed
    pub fn portability(
        &mut self,
        category: WarningCategory,
        code: DiagnosticCode,
        message: String,
        span: SimpleSpan<usize>,
    ) {
        if self.should_warn(category) {
            self.sink
                .add(Diagnostic::portability(category, code, message).with_location(span));
        }
    }

    pub fn should_warn(&self, category: WarningCategory) -> bool {
        self.features.should_warn(category)
    }

    pub fn any_fatal_error(&self) -> bool {
        self.sink.any_fatal(self.warnings_are_errors)
    }

    // ===== Symbols =====

    pub fn new_symbol(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Resolve USE associations to the named symbol
    pub fn ultimate(&self, id: SymbolId) -> SymbolId {
        ultimate_symbol(&self.symbols, id)
    }

    /// Record that a symbol is in an error state.
    ///
    /// Panics unless a fatal diagnostic has already been reported; marking a
    /// symbol bad without saying why is a bug.
    pub fn set_error(&mut self, id: SymbolId) {
        let id = self.ultimate(id);
        if !self.error_symbols.contains(&id) {
            assert!(
                self.any_fatal_error(),
                "no error was reported before setting error on '{}'",
                self.symbols[id].name
            );
            self.error_symbols.insert(id);
        }
    }

    pub fn has_error(&self, id: SymbolId) -> bool {
        self.error_symbols.contains(&self.ultimate(id))
    }

    /// Record that a symbol receives a value somewhere
    pub fn note_defined(&mut self, id: SymbolId) {
        let id = self.ultimate(id);
        self.defined_symbols.insert(id);
    }

    pub fn is_defined(&self, id: SymbolId) -> bool {
        self.defined_symbols.contains(&self.ultimate(id))
    }

    // ===== Scopes =====

    pub fn global_scope(&self) -> ScopeId {
        GLOBAL_SCOPE
    }

    /// The root holding builtin modules, created on first use
    pub fn intrinsic_modules_scope(&mut self) -> ScopeId {
        match self.intrinsic_modules {
            Some(id) => id,
            None => {
                let id = self.scopes.push_root(ScopeKind::IntrinsicModules);
                self.intrinsic_modules = Some(id);
                id
            }
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.scopes.scope(id)
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        self.scopes.scope_mut(id)
    }

    /// Widen a scope's source range and keep the offset index in step.
    /// Scopes built from module file text keep their ranges but stay out of
    /// the index; their offsets would collide with the user source.
    pub fn extend_scope_range(&mut self, id: ScopeId, start: usize, end: usize) {
        let old = self.scopes.scope(id).source_range();
        self.scopes.scope_mut(id).extend_source_range(start, end);
        if self.module_file_depth > 0 {
            return;
        }
        let new = self.scopes.scope(id).source_range();
        match (old, new) {
            (None, Some(range)) => self.scope_index.insert(range, id),
            (Some(old_range), Some(range)) if old_range != range => {
                self.scope_index.update(id, old_range.0, range);
            }
            _ => {}
        }
    }

    /// Innermost scope covering a source offset; the global scope when no
    /// unit covers it
    pub fn find_scope(&self, offset: usize) -> ScopeId {
        self.scope_index.search(offset).unwrap_or(GLOBAL_SCOPE)
    }

    /// Mark the start of a module file compilation; see
    /// [`Self::extend_scope_range`]
    pub fn enter_module_file(&mut self) {
        self.module_file_depth += 1;
    }

    pub fn leave_module_file(&mut self) {
        self.module_file_depth -= 1;
    }

    pub fn register_builtin_module(&mut self, name: SmolStr, scope: ScopeId) {
        self.builtin_modules.insert(name, scope);
    }

    pub fn builtin_module(&self, name: &str) -> Option<ScopeId> {
        self.builtin_modules.get(name).copied()
    }

    pub fn register_compiled_module(&mut self, name: SmolStr, scope: ScopeId) {
        self.compiled_modules.insert(name, scope);
    }

    pub fn compiled_module(&self, name: &str) -> Option<ScopeId> {
        self.compiled_modules.get(name).copied()
    }

    // ===== Statement location =====

    pub fn set_location(&mut self, span: SimpleSpan<usize>) {
        self.statement_location = Some(span);
    }

    pub fn clear_location(&mut self) {
        self.statement_location = None;
    }

    pub const fn location(&self) -> Option<SimpleSpan<usize>> {
        self.statement_location
    }

    // ===== Construct stack =====

    pub fn push_construct(&mut self, kind: ConstructKind, span: SimpleSpan<usize>) {
        self.construct_stack.push(ConstructNode { kind, span });
    }

    /// Pop the innermost construct.
    ///
    /// Panics when the top does not match `kind`; pushes and pops must pair.
    pub fn pop_construct(&mut self, kind: ConstructKind) {
        match self.construct_stack.pop() {
            Some(node) if node.kind == kind => {}
            top => panic!("construct stack mismatch: popping {kind}, top was {top:?}"),
        }
    }

    pub fn construct_depth(&self) -> usize {
        self.construct_stack.len()
    }

    pub fn in_construct(&self, kind: ConstructKind) -> bool {
        self.construct_stack.iter().any(|node| node.kind == kind)
    }

    pub fn innermost_construct(&self) -> Option<&ConstructNode> {
        self.construct_stack.last()
    }

    /// Constructs of `kind` on the stack, innermost last
    pub fn constructs_of(&self, kind: ConstructKind) -> impl Iterator<Item = &ConstructNode> {
        self.construct_stack
            .iter()
            .filter(move |node| node.kind == kind)
    }

    // ===== Index variables =====

    /// Put a loop index variable in play. An already active variable is an
    /// error reported against the new activation.
    pub fn activate_index_var(&mut self, id: SymbolId, kind: IndexVarKind, span: SimpleSpan<usize>) {
        self.check_index_var_redefine(id, span);
        let id = self.ultimate(id);
        self.index_vars.insert(id, IndexVarInfo { kind, span });
    }

    /// Take a variable out of play, but only for the activation made at
    /// `span`; an inner construct reusing the name must not release the
    /// outer activation
    pub fn deactivate_index_var(&mut self, id: SymbolId, span: SimpleSpan<usize>) {
        let id = self.ultimate(id);
        if let Some(info) = self.index_vars.get(&id) {
            if info.span == span {
                self.index_vars.remove(&id);
            }
        }
    }

    /// Fatal: the variable controls an enclosing construct
    pub fn check_index_var_redefine(&mut self, id: SymbolId, span: SimpleSpan<usize>) {
        self.index_var_redefine(id, span, false);
    }

    /// Warning form, for definitions the compiler cannot prove, such as
    /// passing the variable as an actual argument
    pub fn warn_index_var_redefine(&mut self, id: SymbolId, span: SimpleSpan<usize>) {
        self.index_var_redefine(id, span, true);
    }

    fn index_var_redefine(&mut self, id: SymbolId, span: SimpleSpan<usize>, warning: bool) {
        let id = self.ultimate(id);
        let Some(info) = self.index_vars.get(&id).copied() else {
            return;
        };
        let name = self.symbols[id].name.clone();
        if warning {
            if self.should_warn(WarningCategory::IndexVarRedefinition) {
                let diagnostic = Diagnostic::warning(
                    WarningCategory::IndexVarRedefinition,
                    DiagnosticCode::IndexVarRedefinition,
                    format!("Possible redefinition of {} variable '{}'", info.kind, name),
                )
                .with_location(span)
                .with_related_span(info.span, format!("Enclosing {} construct", info.kind));
                self.sink.add(diagnostic);
            }
        } else {
            let diagnostic = Diagnostic::error(
                DiagnosticCode::IndexVarRedefinition,
                format!("Cannot redefine {} variable '{}'", info.kind, name),
            )
            .with_location(span)
            .with_related_span(info.span, format!("Enclosing {} construct", info.kind));
            self.sink.add(diagnostic);
        }
    }

    pub fn is_index_var_active(&self, id: SymbolId) -> bool {
        self.index_vars.contains_key(&self.ultimate(id))
    }

    // ===== Deferred DATA =====

    pub fn defer_initialization(&mut self, scope: ScopeId, data: DataStmt) {
        self.deferred_data.push(DeferredDataInit { scope, data });
    }

    pub fn take_deferred_data(&mut self) -> Vec<DeferredDataInit> {
        std::mem::take(&mut self.deferred_data)
    }

    // ===== Compiler-created names =====

    /// A name no source program can spell
    pub fn next_temp_name(&mut self) -> SmolStr {
        let n = self.tmp_counter;
        self.tmp_counter += 1;
        SmolStr::new(format!(".fer.{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ObjectDetails, SymbolDetails};

    fn test_symbol(ctx: &mut SemanticsContext, name: &str) -> SymbolId {
        ctx.new_symbol(Symbol::new(
            name,
            GLOBAL_SCOPE,
            SimpleSpan::from(0..0),
            SymbolDetails::Object(ObjectDetails::default()),
        ))
    }

    #[test]
    fn test_construct_stack_pairing() {
        let mut ctx = SemanticsContext::default();
        ctx.push_construct(ConstructKind::Do, SimpleSpan::from(0..10));
        ctx.push_construct(ConstructKind::If, SimpleSpan::from(2..8));
        assert_eq!(ctx.construct_depth(), 2);
        assert!(ctx.in_construct(ConstructKind::Do));
        ctx.pop_construct(ConstructKind::If);
        ctx.pop_construct(ConstructKind::Do);
        assert_eq!(ctx.construct_depth(), 0);
    }

    #[test]
    #[should_panic(expected = "construct stack mismatch")]
    fn test_mismatched_pop_panics() {
        let mut ctx = SemanticsContext::default();
        ctx.push_construct(ConstructKind::Do, SimpleSpan::from(0..10));
        ctx.pop_construct(ConstructKind::If);
    }

    #[test]
    fn test_index_var_redefinition_is_fatal() {
        let mut ctx = SemanticsContext::default();
        let i = test_symbol(&mut ctx, "i");
        ctx.activate_index_var(i, IndexVarKind::Do, SimpleSpan::from(0..5));
        assert!(ctx.is_index_var_active(i));

        ctx.check_index_var_redefine(i, SimpleSpan::from(10..11));
        assert!(ctx.any_fatal_error());
        let all = ctx.sink().all();
        assert_eq!(all.len(), 1);
        assert!(all[0].message.contains("Cannot redefine DO variable 'i'"));
        assert_eq!(all[0].related_spans.len(), 1);
    }

    #[test]
    fn test_index_var_deactivation_is_location_matched() {
        let mut ctx = SemanticsContext::default();
        let i = test_symbol(&mut ctx, "i");
        let outer = SimpleSpan::from(0..5);
        ctx.activate_index_var(i, IndexVarKind::Do, outer);
        // A deactivation from a different site leaves the variable active
        ctx.deactivate_index_var(i, SimpleSpan::from(20..25));
        assert!(ctx.is_index_var_active(i));
        ctx.deactivate_index_var(i, outer);
        assert!(!ctx.is_index_var_active(i));
    }

    #[test]
    fn test_index_var_warning_form() {
        let mut ctx = SemanticsContext::default();
        let i = test_symbol(&mut ctx, "i");
        ctx.activate_index_var(i, IndexVarKind::Forall, SimpleSpan::from(0..5));
        ctx.warn_index_var_redefine(i, SimpleSpan::from(10..11));
        assert!(!ctx.any_fatal_error());
        assert!(ctx.sink().all()[0]
            .message
            .contains("Possible redefinition of FORALL variable 'i'"));
    }

    #[test]
    #[should_panic(expected = "no error was reported")]
    fn test_set_error_without_diagnostic_panics() {
        let mut ctx = SemanticsContext::default();
        let x = test_symbol(&mut ctx, "x");
        ctx.set_error(x);
    }

    #[test]
    fn test_set_error_after_diagnostic() {
        let mut ctx = SemanticsContext::default();
        let x = test_symbol(&mut ctx, "x");
        ctx.error(
            DiagnosticCode::TypeMismatch,
            "bad".to_string(),
            SimpleSpan::from(0..1),
        );
        ctx.set_error(x);
        assert!(ctx.has_error(x));
    }

    #[test]
    fn test_find_scope_falls_back_to_global() {
        let mut ctx = SemanticsContext::default();
        assert_eq!(ctx.find_scope(42), GLOBAL_SCOPE);
        let main = ctx
            .scopes
            .push_scope(ScopeKind::MainProgram, GLOBAL_SCOPE, "p");
        ctx.extend_scope_range(main, 0, 100);
        assert_eq!(ctx.find_scope(42), main);
        assert_eq!(ctx.find_scope(200), GLOBAL_SCOPE);
    }

    #[test]
    fn test_scope_growth_reindexes() {
        let mut ctx = SemanticsContext::default();
        let main = ctx
            .scopes
            .push_scope(ScopeKind::MainProgram, GLOBAL_SCOPE, "p");
        ctx.extend_scope_range(main, 0, 50);
        assert_eq!(ctx.find_scope(75), GLOBAL_SCOPE);
        ctx.extend_scope_range(main, 0, 100);
        assert_eq!(ctx.find_scope(75), main);
    }

    #[test]
    fn test_module_file_scopes_stay_out_of_the_index() {
        let mut ctx = SemanticsContext::default();
        ctx.enter_module_file();
        let m = ctx.scopes.push_scope(ScopeKind::Module, GLOBAL_SCOPE, "m");
        ctx.extend_scope_range(m, 0, 80);
        ctx.leave_module_file();
        // The range is recorded but a user-source offset does not find it
        assert_eq!(ctx.scope(m).source_range(), Some((0, 80)));
        assert_eq!(ctx.find_scope(40), GLOBAL_SCOPE);
    }

    #[test]
    fn test_temp_names_are_distinct() {
        let mut ctx = SemanticsContext::default();
        let a = ctx.next_temp_name();
        let b = ctx.next_temp_name();
        assert_ne!(a, b);
        assert!(a.starts_with(".fer."));
    }
}
