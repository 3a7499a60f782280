//! # Ferro Semantic Analysis
//!
//! This crate turns a parsed program into a checked one. The passes run in
//! a fixed order under the [`Semantics`] driver: labels are validated, DO
//! loops and extension directives are canonicalized, names resolve into a
//! scope tree of [`Symbol`]s, ambiguous function references are rewritten,
//! storage gets offsets, and two checking walks enforce the declaration
//! and statement rules. Common blocks merge across units at the end, and
//! every module scope is rendered to a module file.
//!
//! All of it reads and writes one [`SemanticsContext`], which carries the
//! diagnostic sink, the symbol and scope tables, and the compilation
//! options.

pub mod canonicalize;
pub mod check_declarations;
pub mod check_expressions;
pub mod checkers;
pub mod common_blocks;
pub mod context;
pub mod data_init;
pub mod dump;
pub mod expr;
pub mod features;
pub mod mod_file;
pub mod offsets;
pub mod resolve_labels;
pub mod resolve_names;
pub mod rewrite;
pub mod scope;
pub mod scope_index;
pub mod semantics;
pub mod symbol;
pub mod types;
pub mod visitor;

pub use context::{ConstructKind, IndexVarKind, SemanticsContext};
pub use features::{DefaultKinds, LanguageExtensions, LanguageFeatures, TargetCharacteristics};
pub use scope::{Scope, ScopeId, ScopeKind, ScopeTree, GLOBAL_SCOPE};
pub use semantics::Semantics;
pub use symbol::{Symbol, SymbolDetails, SymbolFlags};
pub use types::{ConstValue, TypeDesc};
