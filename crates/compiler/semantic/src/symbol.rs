//! # Symbols
//!
//! One [`Symbol`] per declared entity, stored in an arena owned by the
//! semantic context and addressed by `SymbolId`. The variant payload in
//! [`SymbolDetails`] carries what each kind of entity needs: objects get a
//! type, shape, and storage offset; subprograms get their dummy arguments
//! and result; common blocks collect their members.

use chumsky::span::SimpleSpan;
use ferro_compiler_parser::ast::SymbolId;
use index_vec::IndexVec;
use smol_str::SmolStr;

use crate::scope::ScopeId;
use crate::types::{ConstValue, Extent, TypeDesc};

bitflags::bitflags! {
    /// Properties accumulated on a symbol across the passes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u16 {
        /// Holds the value returned by a function
        const FUNCTION_RESULT = 1 << 0;
        /// Dummy argument of a subprogram
        const DUMMY = 1 << 1;
        /// Typed by implicit rules rather than a declaration
        const IMPLICIT = 1 << 2;
        /// Introduced by the compiler, not by source text
        const COMPILER_CREATED = 1 << 3;
        /// Receives a value from a DATA statement or declaration initializer
        const DATA_INIT = 1 << 4;
        /// Referenced somewhere after its declaration
        const USED = 1 << 5;
        /// Named constant
        const PARAMETER = 1 << 6;
        /// Appears in an EQUIVALENCE set
        const EQUIVALENCED = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// Lower-cased source name
    pub name: SmolStr,
    /// Scope the symbol belongs to
    pub owner: ScopeId,
    /// Declaration site, or first reference for implicit symbols
    pub span: SimpleSpan<usize>,
    pub flags: SymbolFlags,
    pub details: SymbolDetails,
}

impl Symbol {
    pub fn new(
        name: impl Into<SmolStr>,
        owner: ScopeId,
        span: SimpleSpan<usize>,
        details: SymbolDetails,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            span,
            flags: SymbolFlags::empty(),
            details,
        }
    }

    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub const fn object(&self) -> Option<&ObjectDetails> {
        match &self.details {
            SymbolDetails::Object(details) => Some(details),
            _ => None,
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut ObjectDetails> {
        match &mut self.details {
            SymbolDetails::Object(details) => Some(details),
            _ => None,
        }
    }

    pub const fn subprogram(&self) -> Option<&SubprogramDetails> {
        match &self.details {
            SymbolDetails::Subprogram(details) => Some(details),
            _ => None,
        }
    }

    pub fn subprogram_mut(&mut self) -> Option<&mut SubprogramDetails> {
        match &mut self.details {
            SymbolDetails::Subprogram(details) => Some(details),
            _ => None,
        }
    }

    pub const fn common_block(&self) -> Option<&CommonBlockDetails> {
        match &self.details {
            SymbolDetails::CommonBlock(details) => Some(details),
            _ => None,
        }
    }

    pub fn common_block_mut(&mut self) -> Option<&mut CommonBlockDetails> {
        match &mut self.details {
            SymbolDetails::CommonBlock(details) => Some(details),
            _ => None,
        }
    }

    /// The declared or implicit type, where the symbol has one
    pub fn type_desc(&self) -> Option<&TypeDesc> {
        match &self.details {
            SymbolDetails::Object(details) => details.decl_type.as_ref(),
            _ => None,
        }
    }

    pub const fn is_named_constant(&self) -> bool {
        self.flags.contains(SymbolFlags::PARAMETER)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolDetails {
    Object(ObjectDetails),
    Subprogram(SubprogramDetails),
    /// A main program name; `scope` is filled once the unit scope exists
    MainProgram { scope: Option<ScopeId> },
    /// A module; its specification part lives in `scope`
    Module { scope: ScopeId },
    /// A block data unit
    BlockData { scope: ScopeId },
    /// A derived type; components live in `scope`
    DerivedType { scope: ScopeId },
    CommonBlock(CommonBlockDetails),
    /// Local alias created by USE association
    Use { target: SymbolId },
    /// Generic intrinsic function
    Intrinsic,
}

/// A variable, array, named constant, or function result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDetails {
    pub decl_type: Option<TypeDesc>,
    /// Constant shape; empty for scalars
    pub shape: Vec<Extent>,
    /// Byte offset within the owning scope or common block
    pub offset: u64,
    /// Byte size, filled in by the offset pass
    pub size: u64,
    /// Value of a named constant
    pub value: Option<ConstValue>,
    /// Static initializer from a declaration or compiled DATA statement
    pub init: Option<Initializer>,
    /// Common block the object is a member of
    pub common: Option<SymbolId>,
}

impl ObjectDetails {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Scalar(ConstValue),
    /// Per-element values in array element order; `None` for elements a
    /// DATA statement left uncovered
    Elements(Vec<Option<ConstValue>>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubprogramDetails {
    pub is_function: bool,
    pub dummy_args: Vec<SymbolId>,
    /// Result symbol of a function
    pub result: Option<SymbolId>,
    /// ENTRY symbols declared inside this subprogram
    pub entries: Vec<SymbolId>,
    /// True for the symbol of an ENTRY statement itself
    pub is_entry: bool,
    /// Scope of the subprogram body, absent for externals
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommonBlockDetails {
    /// Members in storage order
    pub objects: Vec<SymbolId>,
    /// Total byte size, filled in by the offset pass
    pub size: u64,
}

/// Follow USE associations to the symbol they name
pub fn ultimate_symbol(symbols: &IndexVec<SymbolId, Symbol>, mut id: SymbolId) -> SymbolId {
    while let SymbolDetails::Use { target } = &symbols[id].details {
        id = *target;
    }
    id
}
