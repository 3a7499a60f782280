//! # Type Representation
//!
//! Semantic types for Ferro entities: the intrinsic categories with their
//! kind or length, and derived types referring to the defining symbol.
//! Kind numbers double as byte sizes, so `INTEGER(8)` occupies 8 bytes.

use ferro_compiler_parser::ast::SymbolId;
use index_vec::IndexVec;

use crate::features::DefaultKinds;
use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDesc {
    Integer { kind: u8 },
    Real { kind: u8 },
    Logical { kind: u8 },
    Character { len: u32 },
    Derived(SymbolId),
}

impl TypeDesc {
    pub fn default_integer(kinds: &DefaultKinds) -> Self {
        Self::Integer {
            kind: kinds.integer,
        }
    }

    pub fn default_real(kinds: &DefaultKinds) -> Self {
        Self::Real { kind: kinds.real }
    }

    pub fn default_logical(kinds: &DefaultKinds) -> Self {
        Self::Logical {
            kind: kinds.logical,
        }
    }

    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Integer { .. })
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer { .. } | Self::Real { .. })
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::Logical { .. })
    }

    pub const fn is_character(&self) -> bool {
        matches!(self, Self::Character { .. })
    }

    pub fn is_default_integer(&self, kinds: &DefaultKinds) -> bool {
        matches!(self, Self::Integer { kind } if *kind == kinds.integer)
    }

    /// Size in bytes; `None` for derived types, whose size lives on the
    /// type's scope once the offset pass has run
    pub const fn size(&self) -> Option<u64> {
        match self {
            Self::Integer { kind } | Self::Real { kind } | Self::Logical { kind } => {
                Some(*kind as u64)
            }
            Self::Character { len } => Some(*len as u64),
            Self::Derived(_) => None,
        }
    }

    /// Alignment in bytes; `None` for derived types
    pub const fn alignment(&self) -> Option<u64> {
        match self {
            Self::Integer { kind } | Self::Real { kind } | Self::Logical { kind } => {
                Some(*kind as u64)
            }
            Self::Character { .. } => Some(1),
            Self::Derived(_) => None,
        }
    }
}

/// Render a type for messages, resolving derived-type names through the
/// symbol arena
pub fn describe_type(ty: &TypeDesc, symbols: &IndexVec<SymbolId, Symbol>) -> String {
    match ty {
        TypeDesc::Integer { kind } => format!("INTEGER({kind})"),
        TypeDesc::Real { kind } => format!("REAL({kind})"),
        TypeDesc::Logical { kind } => format!("LOGICAL({kind})"),
        TypeDesc::Character { len } => format!("CHARACTER({len})"),
        TypeDesc::Derived(id) => format!("TYPE({})", symbols[*id].name),
    }
}

/// One dimension of a constant array shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lower: i64,
    pub upper: i64,
}

impl Extent {
    pub const fn count(&self) -> u64 {
        let n = self.upper - self.lower + 1;
        if n < 0 { 0 } else { n as u64 }
    }
}

/// Total element count of a shape
pub fn element_count(shape: &[Extent]) -> u64 {
    shape.iter().map(Extent::count).product()
}

/// A folded constant value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Real(f64),
    Logical(bool),
    Char(String),
}

impl ConstValue {
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_of(&self, kinds: &DefaultKinds) -> TypeDesc {
        match self {
            Self::Int(_) => TypeDesc::default_integer(kinds),
            Self::Real(_) => TypeDesc::default_real(kinds),
            Self::Logical(_) => TypeDesc::default_logical(kinds),
            Self::Char(s) => TypeDesc::Character {
                len: s.chars().count() as u32,
            },
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(x) => write!(f, "{x:?}"),
            Self::Logical(true) => write!(f, ".true."),
            Self::Logical(false) => write!(f, ".false."),
            Self::Char(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Coerce a constant to the given type. Mixed numeric categories convert,
/// CHARACTER values pad or truncate to the declared length, anything else
/// is `None`.
pub fn convert_constant(value: ConstValue, ty: &TypeDesc) -> Option<ConstValue> {
    match (ty, value) {
        (TypeDesc::Integer { .. }, ConstValue::Int(n)) => Some(ConstValue::Int(n)),
        (TypeDesc::Integer { .. }, ConstValue::Real(x)) => Some(ConstValue::Int(x.trunc() as i64)),
        (TypeDesc::Real { .. }, ConstValue::Int(n)) => Some(ConstValue::Real(n as f64)),
        (TypeDesc::Real { .. }, ConstValue::Real(x)) => Some(ConstValue::Real(x)),
        (TypeDesc::Logical { .. }, ConstValue::Logical(b)) => Some(ConstValue::Logical(b)),
        (TypeDesc::Character { len }, ConstValue::Char(mut s)) => {
            let len = *len as usize;
            let count = s.chars().count();
            if count > len {
                s = s.chars().take(len).collect();
            } else {
                s.extend(std::iter::repeat(' ').take(len - count));
            }
            Some(ConstValue::Char(s))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_and_alignment() {
        assert_eq!(TypeDesc::Integer { kind: 8 }.size(), Some(8));
        assert_eq!(TypeDesc::Character { len: 5 }.size(), Some(5));
        assert_eq!(TypeDesc::Character { len: 5 }.alignment(), Some(1));
        assert_eq!(TypeDesc::Real { kind: 4 }.alignment(), Some(4));
    }

    #[test]
    fn test_extent_count() {
        assert_eq!(Extent { lower: 1, upper: 10 }.count(), 10);
        assert_eq!(Extent { lower: 0, upper: 9 }.count(), 10);
        assert_eq!(Extent { lower: 5, upper: 4 }.count(), 0);
        assert_eq!(
            element_count(&[Extent { lower: 1, upper: 3 }, Extent { lower: 1, upper: 4 }]),
            12
        );
    }
}
