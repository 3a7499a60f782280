//! # Language Features and Target Characteristics
//!
//! Configuration consumed by the semantic passes: which language extensions
//! are enabled, which warning categories are suppressed, the default kind of
//! each intrinsic type category, and properties of the compilation target.

use std::str::FromStr;

use ferro_compiler_diagnostics::WarningCategory;
use rustc_hash::FxHashSet;

bitflags::bitflags! {
    /// Optional language extensions, each driven by a directive sentinel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LanguageExtensions: u8 {
        /// `!$par` parallel regions
        const PARALLEL = 1 << 0;
        /// `!$offload` device regions
        const OFFLOAD = 1 << 1;
        /// `!$simd` loop annotations
        const SIMD = 1 << 2;
    }
}

impl FromStr for LanguageExtensions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::PARALLEL),
            "offload" => Ok(Self::OFFLOAD),
            "simd" => Ok(Self::SIMD),
            _ => Err(format!("unknown language extension '{s}'")),
        }
    }
}

/// Which extensions are enabled and which warnings fire
#[derive(Debug, Clone, Default)]
pub struct LanguageFeatures {
    extensions: LanguageExtensions,
    disabled_warnings: FxHashSet<WarningCategory>,
}

impl LanguageFeatures {
    pub fn enable(&mut self, extension: LanguageExtensions) -> &mut Self {
        self.extensions.insert(extension);
        self
    }

    pub const fn is_enabled(&self, extension: LanguageExtensions) -> bool {
        self.extensions.contains(extension)
    }

    pub fn suppress_warning(&mut self, category: WarningCategory) -> &mut Self {
        self.disabled_warnings.insert(category);
        self
    }

    pub fn should_warn(&self, category: WarningCategory) -> bool {
        !self.disabled_warnings.contains(&category)
    }
}

/// Kind numbers assumed when a declaration does not spell one out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultKinds {
    pub integer: u8,
    pub real: u8,
    pub logical: u8,
    pub character: u8,
}

impl Default for DefaultKinds {
    fn default() -> Self {
        Self {
            integer: 4,
            real: 4,
            logical: 4,
            character: 1,
        }
    }
}

/// Properties of the machine being compiled for
#[derive(Debug, Clone)]
pub struct TargetCharacteristics {
    /// Width in bytes of the widest vector register, if the target has any
    pub vector_width: Option<u32>,
    /// Whether external link names get a trailing underscore
    pub underscoring: bool,
}

impl Default for TargetCharacteristics {
    fn default() -> Self {
        let vector_width = if cfg!(target_arch = "x86_64") {
            Some(32)
        } else if cfg!(target_arch = "aarch64") {
            Some(16)
        } else {
            None
        };
        Self {
            vector_width,
            underscoring: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_toggles() {
        let mut features = LanguageFeatures::default();
        assert!(!features.is_enabled(LanguageExtensions::PARALLEL));
        features.enable(LanguageExtensions::PARALLEL | LanguageExtensions::SIMD);
        assert!(features.is_enabled(LanguageExtensions::PARALLEL));
        assert!(features.is_enabled(LanguageExtensions::SIMD));
        assert!(!features.is_enabled(LanguageExtensions::OFFLOAD));
    }

    #[test]
    fn test_extension_names_parse() {
        assert_eq!("parallel".parse(), Ok(LanguageExtensions::PARALLEL));
        assert_eq!("simd".parse(), Ok(LanguageExtensions::SIMD));
        assert!("vector".parse::<LanguageExtensions>().is_err());
    }

    #[test]
    fn test_warning_suppression() {
        let mut features = LanguageFeatures::default();
        assert!(features.should_warn(WarningCategory::DistinctCommonSizes));
        features.suppress_warning(WarningCategory::DistinctCommonSizes);
        assert!(!features.should_warn(WarningCategory::DistinctCommonSizes));
        assert!(features.should_warn(WarningCategory::UnusedVariable));
    }
}
