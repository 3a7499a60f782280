//! # Semantic Integration Tests
//!
//! Whole-pipeline tests that drive [`Semantics::perform`] over complete
//! programs, the way the compiler driver does. Behavior specific to a
//! single pass lives in unit tests next to that pass; what belongs here is
//! the interplay: step ordering, diagnostics crossing program units, and
//! module files flowing between compilations.
//!
//! ## Test Organization
//!
//! - `scoping` - name resolution across units, CONTAINS, and USE
//! - `labels` - statement labels through the full driver
//! - `constructs` - checks over canonicalized construct trees
//! - `common_blocks` - COMMON block merging across program units
//! - `data` - deferred DATA compilation at the end of the pipeline
//! - `extensions` - the feature-gated PARALLEL, OFFLOAD, and SIMD walks
//! - `modfiles` - module files written, stored, and read back
//! - `pipeline` - short-circuiting, error limits, and warning controls

pub mod common;
pub use common::*;

pub mod constructs;
pub mod data;
pub mod labels;
pub mod scoping;
