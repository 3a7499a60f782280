pub mod diagnostics;
pub mod reporting;

pub use diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticSeverity, DiagnosticSink, WarningCategory,
};
pub use reporting::build_diagnostic_message;
