//! # Diagnostic System for Semantic Analysis
//!
//! This module provides the diagnostic infrastructure for reporting semantic
//! errors, warnings, and portability notices during compilation.

use ariadne::ReportKind;
use chumsky::span::SimpleSpan;
use std::fmt;
use std::str::FromStr;

/// A diagnostic message from the compiler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: DiagnosticCode,
    pub message: String,
    /// Source span where this diagnostic applies
    pub span: SimpleSpan<usize>,
    /// Optional related spans for additional context
    pub related_spans: Vec<(SimpleSpan<usize>, String)>,
    /// Warning class, present on suppressible diagnostics only
    pub category: Option<WarningCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    /// Legal but non-portable usage; a lower warning tier
    Portability,
}

impl From<DiagnosticSeverity> for ReportKind<'static> {
    fn from(severity: DiagnosticSeverity) -> Self {
        match severity {
            DiagnosticSeverity::Error => ReportKind::Error,
            DiagnosticSeverity::Warning => ReportKind::Warning,
            DiagnosticSeverity::Portability => ReportKind::Advice,
        }
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Portability => write!(f, "portability"),
        }
    }
}

/// Classes of suppressible diagnostics. Every warning and portability
/// notice belongs to exactly one class; errors belong to none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCategory {
    IndexVarRedefinition,
    UndefinedFunctionResult,
    DistinctCommonSizes,
    NonstandardDoTermination,
    UnusedVariable,
    IgnoredDirective,
    NestedParallel,
}

impl WarningCategory {
    pub const ALL: [Self; 7] = [
        Self::IndexVarRedefinition,
        Self::UndefinedFunctionResult,
        Self::DistinctCommonSizes,
        Self::NonstandardDoTermination,
        Self::UnusedVariable,
        Self::IgnoredDirective,
        Self::NestedParallel,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::IndexVarRedefinition => "index-var-redefinition",
            Self::UndefinedFunctionResult => "undefined-function-result",
            Self::DistinctCommonSizes => "distinct-common-sizes",
            Self::NonstandardDoTermination => "nonstandard-do-termination",
            Self::UnusedVariable => "unused-variable",
            Self::IgnoredDirective => "ignored-directive",
            Self::NestedParallel => "nested-parallel",
        }
    }
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WarningCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown warning category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    // Parse-related errors (0-999)
    LexicalError,
    SyntaxError,

    // Label errors (1000-1999)
    InvalidLabel,
    DuplicateLabel,
    UnresolvedLabel,
    BadLoopTermination,

    // Name and declaration errors (2000-2999)
    UndeclaredName,
    DuplicateDeclaration,
    ConflictingDeclaration,
    UnusedVariable,
    MissingModule,
    ParameterWithoutValue,
    NonConstantExpression,
    InvalidCommonObject,
    InvalidEquivalence,
    InvalidKind,

    // Type and expression errors (3000-3999)
    TypeMismatch,
    InvalidOperandType,
    RankMismatch,
    InvalidSubscript,
    InvalidFunctionCall,
    InvalidAssignment,
    DivisionByZero,

    // Construct errors (4000-4999)
    IndexVarRedefinition,
    MisplacedEntry,
    MisplacedStatement,
    OverlappingCase,
    DuplicateDefaultCase,
    InvalidStopCode,
    InvalidAssignedGoto,
    InvalidDataStatement,
    InvalidDirective,

    // Storage association errors (5000-5999)
    CommonInitConflict,
    CommonSizeMismatch,

    // Procedure warnings (6000-6999)
    UndefinedFunctionResult,

    // Module file errors (7000-7999)
    ModuleFileError,
}

impl From<DiagnosticCode> for u32 {
    fn from(code: DiagnosticCode) -> Self {
        match code {
            DiagnosticCode::LexicalError => 1,
            DiagnosticCode::SyntaxError => 2,
            DiagnosticCode::InvalidLabel => 1001,
            DiagnosticCode::DuplicateLabel => 1002,
            DiagnosticCode::UnresolvedLabel => 1003,
            DiagnosticCode::BadLoopTermination => 1004,
            DiagnosticCode::UndeclaredName => 2001,
            DiagnosticCode::DuplicateDeclaration => 2002,
            DiagnosticCode::ConflictingDeclaration => 2003,
            DiagnosticCode::UnusedVariable => 2004,
            DiagnosticCode::MissingModule => 2005,
            DiagnosticCode::ParameterWithoutValue => 2006,
            DiagnosticCode::NonConstantExpression => 2007,
            DiagnosticCode::InvalidCommonObject => 2008,
            DiagnosticCode::InvalidEquivalence => 2009,
            DiagnosticCode::InvalidKind => 2010,
            DiagnosticCode::TypeMismatch => 3001,
            DiagnosticCode::InvalidOperandType => 3002,
            DiagnosticCode::RankMismatch => 3003,
            DiagnosticCode::InvalidSubscript => 3004,
            DiagnosticCode::InvalidFunctionCall => 3005,
            DiagnosticCode::InvalidAssignment => 3006,
            DiagnosticCode::DivisionByZero => 3007,
            DiagnosticCode::IndexVarRedefinition => 4001,
            DiagnosticCode::MisplacedEntry => 4002,
            DiagnosticCode::MisplacedStatement => 4003,
            DiagnosticCode::OverlappingCase => 4004,
            DiagnosticCode::DuplicateDefaultCase => 4005,
            DiagnosticCode::InvalidStopCode => 4006,
            DiagnosticCode::InvalidAssignedGoto => 4007,
            DiagnosticCode::InvalidDataStatement => 4008,
            DiagnosticCode::InvalidDirective => 4009,
            DiagnosticCode::CommonInitConflict => 5001,
            DiagnosticCode::CommonSizeMismatch => 5002,
            DiagnosticCode::UndefinedFunctionResult => 6001,
            DiagnosticCode::ModuleFileError => 7001,
        }
    }
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: String) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code,
            message,
            span: SimpleSpan::from(0..0),
            related_spans: Vec::new(),
            category: None,
        }
    }

    /// Create a warning diagnostic in the given suppression class
    pub fn warning(category: WarningCategory, code: DiagnosticCode, message: String) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code,
            message,
            span: SimpleSpan::from(0..0),
            related_spans: Vec::new(),
            category: Some(category),
        }
    }

    /// Create a portability notice in the given suppression class
    pub fn portability(category: WarningCategory, code: DiagnosticCode, message: String) -> Self {
        Self {
            severity: DiagnosticSeverity::Portability,
            code,
            message,
            span: SimpleSpan::from(0..0),
            related_spans: Vec::new(),
            category: Some(category),
        }
    }

    /// Add location information to this diagnostic
    pub const fn with_location(mut self, span: SimpleSpan<usize>) -> Self {
        self.span = span;
        self
    }

    /// Add a related span with context message
    pub fn with_related_span(mut self, span: SimpleSpan<usize>, message: String) -> Self {
        self.related_spans.push((span, message));
        self
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Error)
    }

    /// Convenience method for lexical errors
    pub fn lexical_error(message: String, span: SimpleSpan<usize>) -> Self {
        Self::error(DiagnosticCode::LexicalError, message).with_location(span)
    }

    /// Convenience method for syntax errors
    pub fn syntax_error(message: String, span: SimpleSpan<usize>) -> Self {
        Self::error(DiagnosticCode::SyntaxError, message).with_location(span)
    }

    /// Convenience method for undeclared name errors
    pub fn undeclared_name(name: &str, span: SimpleSpan<usize>) -> Self {
        Self::error(
            DiagnosticCode::UndeclaredName,
            format!("No explicit type declared for '{name}'"),
        )
        .with_location(span)
    }

    /// Convenience method for unused variable warnings
    pub fn unused_variable(name: &str, span: SimpleSpan<usize>) -> Self {
        Self::warning(
            WarningCategory::UnusedVariable,
            DiagnosticCode::UnusedVariable,
            format!("Unused variable '{name}'"),
        )
        .with_location(span)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        write!(f, " (at {}:{})", self.span.start, self.span.end)?;
        for (span, message) in &self.related_spans {
            write!(f, "\n  note: {} (at {}:{})", message, span.start, span.end)?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across all passes of a compilation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic to the sink
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Add multiple diagnostics
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Get only error diagnostics
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_fatal()).collect()
    }

    /// Get only warning and portability diagnostics
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_fatal()).collect()
    }

    /// True if any recorded diagnostic is fatal. With `warnings_are_errors`
    /// every warning and portability notice counts as fatal too.
    pub fn any_fatal(&self, warnings_are_errors: bool) -> bool {
        if warnings_are_errors {
            !self.diagnostics.is_empty()
        } else {
            self.diagnostics.iter().any(Diagnostic::is_fatal)
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_fatal()).count()
    }

    pub const fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Drop every diagnostic recorded after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.diagnostics.truncate(len);
    }

    pub const fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Stable sort into source order
    pub fn sort_by_position(&mut self) {
        self.diagnostics
            .sort_by_key(|d| (d.span.start, d.span.end));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }
}

impl From<Vec<Diagnostic>> for DiagnosticSink {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }
}

impl IntoIterator for DiagnosticSink {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_creation() {
        let span = SimpleSpan::from(10..20);
        let diag = Diagnostic::undeclared_name("x1", span);
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.code, DiagnosticCode::UndeclaredName);
        assert!(diag.message.contains("x1"));
        assert_eq!(diag.span, span);
        assert!(diag.category.is_none());
    }

    #[test]
    fn test_warning_carries_category() {
        let diag = Diagnostic::unused_variable("tmp", SimpleSpan::from(0..3));
        assert_eq!(diag.severity, DiagnosticSeverity::Warning);
        assert_eq!(diag.category, Some(WarningCategory::UnusedVariable));
        assert!(!diag.is_fatal());
    }

    #[test]
    fn test_any_fatal_with_escalation() {
        let mut sink = DiagnosticSink::new();
        sink.add(Diagnostic::unused_variable("tmp", SimpleSpan::from(0..3)));
        assert!(!sink.any_fatal(false));
        assert!(sink.any_fatal(true));

        sink.add(Diagnostic::undeclared_name("y", SimpleSpan::from(5..6)));
        assert!(sink.any_fatal(false));
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn test_sort_by_position() {
        let mut sink = DiagnosticSink::new();
        sink.add(Diagnostic::undeclared_name("b", SimpleSpan::from(40..41)));
        sink.add(Diagnostic::undeclared_name("a", SimpleSpan::from(10..11)));
        sink.sort_by_position();
        assert_eq!(sink.all()[0].span.start, 10);
        assert_eq!(sink.all()[1].span.start, 40);
    }

    #[test]
    fn test_category_round_trip() {
        for category in WarningCategory::ALL {
            assert_eq!(category.name().parse::<WarningCategory>(), Ok(category));
        }
        assert!("no-such-category".parse::<WarningCategory>().is_err());
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(
            DiagnosticCode::CommonInitConflict,
            "Multiple initialization of COMMON block /blk/".to_string(),
        )
        .with_location(SimpleSpan::from(5..10))
        .with_related_span(SimpleSpan::from(1..4), "Previous initialization".to_string());
        let display = format!("{diag}");
        assert!(display.contains("error"));
        assert!(display.contains("COMMON block"));
        assert!(display.contains("note: Previous initialization"));
    }
}
