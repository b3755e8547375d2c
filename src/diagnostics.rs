//! # Diagnostics
//!
//! Typed findings about the analyzed program and the sinks that receive them.
//! The pipeline never prints; hosts decide how findings are rendered.

use crate::model::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Finding categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    Unresolvable,
    WrongKind,
    Ambiguous,
    Inaccessible,
    SelfOrAncestorCopy,
    CrossAssembly,
    CircularDependency,
    TypeArgumentConstraintViolation,
    UnknownPartialPartName,
    EquivalentTarget,
    NotPartial,
    ContainingTypeNotPartial,
    MalformedDirective,
    InvalidPattern,
    AdditionalConstructNotApplicable,
    MemberTransplantFailed,
}

impl DiagnosticCode {
    /// Stable identifier for hosts and suppression lists
    pub fn id(self) -> &'static str {
        match self {
            DiagnosticCode::Unresolvable => "TC0001",
            DiagnosticCode::WrongKind => "TC0002",
            DiagnosticCode::Ambiguous => "TC0003",
            DiagnosticCode::Inaccessible => "TC0004",
            DiagnosticCode::SelfOrAncestorCopy => "TC0005",
            DiagnosticCode::CrossAssembly => "TC0006",
            DiagnosticCode::CircularDependency => "TC0007",
            DiagnosticCode::TypeArgumentConstraintViolation => "TC0008",
            DiagnosticCode::UnknownPartialPartName => "TC0009",
            DiagnosticCode::EquivalentTarget => "TC0010",
            DiagnosticCode::NotPartial => "TC0011",
            DiagnosticCode::ContainingTypeNotPartial => "TC0012",
            DiagnosticCode::MalformedDirective => "TC0013",
            DiagnosticCode::InvalidPattern => "TC0014",
            DiagnosticCode::AdditionalConstructNotApplicable => "TC0015",
            DiagnosticCode::MemberTransplantFailed => "TC0016",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticCode::EquivalentTarget | DiagnosticCode::MemberTransplantFailed => {
                Severity::Warning
            }
            DiagnosticCode::AdditionalConstructNotApplicable => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Structural problems that stop every directive of the requestor
    pub fn aborts_requestor(self) -> bool {
        matches!(
            self,
            DiagnosticCode::SelfOrAncestorCopy
                | DiagnosticCode::CircularDependency
                | DiagnosticCode::NotPartial
                | DiagnosticCode::ContainingTypeNotPartial
        )
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    /// Qualified name of the requestor the finding belongs to
    pub requestor: Option<String>,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            requestor: None,
            location: None,
        }
    }

    pub fn for_requestor(mut self, requestor: impl Into<String>) -> Self {
        self.requestor = Some(requestor.into());
        self
    }

    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Receives findings during a pass
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);

    /// Whether producers should build detailed findings. Quiet sinks only
    /// track whether anything failed.
    fn is_detailed(&self) -> bool;

    fn has_errors(&self) -> bool;

    /// Drain collected findings
    fn take(&mut self) -> Vec<Diagnostic>;
}

/// Detailed sink keeping every finding
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.diagnostics.iter().map(|d| d.code).collect()
    }
}

impl DiagnosticSink for DiagnosticBag {
    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::debug!("[TCG] {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn is_detailed(&self) -> bool {
        true
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Quiet sink: remembers only whether an error was reported
#[derive(Debug, Default)]
pub struct FailureFlag {
    failed: bool,
}

impl FailureFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticSink for FailureFlag {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.failed |= diagnostic.is_error();
    }

    fn is_detailed(&self) -> bool {
        false
    }

    fn has_errors(&self) -> bool {
        self.failed
    }

    fn take(&mut self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// Order findings independently of the order requestors were processed in
pub fn sort_deterministic(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        a.requestor
            .cmp(&b.requestor)
            .then_with(|| a.location.cmp(&b.location))
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.message.cmp(&b.message))
    });
}
