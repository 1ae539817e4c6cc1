//! Non-fatal findings produced while extracting lineage.
//!
//! Extraction never aborts on bad input. Anything that degrades the result
//! (a missing target table, a skipped metadata alignment, a column whose
//! source could not be resolved) is recorded as a [`Diagnostic`] on the
//! analysis result so batch callers can keep going and review later.
//!
//! | Code | Kind | Severity |
//! |------|------|----------|
//! | LIN001 | [`DiagnosticKind::MissingTarget`] | Warning |
//! | LIN002 | [`DiagnosticKind::MissingSource`] | Warning |
//! | LIN003 | [`DiagnosticKind::MetadataUnavailable`] | Info |
//! | LIN004 | [`DiagnosticKind::ArityMismatch`] | Warning |
//! | LIN005 | [`DiagnosticKind::SelectStar`] | Info |
//! | LIN006 | [`DiagnosticKind::UnresolvedSource`] | Info |
//! | LIN007 | [`DiagnosticKind::UnnamedColumn`] | Info |
//! | LIN008 | [`DiagnosticKind::TokenizeError`] | Warning |
//! | LIN009 | [`DiagnosticKind::EmptyField`] | Info |

use serde::Serialize;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    /// Informational, result is still complete for what was parsed
    Info,
    /// Part of the result is missing or unreliable
    Warning
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN")
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// No `INSERT OVERWRITE TABLE` / `INSERT INTO` target was found
    MissingTarget,
    /// No `FROM <table>` clause was found
    MissingSource,
    /// The metadata provider failed or knows no columns for the target
    MetadataUnavailable,
    /// Extracted column count differs from the authoritative column count
    ArityMismatch,
    /// `SELECT *` was not expanded into column lineage
    SelectStar,
    /// A column lineage edge has no source column and needs manual review
    UnresolvedSource,
    /// A select field had no usable output name
    UnnamedColumn,
    /// The tokenizer stopped early; only the text before the error was scanned
    TokenizeError,
    /// An empty entry between commas in the select list was skipped
    EmptyField
}

impl DiagnosticKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingTarget => "LIN001",
            Self::MissingSource => "LIN002",
            Self::MetadataUnavailable => "LIN003",
            Self::ArityMismatch => "LIN004",
            Self::SelectStar => "LIN005",
            Self::UnresolvedSource => "LIN006",
            Self::UnnamedColumn => "LIN007",
            Self::TokenizeError => "LIN008",
            Self::EmptyField => "LIN009"
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingTarget
            | Self::MissingSource
            | Self::ArityMismatch
            | Self::TokenizeError => Severity::Warning,
            Self::MetadataUnavailable
            | Self::SelectStar
            | Self::UnresolvedSource
            | Self::UnnamedColumn
            | Self::EmptyField => Severity::Info
        }
    }

    /// Whether the statement itself could not be fully recognized.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget | Self::MissingSource | Self::TokenizeError
        )
    }
}

/// A single finding attached to an analysis result.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Stable code, e.g. "LIN004"
    pub code:     &'static str,
    pub kind:     DiagnosticKind,
    pub severity: Severity,
    pub message:  String
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            kind,
            severity: kind.severity(),
            message: message.into()
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}
