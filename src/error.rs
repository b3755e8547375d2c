//! # Errors
//!
//! Hard failures of a generation pass. Problems found in the analyzed
//! program are not errors here; they travel as
//! [`Diagnostic`](crate::diagnostics::Diagnostic) values instead.

use crate::model::DeclId;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = CopyError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Invalid symbol graph: {0}")]
    InvalidGraph(String),

    #[error("Declaration not found: {0:?}")]
    UnknownDeclaration(DeclId),

    #[error("Failed to deserialize input: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Invalid generator options: {0}")]
    Options(#[source] serde_json::Error),

    #[error("Generation cancelled")]
    Cancelled,
}

impl CopyError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }
}
