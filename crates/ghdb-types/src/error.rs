use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid document path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid version token: {0}")]
    InvalidVersion(String),
}
