use ghdb_types::{DocPath, Version};

/// Errors from versioned store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document exists at the path.
    #[error("document not found: {path}")]
    NotFound { path: DocPath },

    /// The expected version did not match the stored one.
    #[error("version conflict on {path}: expected {}, found {}", show(.expected), show(.actual))]
    VersionConflict {
        path: DocPath,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// The store could not be reached; retry with a fresh read.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The value written is not a JSON object.
    #[error("document at {path} must be a JSON object")]
    NotAnObject { path: DocPath },

    /// Stored bytes could not be decoded.
    #[error("corrupt document {path}: {reason}")]
    CorruptDocument { path: DocPath, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

fn show(version: &Option<Version>) -> String {
    match version {
        Some(v) => v.short().to_string(),
        None => "<absent>".to_string(),
    }
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`StoreError::VersionConflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` for [`StoreError::Transient`].
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether a get-modify-put loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict() || self.is_transient()
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> DocPath {
        DocPath::new("users/users.json").unwrap()
    }

    #[test]
    fn classification() {
        let nf = StoreError::NotFound { path: path() };
        assert!(nf.is_not_found() && !nf.is_retryable());

        let conflict = StoreError::VersionConflict {
            path: path(),
            expected: None,
            actual: Some(Version::new("abc").unwrap()),
        };
        assert!(conflict.is_conflict() && conflict.is_retryable());

        let transient = StoreError::Transient("connection reset".into());
        assert!(transient.is_transient() && transient.is_retryable());
        assert!(!transient.is_not_found());

        assert!(!StoreError::Unauthorized("bad token".into()).is_retryable());
    }

    #[test]
    fn conflict_message_shows_both_sides() {
        let err = StoreError::VersionConflict {
            path: path(),
            expected: Some(Version::new("1111111111").unwrap()),
            actual: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("users/users.json"));
        assert!(msg.contains("11111111"));
        assert!(msg.contains("<absent>"));
    }
}
