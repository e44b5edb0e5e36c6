use std::convert::Infallible;

use ghdb_store::StoreError;
use ghdb_types::{DocPath, TypeError};
use thiserror::Error;

/// Errors from [`DocumentClient`](crate::DocumentClient) operations.
///
/// `E` is the error type of the caller's update closure; plain reads use
/// the default `Infallible`.
#[derive(Debug, Error)]
pub enum ClientError<E = Infallible> {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid schema path: {0}")]
    Path(#[from] TypeError),

    #[error("document {path} does not match its schema: {source}")]
    Decode {
        path: DocPath,
        source: serde_json::Error,
    },

    #[error("document {path} could not be encoded: {source}")]
    Encode {
        path: DocPath,
        source: serde_json::Error,
    },

    #[error("gave up on {path} after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: DocPath,
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },

    /// The update closure refused the change. Nothing was written.
    #[error("update rejected: {0}")]
    Rejected(E),
}

impl<E> ClientError<E> {
    /// Separate the closure's own error from client failures.
    pub fn into_rejection(self) -> Result<E, ClientError> {
        match self {
            Self::Rejected(e) => Ok(e),
            Self::Store(e) => Err(ClientError::Store(e)),
            Self::Path(e) => Err(ClientError::Path(e)),
            Self::Decode { path, source } => Err(ClientError::Decode { path, source }),
            Self::Encode { path, source } => Err(ClientError::Encode { path, source }),
            Self::RetriesExhausted {
                path,
                attempts,
                last,
            } => Err(ClientError::RetriesExhausted {
                path,
                attempts,
                last,
            }),
        }
    }

    /// The store error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            Self::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_transient)
    }
}

pub type ClientResult<T, E = Infallible> = Result<T, ClientError<E>>;
