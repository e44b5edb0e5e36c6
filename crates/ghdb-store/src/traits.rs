use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ghdb_types::{DocPath, Version};

use crate::document::Document;
use crate::error::StoreResult;

/// Versioned document store with compare-and-swap writes.
///
/// All implementations must satisfy these invariants:
/// - `get` returns [`StoreError::NotFound`] when nothing exists at the path,
///   and [`StoreError::Transient`] when the backend could not be reached.
///   The two are never conflated.
/// - `put` applies the write only if `expected` equals the current version
///   (`None` meaning "must not exist yet"); otherwise it fails with
///   [`StoreError::VersionConflict`] and leaves the stored document intact.
/// - Every successful `put` returns a token different from the one it
///   replaced.
/// - Among concurrent writers holding the same token, at most one succeeds.
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
/// [`StoreError::Transient`]: crate::StoreError::Transient
/// [`StoreError::VersionConflict`]: crate::StoreError::VersionConflict
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Read a document and its current version.
    async fn get(&self, path: &DocPath) -> StoreResult<Document>;

    /// Write a document if its current version equals `expected`.
    ///
    /// Returns the new version token.
    async fn put(
        &self,
        path: &DocPath,
        value: &Value,
        expected: Option<&Version>,
    ) -> StoreResult<Version>;

    /// List document paths under `prefix`, sorted.
    ///
    /// Pass `""` to list everything.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>>;

    /// Check whether a document exists.
    ///
    /// Default implementation calls `get()`. Transient failures propagate.
    async fn exists(&self, path: &DocPath) -> StoreResult<bool> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: VersionedStore + ?Sized> VersionedStore for Arc<S> {
    async fn get(&self, path: &DocPath) -> StoreResult<Document> {
        (**self).get(path).await
    }

    async fn put(
        &self,
        path: &DocPath,
        value: &Value,
        expected: Option<&Version>,
    ) -> StoreResult<Version> {
        (**self).put(path, value, expected).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>> {
        (**self).list(prefix).await
    }

    async fn exists(&self, path: &DocPath) -> StoreResult<bool> {
        (**self).exists(path).await
    }
}
