use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use ghdb_store::{Document, Op, StoreError, StoreResult, VersionedStore};
use ghdb_types::{DocPath, Version};

use crate::codec::Base64Json;
use crate::config::ContentsConfig;
use crate::error::ContentsError;
use crate::transport::{ContentsResponse, ContentsTransport};
use crate::wire::{ContentsBody, EntryKind, PutContents, PutContentsResponse};

/// Commit message recorded for a write to `path` at `at`.
///
/// `Update users/users.json - 2024-06-01T10:00:00.000Z`
pub fn commit_message(path: &DocPath, at: DateTime<Utc>) -> String {
    format!(
        "Update {path} - {}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// [`VersionedStore`] backed by a repository contents endpoint.
///
/// The blob SHA is the version token. Statuses map onto store errors:
///
/// - 404 -> [`StoreError::NotFound`]
/// - 409, 422 on `PUT` -> [`StoreError::VersionConflict`]
/// - 401, 403 -> [`StoreError::Unauthorized`] (rate-limit 403s are transient)
/// - 429, 5xx, no response -> [`StoreError::Transient`]
/// - anything else -> [`StoreError::Backend`]
pub struct ContentsStore<T> {
    transport: T,
    config: ContentsConfig,
}

impl<T: ContentsTransport> ContentsStore<T> {
    pub fn new(transport: T, config: ContentsConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ContentsConfig {
        &self.config
    }

    fn branch(&self) -> &str {
        &self.config.location.branch
    }

    fn url(&self, path: &str) -> String {
        self.config.location.contents_url(path)
    }

    /// Map a non-success response. Auth failures on anonymous requests say so.
    fn reject(
        &self,
        op: Op,
        path: &DocPath,
        resp: &ContentsResponse,
        expected: Option<&Version>,
    ) -> StoreError {
        match status_error(op, path, resp, expected) {
            StoreError::Unauthorized(message) if self.config.authorization().is_none() => {
                StoreError::Unauthorized(format!("{message} (no access token configured)"))
            }
            err => err,
        }
    }
}

fn transport_error(url: &str, err: ContentsError) -> StoreError {
    match err {
        ContentsError::Transport(msg) => {
            warn!(url, error = %msg, "contents request got no response");
            StoreError::Transient(msg)
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn status_error(
    op: Op,
    path: &DocPath,
    resp: &ContentsResponse,
    expected: Option<&Version>,
) -> StoreError {
    let message = resp.error_message();
    match (op, resp.status) {
        (_, 404) => StoreError::NotFound { path: path.clone() },
        (Op::Put, 409 | 422) => StoreError::VersionConflict {
            path: path.clone(),
            expected: expected.cloned(),
            actual: None,
        },
        (_, 403) if message.to_ascii_lowercase().contains("rate limit") => {
            StoreError::Transient(format!("rate limited: {message}"))
        }
        (_, 401 | 403) => StoreError::Unauthorized(message),
        (_, 429 | 500..=599) => StoreError::Transient(format!("status {}: {message}", resp.status)),
        (_, status) => StoreError::Backend(format!("unexpected status {status}: {message}")),
    }
}

fn corrupt(path: &DocPath, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptDocument {
        path: path.clone(),
        reason: reason.into(),
    }
}

#[async_trait]
impl<T: ContentsTransport> VersionedStore for ContentsStore<T> {
    async fn get(&self, path: &DocPath) -> StoreResult<Document> {
        let resp = self
            .transport
            .get_contents(path.as_str(), self.branch())
            .await
            .map_err(|e| transport_error(&self.url(path.as_str()), e))?;
        if !resp.is_success() {
            return Err(self.reject(Op::Get, path, &resp, None));
        }

        let body: ContentsBody = resp.json().map_err(|e| corrupt(path, e.to_string()))?;
        let file = match body {
            ContentsBody::File(file) if file.kind == EntryKind::File => file,
            _ => return Err(corrupt(path, "path is not a file")),
        };
        let content = file
            .content
            .ok_or_else(|| corrupt(path, "response carried no content"))?;
        let value: Value = Base64Json::decode(&content).map_err(|e| corrupt(path, e.to_string()))?;
        if !value.is_object() {
            return Err(corrupt(path, "top-level value is not a JSON object"));
        }
        let version = Version::new(file.sha).map_err(|e| corrupt(path, e.to_string()))?;

        debug!(%path, version = version.short(), "fetched document");
        Ok(Document::new(path.clone(), value, version))
    }

    async fn put(
        &self,
        path: &DocPath,
        value: &Value,
        expected: Option<&Version>,
    ) -> StoreResult<Version> {
        if !value.is_object() {
            return Err(StoreError::NotAnObject { path: path.clone() });
        }
        let content = Base64Json::encode(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let body = PutContents {
            message: commit_message(path, Utc::now()),
            content,
            sha: expected.map(|v| v.to_string()),
            branch: Some(self.branch().to_string()),
            committer: self.config.committer.clone(),
        };

        let resp = self
            .transport
            .put_contents(path.as_str(), &body)
            .await
            .map_err(|e| transport_error(&self.url(path.as_str()), e))?;
        if !resp.is_success() {
            let err = self.reject(Op::Put, path, &resp, expected);
            debug!(url = %self.url(path.as_str()), status = resp.status, error = %err, "write rejected");
            return Err(err);
        }

        let written: PutContentsResponse = resp
            .json()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let version =
            Version::new(written.content.sha).map_err(|e| StoreError::Backend(e.to_string()))?;
        debug!(%path, version = version.short(), commit = %written.commit.sha, "document written");
        Ok(version)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>> {
        let mut paths = Vec::new();
        let mut pending = VecDeque::from([prefix.trim_matches('/').to_string()]);

        while let Some(dir) = pending.pop_front() {
            let resp = self
                .transport
                .get_contents(&dir, self.branch())
                .await
                .map_err(|e| transport_error(&self.url(&dir), e))?;
            if resp.status == 404 {
                continue;
            }
            if !resp.is_success() {
                return Err(match DocPath::new(dir.as_str()) {
                    Ok(at) => self.reject(Op::Get, &at, &resp, None),
                    // The repository root has no DocPath.
                    Err(_) if matches!(resp.status, 429 | 500..=599) => StoreError::Transient(
                        format!("listing root: status {}", resp.status),
                    ),
                    Err(_) => StoreError::Backend(format!(
                        "listing root failed with status {}: {}",
                        resp.status,
                        resp.error_message()
                    )),
                });
            }
            let body: ContentsBody = resp
                .json()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let entries = match body {
                ContentsBody::File(file) => vec![file],
                ContentsBody::Dir(entries) => entries,
            };
            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => pending.push_back(entry.path),
                    EntryKind::File => match DocPath::new(entry.path.as_str()) {
                        Ok(path) => paths.push(path),
                        Err(e) => debug!(path = %entry.path, error = %e, "skipping entry"),
                    },
                    EntryKind::Symlink | EntryKind::Submodule => {}
                }
            }
        }

        paths.retain(|p| p.starts_with(prefix));
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

impl<T> std::fmt::Debug for ContentsStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentsStore")
            .field("config", &self.config)
            .finish()
    }
}
