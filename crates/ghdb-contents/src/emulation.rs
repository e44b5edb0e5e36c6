use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use ghdb_crypto::ContentHasher;
use ghdb_store::Op;
use ghdb_types::{DocPath, Version};

use crate::codec::{Base64Json, LINE_WIDTH};
use crate::error::{ContentsError, ContentsResult};
use crate::transport::{ContentsResponse, ContentsTransport};
use crate::wire::{ApiError, CommitInfo, ContentsFile, EntryKind, PutContents, PutContentsResponse};

/// Failure to inject in place of a real response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentsFault {
    /// Respond with this status and a generic error body.
    Status(u16),
    /// Produce no response at all.
    Disconnect,
}

#[derive(Clone)]
struct Blob {
    /// Base64 as the remote renders it (wrapped).
    content: String,
    sha: Version,
    size: u64,
    revision: u64,
}

/// In-process emulation of a repository contents endpoint.
///
/// Reproduces the status semantics a client has to handle:
///
/// | request                              | status |
/// |--------------------------------------|--------|
/// | `GET` missing path                   | 404    |
/// | `PUT` existing file without `sha`    | 422    |
/// | `PUT` with a `sha` that is not current | 409  |
/// | `PUT` creating a file                | 201    |
/// | `PUT` updating a file                | 200    |
///
/// Blob SHAs are minted from path, per-file revision and content, so every
/// accepted write yields a fresh SHA.
pub struct InMemoryContents {
    default_branch: String,
    files: RwLock<HashMap<(String, String), Blob>>,
    commits: RwLock<Vec<CommitInfo>>,
    faults: Mutex<Vec<(Op, ContentsFault)>>,
}

impl InMemoryContents {
    pub fn new() -> Self {
        Self::with_default_branch("main")
    }

    pub fn with_default_branch(branch: impl Into<String>) -> Self {
        Self {
            default_branch: branch.into(),
            files: RwLock::new(HashMap::new()),
            commits: RwLock::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Number of files across all branches.
    pub fn file_count(&self) -> usize {
        self.files.read().expect("lock poisoned").len()
    }

    /// Commits in the order they were made.
    pub fn commits(&self) -> Vec<CommitInfo> {
        self.commits.read().expect("lock poisoned").clone()
    }

    /// Stored (wrapped base64) content of `path` on the default branch.
    pub fn raw_content(&self, path: &str) -> Option<String> {
        self.files
            .read()
            .expect("lock poisoned")
            .get(&(self.default_branch.clone(), path.to_string()))
            .map(|b| b.content.clone())
    }

    /// Make the next `count` requests of kind `op` fail with `fault`.
    pub fn fail_next(&self, op: Op, count: usize, fault: ContentsFault) {
        let mut faults = self.faults.lock().expect("lock poisoned");
        faults.extend(std::iter::repeat((op, fault)).take(count));
    }

    fn take_fault(&self, op: Op) -> Option<ContentsFault> {
        let mut faults = self.faults.lock().expect("lock poisoned");
        let index = faults.iter().position(|(o, _)| *o == op)?;
        Some(faults.remove(index).1)
    }

    fn branch_or_default(&self, branch: Option<&str>) -> String {
        match branch {
            Some(b) if !b.is_empty() => b.to_string(),
            _ => self.default_branch.clone(),
        }
    }

    fn injected(&self, op: Op, path: &str) -> Option<ContentsResult<ContentsResponse>> {
        let fault = self.take_fault(op)?;
        debug!(path, ?op, ?fault, "injecting contents fault");
        Some(match fault {
            ContentsFault::Disconnect => Err(ContentsError::Transport(format!(
                "connection reset while requesting {path}"
            ))),
            ContentsFault::Status(status) => error(status, "injected failure"),
        })
    }

    fn listing(&self, branch: &str, dir: &str) -> Vec<ContentsFile> {
        let files = self.files.read().expect("lock poisoned");
        let mut entries: BTreeMap<String, ContentsFile> = BTreeMap::new();

        for ((b, path), blob) in files.iter() {
            if b != branch {
                continue;
            }
            let rest = if dir.is_empty() {
                path.as_str()
            } else {
                match path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let full = |name: &str| {
                if dir.is_empty() {
                    name.to_string()
                } else {
                    format!("{dir}/{name}")
                }
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let child_path = full(child);
                    entries.entry(child.to_string()).or_insert_with(|| ContentsFile {
                        kind: EntryKind::Dir,
                        encoding: None,
                        size: 0,
                        name: child.to_string(),
                        sha: ContentHasher::DOCUMENT
                            .version_of(child_path.as_bytes())
                            .into_string(),
                        path: child_path,
                        content: None,
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        ContentsFile {
                            kind: EntryKind::File,
                            encoding: None,
                            size: blob.size,
                            name: rest.to_string(),
                            path: full(rest),
                            content: None,
                            sha: blob.sha.to_string(),
                        },
                    );
                }
            }
        }
        entries.into_values().collect()
    }
}

impl Default for InMemoryContents {
    fn default() -> Self {
        Self::new()
    }
}

fn reply<T: Serialize>(status: u16, body: &T) -> ContentsResult<ContentsResponse> {
    Ok(ContentsResponse::new(status, serde_json::to_string(body)?))
}

fn error(status: u16, message: impl Into<String>) -> ContentsResult<ContentsResponse> {
    reply(status, &ApiError::new(message))
}

fn file_entry(path: &DocPath, blob: &Blob, with_content: bool) -> ContentsFile {
    ContentsFile {
        kind: EntryKind::File,
        encoding: with_content.then(|| "base64".to_string()),
        size: blob.size,
        name: path.file_name().to_string(),
        path: path.to_string(),
        content: with_content.then(|| blob.content.clone()),
        sha: blob.sha.to_string(),
    }
}

#[async_trait]
impl ContentsTransport for InMemoryContents {
    async fn get_contents(&self, path: &str, git_ref: &str) -> ContentsResult<ContentsResponse> {
        if let Some(injected) = self.injected(Op::Get, path) {
            return injected;
        }
        let branch = self.branch_or_default(Some(git_ref));
        let dir = path.trim_matches('/');

        if let Ok(doc_path) = DocPath::new(dir) {
            let files = self.files.read().expect("lock poisoned");
            if let Some(blob) = files.get(&(branch.clone(), dir.to_string())) {
                return reply(200, &file_entry(&doc_path, blob, true));
            }
        }

        let entries = self.listing(&branch, dir);
        if entries.is_empty() {
            return error(404, "Not Found");
        }
        reply(200, &entries)
    }

    async fn put_contents(&self, path: &str, body: &PutContents) -> ContentsResult<ContentsResponse> {
        if let Some(injected) = self.injected(Op::Put, path) {
            return injected;
        }
        let Ok(doc_path) = DocPath::new(path) else {
            return error(422, format!("path is invalid: {path:?}"));
        };
        let Ok(bytes) = Base64Json::decode_bytes(&body.content) else {
            return error(422, "content is not valid Base64");
        };
        let branch = self.branch_or_default(body.branch.as_deref());
        let key = (branch, path.to_string());

        let mut files = self.files.write().expect("lock poisoned");
        let current = files.get(&key);
        match (current, body.sha.as_deref()) {
            (Some(_), None) => {
                return error(422, "Invalid request.\n\n\"sha\" wasn't supplied.");
            }
            (Some(blob), Some(sha)) if blob.sha.as_str() != sha => {
                return error(409, format!("{path} does not match {sha}"));
            }
            (None, Some(sha)) => {
                return error(409, format!("{path} does not match {sha}"));
            }
            _ => {}
        }

        let created = current.is_none();
        let revision = current.map(|b| b.revision).unwrap_or(0) + 1;
        let blob = Blob {
            content: Base64Json::wrap(&Base64Json::encode_bytes(&bytes), LINE_WIDTH),
            sha: ContentHasher::VERSION.mint(&doc_path, revision, &bytes),
            size: bytes.len() as u64,
            revision,
        };
        let content = file_entry(&doc_path, &blob, false);
        files.insert(key, blob);
        drop(files);

        let mut commits = self.commits.write().expect("lock poisoned");
        let preimage = format!("{}\0{}\0{}", commits.len(), content.sha, body.message);
        let commit = CommitInfo {
            sha: ContentHasher::COMMIT
                .version_of(preimage.as_bytes())
                .into_string(),
            message: body.message.clone(),
        };
        commits.push(commit.clone());
        drop(commits);

        debug!(path, revision, created, "contents emulation accepted write");
        reply(
            if created { 201 } else { 200 },
            &PutContentsResponse { content, commit },
        )
    }
}

impl std::fmt::Debug for InMemoryContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContents")
            .field("default_branch", &self.default_branch)
            .field("file_count", &self.file_count())
            .finish()
    }
}
