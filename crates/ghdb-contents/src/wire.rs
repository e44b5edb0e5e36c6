//! Request and response bodies of the contents endpoint.
//!
//! Field names follow the remote API exactly (`snake_case`, `type` for the
//! entry kind).

use serde::{Deserialize, Serialize};

/// Kind of entry returned by a contents `GET`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// A file (or directory entry) as returned by `GET /contents/{path}`.
///
/// `content` is present for single-file responses and absent in directory
/// listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentsFile {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub size: u64,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub sha: String,
}

/// Body of a successful `GET`: one file, or the entries of a directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentsBody {
    File(ContentsFile),
    Dir(Vec<ContentsFile>),
}

/// Author or committer identity on a write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

/// Body of `PUT /contents/{path}`.
///
/// `sha` must be the blob SHA being replaced when the file exists, and must
/// be omitted when creating it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutContents {
    pub message: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<Committer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
}

/// Body of a successful `PUT` (200 on update, 201 on create).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutContentsResponse {
    pub content: ContentsFile,
    pub commit: CommitInfo,
}

/// Error body returned with any non-2xx status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            documentation_url: None,
        }
    }
}
