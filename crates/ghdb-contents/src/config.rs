use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wire::Committer;

/// Where the documents live: one branch of one repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_base: String,
}

impl Default for RepoLocation {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: "main".into(),
            api_base: "https://api.github.com".into(),
        }
    }
}

impl RepoLocation {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            ..Self::default()
        }
    }

    /// `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// URL of the contents endpoint for `path`.
    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }
}

/// Settings for a [`ContentsStore`](crate::ContentsStore).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentsConfig {
    pub location: RepoLocation,
    /// Access token, substituted at deploy time. Never logged.
    pub token: Option<String>,
    /// Identity recorded on commits; the token owner when absent.
    pub committer: Option<Committer>,
}

impl ContentsConfig {
    pub fn new(location: RepoLocation) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Value for the `Authorization` header, if a token is configured.
    pub fn authorization(&self) -> Option<String> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("token {t}"))
    }
}

impl fmt::Debug for ContentsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentsConfig")
            .field("location", &self.location)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("committer", &self.committer)
            .finish()
    }
}
