use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque revision token for a stored document.
///
/// A `Version` is minted by the store on every successful write. Callers
/// never interpret it: they keep the token they last observed and hand it
/// back on the next write so the store can detect that someone else wrote in
/// between. For remote repositories this is the blob SHA; local backends
/// mint hex digests of their own.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap a token received from a store.
    pub fn new(token: impl Into<String>) -> Result<Self, TypeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(TypeError::InvalidVersion("token must not be empty".into()));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidVersion(format!(
                "token contains whitespace: {token:?}"
            )));
        }
        Ok(Self(token))
    }

    /// Mint a token from raw digest bytes (lowercase hex).
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs (first 8 characters).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Consume into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.short())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
