use ghdb_types::{DocPath, Version};

/// Length in bytes of minted version tokens (40 hex characters, the same
/// width as a git blob SHA).
pub const VERSION_LEN: usize = 20;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"ghdb-doc-v1"`) that is
/// prepended to every hash computation, so a document body and a version
/// preimage with identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for document bodies.
    pub const DOCUMENT: Self = Self {
        domain: "ghdb-doc-v1",
    };
    /// Hasher for version tokens minted by local backends.
    pub const VERSION: Self = Self {
        domain: "ghdb-version-v1",
    };
    /// Hasher for commit identifiers in the contents emulation.
    pub const COMMIT: Self = Self {
        domain: "ghdb-commit-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Truncated digest rendered as a [`Version`] token.
    pub fn version_of(&self, data: &[u8]) -> Version {
        Version::from_digest(&self.hash(data)[..VERSION_LEN])
    }

    /// Mint the token for revision `revision` of the document at `path`.
    ///
    /// The revision number is part of the preimage, so rewriting identical
    /// content still produces a fresh token.
    pub fn mint(&self, path: &DocPath, revision: u64, body: &[u8]) -> Version {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(path.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(&revision.to_be_bytes());
        hasher.update(body);
        Version::from_digest(&hasher.finalize().as_bytes()[..VERSION_LEN])
    }
}
