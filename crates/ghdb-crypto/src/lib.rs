//! Hashing primitives for ghdb.
//!
//! Provides domain-separated BLAKE3 hashing for content digests and version
//! tokens, and salted password digests for stored user records.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;
pub mod secret;

pub use hasher::{ContentHasher, VERSION_LEN};
pub use secret::{PasswordDigest, SecretError};
