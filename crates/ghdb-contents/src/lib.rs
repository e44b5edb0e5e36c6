//! Repository contents API model for ghdb.
//!
//! A hosted git repository exposes each file through a contents endpoint:
//! `GET` returns the base64-encoded blob with its SHA, and `PUT` writes a new
//! blob conditioned on the SHA the caller last saw. This crate models that
//! API (wire types, status semantics, codec) and adapts it to
//! [`VersionedStore`].
//!
//! # Key Types
//!
//! - [`ContentsTransport`] -- Request/response seam to a contents endpoint
//! - [`InMemoryContents`] -- In-process emulation of the endpoint
//! - [`ContentsStore`] -- [`VersionedStore`] over any transport
//! - [`Base64Json`] -- JSON-in-base64 codec tolerant of wrapped lines
//!
//! No HTTP client ships here. A deployment provides its own transport.
//!
//! [`VersionedStore`]: ghdb_store::VersionedStore

pub mod codec;
pub mod config;
pub mod emulation;
pub mod error;
pub mod store;
pub mod transport;
pub mod wire;

pub use codec::Base64Json;
pub use config::{ContentsConfig, RepoLocation};
pub use emulation::{ContentsFault, InMemoryContents};
pub use error::{ContentsError, ContentsResult};
pub use store::{commit_message, ContentsStore};
pub use transport::{ContentsResponse, ContentsTransport};
pub use wire::{ApiError, CommitInfo, Committer, ContentsBody, ContentsFile, EntryKind, PutContents, PutContentsResponse};
