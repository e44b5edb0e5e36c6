//! Versioned JSON document storage for ghdb.
//!
//! This crate implements a key-value store where keys are document paths,
//! values are JSON objects, and every value carries an opaque [`Version`]
//! token assigned by the store on write. It is the local counterpart of a
//! repository contents API: read a file with its blob SHA, write a file
//! conditioned on the SHA you last saw.
//!
//! # Storage Backends
//!
//! All backends implement the [`VersionedStore`] trait:
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding, with
//!   scripted fault injection
//! - [`DirectoryStore`] -- one JSON file per document under a root directory
//!
//! # Design Rules
//!
//! 1. Writes are compare-and-swap: a write names the version it expects to
//!    replace, and fails with [`StoreError::VersionConflict`] otherwise.
//! 2. A write with no expected version is a create.
//! 3. There is no locking visible to callers and no delete path.
//! 4. "Not found" and "could not reach the store" are different errors and
//!    are never conflated.
//! 5. The store never interprets document contents beyond requiring a JSON
//!    object at the top level.
//!
//! [`Version`]: ghdb_types::Version

pub mod directory;
pub mod document;
pub mod error;
pub mod memory;
pub mod traits;

pub use directory::DirectoryStore;
pub use document::Document;
pub use error::{StoreError, StoreResult};
pub use memory::{Fault, InMemoryStore, Op};
pub use traits::VersionedStore;
