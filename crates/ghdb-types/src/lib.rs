//! Foundation types for ghdb.
//!
//! ghdb treats a repository of JSON files as a document database. This crate
//! provides the two identifiers every other ghdb crate speaks in.
//!
//! # Key Types
//!
//! - [`DocPath`] -- Validated, normalized path of a document inside the store
//! - [`Version`] -- Opaque revision token used for compare-and-swap writes

pub mod error;
pub mod path;
pub mod version;

pub use error::TypeError;
pub use path::DocPath;
pub use version::Version;
