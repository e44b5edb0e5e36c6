//! Typed client for ghdb document stores.
//!
//! [`DocumentClient`] replaces ad-hoc "fetch, decode, mutate, write" code with
//! one get-modify-put loop that honors the store's compare-and-swap contract.
//!
//! # Key Types
//!
//! - [`DocumentClient`] -- Cache of `path -> (value, version)` over a store
//! - [`DocumentSchema`] -- A typed document living at a fixed path
//! - [`CappedLog`] -- Most-recent-first array that keeps at most N records
//! - [`RetryPolicy`] -- Attempt bound and backoff for the update loop
//!
//! # Design Rules
//!
//! 1. A missing document reads as its schema's empty default. A store that
//!    cannot be reached is an error, never an empty default.
//! 2. A version conflict invalidates the cached entry and the update runs
//!    again against a fresh read.
//! 3. The cache only ever holds what a store returned or confirmed.

pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod retry;
pub mod schema;

pub use client::{DocumentClient, Snapshot};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use log::CappedLog;
pub use retry::RetryPolicy;
pub use schema::DocumentSchema;
