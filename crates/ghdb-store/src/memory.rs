use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use ghdb_crypto::ContentHasher;
use ghdb_types::{DocPath, Version};

use crate::document::{ensure_object, Document};
use crate::error::{StoreError, StoreResult};
use crate::traits::VersionedStore;

/// Store operation a scripted fault applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Get,
    Put,
}

/// Failure to inject in place of a real operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Behave as if the network dropped the request.
    Transient,
    /// Behave as if the credentials were rejected.
    Unauthorized,
}

impl Fault {
    fn into_error(self, op: Op, path: &DocPath) -> StoreError {
        match self {
            Self::Transient => StoreError::Transient(format!("injected {op:?} failure for {path}")),
            Self::Unauthorized => {
                StoreError::Unauthorized(format!("injected {op:?} rejection for {path}"))
            }
        }
    }
}

#[derive(Clone)]
struct Entry {
    value: Value,
    version: Version,
    revision: u64,
}

/// In-memory, HashMap-based versioned store.
///
/// Intended for tests and embedding. Documents live behind a `RwLock`; the
/// version check and the swap happen under a single write lock, so
/// concurrent writers holding the same token cannot both win.
///
/// Faults queued with [`InMemoryStore::fail_next`] are consumed in order by
/// the next matching operations.
pub struct InMemoryStore {
    docs: RwLock<HashMap<DocPath, Entry>>,
    faults: Mutex<Vec<(Op, Fault)>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.docs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.docs.read().expect("lock poisoned").is_empty()
    }

    /// Number of successful writes applied to `path` so far.
    pub fn revision(&self, path: &DocPath) -> u64 {
        self.docs
            .read()
            .expect("lock poisoned")
            .get(path)
            .map(|e| e.revision)
            .unwrap_or(0)
    }

    /// Write unconditionally, bypassing the version check and any faults.
    ///
    /// Used to pre-seed fixtures.
    pub fn seed(&self, path: &DocPath, value: Value) -> StoreResult<Version> {
        ensure_object(path, &value)?;
        let mut docs = self.docs.write().expect("lock poisoned");
        let revision = docs.get(path).map(|e| e.revision).unwrap_or(0) + 1;
        let version = mint(path, revision, &value)?;
        docs.insert(
            path.clone(),
            Entry {
                value,
                version: version.clone(),
                revision,
            },
        );
        Ok(version)
    }

    /// Make the next `count` operations of kind `op` fail with `fault`.
    pub fn fail_next(&self, op: Op, count: usize, fault: Fault) {
        let mut faults = self.faults.lock().expect("lock poisoned");
        faults.extend(std::iter::repeat((op, fault)).take(count));
    }

    /// Drop all queued faults.
    pub fn clear_faults(&self) {
        self.faults.lock().expect("lock poisoned").clear();
    }

    fn take_fault(&self, op: Op) -> Option<Fault> {
        let mut faults = self.faults.lock().expect("lock poisoned");
        let index = faults.iter().position(|(o, _)| *o == op)?;
        Some(faults.remove(index).1)
    }
}

fn mint(path: &DocPath, revision: u64, value: &Value) -> StoreResult<Version> {
    let body = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(ContentHasher::VERSION.mint(path, revision, &body))
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionedStore for InMemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Document> {
        if let Some(fault) = self.take_fault(Op::Get) {
            return Err(fault.into_error(Op::Get, path));
        }
        let docs = self.docs.read().expect("lock poisoned");
        match docs.get(path) {
            Some(entry) => Ok(Document::new(
                path.clone(),
                entry.value.clone(),
                entry.version.clone(),
            )),
            None => Err(StoreError::NotFound { path: path.clone() }),
        }
    }

    async fn put(
        &self,
        path: &DocPath,
        value: &Value,
        expected: Option<&Version>,
    ) -> StoreResult<Version> {
        ensure_object(path, value)?;
        if let Some(fault) = self.take_fault(Op::Put) {
            return Err(fault.into_error(Op::Put, path));
        }

        let mut docs = self.docs.write().expect("lock poisoned");
        let current = docs.get(path);
        let actual = current.map(|e| &e.version);
        if actual != expected {
            debug!(%path, ?expected, ?actual, "rejecting stale write");
            return Err(StoreError::VersionConflict {
                path: path.clone(),
                expected: expected.cloned(),
                actual: actual.cloned(),
            });
        }

        let revision = current.map(|e| e.revision).unwrap_or(0) + 1;
        let version = mint(path, revision, value)?;
        docs.insert(
            path.clone(),
            Entry {
                value: value.clone(),
                version: version.clone(),
                revision,
            },
        );
        debug!(%path, revision, version = version.short(), "document written");
        Ok(version)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>> {
        let docs = self.docs.read().expect("lock poisoned");
        let mut paths: Vec<DocPath> = docs
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryStore")
            .field("document_count", &count)
            .finish()
    }
}
