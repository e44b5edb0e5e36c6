use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use ghdb_crypto::ContentHasher;
use ghdb_types::{DocPath, Version};

use crate::document::{ensure_object, Document};
use crate::error::{StoreError, StoreResult};
use crate::traits::VersionedStore;

/// On-disk envelope for a single document.
///
/// ```text
/// { "revision": 3, "version": "<40 hex>", "value": { ... } }
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    revision: u64,
    version: Version,
    value: Value,
}

/// Name of the lock file under the root. Writers on any handle, in any
/// process, hold an exclusive lock on it for the whole check-and-swap.
const LOCK_FILE: &str = ".lock";

struct Inner {
    root: PathBuf,
}

/// Exclusive lock on `<root>/.lock`, released on drop.
struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "failed to release store lock");
        }
    }
}

/// Directory-backed versioned store.
///
/// Each document is a JSON file at `<root>/<path>`. Writes land in a temp
/// file in the target directory and are renamed into place, so readers see
/// either the old envelope or the new one. The read-compare-rename of a
/// `put` runs under an OS file lock on `<root>/.lock`, so separate handles
/// and separate processes on one root serialize their writes. Blocking file
/// I/O runs on the tokio blocking pool.
#[derive(Clone)]
pub struct DirectoryStore {
    inner: Arc<Inner>,
}

impl DirectoryStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            inner: Arc::new(Inner { root }),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

impl Inner {
    fn lock(&self) -> StoreResult<WriteLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.root.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        Ok(WriteLock { file })
    }

    fn file_for(&self, path: &DocPath) -> PathBuf {
        path.components()
            .fold(self.root.clone(), |acc, component| acc.join(component))
    }

    fn read_envelope(&self, path: &DocPath) -> StoreResult<Option<Envelope>> {
        let bytes = match fs::read(self.file_for(path)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptDocument {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(envelope))
    }

    fn write_envelope(&self, path: &DocPath, envelope: &Envelope) -> StoreResult<()> {
        let target = self.file_for(path);
        let dir = target
            .parent()
            .ok_or_else(|| StoreError::Backend(format!("no parent directory for {path}")))?;
        fs::create_dir_all(dir)?;

        let bytes =
            serde_json::to_vec_pretty(envelope).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn collect(&self, dir: &Path, out: &mut Vec<DocPath>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let full = entry.path();
            if file_type.is_dir() {
                self.collect(&full, out)?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Ok(relative) = full.strip_prefix(&self.root) else {
                continue;
            };
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // Temp files and anything else that is not a valid document path
            // are skipped.
            match DocPath::new(joined) {
                Ok(path) => out.push(path),
                Err(e) => debug!(file = %full.display(), error = %e, "skipping non-document file"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore for DirectoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Document> {
        let path = path.clone();
        self.blocking(move |inner| match inner.read_envelope(&path)? {
            Some(env) => Ok(Document::new(path, env.value, env.version)),
            None => Err(StoreError::NotFound { path }),
        })
        .await
    }

    async fn put(
        &self,
        path: &DocPath,
        value: &Value,
        expected: Option<&Version>,
    ) -> StoreResult<Version> {
        ensure_object(path, value)?;
        let path = path.clone();
        let value = value.clone();
        let expected = expected.cloned();

        self.blocking(move |inner| {
            let _guard = inner.lock()?;

            let current = inner.read_envelope(&path)?;
            let actual = current.as_ref().map(|env| env.version.clone());
            if actual != expected {
                debug!(%path, ?expected, ?actual, "rejecting stale write");
                return Err(StoreError::VersionConflict {
                    path,
                    expected,
                    actual,
                });
            }

            let revision = current.map(|env| env.revision).unwrap_or(0) + 1;
            let body =
                serde_json::to_vec(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;
            let version = ContentHasher::VERSION.mint(&path, revision, &body);
            let envelope = Envelope {
                revision,
                version: version.clone(),
                value,
            };
            if let Err(e) = inner.write_envelope(&path, &envelope) {
                warn!(%path, error = %e, "document write failed");
                return Err(e);
            }
            debug!(%path, revision, version = version.short(), "document written");
            Ok(version)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>> {
        let prefix = prefix.to_string();
        self.blocking(move |inner| {
            let mut paths = Vec::new();
            inner.collect(&inner.root, &mut paths)?;
            paths.retain(|p| p.starts_with(&prefix));
            paths.sort();
            Ok(paths)
        })
        .await
    }
}

impl std::fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("root", &self.inner.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> DocPath {
        DocPath::new(p).unwrap()
    }

    #[tokio::test]
    async fn create_update_and_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let p = path("users/users.json");

        let v1 = store.put(&p, &json!({"users": []}), None).await.unwrap();
        let v2 = store
            .put(&p, &json!({"users": [{"email": "a@b.c"}]}), Some(&v1))
            .await
            .unwrap();
        assert_ne!(v1, v2);

        let err = store.put(&p, &json!({"users": []}), Some(&v1)).await.unwrap_err();
        assert!(err.is_conflict());

        let doc = store.get(&p).await.unwrap();
        assert_eq!(doc.version, v2);
        assert_eq!(doc.value["users"][0]["email"], "a@b.c");
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let p = path("chat/messages.json");
        let v1 = {
            let store = DirectoryStore::open(dir.path()).unwrap();
            store.put(&p, &json!({"messages": ["hi"]}), None).await.unwrap()
        };

        let store = DirectoryStore::open(dir.path()).unwrap();
        let doc = store.get(&p).await.unwrap();
        assert_eq!(doc.version, v1);
        assert_eq!(doc.value, json!({"messages": ["hi"]}));
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let err = store.get(&path("nope.json")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn garbage_file_is_corrupt_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users/users.json"), b"not json").unwrap();

        let store = DirectoryStore::open(dir.path()).unwrap();
        let err = store.get(&path("users/users.json")).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptDocument { .. }));
    }

    #[tokio::test]
    async fn list_skips_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.put(&path("sessions/a.json"), &json!({}), None).await.unwrap();
        store.put(&path("users/users.json"), &json!({}), None).await.unwrap();
        fs::write(dir.path().join("sessions/.tmpXYZ"), b"partial").unwrap();

        let all = store.list("").await.unwrap();
        assert_eq!(all, vec![path("sessions/a.json"), path("users/users.json")]);
        let sessions = store.list("sessions/").await.unwrap();
        assert_eq!(sessions, vec![path("sessions/a.json")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_with_same_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let p = path("race.json");
        let v1 = store.put(&p, &json!({"n": 0}), None).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let p = p.clone();
                let v1 = v1.clone();
                tokio::spawn(async move { store.put(&p, &json!({"n": i}), Some(&v1)).await })
            })
            .collect();

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_handles_on_one_root_share_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let p = path("race.json");
        let seed = DirectoryStore::open(dir.path()).unwrap();
        let mut current = seed.put(&p, &json!({"n": 0}), None).await.unwrap();

        for round in 0..20 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = DirectoryStore::open(dir.path()).unwrap();
                    let p = p.clone();
                    let expected = current.clone();
                    tokio::spawn(async move {
                        store.put(&p, &json!({"round": round, "writer": i}), Some(&expected)).await
                    })
                })
                .collect();

            let mut winners = Vec::new();
            for h in handles {
                match h.await.unwrap() {
                    Ok(v) => winners.push(v),
                    Err(e) => assert!(e.is_conflict(), "{e}"),
                }
            }
            assert_eq!(winners.len(), 1, "round {round}");
            current = winners.remove(0);
            assert_eq!(seed.get(&p).await.unwrap().version, current);
        }
    }

    #[tokio::test]
    async fn lock_file_is_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.put(&path("a.json"), &json!({}), None).await.unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        assert_eq!(store.list("").await.unwrap(), vec![path("a.json")]);
    }
}
