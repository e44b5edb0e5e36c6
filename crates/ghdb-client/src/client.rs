use std::collections::HashMap;
use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use ghdb_store::{StoreError, VersionedStore};
use ghdb_types::{DocPath, Version};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::log::CappedLog;
use crate::schema::DocumentSchema;

/// A decoded document and the version it was read at.
///
/// `version` is `None` when the store had nothing at the path and `value` is
/// the schema's empty default.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<D> {
    pub value: D,
    pub version: Option<Version>,
}

impl<D> Snapshot<D> {
    pub fn into_inner(self) -> D {
        self.value
    }

    /// Returns `true` if the document has never been written.
    pub fn is_default(&self) -> bool {
        self.version.is_none()
    }
}

impl<D> Deref for Snapshot<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.value
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: Value,
    version: Option<Version>,
    fetched_at: Instant,
}

/// Typed, caching client over a [`VersionedStore`].
///
/// Holds `path -> (value, version)` for documents it has read or written.
/// Reads are served from the cache while younger than the configured TTL.
/// Writes go through [`DocumentClient::update`], which reads (from cache when
/// fresh), applies the caller's closure, and writes with the version it read.
/// On a version conflict the entry is invalidated and the closure runs again
/// on a fresh read.
pub struct DocumentClient<S> {
    store: S,
    config: ClientConfig,
    cache: Mutex<HashMap<DocPath, CacheEntry>>,
}

impl<S: VersionedStore> DocumentClient<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, ClientConfig::default())
    }

    pub fn with_config(store: S, config: ClientConfig) -> Self {
        Self {
            store,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ---- Reads ----

    /// Read `D`, from cache when fresh.
    ///
    /// A missing document yields `D::empty()`. Any other store failure is
    /// returned as is.
    pub async fn load<D: DocumentSchema>(&self) -> ClientResult<Snapshot<D>> {
        let path = D::doc_path()?;
        if let Some(entry) = self.fresh_entry(&path) {
            debug!(%path, "serving cached document");
            return decode_entry(&path, entry);
        }
        self.fetch(&path).await
    }

    /// Read `D` from the store, bypassing the cache.
    pub async fn refresh<D: DocumentSchema>(&self) -> ClientResult<Snapshot<D>> {
        let path = D::doc_path()?;
        self.fetch(&path).await
    }

    /// Version of `path` as last seen by this client.
    pub fn cached_version(&self, path: &DocPath) -> Option<Version> {
        self.cache
            .lock()
            .expect("lock poisoned")
            .get(path)
            .and_then(|e| e.version.clone())
    }

    /// Forget the cached entry for `path`.
    pub fn invalidate(&self, path: &DocPath) {
        self.cache.lock().expect("lock poisoned").remove(path);
    }

    /// Forget every cached entry.
    pub fn clear(&self) {
        self.cache.lock().expect("lock poisoned").clear();
    }

    // ---- Writes ----

    /// Get-modify-put `D` until the write lands.
    ///
    /// `f` may run more than once, each time on a fresh copy. If it returns
    /// `Err` on a cached copy, the document is re-read from the store and `f`
    /// runs again, so a rejection is never based on stale data. If it returns
    /// `Err` on a fresh read, nothing is written and the error comes back as
    /// [`ClientError::Rejected`].
    ///
    /// Version conflicts back off for a random delay of up to
    /// [`RetryPolicy::delay_for`](crate::RetryPolicy::delay_for) so racing
    /// writers spread out.
    pub async fn update<D, R, E, F>(&self, mut f: F) -> ClientResult<R, E>
    where
        D: DocumentSchema,
        F: FnMut(&mut D) -> Result<R, E> + Send,
        R: Send,
        E: Send,
    {
        let path = D::doc_path()?;
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        let mut bypass_cache = false;

        loop {
            attempt += 1;

            let cached = if bypass_cache {
                None
            } else {
                self.fresh_entry(&path)
            };
            let from_cache = cached.is_some();
            let read = match cached {
                Some(entry) => decode_entry::<D>(&path, entry),
                None => self.fetch::<D>(&path).await,
            };
            let err = match read {
                Ok(Snapshot { mut value, version }) => {
                    let out = match f(&mut value) {
                        Ok(out) => out,
                        Err(_) if from_cache => {
                            debug!(%path, "cached copy rejected, re-reading");
                            bypass_cache = true;
                            attempt -= 1;
                            continue;
                        }
                        Err(e) => return Err(ClientError::Rejected(e)),
                    };
                    let body = serde_json::to_value(&value).map_err(|source| {
                        ClientError::<E>::Encode {
                            path: path.clone(),
                            source,
                        }
                    })?;

                    match self.store.put(&path, &body, version.as_ref()).await {
                        Ok(new_version) => {
                            debug!(%path, attempt, version = new_version.short(), "update applied");
                            self.remember(&path, body, Some(new_version));
                            return Ok(out);
                        }
                        Err(e) if e.is_conflict() => {
                            debug!(%path, attempt, "version conflict, re-reading");
                            self.invalidate(&path);
                            e
                        }
                        Err(e) if e.is_transient() => {
                            // The write may or may not have landed.
                            self.invalidate(&path);
                            e
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(ClientError::Store(e)) if e.is_transient() => e,
                Err(e) => return Err(lift(e)),
            };

            if !policy.allows_another(attempt) {
                warn!(%path, attempts = attempt, error = %err, "update retries exhausted");
                return Err(ClientError::RetriesExhausted {
                    path,
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            let delay = if err.is_transient() {
                policy.delay_for(attempt)
            } else {
                policy.conflict_delay(attempt)
            };
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                debug!(%path, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Prepend `record` to the capped log `select` picks out of `D`.
    ///
    /// Returns the records that fell off the end.
    pub async fn append_capped<D, T, F>(&self, record: T, cap: usize, select: F) -> ClientResult<Vec<T>>
    where
        D: DocumentSchema,
        T: Clone + Send,
        F: Fn(&mut D) -> &mut CappedLog<T> + Send,
    {
        self.update::<D, _, Infallible, _>(move |doc| {
            Ok(select(doc).push_front(record.clone(), cap))
        })
        .await
    }

    // ---- Internals ----

    fn fresh_entry(&self, path: &DocPath) -> Option<CacheEntry> {
        let ttl = self.config.cache_ttl;
        if ttl.is_zero() {
            return None;
        }
        let cache = self.cache.lock().expect("lock poisoned");
        cache
            .get(path)
            .filter(|e| e.fetched_at.elapsed() < ttl)
            .cloned()
    }

    fn remember(&self, path: &DocPath, value: Value, version: Option<Version>) {
        self.cache.lock().expect("lock poisoned").insert(
            path.clone(),
            CacheEntry {
                value,
                version,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn fetch<D: DocumentSchema>(&self, path: &DocPath) -> ClientResult<Snapshot<D>> {
        match self.store.get(path).await {
            Ok(doc) => {
                let value: D = serde_json::from_value(doc.value.clone()).map_err(|source| {
                    ClientError::<Infallible>::Decode {
                        path: path.clone(),
                        source,
                    }
                })?;
                self.remember(path, doc.value, Some(doc.version.clone()));
                Ok(Snapshot {
                    value,
                    version: Some(doc.version),
                })
            }
            Err(StoreError::NotFound { .. }) => {
                debug!(%path, "document missing, using empty default");
                let value = D::empty();
                let body = serde_json::to_value(&value).map_err(|source| {
                    ClientError::<Infallible>::Encode {
                        path: path.clone(),
                        source,
                    }
                })?;
                self.remember(path, body, None);
                Ok(Snapshot {
                    value,
                    version: None,
                })
            }
            Err(e) => {
                debug!(%path, error = %e, "read failed");
                Err(e.into())
            }
        }
    }
}

fn decode_entry<D: DocumentSchema>(path: &DocPath, entry: CacheEntry) -> ClientResult<Snapshot<D>> {
    let value = serde_json::from_value(entry.value).map_err(|source| {
        ClientError::<Infallible>::Decode {
            path: path.clone(),
            source,
        }
    })?;
    Ok(Snapshot {
        value,
        version: entry.version,
    })
}

/// Re-type a read error for an update with closure error `E`.
fn lift<E>(err: ClientError) -> ClientError<E> {
    match err {
        ClientError::Store(e) => ClientError::Store(e),
        ClientError::Path(e) => ClientError::Path(e),
        ClientError::Decode { path, source } => ClientError::Decode { path, source },
        ClientError::Encode { path, source } => ClientError::Encode { path, source },
        ClientError::RetriesExhausted {
            path,
            attempts,
            last,
        } => ClientError::RetriesExhausted {
            path,
            attempts,
            last,
        },
        ClientError::Rejected(never) => match never {},
    }
}

impl<S> std::fmt::Debug for DocumentClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.cache.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("DocumentClient")
            .field("config", &self.config)
            .field("cached_documents", &cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use ghdb_store::{Document, Fault, InMemoryStore, Op, StoreResult};

    use crate::retry::RetryPolicy;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u64,
    }

    impl DocumentSchema for Counter {
        const PATH: &'static str = "test/counter.json";

        fn empty() -> Self {
            Self::default()
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct History {
        events: CappedLog<u32>,
    }

    impl DocumentSchema for History {
        const PATH: &'static str = "test/history.json";

        fn empty() -> Self {
            Self::default()
        }
    }

    fn counter_path() -> DocPath {
        DocPath::new(Counter::PATH).unwrap()
    }

    fn config(ttl: Duration, retry: RetryPolicy) -> ClientConfig {
        ClientConfig {
            retry,
            cache_ttl: ttl,
        }
    }

    fn client(ttl: Duration) -> DocumentClient<Arc<InMemoryStore>> {
        DocumentClient::with_config(
            Arc::new(InMemoryStore::new()),
            config(ttl, RetryPolicy::immediate(5)),
        )
    }

    async fn increment(client: &DocumentClient<Arc<InMemoryStore>>) -> ClientResult<u64> {
        client
            .update::<Counter, _, Infallible, _>(|c| {
                c.n += 1;
                Ok(c.n)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_document_reads_as_empty_default() {
        let client = client(Duration::from_secs(60));
        let snap = client.load::<Counter>().await.unwrap();
        assert!(snap.is_default());
        assert_eq!(snap.n, 0);
    }

    #[tokio::test]
    async fn transient_read_is_surfaced_not_defaulted() {
        let client = client(Duration::from_secs(60));
        client.store().seed(&counter_path(), json!({"n": 7})).unwrap();
        client.store().fail_next(Op::Get, 1, Fault::Transient);

        let err = client.load::<Counter>().await.unwrap_err();
        assert!(err.is_transient());
        assert!(client.cached_version(&counter_path()).is_none());

        let snap = client.load::<Counter>().await.unwrap();
        assert_eq!(snap.n, 7);
    }

    #[tokio::test]
    async fn cache_serves_within_ttl_and_refresh_bypasses_it() {
        let client = client(Duration::from_secs(60));
        client.store().seed(&counter_path(), json!({"n": 1})).unwrap();
        assert_eq!(client.load::<Counter>().await.unwrap().n, 1);

        client.store().seed(&counter_path(), json!({"n": 2})).unwrap();
        assert_eq!(client.load::<Counter>().await.unwrap().n, 1);
        assert_eq!(client.refresh::<Counter>().await.unwrap().n, 2);
        assert_eq!(client.load::<Counter>().await.unwrap().n, 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_reads_through() {
        let client = client(Duration::ZERO);
        client.store().seed(&counter_path(), json!({"n": 1})).unwrap();
        assert_eq!(client.load::<Counter>().await.unwrap().n, 1);
        client.store().seed(&counter_path(), json!({"n": 2})).unwrap();
        assert_eq!(client.load::<Counter>().await.unwrap().n, 2);
    }

    #[tokio::test]
    async fn mismatched_document_is_a_decode_error() {
        let client = client(Duration::ZERO);
        client.store().seed(&counter_path(), json!({"n": "seven"})).unwrap();
        let err = client.load::<Counter>().await.unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn update_creates_missing_document() {
        let client = client(Duration::from_secs(60));
        assert_eq!(increment(&client).await.unwrap(), 1);
        assert_eq!(client.store().revision(&counter_path()), 1);
        assert!(client.cached_version(&counter_path()).is_some());
    }

    #[tokio::test]
    async fn stale_cache_is_invalidated_on_conflict() {
        let client = client(Duration::from_secs(60));
        increment(&client).await.unwrap();
        let stale = client.cached_version(&counter_path()).unwrap();

        // Another writer lands behind the client's back.
        client.store().seed(&counter_path(), json!({"n": 10})).unwrap();

        assert_eq!(increment(&client).await.unwrap(), 11);
        let fresh = client.cached_version(&counter_path()).unwrap();
        assert_ne!(fresh, stale);
        assert_eq!(client.store().get(&counter_path()).await.unwrap().value, json!({"n": 11}));
    }

    #[tokio::test]
    async fn rejected_update_writes_nothing() {
        let client = client(Duration::from_secs(60));
        increment(&client).await.unwrap();
        let before = client.cached_version(&counter_path());

        let err = client
            .update::<Counter, (), _, _>(|c| {
                c.n = 999;
                Err("not allowed")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected("not allowed")));
        assert_eq!(client.store().revision(&counter_path()), 1);
        assert_eq!(client.cached_version(&counter_path()), before);
        assert_eq!(client.load::<Counter>().await.unwrap().n, 1);
    }

    #[tokio::test]
    async fn rejection_on_cached_copy_is_rechecked_against_the_store() {
        let client = client(Duration::from_secs(60));
        increment(&client).await.unwrap();

        // Another writer lands behind the client's back.
        client.store().seed(&counter_path(), json!({"n": 10})).unwrap();

        let mut seen = Vec::new();
        let n = client
            .update::<Counter, _, _, _>(|c| {
                seen.push(c.n);
                if c.n < 10 {
                    return Err("too small");
                }
                c.n += 1;
                Ok(c.n)
            })
            .await
            .unwrap();
        assert_eq!(n, 11);
        assert_eq!(seen, vec![1, 10]);
    }

    #[tokio::test]
    async fn rejection_on_fresh_read_is_final() {
        let client = client(Duration::from_secs(60));
        increment(&client).await.unwrap();
        client.store().seed(&counter_path(), json!({"n": 5})).unwrap();

        let mut runs = 0;
        let err = client
            .update::<Counter, (), _, _>(|_| {
                runs += 1;
                Err("never")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected("never")));
        assert_eq!(runs, 2);
        assert_eq!(client.load::<Counter>().await.unwrap().n, 5);
    }

    #[tokio::test]
    async fn transient_writes_are_retried() {
        let client = client(Duration::from_secs(60));
        client.store().fail_next(Op::Put, 2, Fault::Transient);
        assert_eq!(increment(&client).await.unwrap(), 1);
        assert_eq!(client.store().revision(&counter_path()), 1);
    }

    #[tokio::test]
    async fn transient_reads_inside_update_are_retried() {
        let client = client(Duration::ZERO);
        client.store().fail_next(Op::Get, 2, Fault::Transient);
        assert_eq!(increment(&client).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let client = DocumentClient::with_config(
            Arc::new(InMemoryStore::new()),
            config(Duration::from_secs(60), RetryPolicy::immediate(3)),
        );
        client.store().fail_next(Op::Put, 10, Fault::Transient);

        let err = increment(&client).await.unwrap_err();
        match err {
            ClientError::RetriesExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(last.is_transient());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(client.store().revision(&counter_path()), 0);
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried_and_cache_is_untouched() {
        let client = client(Duration::from_secs(60));
        increment(&client).await.unwrap();
        let before = client.cached_version(&counter_path());

        client.store().fail_next(Op::Put, 1, Fault::Unauthorized);
        let err = increment(&client).await.unwrap_err();
        assert!(matches!(err, ClientError::Store(StoreError::Unauthorized(_))));
        assert_eq!(client.cached_version(&counter_path()), before);
        assert_eq!(client.load::<Counter>().await.unwrap().n, 1);
    }

    /// Store whose writes always lose the race.
    struct AlwaysConflicting(InMemoryStore);

    #[async_trait]
    impl VersionedStore for AlwaysConflicting {
        async fn get(&self, path: &DocPath) -> StoreResult<Document> {
            self.0.get(path).await
        }

        async fn put(&self, path: &DocPath, _: &Value, expected: Option<&Version>) -> StoreResult<Version> {
            Err(StoreError::VersionConflict {
                path: path.clone(),
                expected: expected.cloned(),
                actual: None,
            })
        }

        async fn list(&self, prefix: &str) -> StoreResult<Vec<DocPath>> {
            self.0.list(prefix).await
        }
    }

    #[tokio::test]
    async fn endless_conflicts_exhaust_retries() {
        let client = DocumentClient::with_config(
            AlwaysConflicting(InMemoryStore::new()),
            config(Duration::from_secs(60), RetryPolicy::immediate(4)),
        );
        let mut runs = 0;
        let err = client
            .update::<Counter, _, Infallible, _>(|c| {
                runs += 1;
                c.n += 1;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(runs, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_lose_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let tasks = 8;
        let per_task = 25;

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let n = per_task;
                let client = DocumentClient::with_config(
                    Arc::clone(&store),
                    config(Duration::from_secs(60), RetryPolicy::immediate(10_000)),
                );
                tokio::spawn(async move {
                    for _ in 0..n {
                        increment(&client).await.unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        let doc = store.get(&counter_path()).await.unwrap();
        assert_eq!(doc.value, json!({"n": tasks * per_task}));
        assert_eq!(store.revision(&counter_path()), tasks * per_task);
    }

    // -----------------------------------------------------------------------
    // Capped logs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_capped_keeps_most_recent() {
        let client = client(Duration::from_secs(60));
        for i in 0..250u32 {
            client
                .append_capped::<History, _, _>(i, 200, |h| &mut h.events)
                .await
                .unwrap();
        }

        let history = client.refresh::<History>().await.unwrap();
        assert_eq!(history.events.len(), 200);
        assert_eq!(history.events.latest(), Some(&249));
        let expected: Vec<u32> = (50..250).rev().collect();
        assert_eq!(history.events.as_slice(), expected.as_slice());
    }

    #[tokio::test]
    async fn append_capped_returns_dropped_records() {
        let client = client(Duration::from_secs(60));
        for i in 0..3u32 {
            client.append_capped::<History, _, _>(i, 3, |h| &mut h.events).await.unwrap();
        }
        let dropped = client
            .append_capped::<History, _, _>(3, 3, |h| &mut h.events)
            .await
            .unwrap();
        assert_eq!(dropped, vec![0]);
    }

    #[test]
    fn debug_shows_cache_size() {
        let client = client(Duration::ZERO);
        let shown = format!("{client:?}");
        assert!(shown.contains("cached_documents: 0"));
    }
}
