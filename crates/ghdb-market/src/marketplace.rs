use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use ghdb_client::DocumentClient;
use ghdb_store::{DirectoryStore, InMemoryStore, StoreError, VersionedStore};
use ghdb_types::{DocPath, Version};

use crate::accounts::{normalize_email, Accounts};
use crate::catalog::Catalog;
use crate::chat::ChatRoom;
use crate::config::{MarketConfig, StoreBackend};
use crate::dashboard::Dashboard;
use crate::documents::{AdminConfig, KnownDocument, UsersDoc};
use crate::error::{MarketError, MarketResult};

pub(crate) type SharedClient = Arc<DocumentClient<Arc<dyn VersionedStore>>>;

/// Outcome of validating one stored document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    Valid { records: usize },
    Invalid { reason: String },
    /// No schema is registered for the path.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentCheck {
    pub path: DocPath,
    pub version: Version,
    pub status: DocumentStatus,
}

/// Result of [`Marketplace::check_documents`], sorted by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub documents: Vec<DocumentCheck>,
}

impl StoreReport {
    /// Returns `true` if no known document failed validation.
    pub fn is_healthy(&self) -> bool {
        self.invalid().next().is_none()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &DocumentCheck> {
        self.documents
            .iter()
            .filter(|d| matches!(d.status, DocumentStatus::Invalid { .. }))
    }

    pub fn get(&self, path: &str) -> Option<&DocumentCheck> {
        self.documents.iter().find(|d| d.path.as_str() == path)
    }
}

/// Entry point: one document client shared by every service.
///
/// Cloning is cheap; clones share the cache and the admin failure counters.
#[derive(Clone)]
pub struct Marketplace {
    client: SharedClient,
    config: Arc<MarketConfig>,
    seed_admins: Arc<[String]>,
    admin_failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl Marketplace {
    /// Open the store named by `config.store`.
    pub fn open(config: &MarketConfig) -> MarketResult<Self> {
        let store: Arc<dyn VersionedStore> = match &config.store {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Directory { root } => Arc::new(DirectoryStore::open(root.clone())?),
        };
        info!(backend = ?config.store, "marketplace opened");
        Ok(Self::with_store(store, config))
    }

    /// Run over an already constructed store.
    pub fn with_store(store: Arc<dyn VersionedStore>, config: &MarketConfig) -> Self {
        let seed_admins: Vec<String> = config
            .seed_admin_emails
            .iter()
            .map(|e| normalize_email(e))
            .collect();
        Self {
            client: Arc::new(DocumentClient::with_config(store, config.client.clone())),
            config: Arc::new(config.clone()),
            seed_admins: seed_admins.into(),
            admin_failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn client(&self) -> &DocumentClient<Arc<dyn VersionedStore>> {
        &self.client
    }

    // ---- Services ----

    pub fn accounts(&self) -> Accounts {
        Accounts::new(
            Arc::clone(&self.client),
            self.config.limits.clone(),
            Arc::clone(&self.seed_admins),
            Arc::clone(&self.admin_failures),
        )
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(Arc::clone(&self.client))
    }

    pub fn chat(&self) -> ChatRoom {
        ChatRoom::new(Arc::clone(&self.client), self.config.limits.clone())
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(Arc::clone(&self.client))
    }

    // ---- Maintenance ----

    /// Check the store is reachable by reading the users document.
    ///
    /// A missing document counts as reachable.
    pub async fn ping(&self) -> MarketResult<()> {
        match self.client.refresh::<UsersDoc>().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "store unreachable");
                Err(e.into())
            }
        }
    }

    /// Write the configured seed administrators into the admin config
    /// document. Returns how many were added.
    pub async fn bootstrap(&self) -> MarketResult<usize> {
        let current = self.client.refresh::<AdminConfig>().await?;
        let missing = |config: &AdminConfig| -> Vec<String> {
            self.seed_admins
                .iter()
                .filter(|seed| {
                    !config
                        .security
                        .admin_emails
                        .iter()
                        .any(|a| normalize_email(a) == **seed)
                })
                .cloned()
                .collect()
        };
        if missing(&current.value).is_empty() && !current.is_default() {
            return Ok(0);
        }

        let added = self
            .client
            .update::<AdminConfig, _, MarketError, _>(|config| {
                let new = missing(config);
                config.security.admin_emails.extend(new.iter().cloned());
                Ok(new.len())
            })
            .await?;
        info!(added, "admin config bootstrapped");
        Ok(added)
    }

    /// Validate every stored document against the schema for its path.
    pub async fn check_documents(&self) -> MarketResult<StoreReport> {
        let store = self.client.store();
        let mut documents = Vec::new();

        for path in store.list("").await? {
            let doc = match store.get(&path).await {
                Ok(doc) => doc,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            let status = match KnownDocument::decode(&path, doc.value) {
                Ok(known) => DocumentStatus::Valid {
                    records: known.record_count(),
                },
                Err(MarketError::UnknownDocument(_)) => DocumentStatus::Unknown,
                Err(e) => {
                    warn!(%path, error = %e, "stored document failed validation");
                    DocumentStatus::Invalid {
                        reason: e.to_string(),
                    }
                }
            };
            documents.push(DocumentCheck {
                path,
                version: doc.version,
                status,
            });
        }
        Ok(StoreReport { documents })
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
