use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ghdb_client::ClientConfig;

use crate::error::{MarketError, MarketResult};

/// Which store the marketplace opens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Directory { root: PathBuf },
}

/// Retention caps and input limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub login_history_cap: usize,
    pub registration_history_cap: usize,
    pub chat_history_cap: usize,
    pub max_message_len: usize,
    pub min_password_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            login_history_cap: 200,
            registration_history_cap: 500,
            chat_history_cap: 500,
            max_message_len: 1000,
            min_password_len: 6,
        }
    }
}

/// Top-level marketplace configuration.
///
/// ```toml
/// seed_admin_emails = ["admin@example.com"]
///
/// [store]
/// backend = "directory"
/// root = "/var/lib/market"
///
/// [client]
/// cache_ttl = 2000
///
/// [limits]
/// login_history_cap = 200
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub store: StoreBackend,
    pub client: ClientConfig,
    pub limits: Limits,
    /// Administrators recognized before an admin config document exists.
    pub seed_admin_emails: Vec<String>,
}

impl MarketConfig {
    pub fn from_toml_str(raw: &str) -> MarketResult<Self> {
        toml::from_str(raw).map_err(|e| MarketError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> MarketResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MarketError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}
