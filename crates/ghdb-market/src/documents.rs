//! The documents the marketplace keeps, one per known path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ghdb_client::{CappedLog, DocumentSchema};
use ghdb_types::DocPath;

use crate::error::{MarketError, MarketResult};
use crate::records::{ChatMessage, LoginRecord, Product, RegistrationRecord, User};

pub const USERS_PATH: &str = "users/users.json";
pub const LOGIN_HISTORY_PATH: &str = "sessions/login-history.json";
pub const REGISTRATION_HISTORY_PATH: &str = "sessions/registration-history.json";
pub const ADMIN_CONFIG_PATH: &str = "config/admin-config.json";
pub const PRODUCTS_PATH: &str = "products/products.json";
pub const CHAT_PATH: &str = "chat/messages.json";

/// Every path with a registered schema.
pub const KNOWN_PATHS: &[&str] = &[
    USERS_PATH,
    LOGIN_HISTORY_PATH,
    REGISTRATION_HISTORY_PATH,
    ADMIN_CONFIG_PATH,
    PRODUCTS_PATH,
    CHAT_PATH,
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersDoc {
    pub users: Vec<User>,
}

impl DocumentSchema for UsersDoc {
    const PATH: &'static str = USERS_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

impl UsersDoc {
    pub fn by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn by_email_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.email == email)
    }

    pub fn by_id_mut(&mut self, id: uuid::Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }
}

/// Login history, most recent first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginHistoryDoc {
    pub sessions: CappedLog<LoginRecord>,
}

impl DocumentSchema for LoginHistoryDoc {
    const PATH: &'static str = LOGIN_HISTORY_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

/// Registration history, most recent first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationHistoryDoc {
    pub registrations: CappedLog<RegistrationRecord>,
}

impl DocumentSchema for RegistrationHistoryDoc {
    const PATH: &'static str = REGISTRATION_HISTORY_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub owner: String,
    pub branch: String,
}

impl Default for RepositoryInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            owner: String::new(),
            branch: "main".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettings {
    #[serde(default)]
    pub admin_emails: Vec<String>,
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
}

fn default_max_login_attempts() -> u32 {
    5
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            admin_emails: Vec::new(),
            max_login_attempts: default_max_login_attempts(),
        }
    }
}

/// Admin configuration document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub repository: RepositoryInfo,
    #[serde(default)]
    pub security: SecuritySettings,
}

impl DocumentSchema for AdminConfig {
    const PATH: &'static str = ADMIN_CONFIG_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

/// Product feed, newest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductsDoc {
    pub products: Vec<Product>,
}

impl DocumentSchema for ProductsDoc {
    const PATH: &'static str = PRODUCTS_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

impl ProductsDoc {
    pub fn by_id_mut(&mut self, id: uuid::Uuid) -> Option<&mut Product> {
        self.products.iter_mut().find(|p| p.id == id)
    }
}

/// Chat room messages, most recent first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDoc {
    pub messages: CappedLog<ChatMessage>,
}

impl DocumentSchema for ChatDoc {
    const PATH: &'static str = CHAT_PATH;

    fn empty() -> Self {
        Self::default()
    }
}

/// A raw document decoded against the schema registered for its path.
#[derive(Clone, Debug, PartialEq)]
pub enum KnownDocument {
    Users(UsersDoc),
    LoginHistory(LoginHistoryDoc),
    RegistrationHistory(RegistrationHistoryDoc),
    AdminConfig(AdminConfig),
    Products(ProductsDoc),
    Chat(ChatDoc),
}

impl KnownDocument {
    /// Validate `value` against the schema for `path`.
    pub fn decode(path: &DocPath, value: Value) -> MarketResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(path: &DocPath, value: Value) -> MarketResult<T> {
            serde_json::from_value(value).map_err(|e| MarketError::InvalidDocument {
                path: path.to_string(),
                reason: e.to_string(),
            })
        }

        Ok(match path.as_str() {
            USERS_PATH => Self::Users(parse(path, value)?),
            LOGIN_HISTORY_PATH => Self::LoginHistory(parse(path, value)?),
            REGISTRATION_HISTORY_PATH => Self::RegistrationHistory(parse(path, value)?),
            ADMIN_CONFIG_PATH => Self::AdminConfig(parse(path, value)?),
            PRODUCTS_PATH => Self::Products(parse(path, value)?),
            CHAT_PATH => Self::Chat(parse(path, value)?),
            other => return Err(MarketError::UnknownDocument(other.to_string())),
        })
    }

    /// Path this document lives at.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Users(_) => USERS_PATH,
            Self::LoginHistory(_) => LOGIN_HISTORY_PATH,
            Self::RegistrationHistory(_) => REGISTRATION_HISTORY_PATH,
            Self::AdminConfig(_) => ADMIN_CONFIG_PATH,
            Self::Products(_) => PRODUCTS_PATH,
            Self::Chat(_) => CHAT_PATH,
        }
    }

    /// Number of records held (admin emails for the config document).
    pub fn record_count(&self) -> usize {
        match self {
            Self::Users(d) => d.users.len(),
            Self::LoginHistory(d) => d.sessions.len(),
            Self::RegistrationHistory(d) => d.registrations.len(),
            Self::AdminConfig(d) => d.security.admin_emails.len(),
            Self::Products(d) => d.products.len(),
            Self::Chat(d) => d.messages.len(),
        }
    }
}
