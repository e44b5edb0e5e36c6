use ghdb_client::ClientError;
use ghdb_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors from marketplace operations.
#[derive(Debug, Error)]
pub enum MarketError {
    // ---- Accounts ----
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("email already registered: {0}")]
    EmailTaken(String),

    /// No active account with this email (or id).
    #[error("no active account for {0}")]
    UnknownUser(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0} is not an administrator")]
    NotAdmin(String),

    #[error("too many failed admin logins for {email} ({attempts})")]
    TooManyAttempts { email: String, attempts: u32 },

    // ---- Catalog ----
    #[error("invalid product: {0}")]
    InvalidProduct(String),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("product {id} belongs to another seller")]
    NotSeller { id: Uuid },

    // ---- Chat ----
    #[error("message is empty")]
    EmptyMessage,

    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    // ---- Documents and configuration ----
    #[error("no schema is registered for {0}")]
    UnknownDocument(String),

    #[error("document {path} is invalid: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    // ---- Lower layers ----
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ClientError<MarketError>> for MarketError {
    fn from(err: ClientError<MarketError>) -> Self {
        match err.into_rejection() {
            Ok(rejection) => rejection,
            Err(other) => Self::Client(other),
        }
    }
}

impl MarketError {
    /// Returns `true` when the store could not be reached and the operation
    /// may succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
