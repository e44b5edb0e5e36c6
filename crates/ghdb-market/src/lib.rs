//! Second-hand marketplace services over a ghdb document store.
//!
//! Users, login and registration histories, the product feed, the chat
//! room and the admin configuration each live in one JSON document. Every
//! change is a get-modify-put through [`ghdb_client::DocumentClient`], so
//! concurrent processes sharing one store never overwrite each other's
//! records.
//!
//! # Key Types
//!
//! - [`Marketplace`] -- Opens the configured store and hands out services
//! - [`Accounts`] -- Registration, login, admin login, histories
//! - [`Catalog`] -- Product listings
//! - [`ChatRoom`] -- Public chat with a capped history
//! - [`Dashboard`] -- Counters for the admin view
//! - [`KnownDocument`] -- A raw document validated against its path's schema
//!
//! # Design Rules
//!
//! 1. Duplicate checks run inside the write loop, never against a separate
//!    earlier read.
//! 2. A store that cannot be reached fails the operation. It never reads as
//!    an empty document.
//! 3. History writes that follow a primary write are best effort and logged
//!    when they fail.

pub mod accounts;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod documents;
pub mod error;
pub mod marketplace;
pub mod records;

pub use accounts::{normalize_email, Accounts};
pub use catalog::{Catalog, ProductDraft};
pub use chat::ChatRoom;
pub use config::{Limits, MarketConfig, StoreBackend};
pub use context::{BrowserInfo, ClientContext, DeviceType};
pub use dashboard::{Dashboard, DashboardStats, NEW_USER_DAYS};
pub use documents::{
    AdminConfig, ChatDoc, KnownDocument, LoginHistoryDoc, ProductsDoc, RegistrationHistoryDoc,
    UsersDoc,
};
pub use error::{MarketError, MarketResult};
pub use marketplace::{DocumentCheck, DocumentStatus, Marketplace, StoreReport};
pub use records::{
    ChatMessage, ContactMethod, GeoLocation, LoginRecord, LoginStatus, MessageKind, Product,
    ProductStatus, RegistrationRecord, Role, User, UserStatus,
};
