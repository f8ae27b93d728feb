//! Persistence for campaigns, senders, contacts, the suppression list and the
//! per-campaign delivery ledger.
//!
//! Everything the scheduler and its collaborators read or write goes through
//! [`CampaignStore`]. Two backends are provided:
//!
//! - [`MemoryStore`]: a lock-protected in-process store for tests and dry runs
//! - [`SqliteStore`]: SQLite through `tokio-rusqlite`, parameterised statements only

pub mod backends;
pub mod config;
pub mod error;
pub mod store;

pub use backends::{MemoryStore, SqliteStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::CampaignStore;
