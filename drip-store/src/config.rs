use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{CampaignStore, MemoryStore, Result, SqliteStore};

/// Which backend the daemon persists to.
///
/// ```ron
/// store: Sqlite(path: "/var/lib/drip/drip.sqlite3"),
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// Nothing survives a restart.
    #[default]
    Memory,
    Sqlite { path: PathBuf },
}

impl StoreConfig {
    /// Opens the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Schema`] if the SQLite database cannot be
    /// opened or its tables cannot be created.
    pub async fn open(&self) -> Result<Arc<dyn CampaignStore>> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::Sqlite { path } => Arc::new(SqliteStore::open(path).await?),
        })
    }
}
