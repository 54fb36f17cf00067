//! Append-only storage for accepted relay commands.
//!
//! Handlers only ever see `Arc<dyn StateStore>`; the concrete backend is
//! chosen from the configured URL by [`connect`].

mod entity;
mod memory;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;

use crate::relay::StateRecord;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// URL scheme selecting [`MemoryStore`].
pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to '{url}': {source}")]
    Connect {
        url: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("record {id} has unrecognized state {state:?}")]
    Corrupt { id: i64, state: String },
}

/// Durable collection of [`StateRecord`]s.
///
/// Inserts are atomic per record. There is no update or delete.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append one record.
    async fn append(&self, record: StateRecord) -> Result<(), StoreError>;

    /// The record with the greatest timestamp, or `None` when empty.
    ///
    /// Records sharing a timestamp are ordered by insertion; the later one wins.
    async fn latest(&self) -> Result<Option<StateRecord>, StoreError>;
}

/// Open the store named by `url`.
pub async fn connect(url: &str) -> Result<Arc<dyn StateStore>, StoreError> {
    if url.starts_with(MEMORY_URL) {
        tracing::warn!("Using in-memory store, records will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    Ok(Arc::new(SqlStore::connect(url).await?))
}
