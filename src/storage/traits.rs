//! Storage traits and error types
//!
//! This module defines the persistence boundary the crawler hands product
//! records to, along with its outcome and error types.

use crate::config::DuplicateSkuSetting;
use crate::extract::ProductRecord;
use crate::storage::SessionRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What to do when a record collides with one already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateSkuPolicy {
    /// The most recent extraction wins
    Replace,

    /// The stored record is kept
    Ignore,
}

impl From<DuplicateSkuSetting> for DuplicateSkuPolicy {
    fn from(setting: DuplicateSkuSetting) -> Self {
        match setting {
            DuplicateSkuSetting::Replace => Self::Replace,
            DuplicateSkuSetting::Ignore => Self::Ignore,
        }
    }
}

/// Non-error result of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new record was stored
    Saved,

    /// A record with the same key existed; `replaced` tells whether it was overwritten
    DuplicateSku { replaced: bool },
}

/// Persistence boundary for extracted products
///
/// Records are keyed per store by SKU, or by source URL when the page had
/// no SKU. Implementations must be shareable across the crawl's workers.
pub trait ProductStore: Send + Sync {
    /// Stores one record, taking ownership of it
    fn save_product(
        &self,
        store_id: &str,
        record: ProductRecord,
        policy: DuplicateSkuPolicy,
    ) -> StorageResult<SaveOutcome>;

    /// Reads back every record of a store in insertion order
    fn load_products(&self, store_id: &str) -> StorageResult<Vec<ProductRecord>>;

    /// Records the summary of a finished session
    fn record_session(&self, session: &SessionRecord) -> StorageResult<()>;
}
