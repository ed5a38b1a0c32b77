//! Storage module for persisting crawl output
//!
//! This module holds the persistence boundary:
//! - the [`ProductStore`] trait the coordinator emits records to
//! - a SQLite adapter with schema management
//! - an in-memory adapter for tests and database-less runs

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryProductStore;
pub use sqlite::SqliteProductStore;
pub use traits::{DuplicateSkuPolicy, ProductStore, SaveOutcome, StorageError, StorageResult};

use crate::state::SessionState;
use chrono::{DateTime, Utc};

/// Summary of one finished crawl session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub store_id: String,
    pub start_url: String,
    pub domain: String,
    pub outcome: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_fetched: u64,
    pub products_saved: u64,
    pub skipped: u64,
    pub config_hash: Option<String>,
}
