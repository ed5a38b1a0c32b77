//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ProductStore trait.

use crate::extract::ProductRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    DuplicateSkuPolicy, ProductStore, SaveOutcome, StorageError, StorageResult,
};
use crate::storage::SessionRecord;
use crate::state::SessionState;
use crate::MirrorError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
///
/// The connection sits behind a mutex so one store can be shared by every
/// worker of a session.
pub struct SqliteProductStore {
    conn: Mutex<Connection>,
}

impl SqliteProductStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, MirrorError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, MirrorError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Counts the records stored for `store_id`
    pub fn count_products(&self, store_id: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM products WHERE store_id = ?1",
            params![store_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Returns the most recently recorded session of `store_id`
    pub fn latest_session(&self, store_id: &str) -> StorageResult<Option<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT store_id, start_url, domain, outcome, started_at, finished_at,
                    pages_fetched, products_saved, skipped, config_hash
             FROM crawl_sessions WHERE store_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;

        let row = stmt
            .query_row(params![store_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })
            .optional()?;

        let Some((store, start, domain, outcome, started, finished, fetched, saved, skipped, hash)) =
            row
        else {
            return Ok(None);
        };

        let outcome = SessionState::from_db_string(&outcome)
            .ok_or_else(|| StorageError::Serialization(format!("unknown outcome {}", outcome)))?;

        Ok(Some(SessionRecord {
            store_id: store,
            start_url: start,
            domain,
            outcome,
            started_at: parse_timestamp(&started)?,
            finished_at: parse_timestamp(&finished)?,
            pages_fetched: fetched as u64,
            products_saved: saved as u64,
            skipped: skipped as u64,
            config_hash: hash,
        }))
    }
}

impl ProductStore for SqliteProductStore {
    fn save_product(
        &self,
        store_id: &str,
        record: ProductRecord,
        policy: DuplicateSkuPolicy,
    ) -> StorageResult<SaveOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = match &record.sku {
            Some(sku) => tx
                .query_row(
                    "SELECT id FROM products WHERE store_id = ?1 AND sku = ?2",
                    params![store_id, sku],
                    |row| row.get(0),
                )
                .optional()?,
            None => tx
                .query_row(
                    "SELECT id FROM products WHERE store_id = ?1 AND source_url = ?2 AND sku IS NULL",
                    params![store_id, record.source_url],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let outcome = match (existing, policy) {
            (Some(_), DuplicateSkuPolicy::Ignore) => SaveOutcome::DuplicateSku { replaced: false },
            (Some(id), DuplicateSkuPolicy::Replace) => {
                tx.execute(
                    "UPDATE products SET source_url = ?1, name = ?2, raw_price = ?3, currency = ?4,
                            description = ?5, category = ?6, extracted_at = ?7
                     WHERE id = ?8",
                    params![
                        record.source_url,
                        record.name,
                        record.raw_price,
                        record.currency,
                        record.description,
                        record.category,
                        record.extracted_at.to_rfc3339(),
                        id
                    ],
                )?;
                tx.execute("DELETE FROM product_images WHERE product_id = ?1", params![id])?;
                insert_images(&tx, id, &record.image_urls)?;
                SaveOutcome::DuplicateSku { replaced: true }
            }
            (None, _) => {
                tx.execute(
                    "INSERT INTO products (store_id, source_url, name, raw_price, currency,
                                           description, category, sku, extracted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        store_id,
                        record.source_url,
                        record.name,
                        record.raw_price,
                        record.currency,
                        record.description,
                        record.category,
                        record.sku,
                        record.extracted_at.to_rfc3339()
                    ],
                )?;
                let id = tx.last_insert_rowid();
                insert_images(&tx, id, &record.image_urls)?;
                SaveOutcome::Saved
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn load_products(&self, store_id: &str) -> StorageResult<Vec<ProductRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, source_url, name, raw_price, currency, description, category, sku, extracted_at
             FROM products WHERE store_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![store_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut images_stmt =
            conn.prepare("SELECT url FROM product_images WHERE product_id = ?1 ORDER BY position")?;

        let mut products = Vec::with_capacity(rows.len());
        for (id, source_url, name, raw_price, currency, description, category, sku, extracted_at) in
            rows
        {
            let image_urls = images_stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            products.push(ProductRecord {
                source_url,
                name,
                raw_price,
                currency,
                description,
                image_urls,
                category,
                sku,
                extracted_at: parse_timestamp(&extracted_at)?,
            });
        }

        Ok(products)
    }

    fn record_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO crawl_sessions (store_id, start_url, domain, outcome, started_at, finished_at,
                                         pages_fetched, products_saved, skipped, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.store_id,
                session.start_url,
                session.domain,
                session.outcome.to_db_string(),
                session.started_at.to_rfc3339(),
                session.finished_at.to_rfc3339(),
                session.pages_fetched as i64,
                session.products_saved as i64,
                session.skipped as i64,
                session.config_hash
            ],
        )?;
        Ok(())
    }
}

fn insert_images(tx: &Transaction<'_>, product_id: i64, urls: &[String]) -> StorageResult<()> {
    for (position, url) in urls.iter().enumerate() {
        tx.execute(
            "INSERT INTO product_images (product_id, position, url) VALUES (?1, ?2, ?3)",
            params![product_id, position as i64, url],
        )?;
    }
    Ok(())
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp {}: {}", raw, e)))
}
