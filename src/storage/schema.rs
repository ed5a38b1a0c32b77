//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the catalog database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Normalized product records, one per store and key
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id TEXT NOT NULL,
    source_url TEXT NOT NULL,
    name TEXT NOT NULL,
    raw_price TEXT NOT NULL,
    currency TEXT NOT NULL,
    description TEXT,
    category TEXT,
    sku TEXT,
    extracted_at TEXT NOT NULL
);

-- Records with a SKU are keyed by it, the rest by their page
CREATE UNIQUE INDEX IF NOT EXISTS idx_products_store_sku
    ON products(store_id, sku) WHERE sku IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_products_store_url
    ON products(store_id, source_url) WHERE sku IS NULL;
CREATE INDEX IF NOT EXISTS idx_products_store ON products(store_id);

-- Product images in page order
CREATE TABLE IF NOT EXISTS product_images (
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (product_id, position)
);

-- One row per finished crawl session
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id TEXT NOT NULL,
    start_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    outcome TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    products_saved INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_sessions_store ON crawl_sessions(store_id);
"#;

/// Initializes the database schema
///
/// Safe to run against an existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
