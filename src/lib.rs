//! Catalog-Mirror: a polite storefront catalog crawler
//!
//! This crate implements the crawl-and-extract pipeline that mirrors a single
//! storefront's public catalog: it discovers product pages within one domain,
//! respecting robots.txt and rate limits, classifies them, extracts normalized
//! product records and hands each one to a persistence boundary exactly once.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionState,
        to: state::SessionState,
    },

    #[error("Crawl session ended unexpectedly: {0}")]
    SessionLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{start_crawl, CrawlHandle, CrawlReport, CrawlRequest};
pub use extract::{classify, extract_product, PageClassification, PageKind, ProductRecord};
pub use robots::{Authorization, PolitenessGate};
pub use state::{SessionState, TaskState};
pub use storage::{DuplicateSkuPolicy, MemoryProductStore, ProductStore, SqliteProductStore};
pub use url::{extract_domain, is_same_domain, normalize_url};
