//! Configuration module for Catalog-Mirror
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! A configuration is supplied once at session start and never mutated mid-session.
//!
//! # Example
//!
//! ```no_run
//! use catalog_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mirror.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CrawlerConfig, DuplicateSkuSetting, FetcherConfig, OutputConfig,
    PolitenessConfig, RetryConfig, StoreConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
