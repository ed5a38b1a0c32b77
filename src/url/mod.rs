//! URL handling module for Catalog-Mirror
//!
//! This module provides URL normalization, relative link resolution, domain
//! extraction and the same-domain check that bounds a crawl to one storefront.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, is_same_domain};
pub use normalize::{normalize_url, resolve_link};
