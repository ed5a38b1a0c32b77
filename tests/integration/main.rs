//! Integration tests for Catalog-Mirror
//!
//! These tests run the pipeline against wiremock servers standing in for a
//! storefront.

mod common;
mod crawl_tests;
mod fetcher_tests;
mod politeness_tests;
