//! Crawler module for page fetching and session orchestration
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching through the politeness gate
//! - HTML link extraction
//! - The depth-bucketed frontier and visited set
//! - Retry policy and the per-task state machine
//! - Overall session coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod retry;
mod session;

pub use fetcher::{build_http_client, parse_retry_after, FetchFailure, FetchResult, Fetcher};
pub use frontier::{CrawlTask, Frontier, Offer};
pub use parser::extract_links;
pub use retry::RetryPolicy;
pub use session::{
    CrawlHandle, CrawlReport, CrawlRequest, SessionStatus, SessionSummary, SkipReason,
};

use crate::config::{validate, Config};
use crate::storage::ProductStore;
use crate::url::{extract_domain, normalize_url};
use crate::{MirrorError, UrlError};
use coordinator::Coordinator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Starts a crawl session in the background
///
/// This is the main entry point for a crawl. It will:
/// 1. Validate the configuration
/// 2. Normalize the start URL and fix the session's domain
/// 3. Build the HTTP client
/// 4. Spawn the coordinator, which loads the domain policy and runs the
///    session to a terminal state
///
/// Errors returned here mean the session never started; everything that
/// goes wrong later is reported through the handle.
///
/// # Example
///
/// ```no_run
/// use catalog_mirror::config::Config;
/// use catalog_mirror::crawler::{start_crawl, CrawlRequest};
/// use catalog_mirror::storage::MemoryProductStore;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let request = CrawlRequest::from_config(&config, "https://shop.example/");
/// let handle = start_crawl(request, config, Arc::new(MemoryProductStore::new()))?;
/// let summary = handle.wait().await?;
/// println!("{}: {} products", summary.outcome, summary.report.products_saved);
/// # Ok(())
/// # }
/// ```
pub fn start_crawl(
    request: CrawlRequest,
    config: Config,
    store: Arc<dyn ProductStore>,
) -> Result<CrawlHandle, MirrorError> {
    validate(&config)?;
    let start_url = normalize_url(&request.start_url)?;
    let domain = extract_domain(&start_url).ok_or(UrlError::MissingDomain)?;
    let client = build_http_client(&config)?;

    let cancel = CancellationToken::new();
    let (status_tx, status_rx) = watch::channel(SessionStatus::pending());

    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let coordinator = Coordinator::new(
            request, start_url, domain, &config, client, store, status_tx, token,
        )
        .await;
        coordinator.run().await
    });

    Ok(CrawlHandle::new(status_rx, cancel, task))
}
