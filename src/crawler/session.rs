//! Crawl session types
//!
//! A session is one invocation of the pipeline against one store. The caller
//! gets a [`CrawlHandle`] back from `start_crawl` and observes progress
//! through it; everything else about the session lives in the coordinator.

use crate::config::Config;
use crate::state::SessionState;
use crate::MirrorError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Identifier records are stored under
    pub store_id: String,

    /// First page fetched; its domain bounds the session
    pub start_url: String,

    pub max_depth: u32,
    pub max_pages: u32,

    /// Hash of the configuration file, recorded with the session summary
    pub config_hash: Option<String>,
}

impl CrawlRequest {
    /// Request for `start_url` with store id and caps taken from `config`
    pub fn from_config(config: &Config, start_url: impl Into<String>) -> Self {
        Self {
            store_id: config.store.id.clone(),
            start_url: start_url.into(),
            max_depth: config.crawler.max_depth,
            max_pages: config.crawler.max_pages,
            config_hash: None,
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }
}

/// Why a URL was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// robots.txt or policy denied the URL
    PolicyDenied,
    /// Retries exhausted on transient failures
    Transient,
    /// Fatal fetch outcome
    Permanent,
    /// Product page missing a required field
    ExtractionIncomplete,
    /// The persistence collaborator rejected the record
    StorageError,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PolicyDenied => "policy denied",
            Self::Transient => "transient (retries exhausted)",
            Self::Permanent => "permanent",
            Self::ExtractionIncomplete => "extraction incomplete",
            Self::StorageError => "storage error",
        };
        f.write_str(label)
    }
}

/// Counters for a session, updated as workers report back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Tasks handed to a worker (what `max_pages` caps)
    pub dispatched: u64,

    /// Pages that returned an HTML body
    pub pages_fetched: u64,

    /// Pages classified as category pages
    pub categories: u64,

    /// Records that passed extraction
    pub products_extracted: u64,

    /// Records the store accepted as new
    pub products_saved: u64,

    /// Records that hit an existing SKU (replaced or ignored)
    pub duplicates: u64,

    /// Fetch attempts beyond the first
    pub retries: u64,

    /// Same-host redirects answered instead of a page
    pub redirects: u64,

    /// Links pointing off the session's domain
    pub external_links_ignored: u64,

    /// Skipped URLs by reason
    pub skips: BTreeMap<SkipReason, u64>,

    /// Storage failures, one line per failed save
    pub storage_warnings: Vec<String>,
}

impl CrawlReport {
    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.skips.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped(&self, reason: SkipReason) -> u64 {
        self.skips.get(&reason).copied().unwrap_or(0)
    }

    /// Skips across all reasons
    pub fn total_skipped(&self) -> u64 {
        self.skips.values().sum()
    }
}

/// Live view of a session, published on every change
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub report: CrawlReport,

    /// Reason for `FailedFatal`, or what ended an aborted session
    pub failure: Option<String>,
}

impl SessionStatus {
    pub(crate) fn pending() -> Self {
        Self {
            state: SessionState::Pending,
            report: CrawlReport::default(),
            failure: None,
        }
    }
}

/// Final result of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub store_id: String,
    pub start_url: String,
    pub domain: String,
    pub max_depth: u32,
    pub max_pages: u32,
    pub outcome: SessionState,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub report: CrawlReport,

    /// Every URL dispatched during the session, sorted
    pub visited: Vec<String>,
}

/// Session bookkeeping owned by the coordinator
#[derive(Debug)]
pub(crate) struct CrawlSession {
    pub store_id: String,
    pub start_url: String,
    pub domain: String,
    pub max_depth: u32,
    pub max_pages: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    state: SessionState,
}

impl CrawlSession {
    pub fn new(request: &CrawlRequest, domain: String) -> Self {
        Self {
            store_id: request.store_id.clone(),
            start_url: request.start_url.clone(),
            domain,
            max_depth: request.max_depth,
            max_pages: request.max_pages,
            started_at: Utc::now(),
            finished_at: None,
            state: SessionState::Pending,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`, stamping `finished_at` on terminal states
    pub fn transition(&mut self, next: SessionState) -> Result<(), MirrorError> {
        if !self.state.can_transition_to(next) {
            return Err(MirrorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!("Session {}: {} -> {}", self.store_id, self.state, next);
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Caller's handle on a running session
pub struct CrawlHandle {
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

impl CrawlHandle {
    pub(crate) fn new(
        status: watch::Receiver<SessionStatus>,
        cancel: CancellationToken,
        task: JoinHandle<SessionSummary>,
    ) -> Self {
        Self {
            status,
            cancel,
            task,
        }
    }

    /// Current session state
    pub fn status(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Current state plus counters
    pub fn snapshot(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Requests cancellation; in-flight tasks finish, nothing new dispatches
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the session to reach a terminal state
    pub async fn wait(self) -> Result<SessionSummary, MirrorError> {
        self.task
            .await
            .map_err(|e| MirrorError::SessionLost(e.to_string()))
    }
}
