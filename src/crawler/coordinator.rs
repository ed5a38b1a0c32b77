//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the session loop that coordinates all aspects of a
//! crawl, including:
//! - Loading the domain policy and seeding the frontier
//! - Dispatching fetch-classify-extract pipelines to a bounded worker pool
//! - Feeding discovered links back into the frontier
//! - Applying the termination policy and recording the session summary
//!
//! The coordinator is the only owner of the frontier and visited set. Workers
//! get an immutable [`CrawlTask`] and hand a [`TaskOutcome`] back through
//! their join handle.

use crate::config::{Config, StoreConfig};
use crate::crawler::fetcher::{request_path, MAX_REDIRECTS};
use crate::crawler::frontier::{CrawlTask, Frontier, Offer};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::session::{
    CrawlReport, CrawlRequest, CrawlSession, SessionStatus, SessionSummary, SkipReason,
};
use crate::crawler::{extract_links, FetchFailure, FetchResult, Fetcher};
use crate::extract::{
    classify_with_threshold, extract_product, ExtractionContext, ExtractionIncomplete, PageKind,
};
use crate::robots::{load_policy, Authorization, PolitenessGate};
use crate::state::{SessionState, TaskState};
use crate::storage::{DuplicateSkuPolicy, ProductStore, SaveOutcome, SessionRecord};
use crate::url::{is_same_domain, normalize_url};
use chrono::Utc;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Progress is logged every this many fetched pages
const PROGRESS_INTERVAL: u64 = 10;

/// What a worker reports back for one task
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    task: CrawlTask,
    attempts: u32,
    result: TaskResult,
}

#[derive(Debug)]
enum TaskResult {
    Fetched {
        final_url: Url,
        kind: PageKind,
        links: Vec<Url>,
        product: ProductOutcome,
    },
    Redirected {
        status_code: u16,
        location: Url,
    },
    Skipped {
        reason: SkipReason,
        detail: String,
    },
    Cancelled,
}

#[derive(Debug)]
enum ProductOutcome {
    NotProduct,
    Incomplete(ExtractionIncomplete),
    Stored(SaveOutcome),
    StorageFailed(String),
}

/// Why dispatching stopped before the frontier ran dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    BudgetExpired,
}

/// Read-only state shared by every worker of a session
struct WorkerContext {
    fetcher: Fetcher,
    retry: RetryPolicy,
    store: Arc<dyn ProductStore>,
    store_id: String,
    store_config: StoreConfig,
    duplicate_policy: DuplicateSkuPolicy,
    confidence_threshold: f64,
    cancel: CancellationToken,
}

/// Main coordinator structure for one session
pub(crate) struct Coordinator {
    session: CrawlSession,
    config_hash: Option<String>,
    start_url: Url,
    frontier: Frontier,
    gate: Arc<PolitenessGate>,
    workers: Arc<WorkerContext>,
    concurrency: usize,
    budget: Option<Duration>,
    report: CrawlReport,
    denied: HashSet<String>,
    failure: Option<String>,
    status: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Loads the domain policy and prepares the session
    ///
    /// The session stays `Pending` until [`run`](Self::run) starts it.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        request: CrawlRequest,
        start_url: Url,
        domain: String,
        config: &Config,
        client: Client,
        store: Arc<dyn ProductStore>,
        status: watch::Sender<SessionStatus>,
        cancel: CancellationToken,
    ) -> Self {
        tracing::info!("Loading politeness policy for {}", domain);
        let policy = load_policy(&client, &start_url, &config.politeness, &config.user_agent).await;
        tracing::debug!(
            "Policy for {}: min interval {:?}",
            domain,
            policy.min_interval
        );

        let mut gate = PolitenessGate::new();
        gate.insert_policy(&domain, policy);
        let gate = Arc::new(gate);

        let workers = Arc::new(WorkerContext {
            fetcher: Fetcher::new(client, Arc::clone(&gate), cancel.clone()),
            retry: RetryPolicy::from_config(&config.retry),
            store,
            store_id: request.store_id.clone(),
            store_config: config.store.clone(),
            duplicate_policy: config.store.duplicate_sku.into(),
            confidence_threshold: config.classifier.confidence_threshold,
            cancel: cancel.clone(),
        });

        Self {
            session: CrawlSession::new(&request, domain),
            config_hash: request.config_hash.clone(),
            frontier: Frontier::new(request.max_depth),
            start_url,
            gate,
            workers,
            concurrency: config.crawler.concurrency.max(1) as usize,
            budget: config.crawler.session_budget_secs.map(Duration::from_secs),
            report: CrawlReport::default(),
            denied: HashSet::new(),
            failure: None,
            status,
            cancel,
        }
    }

    /// Runs the session to a terminal state
    pub async fn run(mut self) -> SessionSummary {
        let start_path = request_path(&self.start_url);
        if let Authorization::Deny(reason) = self.gate.authorize(&self.session.domain, &start_path) {
            tracing::error!("Start URL {} denied: {}", self.start_url, reason);
            self.report.record_skip(SkipReason::PolicyDenied);
            self.failure = Some(format!("start URL denied: {}", reason));
            return self.finish(SessionState::FailedFatal).await;
        }

        self.transition(SessionState::Running);
        tracing::info!(
            "Starting crawl of {} (max depth {}, max pages {})",
            self.start_url,
            self.session.max_depth,
            self.session.max_pages
        );

        self.frontier.seed(self.start_url.clone());
        self.publish();

        let stop = self.crawl_loop().await;

        let outcome = if self.failure.is_some() {
            SessionState::FailedFatal
        } else if let Some(reason) = stop {
            self.failure = Some(match reason {
                StopReason::Cancelled => "cancelled".to_string(),
                StopReason::BudgetExpired => "session budget expired".to_string(),
            });
            SessionState::Aborted
        } else if self.page_limit_reached() && !self.frontier.is_empty() {
            self.failure = Some(format!(
                "page limit of {} reached with {} URLs pending",
                self.session.max_pages,
                self.frontier.pending()
            ));
            SessionState::Aborted
        } else {
            SessionState::Completed
        };

        self.finish(outcome).await
    }

    /// Dispatches and collects tasks until nothing is left to do
    async fn crawl_loop(&mut self) -> Option<StopReason> {
        let started = Instant::now();
        let deadline = self.budget.map(|budget| started + budget);
        let mut running: JoinSet<TaskOutcome> = JoinSet::new();
        let mut dispatched: HashMap<TaskId, CrawlTask> = HashMap::new();
        let mut stop: Option<StopReason> = None;

        loop {
            if stop.is_none() && self.failure.is_none() {
                if self.cancel.is_cancelled() {
                    stop = Some(StopReason::Cancelled);
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    stop = Some(StopReason::BudgetExpired);
                } else {
                    self.dispatch(&mut running, &mut dispatched);
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    self.collect(joined, &mut dispatched);
                    self.publish();
                }
                _ = self.cancel.cancelled(), if stop.is_none() => {
                    tracing::info!("Cancellation requested; waiting for {} in-flight tasks", running.len());
                    stop = Some(StopReason::Cancelled);
                }
                _ = sleep_until_deadline(deadline), if stop.is_none() => {
                    tracing::info!("Session budget expired; waiting for {} in-flight tasks", running.len());
                    stop = Some(StopReason::BudgetExpired);
                }
            }
        }

        tracing::info!(
            "Crawl loop finished: {} pages fetched in {:?}",
            self.report.pages_fetched,
            started.elapsed()
        );
        stop
    }

    /// Starts ready tasks until the pool is full or nothing is dispatchable
    fn dispatch(
        &mut self,
        running: &mut JoinSet<TaskOutcome>,
        dispatched: &mut HashMap<TaskId, CrawlTask>,
    ) {
        while running.len() < self.concurrency && !self.page_limit_reached() {
            let Some(task) = self.frontier.next_ready() else {
                break;
            };

            self.report.dispatched += 1;
            tracing::debug!("Dispatching {} (depth {})", task.url, task.depth);

            let workers = Arc::clone(&self.workers);
            let handle = running.spawn(process_task(workers, task.clone()));
            dispatched.insert(handle.id(), task);
        }
    }

    /// Applies a finished worker's result
    ///
    /// A worker that panicked still releases its depth, otherwise deeper
    /// levels would stay gated for the rest of the session.
    fn collect(
        &mut self,
        joined: Result<(TaskId, TaskOutcome), JoinError>,
        dispatched: &mut HashMap<TaskId, CrawlTask>,
    ) {
        match joined {
            Ok((id, outcome)) => {
                dispatched.remove(&id);
                self.handle_outcome(outcome);
            }
            Err(e) => {
                tracing::error!("Crawl worker failed: {}", e);
                if let Some(task) = dispatched.remove(&e.id()) {
                    self.frontier.complete(task.depth);
                    self.skip(&task, SkipReason::Permanent, format!("worker failed: {}", e));
                }
            }
        }
    }

    fn page_limit_reached(&self) -> bool {
        self.report.dispatched >= u64::from(self.session.max_pages)
    }

    fn handle_outcome(&mut self, outcome: TaskOutcome) {
        let TaskOutcome {
            task,
            attempts,
            result,
        } = outcome;

        self.frontier.complete(task.depth);
        self.report.retries += u64::from(attempts.saturating_sub(1));

        match result {
            TaskResult::Fetched {
                final_url,
                kind,
                links,
                product,
            } => {
                self.report.pages_fetched += 1;

                match kind {
                    PageKind::Category => self.report.categories += 1,
                    PageKind::Product => self.record_product(&task, product),
                    PageKind::Other => {}
                }

                self.enqueue_links(&task, &final_url, links);

                if self.report.pages_fetched % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        "Progress: {} pages fetched, {} products saved, {} in frontier",
                        self.report.pages_fetched,
                        self.report.products_saved,
                        self.frontier.pending()
                    );
                }
            }

            TaskResult::Redirected {
                status_code,
                location,
            } => {
                tracing::debug!("{} redirected ({}) to {}", task.url, status_code, location);
                self.report.redirects += 1;
                self.follow_redirect(&task, location);
            }

            TaskResult::Skipped { reason, detail } => self.skip(&task, reason, detail),

            TaskResult::Cancelled => {
                tracing::debug!("Task for {} cancelled", task.url);
            }
        }
    }

    fn skip(&mut self, task: &CrawlTask, reason: SkipReason, detail: String) {
        tracing::warn!("Skipping {} ({}): {}", task.url, reason, detail);
        self.report.record_skip(reason);

        if task.is_start() {
            self.failure = Some(format!("start URL {} failed: {}", task.url, detail));
        }
    }

    /// Queues a redirect target as a task of its own
    ///
    /// The target goes through the same domain, policy and visited checks
    /// as a discovered link, so no hop is fetched without authorization.
    fn follow_redirect(&mut self, task: &CrawlTask, location: Url) {
        if task.redirect_hops >= MAX_REDIRECTS {
            self.skip(task, SkipReason::Permanent, FetchFailure::RedirectLimit.to_string());
            return;
        }

        let target = match normalize_url(location.as_str()) {
            Ok(target) => target,
            Err(e) => {
                self.skip(task, SkipReason::Permanent, format!("bad redirect target: {}", e));
                return;
            }
        };

        if !is_same_domain(&target, &self.session.domain) {
            let detail = FetchFailure::OffDomainRedirect(target.to_string()).to_string();
            self.skip(task, SkipReason::Permanent, detail);
            return;
        }

        if let Authorization::Deny(reason) =
            self.gate.authorize(&self.session.domain, &request_path(&target))
        {
            if self.denied.insert(target.as_str().to_string()) {
                let detail = format!("redirect to {} denied: {}", target, reason);
                self.skip(task, SkipReason::PolicyDenied, detail);
            }
            return;
        }

        match self.frontier.follow_redirect(task, target.clone()) {
            Offer::Accepted => {}
            Offer::AlreadyKnown if task.is_start() => {
                self.failure = Some(format!("start URL {} redirects in a loop", task.url));
            }
            Offer::AlreadyKnown | Offer::TooDeep => {
                tracing::debug!("Redirect target {} already known", target);
            }
        }
    }

    fn record_product(&mut self, task: &CrawlTask, product: ProductOutcome) {
        match product {
            ProductOutcome::NotProduct => {}
            ProductOutcome::Incomplete(incomplete) => {
                tracing::warn!("{}", incomplete);
                self.report.record_skip(SkipReason::ExtractionIncomplete);
            }
            ProductOutcome::Stored(SaveOutcome::Saved) => {
                self.report.products_extracted += 1;
                self.report.products_saved += 1;
            }
            ProductOutcome::Stored(SaveOutcome::DuplicateSku { replaced }) => {
                tracing::debug!(
                    "Duplicate product at {} ({})",
                    task.url,
                    if replaced { "replaced" } else { "ignored" }
                );
                self.report.products_extracted += 1;
                self.report.duplicates += 1;
            }
            ProductOutcome::StorageFailed(message) => {
                tracing::warn!("Storage failed for {}: {}", task.url, message);
                self.report.products_extracted += 1;
                self.report.record_skip(SkipReason::StorageError);
                self.report
                    .storage_warnings
                    .push(format!("{}: {}", task.url, message));
            }
        }
    }

    /// Offers in-domain, authorized links to the frontier at `depth + 1`
    fn enqueue_links(&mut self, task: &CrawlTask, page_url: &Url, links: Vec<Url>) {
        let depth = task.depth + 1;
        let mut accepted = 0;

        for link in links {
            if !is_same_domain(&link, &self.session.domain) {
                self.report.external_links_ignored += 1;
                continue;
            }

            if depth > self.session.max_depth || self.frontier.is_known(&link) {
                continue;
            }

            if let Authorization::Deny(reason) =
                self.gate.authorize(&self.session.domain, &request_path(&link))
            {
                if self.denied.insert(link.as_str().to_string()) {
                    tracing::debug!("Not following {}: {}", link, reason);
                    self.report.record_skip(SkipReason::PolicyDenied);
                }
                continue;
            }

            if self.frontier.offer(link, depth, page_url) == Offer::Accepted {
                accepted += 1;
            }
        }

        tracing::trace!("{} new links from {}", accepted, page_url);
    }

    fn transition(&mut self, next: SessionState) {
        if let Err(e) = self.session.transition(next) {
            tracing::error!("{}", e);
        }
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.session.state(),
            report: self.report.clone(),
            failure: self.failure.clone(),
        });
    }

    /// Moves to the terminal state, records the session and builds the summary
    async fn finish(mut self, outcome: SessionState) -> SessionSummary {
        self.transition(outcome);
        let finished_at = self.session.finished_at.unwrap_or_else(Utc::now);

        let record = SessionRecord {
            store_id: self.session.store_id.clone(),
            start_url: self.session.start_url.clone(),
            domain: self.session.domain.clone(),
            outcome: self.session.state(),
            started_at: self.session.started_at,
            finished_at,
            pages_fetched: self.report.pages_fetched,
            products_saved: self.report.products_saved,
            skipped: self.report.total_skipped(),
            config_hash: self.config_hash.clone(),
        };

        let store = Arc::clone(&self.workers.store);
        match tokio::task::spawn_blocking(move || store.record_session(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Failed to record session summary: {}", e);
                self.report
                    .storage_warnings
                    .push(format!("session summary: {}", e));
            }
            Err(e) => {
                tracing::warn!("Session summary task failed: {}", e);
                self.report
                    .storage_warnings
                    .push(format!("session summary: {}", e));
            }
        }

        match &self.failure {
            Some(reason) => tracing::info!("Session {} {}: {}", self.session.store_id, outcome, reason),
            None => tracing::info!("Session {} {}", self.session.store_id, outcome),
        }

        self.publish();

        SessionSummary {
            store_id: self.session.store_id.clone(),
            start_url: self.session.start_url.clone(),
            domain: self.session.domain.clone(),
            max_depth: self.session.max_depth,
            max_pages: self.session.max_pages,
            outcome: self.session.state(),
            failure: self.failure.clone(),
            started_at: self.session.started_at,
            finished_at,
            report: self.report.clone(),
            visited: self.frontier.visited(),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Fetch-classify-extract pipeline for one task
async fn process_task(ctx: Arc<WorkerContext>, task: CrawlTask) -> TaskOutcome {
    let mut attempt = 1;

    let result = loop {
        if ctx.cancel.is_cancelled() {
            return TaskOutcome {
                task,
                attempts: attempt - 1,
                result: TaskResult::Cancelled,
            };
        }

        let result = ctx.fetcher.fetch(&task.url, attempt).await;
        match ctx.retry.next_state(attempt, &result) {
            state @ TaskState::Retrying { next_delay, .. } => {
                tracing::debug!("{}: {}", task.url, state);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        return TaskOutcome {
                            task,
                            attempts: attempt,
                            result: TaskResult::Cancelled,
                        };
                    }
                    _ = tokio::time::sleep(next_delay) => {}
                }
                attempt += 1;
            }
            _ => break result,
        }
    };

    let result = match result {
        FetchResult::Success { body, final_url, .. } => process_page(&ctx, body, final_url).await,
        FetchResult::Redirect {
            status_code,
            location,
        } => TaskResult::Redirected {
            status_code,
            location,
        },
        FetchResult::Fatal {
            reason: FetchFailure::Cancelled,
        } => TaskResult::Cancelled,
        FetchResult::Fatal {
            reason: FetchFailure::PolicyDenied(detail),
        } => TaskResult::Skipped {
            reason: SkipReason::PolicyDenied,
            detail,
        },
        FetchResult::Fatal { reason } => TaskResult::Skipped {
            reason: SkipReason::Permanent,
            detail: reason.to_string(),
        },
        FetchResult::Retryable { reason, .. } => TaskResult::Skipped {
            reason: SkipReason::Transient,
            detail: format!("{} after {} attempts", reason, attempt),
        },
    };

    TaskOutcome {
        task,
        attempts: attempt,
        result,
    }
}

async fn process_page(ctx: &WorkerContext, body: String, final_url: Url) -> TaskResult {
    let classification = classify_with_threshold(&body, ctx.confidence_threshold);
    let links: Vec<Url> = extract_links(&body, &final_url).collect();
    tracing::debug!(
        "{} classified as {} ({:.2})",
        final_url,
        classification.kind,
        classification.confidence
    );

    let product = if classification.kind == PageKind::Product {
        let extraction = ExtractionContext::new(&ctx.store_config, Utc::now());
        match extract_product(&body, &final_url, &extraction) {
            Ok(record) => save(ctx, record).await,
            Err(incomplete) => ProductOutcome::Incomplete(incomplete),
        }
    } else {
        ProductOutcome::NotProduct
    };

    TaskResult::Fetched {
        final_url,
        kind: classification.kind,
        links,
        product,
    }
}

async fn save(ctx: &WorkerContext, record: crate::extract::ProductRecord) -> ProductOutcome {
    let store = Arc::clone(&ctx.store);
    let store_id = ctx.store_id.clone();
    let policy = ctx.duplicate_policy;

    match tokio::task::spawn_blocking(move || store.save_product(&store_id, record, policy)).await {
        Ok(Ok(outcome)) => ProductOutcome::Stored(outcome),
        Ok(Err(e)) => ProductOutcome::StorageFailed(e.to_string()),
        Err(e) => ProductOutcome::StorageFailed(e.to_string()),
    }
}
