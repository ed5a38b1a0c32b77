//! Crawl frontier and visited set
//!
//! This module handles:
//! - Depth-bucketed queueing of crawl tasks (lowest depth first)
//! - The visited set that guarantees each URL is dispatched once
//! - Breadth-first gating against in-flight work
//!
//! The frontier is owned by the coordinator loop; workers never touch it.

use std::collections::{BTreeMap, HashSet, VecDeque};
use url::Url;

/// A URL accepted for crawling
///
/// Depth is fixed at discovery time and the task is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Normalized URL to fetch
    pub url: Url,

    /// Link distance from the start URL
    pub depth: u32,

    /// Page the link was found on (`None` for the start URL)
    pub discovered_from: Option<Url>,

    /// Redirects followed to reach this URL
    pub redirect_hops: u32,
}

impl CrawlTask {
    /// True for the start URL and the targets it redirected to
    pub fn is_start(&self) -> bool {
        self.discovered_from.is_none()
    }
}

/// Why [`Frontier::offer`] did or did not accept a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    AlreadyKnown,
    TooDeep,
}

/// Pending tasks plus everything already dispatched
pub struct Frontier {
    /// Pending tasks keyed by depth, FIFO within a depth
    buckets: BTreeMap<u32, VecDeque<CrawlTask>>,

    /// URLs waiting in a bucket
    queued: HashSet<String>,

    /// URLs dispatched or completed
    visited: HashSet<String>,

    /// Dispatched, not yet completed task counts per depth
    in_flight: BTreeMap<u32, usize>,

    max_depth: u32,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            buckets: BTreeMap::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            in_flight: BTreeMap::new(),
            max_depth,
        }
    }

    /// Queues the start URL at depth 0
    pub fn seed(&mut self, url: Url) -> Offer {
        self.push(CrawlTask {
            url,
            depth: 0,
            discovered_from: None,
            redirect_hops: 0,
        })
    }

    /// Offers a link found on `from` at `depth`
    ///
    /// Rejects links deeper than the session's maximum and URLs already
    /// queued or visited. Domain and policy checks are the caller's job.
    pub fn offer(&mut self, url: Url, depth: u32, from: &Url) -> Offer {
        self.push(CrawlTask {
            url,
            depth,
            discovered_from: Some(from.clone()),
            redirect_hops: 0,
        })
    }

    /// Queues the target of a redirect served for `task`
    ///
    /// The target keeps the task's depth and provenance, so a redirect from
    /// the start URL still counts as the start of the session.
    pub fn follow_redirect(&mut self, task: &CrawlTask, location: Url) -> Offer {
        self.push(CrawlTask {
            url: location,
            depth: task.depth,
            discovered_from: task.discovered_from.clone(),
            redirect_hops: task.redirect_hops + 1,
        })
    }

    fn push(&mut self, task: CrawlTask) -> Offer {
        if task.depth > self.max_depth {
            return Offer::TooDeep;
        }
        if self.is_known(&task.url) {
            return Offer::AlreadyKnown;
        }

        self.queued.insert(task.url.as_str().to_string());
        self.buckets.entry(task.depth).or_default().push_back(task);
        Offer::Accepted
    }

    /// Pops the next dispatchable task and marks it visited
    ///
    /// Returns `None` when the frontier is empty or when the shallowest
    /// pending task is more than one level below some in-flight task: a
    /// depth-`d` task waits until every depth-`d-2` task has finished, so
    /// all depth-`d-1` links have been enqueued before it runs.
    pub fn next_ready(&mut self) -> Option<CrawlTask> {
        let (&depth, _) = self.buckets.iter().next()?;

        if let Some((&shallowest_running, _)) = self.in_flight.iter().next() {
            if shallowest_running + 1 < depth {
                return None;
            }
        }

        let bucket = self.buckets.get_mut(&depth)?;
        let task = bucket.pop_front()?;
        if bucket.is_empty() {
            self.buckets.remove(&depth);
        }

        let key = task.url.as_str().to_string();
        self.queued.remove(&key);
        self.visited.insert(key);
        *self.in_flight.entry(depth).or_insert(0) += 1;

        Some(task)
    }

    /// Records that a dispatched task of `depth` finished
    pub fn complete(&mut self, depth: u32) {
        if let Some(count) = self.in_flight.get_mut(&depth) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&depth);
            }
        }
    }

    /// True if the URL is queued or already visited
    pub fn is_known(&self, url: &Url) -> bool {
        let key = url.as_str();
        self.visited.contains(key) || self.queued.contains(key)
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    /// Number of tasks waiting to be dispatched
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    /// Number of dispatched tasks that have not completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.values().sum()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Visited URLs in sorted order
    pub fn visited(&self) -> Vec<String> {
        let mut visited: Vec<String> = self.visited.iter().cloned().collect();
        visited.sort();
        visited
    }
}
