//! Politeness gate guarding every outbound fetch

use crate::robots::DomainPolicy;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny(String),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Per-domain robots rules plus the last-dispatch timestamp
struct DomainGate {
    policy: DomainPolicy,
    last_dispatch: Mutex<Option<Instant>>,
}

/// Gate-keeps all outbound fetches
///
/// The gate answers two questions: may this path be fetched at all
/// ([`authorize`](Self::authorize)), and when may the next request to this
/// domain go out ([`await_slot`](Self::await_slot)). Policies are registered
/// before the session starts and are read-only afterwards; only the
/// per-domain timestamp is mutated, behind its own async mutex.
#[derive(Default)]
pub struct PolitenessGate {
    domains: HashMap<String, DomainGate>,
}

impl PolitenessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the policy for a domain, replacing any previous one
    pub fn insert_policy(&mut self, domain: &str, policy: DomainPolicy) {
        self.domains.insert(
            domain_key(domain),
            DomainGate {
                policy,
                last_dispatch: Mutex::new(None),
            },
        );
    }

    /// Returns the policy registered for `domain`
    pub fn policy(&self, domain: &str) -> Option<&DomainPolicy> {
        self.domains.get(&domain_key(domain)).map(|gate| &gate.policy)
    }

    /// Checks robots rules for `path` (path plus optional query) on `domain`
    ///
    /// Domains without a registered policy are denied: a session only ever
    /// fetches from the domain it loaded a policy for.
    pub fn authorize(&self, domain: &str, path: &str) -> Authorization {
        let Some(gate) = self.domains.get(&domain_key(domain)) else {
            return Authorization::Deny(format!("no politeness policy loaded for {}", domain));
        };

        let policy = &gate.policy;
        if policy.robots.is_disallow_all() {
            return Authorization::Deny(format!("robots.txt for {} is unavailable", domain));
        }

        if policy.robots.is_allowed(path, &policy.user_agent) {
            Authorization::Allow
        } else {
            Authorization::Deny(format!("{} disallowed by robots.txt", path))
        }
    }

    /// Suspends until the domain's minimum interval has elapsed since the
    /// previous slot, then claims the next slot
    ///
    /// Concurrent callers queue on the domain's mutex, so no two requests
    /// to one domain are released within the interval.
    pub async fn await_slot(&self, domain: &str) {
        let Some(gate) = self.domains.get(&domain_key(domain)) else {
            return;
        };

        let mut last = gate.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + gate.policy.min_interval;
            if ready_at > Instant::now() {
                tracing::trace!(
                    "Waiting {:?} for a slot on {}",
                    ready_at - Instant::now(),
                    domain
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Key under which a domain's gate is stored
fn domain_key(domain: &str) -> String {
    let lowered = domain.to_lowercase();
    lowered
        .strip_prefix("www.")
        .map(str::to_string)
        .unwrap_or(lowered)
}
