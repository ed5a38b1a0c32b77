//! Per-domain politeness policy and robots.txt retrieval

use crate::config::{PolitenessConfig, UserAgentConfig};
use crate::robots::ParsedRobots;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Pause between robots.txt attempts, multiplied by the attempt number
const ROBOTS_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Rules a session applies to one domain
///
/// Loaded once at session start and read-only afterwards.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    /// Parsed robots.txt directives (or an allow/deny fallback)
    pub robots: ParsedRobots,

    /// Minimum time between two requests to the domain
    pub min_interval: Duration,

    /// Product token matched against robots.txt user-agent groups
    pub user_agent: String,
}

impl DomainPolicy {
    /// Builds a policy from robots rules, honouring `Crawl-delay` when it is
    /// stricter than the configured interval
    pub fn new(robots: ParsedRobots, configured_interval: Duration, user_agent: &str) -> Self {
        let robots_delay = robots
            .crawl_delay(user_agent)
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO);

        Self {
            robots,
            min_interval: std::cmp::max(configured_interval, robots_delay),
            user_agent: user_agent.to_string(),
        }
    }

    /// Policy that allows every path with the given interval
    pub fn permissive(min_interval: Duration, user_agent: &str) -> Self {
        Self::new(ParsedRobots::allow_all(), min_interval, user_agent)
    }
}

/// Loads the policy for the domain serving `origin`
///
/// robots.txt outcomes map as follows:
///
/// | Response | Rules |
/// |----------|-------|
/// | 2xx | parsed content |
/// | 401 / 403 | disallow all |
/// | other 4xx (404, 410, ...) | allow all |
/// | 5xx, 429 or network error after retries | disallow all |
pub async fn load_policy(
    client: &Client,
    origin: &Url,
    politeness: &PolitenessConfig,
    user_agent: &UserAgentConfig,
) -> DomainPolicy {
    let interval = Duration::from_millis(politeness.min_interval_ms);
    let token = user_agent.crawler_name.as_str();

    if !politeness.respect_robots {
        tracing::debug!("robots.txt handling disabled for {}", origin);
        return DomainPolicy::permissive(interval, token);
    }

    let robots = fetch_robots(client, origin, politeness.robots_retries).await;
    DomainPolicy::new(robots, interval, token)
}

/// Fetches robots.txt for the origin of `origin`
///
/// Never fails: unreachable files degrade to [`ParsedRobots::disallow_all`].
pub async fn fetch_robots(client: &Client, origin: &Url, retries: u32) -> ParsedRobots {
    let robots_url = match origin.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL for {}: {}", origin, e);
            return ParsedRobots::disallow_all();
        }
    };

    for attempt in 0..=retries {
        if attempt > 0 {
            tokio::time::sleep(ROBOTS_RETRY_DELAY * attempt).await;
        }

        match client.get(robots_url.clone()).send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    match response.text().await {
                        Ok(body) => {
                            tracing::debug!("Loaded robots.txt from {}", robots_url);
                            return ParsedRobots::from_content(&body);
                        }
                        Err(e) => {
                            tracing::debug!("robots.txt body read failed for {}: {}", robots_url, e);
                            continue;
                        }
                    }
                }

                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    tracing::info!("robots.txt at {} is {}; treating site as disallowed", robots_url, status);
                    return ParsedRobots::disallow_all();
                }

                if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                    tracing::debug!("No robots.txt at {} ({}); allowing all", robots_url, status);
                    return ParsedRobots::allow_all();
                }

                tracing::debug!(
                    "robots.txt attempt {} for {} returned {}",
                    attempt + 1,
                    robots_url,
                    status
                );
            }
            Err(e) => {
                tracing::debug!(
                    "robots.txt attempt {} for {} failed: {}",
                    attempt + 1,
                    robots_url,
                    e
                );
            }
        }
    }

    tracing::warn!(
        "robots.txt at {} unreachable after {} attempts; treating site as disallowed",
        robots_url,
        retries + 1
    );
    ParsedRobots::disallow_all()
}
