//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent, headers and proxy
//! - Passing every request through the politeness gate
//! - Classifying redirects as same-host hops or off-domain failures
//! - Error classification into retryable and fatal outcomes
//!
//! The fetcher makes exactly one attempt per call; retries belong to the
//! coordinator.

use crate::config::Config;
use crate::robots::{Authorization, PolitenessGate};
use crate::url::{extract_domain, is_same_domain};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, Proxy, Response, StatusCode};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum redirect hops followed from one discovered URL
pub(crate) const MAX_REDIRECTS: u32 = 10;

/// Why a fetch did not produce a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server error (HTTP {0})")]
    ServerError(u16),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("client error (HTTP {0})")]
    ClientError(u16),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("not an HTML page ({0})")]
    NotHtml(String),

    #[error("redirect left the domain: {0}")]
    OffDomainRedirect(String),

    #[error("too many redirects")]
    RedirectLimit,

    #[error("denied by politeness policy: {0}")]
    PolicyDenied(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("cancelled")]
    Cancelled,
}

/// Result of a single fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
        /// URL the body was served from
        final_url: Url,
    },

    /// Transient failure worth retrying
    Retryable {
        reason: FetchFailure,
        /// Server-provided backoff hint from `Retry-After`
        retry_after: Option<Duration>,
    },

    /// Same-host redirect; the target is fetched as a task of its own
    Redirect {
        /// HTTP status code (3xx)
        status_code: u16,
        /// Resolved `Location` target
        location: Url,
    },

    /// Permanent failure; retrying will not help
    Fatal { reason: FetchFailure },
}

/// Builds an HTTP client with proper configuration
///
/// The user agent follows `Name/Version (+ContactURL; ContactEmail)`.
/// Redirects are never followed by the client: every hop has to pass the
/// politeness gate, so [`Fetcher::fetch`] reports them instead.
///
/// # Example
///
/// ```no_run
/// use catalog_mirror::config::Config;
/// use catalog_mirror::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.fetcher.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header {}", name),
        }
    }

    let mut builder = Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .timeout(Duration::from_millis(config.fetcher.request_timeout_ms))
        .connect_timeout(Duration::from_millis(config.fetcher.connect_timeout_ms))
        .redirect(Policy::none())
        .https_only(config.fetcher.https_only)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.fetcher.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

/// Single-attempt fetch primitive
///
/// Checks authorization first, then waits for the domain's slot, then
/// sends the request. Cancellation is observed while waiting for the slot.
pub struct Fetcher {
    client: Client,
    gate: Arc<PolitenessGate>,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(client: Client, gate: Arc<PolitenessGate>, cancel: CancellationToken) -> Self {
        Self {
            client,
            gate,
            cancel,
        }
    }

    /// Fetches `url` once; `attempt` (from 1) is only used for logging
    pub async fn fetch(&self, url: &Url, attempt: u32) -> FetchResult {
        let Some(domain) = extract_domain(url) else {
            return FetchResult::Fatal {
                reason: FetchFailure::InvalidUrl(url.to_string()),
            };
        };

        if let Authorization::Deny(reason) = self.gate.authorize(&domain, &request_path(url)) {
            return FetchResult::Fatal {
                reason: FetchFailure::PolicyDenied(reason),
            };
        }

        if self.cancel.is_cancelled() {
            return FetchResult::Fatal {
                reason: FetchFailure::Cancelled,
            };
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return FetchResult::Fatal { reason: FetchFailure::Cancelled };
            }
            _ = self.gate.await_slot(&domain) => {}
        }

        tracing::debug!("Fetching {} (attempt {})", url, attempt);

        match self.client.get(url.clone()).send().await {
            Ok(response) => classify_response(response, url, &domain).await,
            Err(e) => classify_error(&e),
        }
    }
}

/// Path plus query as matched against robots.txt rules
pub(crate) fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

async fn classify_response(response: Response, url: &Url, domain: &str) -> FetchResult {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchResult::Retryable {
            reason: FetchFailure::RateLimited,
            retry_after: retry_after_header(&response),
        };
    }

    if status.is_server_error() {
        return FetchResult::Retryable {
            reason: FetchFailure::ServerError(status.as_u16()),
            retry_after: retry_after_header(&response),
        };
    }

    if status.is_redirection() {
        return classify_redirect(&response, url, domain);
    }

    if !status.is_success() {
        return FetchResult::Fatal {
            reason: FetchFailure::ClientError(status.as_u16()),
        };
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_lowercase);

    if let Some(content_type) = content_type {
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml+xml") {
            return FetchResult::Fatal {
                reason: FetchFailure::NotHtml(content_type),
            };
        }
    }

    match response.text().await {
        Ok(body) => FetchResult::Success {
            status_code: status.as_u16(),
            body,
            final_url: url.clone(),
        },
        Err(e) => FetchResult::Retryable {
            reason: FetchFailure::Body(e.to_string()),
            retry_after: None,
        },
    }
}

fn classify_redirect(response: &Response, url: &Url, domain: &str) -> FetchResult {
    let Some(target) = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
    else {
        return FetchResult::Fatal {
            reason: FetchFailure::ClientError(response.status().as_u16()),
        };
    };

    let Ok(location) = url.join(target) else {
        return FetchResult::Fatal {
            reason: FetchFailure::InvalidUrl(target.to_string()),
        };
    };

    if !is_same_domain(&location, domain) {
        return FetchResult::Fatal {
            reason: FetchFailure::OffDomainRedirect(location.to_string()),
        };
    }

    FetchResult::Redirect {
        status_code: response.status().as_u16(),
        location,
    }
}

fn classify_error(error: &reqwest::Error) -> FetchResult {
    if error.is_builder() {
        return FetchResult::Fatal {
            reason: FetchFailure::InvalidUrl(error.to_string()),
        };
    }

    if is_tls_error(error) {
        return FetchResult::Fatal {
            reason: FetchFailure::Tls(error.to_string()),
        };
    }

    let reason = if error.is_timeout() {
        FetchFailure::Timeout
    } else if error.is_connect() {
        FetchFailure::Connect(error.to_string())
    } else {
        // Resets and other mid-request I/O failures
        FetchFailure::Request(error.to_string())
    };

    FetchResult::Retryable {
        reason,
        retry_after: None,
    }
}

/// reqwest does not expose TLS failures directly; inspect the source chain
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(inner) = source {
        let message = inner.to_string().to_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("handshake") {
            return true;
        }
        source = inner.source();
    }
    false
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()))
}

/// Parses a `Retry-After` value (delta-seconds or HTTP date) relative to `now`
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((date - now).to_std().unwrap_or(Duration::ZERO))
}
