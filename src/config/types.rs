use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Catalog-Mirror
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl bounds and worker pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from the start URL
    pub max_depth: u32,

    /// Maximum number of tasks dispatched in one session
    pub max_pages: u32,

    /// Number of concurrent fetch-classify-extract pipelines
    pub concurrency: u32,

    /// Optional wall-clock budget for the whole session (seconds)
    #[serde(default)]
    pub session_budget_secs: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 500,
            concurrency: 4,
            session_budget_secs: None,
        }
    }
}

/// Robots.txt and rate limiting behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same domain (milliseconds)
    pub min_interval_ms: u64,

    /// Whether robots.txt is fetched and honoured
    pub respect_robots: bool,

    /// Extra attempts when robots.txt is unreachable
    pub robots_retries: u32,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            respect_robots: true,
            robots_retries: 2,
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    pub connect_timeout_ms: u64,

    /// Overall deadline for a single request, body included
    pub request_timeout_ms: u64,

    /// Optional proxy URL applied to all requests
    #[serde(default)]
    pub proxy: Option<String>,

    /// Refuse plain HTTP URLs
    #[serde(default)]
    pub https_only: bool,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            proxy: None,
            https_only: false,
            headers: BTreeMap::new(),
        }
    }
}

/// Retry/backoff policy for retryable fetch outcomes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,

    /// Upper bound of the random extra delay, as a fraction of the backoff
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Page classifier tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassifierConfig {
    pub confidence_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full user agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CatalogMirror".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Store the crawl feeds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Identifier records are persisted under
    pub id: String,

    /// Locale used to read ambiguous prices when the page gives no hint
    #[serde(default = "default_locale")]
    pub locale: String,

    /// ISO 4217 code used when a page shows no currency
    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default)]
    pub duplicate_sku: DuplicateSkuSetting,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            locale: default_locale(),
            default_currency: default_currency(),
            duplicate_sku: DuplicateSkuSetting::default(),
        }
    }
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

/// What to do when a record's SKU is already stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateSkuSetting {
    /// Most recent extraction wins
    #[default]
    Replace,
    /// Keep the stored record
    Ignore,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./catalog.db".to_string(),
        }
    }
}
