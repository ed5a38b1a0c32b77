//! Catalog-Mirror main entry point
//!
//! This is the command-line interface for the Catalog-Mirror storefront crawler.

use catalog_mirror::config::{load_config_with_hash, Config};
use catalog_mirror::crawler::{start_crawl, CrawlRequest};
use catalog_mirror::output::{print_report, write_markdown_report};
use catalog_mirror::storage::{MemoryProductStore, ProductStore, SqliteProductStore};
use catalog_mirror::url::{extract_domain, normalize_url};
use catalog_mirror::SessionState;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Catalog-Mirror: a polite storefront catalog crawler
///
/// Catalog-Mirror crawls a single storefront domain while respecting
/// robots.txt and rate limits, recognizes product pages and stores a
/// normalized record for each product it finds.
#[derive(Parser, Debug)]
#[command(name = "catalog-mirror")]
#[command(version)]
#[command(about = "A polite storefront catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Page the crawl starts from; its domain bounds the session
    #[arg(value_name = "START_URL", required_unless_present = "stats")]
    start_url: Option<String>,

    /// Override the configured maximum link depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Override the configured page cap
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "memory"])]
    dry_run: bool,

    /// Keep records in memory instead of the configured database
    #[arg(long)]
    memory: bool,

    /// Show the stored product count and latest session, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "memory"])]
    stats: bool,

    /// Also write the session report as markdown to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(depth) = cli.max_depth {
        config.crawler.max_depth = depth;
    }
    if let Some(pages) = cli.max_pages {
        config.crawler.max_pages = pages.max(1);
    }

    if cli.stats {
        return handle_stats(&config);
    }

    let start_url = cli.start_url.unwrap_or_default();
    let request = CrawlRequest::from_config(&config, start_url).with_config_hash(config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &request)
    } else {
        handle_crawl(config, request, cli.memory, cli.report.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_mirror=info,warn"),
            1 => EnvFilter::new("catalog_mirror=debug,info"),
            2 => EnvFilter::new("catalog_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, request: &CrawlRequest) -> Result<(), Box<dyn std::error::Error>> {
    let start_url = normalize_url(&request.start_url)?;
    let domain = extract_domain(&start_url).unwrap_or_default();

    println!("=== Catalog-Mirror Dry Run ===\n");

    println!("Session:");
    println!("  Store: {}", request.store_id);
    println!("  Start URL: {}", start_url);
    println!("  Domain: {}", domain);
    println!("  Max depth: {}", request.max_depth);
    println!("  Max pages: {}", request.max_pages);
    println!("  Concurrency: {}", config.crawler.concurrency);
    if let Some(budget) = config.crawler.session_budget_secs {
        println!("  Budget: {}s", budget);
    }

    println!("\nPoliteness:");
    println!("  Minimum interval: {}ms", config.politeness.min_interval_ms);
    println!("  Respect robots.txt: {}", config.politeness.respect_robots);

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}ms x{} (max {}ms, jitter {})",
        config.retry.initial_backoff_ms,
        config.retry.multiplier,
        config.retry.max_backoff_ms,
        config.retry.jitter
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Duplicate SKUs: {:?}", config.store.duplicate_sku);

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling {}", start_url);

    Ok(())
}

/// Handles the --stats mode: shows what the database holds for the store
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let store = SqliteProductStore::new(Path::new(&config.output.database_path))?;
    let products = store.count_products(&config.store.id)?;

    println!("Store {}: {} products", config.store.id, products);
    match store.latest_session(&config.store.id)? {
        Some(session) => {
            println!("\nLatest session:");
            println!("  Start URL: {}", session.start_url);
            println!("  Outcome: {}", session.outcome);
            println!("  Started: {}", session.started_at.to_rfc3339());
            println!("  Finished: {}", session.finished_at.to_rfc3339());
            println!("  Pages fetched: {}", session.pages_fetched);
            println!("  Products saved: {}", session.products_saved);
            println!("  Skipped: {}", session.skipped);
        }
        None => println!("No sessions recorded yet"),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    request: CrawlRequest,
    memory: bool,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn ProductStore> = if memory {
        tracing::info!("Keeping records in memory");
        Arc::new(MemoryProductStore::new())
    } else {
        Arc::new(SqliteProductStore::new(Path::new(&config.output.database_path))?)
    };

    let handle = start_crawl(request, config, store)?;

    // Ctrl-C aborts the session; in-flight pages still finish
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping crawl");
            cancel.cancel();
        }
    });

    let summary = handle.wait().await?;
    print_report(&summary);

    if let Some(path) = report_path {
        write_markdown_report(&summary, path)?;
        println!("\n✓ Report written to: {}", path.display());
    }

    match summary.outcome {
        SessionState::FailedFatal => {
            let reason = summary.failure.unwrap_or_else(|| "unknown failure".to_string());
            tracing::error!("Crawl failed: {}", reason);
            Err(reason.into())
        }
        _ => Ok(()),
    }
}
