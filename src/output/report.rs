//! Session report rendering
//!
//! Turns a finished session's [`SessionSummary`] into a plain-text console
//! report or a markdown document.

use crate::crawler::{SessionSummary, SkipReason};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Prints a session summary to stdout
pub fn print_report(summary: &SessionSummary) {
    let report = &summary.report;

    println!("=== Crawl Report ===\n");

    println!("Session:");
    println!("  Store: {}", summary.store_id);
    println!("  Start URL: {}", summary.start_url);
    println!("  Outcome: {}", summary.outcome);
    if let Some(reason) = &summary.failure {
        println!("  Reason: {}", reason);
    }
    println!("  Duration: {:.1}s", duration_seconds(summary));
    println!();

    println!("Pages:");
    println!("  Dispatched: {} (limit {})", report.dispatched, summary.max_pages);
    println!("  Fetched: {}", report.pages_fetched);
    println!("  Category pages: {}", report.categories);
    println!("  Retries: {}", report.retries);
    println!("  Redirects: {}", report.redirects);
    println!("  External links ignored: {}", report.external_links_ignored);
    println!("  Fetch failure rate: {:.1}%", skip_rate(summary));
    println!();

    println!("Products:");
    println!("  Extracted: {}", report.products_extracted);
    println!("  Saved: {}", report.products_saved);
    println!("  Duplicates: {}", report.duplicates);
    println!();

    if report.total_skipped() > 0 {
        println!("Skipped URLs ({}):", report.total_skipped());
        for (reason, count) in &report.skips {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !report.storage_warnings.is_empty() {
        println!("Storage Warnings ({}):", report.storage_warnings.len());
        for warning in &report.storage_warnings {
            println!("  - {}", warning);
        }
    }
}

/// Writes the markdown form of a summary to `output_path`
pub fn write_markdown_report(summary: &SessionSummary, output_path: &Path) -> std::io::Result<()> {
    let mut file = File::create(output_path)?;
    file.write_all(format_markdown_report(summary).as_bytes())
}

/// Formats a session summary as markdown
pub fn format_markdown_report(summary: &SessionSummary) -> String {
    let report = &summary.report;
    let mut md = String::new();

    md.push_str("# Catalog Mirror Crawl Report\n\n");

    md.push_str("## Session\n\n");
    md.push_str(&format!("- **Store**: {}\n", summary.store_id));
    md.push_str(&format!("- **Start URL**: {}\n", summary.start_url));
    md.push_str(&format!("- **Domain**: {}\n", summary.domain));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        duration_seconds(summary)
    ));
    md.push_str(&format!("- **Outcome**: {}\n", summary.outcome));
    if let Some(reason) = &summary.failure {
        md.push_str(&format!("- **Reason**: {}\n", reason));
    }
    md.push('\n');

    md.push_str("## Pages\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Dispatched | {} |\n", report.dispatched));
    md.push_str(&format!("| Fetched | {} |\n", report.pages_fetched));
    md.push_str(&format!("| Category pages | {} |\n", report.categories));
    md.push_str(&format!("| Retries | {} |\n", report.retries));
    md.push_str(&format!("| Redirects | {} |\n", report.redirects));
    md.push_str(&format!(
        "| External links ignored | {} |\n\n",
        report.external_links_ignored
    ));

    md.push_str("## Products\n\n");
    md.push_str(&format!("- **Extracted**: {}\n", report.products_extracted));
    md.push_str(&format!("- **Saved**: {}\n", report.products_saved));
    md.push_str(&format!("- **Duplicates**: {}\n\n", report.duplicates));

    if report.total_skipped() > 0 {
        md.push_str("## Skipped URLs\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("|--------|-------|\n");
        for (reason, count) in &report.skips {
            md.push_str(&format!("| {} | {} |\n", reason, count));
        }
        md.push('\n');
    }

    if !report.storage_warnings.is_empty() {
        md.push_str("## Storage Warnings\n\n");
        for warning in &report.storage_warnings {
            md.push_str(&format!("- {}\n", warning));
        }
        md.push('\n');
    }

    md
}

fn duration_seconds(summary: &SessionSummary) -> f64 {
    (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
}

/// Share of dispatched pages whose fetch was given up on, as a percentage
pub fn skip_rate(summary: &SessionSummary) -> f64 {
    let report = &summary.report;
    if report.dispatched == 0 {
        return 0.0;
    }
    let fetch_skips: u64 = report
        .skips
        .iter()
        .filter(|(reason, _)| matches!(reason, SkipReason::Transient | SkipReason::Permanent))
        .map(|(_, count)| count)
        .sum();
    fetch_skips as f64 / report.dispatched as f64 * 100.0
}
