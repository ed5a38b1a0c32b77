//! Output module for crawl reports
//!
//! This module handles:
//! - Printing a finished session's report to the console
//! - Writing the same report as a markdown document

mod report;

pub use report::{format_markdown_report, print_report, skip_rate, write_markdown_report};
