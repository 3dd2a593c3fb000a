//! Progress reporting and summaries
//!
//! A spinner for scans and a bar fed from the live batch counters by a
//! refresh thread, plus the summaries printed when an operation ends.

use crate::engine::ImportReport;
use crate::index::PruneReport;
use crate::ops::{BatchCounters, BatchReport};
use crate::walker::TraversalResult;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Refresh period of the batch bar
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Spinner shown while scanning
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new spinner
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bar that follows a running batch
pub struct BatchProgress {
    bar: ProgressBar,
    stop: Arc<AtomicBool>,
    refresher: Option<JoinHandle<()>>,
}

impl BatchProgress {
    /// Start refreshing from `counters`
    pub fn start(label: &str, counters: Arc<BatchCounters>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());

        let stop = Arc::new(AtomicBool::new(false));
        let refresher = {
            let bar = bar.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("progress".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        refresh(&bar, &counters);
                        thread::sleep(REFRESH_INTERVAL);
                    }
                    refresh(&bar, &counters);
                })
        };
        let refresher = match refresher {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Progress display unavailable");
                None
            }
        };

        Self { bar, stop, refresher }
    }

    /// Stop refreshing and clear the bar
    pub fn finish(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresher.take() {
            let _ = handle.join();
        }
        self.bar.finish_and_clear();
    }
}

fn refresh(bar: &ProgressBar, counters: &BatchCounters) {
    bar.set_length(counters.total() as u64);
    bar.set_position(counters.processed() as u64);

    let total_bytes = counters.total_bytes();
    let msg = if total_bytes > 0 {
        let percent = (counters.bytes() as f64 / total_bytes as f64 * 100.0).min(100.0);
        format!(
            "{} / {} ({:.0}%) | failed: {}",
            format_size(counters.bytes(), BINARY),
            format_size(total_bytes, BINARY),
            percent,
            counters.failed()
        )
    } else {
        format!("{} | failed: {}", format_size(counters.bytes(), BINARY), counters.failed())
    };
    bar.set_message(msg);
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header before a long operation
pub fn print_header(action: &str, workers: usize, index: &str) {
    println!();
    println!(
        "{} {}",
        style("iso-commander").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Action:").bold(), action);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Index:").bold(), index);
    println!();
}

/// Print the numbered list of paths
pub fn print_list(entries: &[String], filters: &[&str]) {
    if !filters.is_empty() {
        println!("{} {}", style("Filters:").bold(), filters.join(" > "));
    }
    let width = entries.len().to_string().len();
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>width$}. {}", style(i + 1).green(), entry, width = width);
    }
    println!(
        "{}",
        style(format!("{} images", format_number(entries.len() as u64))).dim()
    );
}

fn print_messages(title: &str, messages: &BTreeSet<String>) {
    if messages.is_empty() {
        return;
    }
    println!("  {}", style(title).bold());
    for message in messages {
        println!("    {}", message);
    }
}

fn print_traversal(traversal: &TraversalResult, verbose: bool) {
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(traversal.dirs)
    );
    println!(
        "  {} {}",
        style("Images found:").bold(),
        format_number(traversal.paths.len() as u64)
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        traversal.duration.as_secs_f64()
    );
    if !traversal.errors.is_empty() {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(traversal.errors.len() as u64)
        );
        if verbose {
            print_messages("Errors", &traversal.errors);
        }
    }
}

/// Print a summary of an import
pub fn print_import_summary(report: &ImportReport, verbose: bool) {
    let title = if report.traversal.interrupted {
        style("Import Interrupted").yellow().bold()
    } else {
        style("Import Complete").green().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    print_traversal(&report.traversal, verbose);
    println!(
        "  {} {}",
        style("New in index:").bold(),
        format_number(report.saved.added as u64)
    );
    if report.saved.evicted > 0 {
        println!(
            "  {} {}",
            style("Evicted (oldest):").yellow().bold(),
            format_number(report.saved.evicted as u64)
        );
    }
    if !report.saved.found_new() && !report.traversal.paths.is_empty() {
        println!("  {}", style("No new images; the index is up to date").dim());
    }
    println!();
}

/// Print a summary of a scan for convertible images
pub fn print_scan_summary(traversal: &TraversalResult, verbose: bool) {
    println!();
    println!("{}", style("Scan Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    print_traversal(traversal, verbose);
    println!();
}

/// Print a summary of a prune pass
pub fn print_prune_summary(report: &PruneReport) {
    println!();
    println!("{}", style("Prune Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Checked:").bold(), format_number(report.checked as u64));
    println!("  {} {}", style("Removed:").bold(), format_number(report.removed as u64));
    println!("  {} {}", style("Remaining:").bold(), format_number(report.remaining as u64));
    println!();
}

/// Print a summary of a batch
pub fn print_batch_summary(report: &BatchReport, verbose: bool) {
    let title = if report.cancelled {
        style(format!("{} Interrupted", capitalize(&report.kind.to_string()))).yellow().bold()
    } else {
        style(format!("{} Complete", capitalize(&report.kind.to_string()))).green().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style(format!("{}:", report.kind.past_tense())).bold(),
        format_number(report.completed as u64)
    );
    if report.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(report.skipped as u64)
        );
    }
    if report.errors() > 0 {
        println!(
            "  {} {}",
            style("Failed:").red().bold(),
            format_number(report.errors() as u64)
        );
    }
    println!("  {} {}", style("Data:").bold(), format_size(report.bytes, BINARY));
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        report.duration.as_secs_f64()
    );

    if verbose {
        print_messages("Succeeded", &report.messages.successes);
    }
    print_messages("Skipped", &report.messages.skips);
    print_messages("Failed", &report.messages.failures);
    print_messages("Warnings", &report.messages.warnings);
    println!();
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
