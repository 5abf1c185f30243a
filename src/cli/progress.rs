//! Progress bar and summary reporting for CLI preloads.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{InstallOutcome, PreloadProgress, PreloadStats, format_bytes, format_preload_summary};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar counting manifest entries.
pub fn make_entry_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} clips - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar
}

/// Drives a progress bar from preload events.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PreloadProgress for BarProgress {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_entry_skipped(&self, path: &str) {
        self.bar.set_message(path.to_string());
        self.bar.inc(1);
    }

    fn on_entry_cached(&self, path: &str, bytes: u64) {
        self.bar
            .set_message(format!("{path} ({})", format_bytes(bytes)));
        self.bar.inc(1);
    }

    fn on_error(&self, path: &str, error: &str) {
        self.bar
            .println(format!("  {} {path}: {error}", style("✗").red()));
        self.bar.inc(1);
    }
}

/// Prints the outcome of an install.
pub fn print_install(cache_name: &str, outcome: &InstallOutcome) {
    if outcome.failed == 0 {
        println!(
            "{} Installed {cache_name}: {} core file(s) cached",
            style("✓").green(),
            outcome.cached
        );
    } else {
        println!(
            "{} Install of {cache_name} incomplete: {} core file(s) failed, nothing stored",
            style("!").yellow(),
            outcome.failed
        );
    }
}

/// Prints a summary of a preload batch.
pub fn print_preload_summary(stats: &PreloadStats) {
    println!("\n{SEPARATOR}");
    println!("Audio Preload Summary");
    println!("{SEPARATOR}");
    println!("  {}", format_preload_summary(stats));
    for failed in &stats.failed {
        println!("  {} {}: {}", style("✗").red(), failed.path, failed.reason);
    }
    println!("{SEPARATOR}");
}
