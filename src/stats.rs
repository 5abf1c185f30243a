//! Outcome statistics for batch cache population.

use std::time::{Duration, Instant};

use serde::Serialize;

/// A manifest entry that could not be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    /// Manifest path of the entry.
    pub path: String,
    /// Why it failed.
    pub reason: String,
}

/// Statistics for one preload (or install) batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadStats {
    /// Entries fetched and stored by this batch.
    pub cached: usize,
    /// Entries that were already present and not fetched.
    pub skipped: usize,
    /// Entries that failed to fetch or store.
    pub failed: Vec<FailedEntry>,
    /// Total body bytes stored by this batch.
    pub total_bytes: u64,
    /// Time taken by the batch.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl Default for PreloadStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PreloadStats {
    /// Creates empty statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cached: 0,
            skipped: 0,
            failed: Vec::new(),
            total_bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns the number of entries the batch looked at.
    #[must_use]
    pub fn total(&self) -> usize {
        self.cached + self.skipped + self.failed.len()
    }

    /// Returns true if no entry failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Accumulates [`PreloadStats`] while a batch runs.
pub struct PreloadStatsBuilder {
    cached: usize,
    skipped: usize,
    failed: Vec<FailedEntry>,
    total_bytes: u64,
    start_time: Instant,
}

impl Default for PreloadStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PreloadStatsBuilder {
    /// Starts timing a new batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cached: 0,
            skipped: 0,
            failed: Vec::new(),
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records a freshly stored entry.
    pub const fn add_cached(&mut self, bytes: u64) {
        self.cached += 1;
        self.total_bytes += bytes;
    }

    /// Records an entry that was already present.
    pub const fn add_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Records a failed entry.
    pub fn add_failed(&mut self, path: &str, reason: impl Into<String>) {
        self.failed.push(FailedEntry {
            path: path.to_string(),
            reason: reason.into(),
        });
    }

    /// Returns the number of failures recorded so far.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Finishes the batch.
    #[must_use]
    pub fn build(mut self) -> PreloadStats {
        self.failed.sort_by(|a, b| a.path.cmp(&b.path));
        PreloadStats {
            cached: self.cached,
            skipped: self.skipped,
            failed: self.failed,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
