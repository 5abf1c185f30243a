//! Human-readable formatting for CLI and log output.

use std::time::Duration;

use crate::stats::PreloadStats;

/// Formats a byte count using binary units (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[(&str, u64)] = &[("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

    UNITS
        .iter()
        .find(|(_, size)| bytes >= *size)
        .map_or_else(
            || format!("{bytes} B"),
            |(unit, size)| format!("{:.2} {unit}", bytes as f64 / *size as f64),
        )
}

/// Formats a short duration: milliseconds below one second, otherwise
/// seconds with one decimal, minutes once past a minute.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{secs}.{}s", d.subsec_millis() / 100)
    } else {
        format!("{}ms", d.subsec_millis())
    }
}

/// One-line summary of a preload batch.
#[must_use]
pub fn format_preload_summary(stats: &PreloadStats) -> String {
    let mut line = format!(
        "{} cached ({}), {} already present",
        stats.cached,
        format_bytes(stats.total_bytes),
        stats.skipped
    );
    if !stats.failed.is_empty() {
        line.push_str(&format!(", {} failed", stats.failed.len()));
    }
    line.push_str(&format!(" in {}", format_duration(stats.elapsed)));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PreloadStatsBuilder;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
    }

    #[test]
    fn summary_mentions_failures_only_when_present() {
        let mut builder = PreloadStatsBuilder::new();
        builder.add_cached(2048);
        builder.add_skipped();
        let clean = format_preload_summary(&builder.build());
        assert!(clean.starts_with("1 cached (2.00 KB), 1 already present in "));

        let mut builder = PreloadStatsBuilder::new();
        builder.add_failed("/audio/commander/numbers/3.mp3", "offline");
        assert!(format_preload_summary(&builder.build()).contains(", 1 failed"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn format_bytes_never_panics(bytes in 0u64..u64::MAX) {
                let _ = format_bytes(bytes);
            }

            #[test]
            fn format_duration_never_panics(millis in 0u64..10_000_000) {
                let _ = format_duration(Duration::from_millis(millis));
            }
        }
    }
}
