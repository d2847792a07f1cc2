//! Progress snapshots and the end-of-transfer summary.

use std::fmt;
use std::time::Duration;

/// Point-in-time view of a running transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written so far.
    pub transferred: u64,
    /// Total size of the resource.
    pub total: u64,
}

impl TransferProgress {
    /// Completion percentage, rounded down. An empty resource is 100%.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let percent = u128::from(self.transferred) * 100 / u128::from(self.total);
        u8::try_from(percent.min(100)).unwrap_or(100)
    }

    /// Returns true once every byte was written.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>15} of {} bytes {:>3}%",
            self.transferred,
            self.total,
            self.percent()
        )
    }
}

/// Totals reported when a transfer finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferSummary {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// Reads issued against the source.
    pub reads: u64,
    /// Writes issued against the sink.
    pub writes: u64,
    /// Wall-clock time from start to the last completion.
    pub elapsed: Duration,
}

impl TransferSummary {
    /// Average throughput in bytes per second, if any time elapsed.
    #[must_use]
    pub fn bytes_per_second(&self) -> Option<f64> {
        let seconds = self.elapsed.as_secs_f64();
        (seconds > 0.0).then(|| self.bytes as f64 / seconds)
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {} bytes in {} reads and {} writes ({:.3}s)",
            self.bytes,
            self.reads,
            self.writes,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down_and_handles_empty() {
        let progress = TransferProgress {
            transferred: 4096,
            total: 10_000,
        };
        assert_eq!(progress.percent(), 40);
        assert!(!progress.is_complete());

        let empty = TransferProgress {
            transferred: 0,
            total: 0,
        };
        assert_eq!(empty.percent(), 100);
        assert!(empty.is_complete());
    }

    #[test]
    fn percent_does_not_overflow_for_huge_sizes() {
        let progress = TransferProgress {
            transferred: u64::MAX - 1,
            total: u64::MAX,
        };
        assert_eq!(progress.percent(), 99);
    }

    #[test]
    fn progress_display_is_aligned() {
        let progress = TransferProgress {
            transferred: 8192,
            total: 10_000,
        };
        assert_eq!(progress.to_string(), "           8192 of 10000 bytes  81%");
    }

    #[test]
    fn summary_display_and_rate() {
        let summary = TransferSummary {
            bytes: 10_000,
            reads: 3,
            writes: 3,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(
            summary.to_string(),
            "received 10000 bytes in 3 reads and 3 writes (0.500s)"
        );
        assert_eq!(summary.bytes_per_second(), Some(20_000.0));

        let instant = TransferSummary {
            elapsed: Duration::ZERO,
            ..summary
        };
        assert_eq!(instant.bytes_per_second(), None);
    }
}
