//! Tunables for a single transfer.
//!
//! Every builder clamps its input to a documented range so a configuration
//! assembled from user input is always usable.

use std::time::Duration;

/// Default capacity of the transfer buffer in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = fast_io::DEFAULT_BUFFER_CAPACITY;

/// Smallest buffer capacity accepted.
pub const MIN_BUFFER_CAPACITY: usize = 16;

/// Largest buffer capacity accepted (64 MiB).
pub const MAX_BUFFER_CAPACITY: usize = 64 * 1024 * 1024;

/// Default delay between scheduling slices when nothing completed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest delay accepted between scheduling slices.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration of a remote-to-local copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    /// Capacity of the single transfer buffer.
    pub buffer_capacity: usize,
    /// Sync the destination to stable storage when the sink closes.
    pub fsync: bool,
    /// Sleep between idle scheduling slices in [`run_to_completion`].
    ///
    /// [`run_to_completion`]: crate::TransferSession::run_to_completion
    pub poll_interval: Duration,
    /// Upper bound on establishing a network connection.
    pub connect_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fsync: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: None,
        }
    }
}

impl TransferConfig {
    /// Sets the buffer capacity, clamped to
    /// [`MIN_BUFFER_CAPACITY`]..=[`MAX_BUFFER_CAPACITY`].
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.clamp(MIN_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY);
        self
    }

    /// Requests an fsync of the destination on close.
    #[must_use]
    pub const fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// Sets the idle poll interval, capped at [`MAX_POLL_INTERVAL`].
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.min(MAX_POLL_INTERVAL);
        self
    }

    /// Bounds connection setup; `None` waits as long as the OS allows.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }
}
