//! Per-transfer bookkeeping.
//!
//! [`TransferState`] is plain data: the buffer (while no request holds it),
//! the byte counters and the phase. The coordinator is the only writer.

use std::io;

use fast_io::TransferBuffer;

/// Where the pipeline currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    /// Set up but not yet bootstrapped.
    NotStarted,
    /// A read is outstanding against the buffer.
    Reading,
    /// A write is outstanding against the buffer.
    Writing,
    /// Every byte has been written.
    Done,
    /// A completion reported an error; nothing further is scheduled.
    Failed,
    /// Cancelled at a completion boundary.
    Cancelled,
}

impl TransferPhase {
    /// Returns true for phases that never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Returns true while a request holds the buffer.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Reading | Self::Writing)
    }
}

/// Counters, phase and idle buffer of a single transfer.
#[derive(Debug)]
pub struct TransferState {
    buffer: Option<TransferBuffer>,
    capacity: usize,
    total_bytes: u64,
    transferred_bytes: u64,
    phase: TransferPhase,
    reads: u64,
    writes: u64,
}

impl TransferState {
    /// Creates the state for a transfer of `total_bytes` through `buffer`.
    #[must_use]
    pub fn new(buffer: TransferBuffer, total_bytes: u64) -> Self {
        Self {
            capacity: buffer.capacity(),
            buffer: Some(buffer),
            total_bytes,
            transferred_bytes: 0,
            phase: TransferPhase::NotStarted,
            reads: 0,
            writes: 0,
        }
    }

    /// Total size of the resource, fixed for the transfer.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes acknowledged by the sink so far.
    #[must_use]
    pub const fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// Bytes still to be written.
    #[must_use]
    pub const fn remaining_bytes(&self) -> u64 {
        self.total_bytes - self.transferred_bytes
    }

    /// True once every byte has been written.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == TransferPhase::Done
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Capacity of the transfer buffer.
    #[must_use]
    pub const fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reads issued.
    #[must_use]
    pub const fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of writes issued.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Returns true while the buffer is parked in the state.
    #[must_use]
    pub const fn holds_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn take_buffer(&mut self) -> Option<TransferBuffer> {
        self.buffer.take()
    }

    pub(crate) fn park_buffer(&mut self, buffer: TransferBuffer) {
        self.buffer = Some(buffer);
    }

    pub(crate) fn release_buffer(&mut self) {
        self.buffer = None;
    }

    pub(crate) fn set_phase(&mut self, phase: TransferPhase) {
        if !self.phase.is_terminal() {
            self.phase = phase;
        }
    }

    pub(crate) fn note_read(&mut self) {
        self.reads += 1;
    }

    pub(crate) fn note_write(&mut self) {
        self.writes += 1;
    }

    /// Adds `bytes` to the transferred count.
    ///
    /// The count never passes the total; a completion claiming otherwise is
    /// rejected and leaves the count unchanged.
    pub(crate) fn record_written(&mut self, bytes: u64) -> io::Result<()> {
        if bytes > self.remaining_bytes() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "sink acknowledged {bytes} bytes with only {} remaining",
                    self.remaining_bytes()
                ),
            ));
        }
        self.transferred_bytes += bytes;
        Ok(())
    }
}
