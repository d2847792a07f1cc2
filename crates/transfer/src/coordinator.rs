//! Completion handlers that drive a transfer one buffer at a time.
//!
//! The coordinator owns the [`TransferState`] and reacts to two events:
//!
//! - a **write completion** credits the written bytes and, if data remains,
//!   schedules the next read into the same buffer;
//! - a **read completion** schedules a write of exactly the bytes read at the
//!   current transferred offset.
//!
//! [`PipelineCoordinator::bootstrap`] starts the cycle by feeding a synthetic
//! zero-byte write completion, so the first read is scheduled by the same code
//! path as every later one. At most one request is outstanding at any time.
//!
//! ```text
//! bootstrap ─▶ on_write_complete ─▶ read_async ─▶ on_read_complete ─▶ write_async ─┐
//!                    ▲                                                            │
//!                    └────────────────────────────────────────────────────────────┘
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fast_io::{Completion, DataSink, DataSource, Operation, Tag, TransferBuffer};
use tracing::{debug, trace};

use crate::error::TransferError;
use crate::plan::ChunkPlan;
use crate::state::{TransferPhase, TransferState};

/// Shared flag used to stop a transfer at its next completion.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the shared flag so a signal handler can set it directly.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// The request currently holding the buffer.
#[derive(Clone, Copy, Debug)]
struct Outstanding {
    offset: u64,
}

/// Schedules reads and writes in response to completions.
#[derive(Debug)]
pub struct PipelineCoordinator {
    state: TransferState,
    plan: ChunkPlan,
    cancel: CancelHandle,
    outstanding: Option<Outstanding>,
}

impl PipelineCoordinator {
    /// Creates a coordinator that will move `total_bytes` through `buffer`.
    #[must_use]
    pub fn new(buffer: TransferBuffer, total_bytes: u64) -> Self {
        let plan = ChunkPlan::new(total_bytes, buffer.capacity());
        Self {
            state: TransferState::new(buffer, total_bytes),
            plan,
            cancel: CancelHandle::default(),
            outstanding: None,
        }
    }

    /// Read-only view of the transfer state.
    #[must_use]
    pub const fn state(&self) -> &TransferState {
        &self.state
    }

    /// Returns a handle that cancels this transfer.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Starts the transfer by simulating a completed zero-byte write.
    ///
    /// A zero-length resource finishes here without issuing any read. Calling
    /// this on a coordinator that already started does nothing.
    pub fn bootstrap<S>(&mut self, source: &mut S) -> Result<TransferPhase, TransferError>
    where
        S: DataSource + ?Sized,
    {
        if self.state.phase() != TransferPhase::NotStarted {
            return Ok(self.state.phase());
        }
        let Some(buffer) = self.state.take_buffer() else {
            return Ok(self.state.phase());
        };
        debug!(
            target: "fetchpipe::pipeline",
            total = self.state.total_bytes(),
            chunks = self.plan.chunk_count(),
            "pipeline starting"
        );
        self.on_write_complete(Completion::new(Operation::Write, buffer, 0, Ok(0)), source)
    }

    /// Routes `completion` to the handler for its direction.
    pub fn on_completion<S, K>(
        &mut self,
        completion: Completion,
        source: &mut S,
        sink: &mut K,
    ) -> Result<TransferPhase, TransferError>
    where
        S: DataSource + ?Sized,
        K: DataSink + ?Sized,
    {
        match completion.operation() {
            Operation::Read => self.on_read_complete(completion, sink),
            Operation::Write => self.on_write_complete(completion, source),
        }
    }

    /// Handles a finished write: credits it and schedules the next read.
    pub fn on_write_complete<S>(
        &mut self,
        completion: Completion,
        source: &mut S,
    ) -> Result<TransferPhase, TransferError>
    where
        S: DataSource + ?Sized,
    {
        let (buffer, requested, result) = completion.into_parts();
        if self.state.phase().is_terminal() {
            self.state.park_buffer(buffer);
            return Ok(self.state.phase());
        }
        let offset = self
            .outstanding
            .take()
            .map_or(self.state.transferred_bytes(), |request| request.offset);

        let written = match result {
            Ok(written) => written as u64,
            Err(error) => return Err(self.fail(buffer, Operation::Write, offset, requested, error)),
        };
        if written != requested {
            let error = io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {requested} bytes"),
            );
            return Err(self.fail(buffer, Operation::Write, offset, requested, error));
        }
        if let Err(error) = self.state.record_written(written) {
            return Err(self.fail(buffer, Operation::Write, offset, requested, error));
        }
        trace!(
            target: "fetchpipe::pipeline",
            offset,
            written,
            transferred = self.state.transferred_bytes(),
            "write completed"
        );

        if self.state.remaining_bytes() == 0 {
            self.state.park_buffer(buffer);
            self.state.set_phase(TransferPhase::Done);
            debug!(
                target: "fetchpipe::pipeline",
                bytes = self.state.transferred_bytes(),
                reads = self.state.reads(),
                writes = self.state.writes(),
                "pipeline finished"
            );
            return Ok(TransferPhase::Done);
        }
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(buffer));
        }

        let offset = self.state.transferred_bytes();
        let len = self.plan.chunk_at(offset);
        match source.read_async(buffer, offset, len, len as Tag) {
            Ok(()) => {
                self.outstanding = Some(Outstanding { offset });
                self.state.note_read();
                self.state.set_phase(TransferPhase::Reading);
                trace!(target: "fetchpipe::pipeline", offset, len, "read scheduled");
                Ok(TransferPhase::Reading)
            }
            Err(rejected) => {
                let (error, buffer) = rejected.into_parts();
                Err(self.fail(buffer, Operation::Read, offset, len as Tag, error))
            }
        }
    }

    /// Handles a finished read: writes what was read at the transferred offset.
    pub fn on_read_complete<K>(
        &mut self,
        completion: Completion,
        sink: &mut K,
    ) -> Result<TransferPhase, TransferError>
    where
        K: DataSink + ?Sized,
    {
        let (buffer, requested, result) = completion.into_parts();
        if self.state.phase().is_terminal() {
            self.state.park_buffer(buffer);
            return Ok(self.state.phase());
        }
        let offset = self
            .outstanding
            .take()
            .map_or(self.state.transferred_bytes(), |request| request.offset);

        let read = match result {
            Ok(read) => read,
            Err(error) => return Err(self.fail(buffer, Operation::Read, offset, requested, error)),
        };
        if read as u64 != requested {
            let error = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read: {read} of {requested} bytes"),
            );
            return Err(self.fail(buffer, Operation::Read, offset, requested, error));
        }
        trace!(target: "fetchpipe::pipeline", offset, read, "read completed");

        if self.cancel.is_cancelled() {
            return Err(self.cancelled(buffer));
        }

        let offset = self.state.transferred_bytes();
        match sink.write_async(buffer, offset, read, read as Tag) {
            Ok(()) => {
                self.outstanding = Some(Outstanding { offset });
                self.state.note_write();
                self.state.set_phase(TransferPhase::Writing);
                trace!(target: "fetchpipe::pipeline", offset, len = read, "write scheduled");
                Ok(TransferPhase::Writing)
            }
            Err(rejected) => {
                let (error, buffer) = rejected.into_parts();
                Err(self.fail(buffer, Operation::Write, offset, read as Tag, error))
            }
        }
    }

    /// Drops the transfer buffer if it is parked here.
    pub fn release_buffer(&mut self) {
        self.state.release_buffer();
    }

    fn fail(
        &mut self,
        buffer: TransferBuffer,
        direction: Operation,
        offset: u64,
        len: u64,
        source: io::Error,
    ) -> TransferError {
        self.state.park_buffer(buffer);
        self.state.set_phase(TransferPhase::Failed);
        debug!(
            target: "fetchpipe::pipeline",
            %direction,
            offset,
            len,
            error = %source,
            "pipeline failed"
        );
        TransferError::Io {
            direction,
            offset,
            len,
            source,
        }
    }

    fn cancelled(&mut self, buffer: TransferBuffer) -> TransferError {
        self.state.park_buffer(buffer);
        self.state.set_phase(TransferPhase::Cancelled);
        let transferred = self.state.transferred_bytes();
        debug!(target: "fetchpipe::pipeline", transferred, "pipeline cancelled");
        TransferError::Cancelled { transferred }
    }
}
