//! Lifecycle of a single remote-to-local copy.
//!
//! [`copy_remote_file_to_local`] performs every setup step in order and
//! returns a running [`TransferSession`]. The host then calls
//! [`TransferSession::task`] repeatedly; each call gives the source and then
//! the sink one scheduling slice and routes any completion to the
//! [`PipelineCoordinator`]. [`TransferSession::teardown`] closes both
//! endpoints and releases the buffer; it is idempotent and also runs on drop.
//! [`TransferSession::close`] does the same and also reports whether the
//! destination was flushed successfully.

use std::io;
use std::path::Path;
use std::thread;
use std::time::Instant;

use fast_io::{Completion, DataSink, DataSource, LocalFileSink, Operation, TransferBuffer};
use tracing::{debug, info, warn};
use transport::{RemoteDescriptor, RemoteSource};

use crate::config::TransferConfig;
use crate::coordinator::{CancelHandle, PipelineCoordinator};
use crate::destination::{ensure_distinct, prepare_destination};
use crate::error::{SetupStage, TransferError};
use crate::progress::{TransferProgress, TransferSummary};
use crate::state::TransferPhase;

/// A session copying from a URL into a local file.
pub type RemoteTransfer = TransferSession<RemoteSource, LocalFileSink>;

/// What [`TransferSession::task`] observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    /// A request is outstanding; keep calling `task`.
    Running,
    /// Every byte was written.
    Done,
    /// A completion reported an error and the endpoints were torn down.
    Failed,
    /// The transfer was cancelled and the endpoints were torn down.
    Cancelled,
}

impl TransferStatus {
    /// Returns true for every status except [`TransferStatus::Running`].
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Copies the resource at `url` into `destination`.
///
/// Setup runs in a fixed order: the URL is parsed, the destination is removed
/// and recreated empty, the source is opened and sized, the sink is opened,
/// the buffer is allocated, and the first read is issued. The first failing
/// step is reported as [`TransferError::Setup`] and everything opened before it
/// is closed again. A destination created before the failure is left in place.
///
/// A `file` URL naming the destination itself fails at
/// [`SetupStage::PrepareDestination`] before anything is removed.
pub fn copy_remote_file_to_local(
    url: &str,
    destination: impl AsRef<Path>,
    config: &TransferConfig,
) -> Result<RemoteTransfer, TransferError> {
    let destination = destination.as_ref();
    let descriptor = RemoteDescriptor::parse(url)
        .map_err(|error| TransferError::setup(SetupStage::ParseUrl, error))?;
    if let Some(source_path) = descriptor.file_path() {
        ensure_distinct(&source_path, destination)
            .map_err(|error| TransferError::setup(SetupStage::PrepareDestination, error))?;
    }
    prepare_destination(destination)
        .map_err(|error| TransferError::setup(SetupStage::PrepareDestination, error))?;

    info!(
        target: "fetchpipe::misc",
        url = %descriptor,
        destination = %destination.display(),
        "receiving"
    );

    let source = RemoteSource::new(descriptor).with_connect_timeout(config.connect_timeout);
    let sink = LocalFileSink::new(destination).with_fsync(config.fsync);
    TransferSession::start(source, sink, config)
}

/// A running transfer between a source and a sink.
#[derive(Debug)]
pub struct TransferSession<S: DataSource, K: DataSink> {
    source: S,
    sink: K,
    coordinator: PipelineCoordinator,
    status: TransferStatus,
    failure: Option<TransferError>,
    config: TransferConfig,
    started: Instant,
    finished: Option<Instant>,
    torn_down: bool,
}

impl<S: DataSource, K: DataSink> TransferSession<S, K> {
    /// Opens both endpoints and issues the first read.
    ///
    /// `source` and `sink` must be closed. On failure both are closed before
    /// the error is returned.
    pub fn start(mut source: S, mut sink: K, config: &TransferConfig) -> Result<Self, TransferError> {
        let total = match open_endpoints(&mut source, &mut sink) {
            Ok(total) => total,
            Err(error) => {
                close_endpoints(&mut source, &mut sink);
                return Err(error);
            }
        };
        let buffer = match TransferBuffer::try_allocate(config.buffer_capacity) {
            Ok(buffer) => buffer,
            Err(source_error) => {
                close_endpoints(&mut source, &mut sink);
                return Err(TransferError::ResourceExhausted {
                    capacity: config.buffer_capacity,
                    source: source_error,
                });
            }
        };
        debug!(
            target: "fetchpipe::pipeline",
            total,
            buffer = config.buffer_capacity,
            "endpoints open"
        );

        let mut session = Self {
            source,
            sink,
            coordinator: PipelineCoordinator::new(buffer, total),
            status: TransferStatus::Running,
            failure: None,
            config: config.clone(),
            started: Instant::now(),
            finished: None,
            torn_down: false,
        };

        match session.coordinator.bootstrap(&mut session.source) {
            Ok(TransferPhase::Done) => session.finish(),
            Ok(_) => {}
            Err(error) => {
                session.teardown();
                return Err(match error {
                    TransferError::Io { source, .. } => {
                        TransferError::setup(SetupStage::Start, source)
                    }
                    other => other,
                });
            }
        }
        Ok(session)
    }

    /// Gives each endpoint one scheduling slice and reports the status.
    ///
    /// Completions are handled inside this call, source first. A slice that
    /// completes nothing while cancellation is requested tears the transfer
    /// down, so a stalled endpoint cannot keep it alive. Once the transfer has
    /// finished, further calls return the same status and do nothing else.
    pub fn task(&mut self) -> TransferStatus {
        if self.status.is_finished() {
            return self.status;
        }
        let mut completed = false;
        if let Some(completion) = self.source.task() {
            self.dispatch(completion);
            completed = true;
        }
        if !self.status.is_finished() {
            if let Some(completion) = self.sink.task() {
                self.dispatch(completion);
                completed = true;
            }
        }
        if !completed
            && !self.status.is_finished()
            && self.coordinator.cancel_handle().is_cancelled()
        {
            debug!(
                target: "fetchpipe::pipeline",
                transferred = self.coordinator.state().transferred_bytes(),
                "cancelled with a request outstanding"
            );
            self.finished = Some(Instant::now());
            self.teardown();
        }
        self.status
    }

    /// Current status without running a slice.
    #[must_use]
    pub const fn status(&self) -> TransferStatus {
        self.status
    }

    /// The error that ended the transfer, if it failed or was cancelled.
    #[must_use]
    pub const fn failure(&self) -> Option<&TransferError> {
        self.failure.as_ref()
    }

    /// Bytes written and total so far.
    #[must_use]
    pub const fn progress(&self) -> TransferProgress {
        let state = self.coordinator.state();
        TransferProgress {
            transferred: state.transferred_bytes(),
            total: state.total_bytes(),
        }
    }

    /// Counters and elapsed time so far.
    #[must_use]
    pub fn summary(&self) -> TransferSummary {
        let state = self.coordinator.state();
        TransferSummary {
            bytes: state.transferred_bytes(),
            reads: state.reads(),
            writes: state.writes(),
            elapsed: self.finished.unwrap_or_else(Instant::now) - self.started,
        }
    }

    /// Phase reported by the coordinator.
    #[must_use]
    pub const fn phase(&self) -> TransferPhase {
        self.coordinator.state().phase()
    }

    /// Requests cancellation at the next completion, or at the next slice
    /// that completes nothing.
    pub fn cancel(&self) {
        self.coordinator.cancel_handle().cancel();
    }

    /// Returns a handle that can cancel the transfer from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.coordinator.cancel_handle()
    }

    /// Closes both endpoints and releases the buffer.
    ///
    /// Safe to call any number of times. Tearing down a running transfer marks
    /// it cancelled; a request still held by an endpoint is abandoned. A sink
    /// that fails to close is only logged; use [`close`](Self::close) to
    /// observe that failure.
    pub fn teardown(&mut self) {
        if let Err(error) = self.release() {
            warn!(target: "fetchpipe::io", %error, "closing destination failed");
        }
    }

    /// Tears the transfer down and reports its outcome.
    ///
    /// A finished transfer whose destination cannot be flushed (or synced,
    /// when requested) fails with a write error at the final offset. A
    /// transfer that is still running is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the transfer, or the close failure.
    pub fn close(&mut self) -> Result<TransferSummary, TransferError> {
        let closed = self.release();
        match (self.status, closed) {
            (TransferStatus::Done, Err(source)) => {
                let transferred = self.coordinator.state().transferred_bytes();
                debug!(target: "fetchpipe::io", error = %source, "closing destination failed");
                self.status = TransferStatus::Failed;
                self.failure = Some(TransferError::Io {
                    direction: Operation::Write,
                    offset: transferred,
                    len: 0,
                    source,
                });
            }
            (_, Err(error)) => {
                warn!(target: "fetchpipe::io", %error, "closing destination failed");
            }
            (_, Ok(())) => {}
        }

        match self.status {
            TransferStatus::Done => Ok(self.summary()),
            _ => Err(self.take_failure()),
        }
    }

    /// Closes everything once, returning the sink's close result.
    fn release(&mut self) -> io::Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        if self.status == TransferStatus::Running {
            self.status = TransferStatus::Cancelled;
            self.failure = Some(TransferError::Cancelled {
                transferred: self.coordinator.state().transferred_bytes(),
            });
        }
        self.source.close_for_read();
        let closed = self.sink.close_for_write();
        self.coordinator.release_buffer();
        debug!(target: "fetchpipe::exit", status = ?self.status, "transfer torn down");
        closed
    }

    /// Returns true once [`teardown`](Self::teardown) ran.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Drives the transfer until it finishes, then tears it down.
    pub fn run_to_completion(self) -> Result<TransferSummary, TransferError> {
        self.run_with_progress(|_| {})
    }

    /// Like [`run_to_completion`](Self::run_to_completion), calling `report`
    /// whenever the transferred byte count changes.
    ///
    /// When a slice completes nothing, the loop sleeps for the configured
    /// poll interval before trying again.
    pub fn run_with_progress<F>(mut self, mut report: F) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(&TransferProgress),
    {
        let mut reported = self.progress();
        report(&reported);
        loop {
            let activity = self.activity();
            let status = self.task();

            let progress = self.progress();
            if progress != reported {
                report(&progress);
                reported = progress;
            }

            match status {
                TransferStatus::Running => {
                    if self.activity() == activity {
                        if self.config.poll_interval.is_zero() {
                            thread::yield_now();
                        } else {
                            thread::sleep(self.config.poll_interval);
                        }
                    }
                }
                TransferStatus::Done => break,
                TransferStatus::Failed | TransferStatus::Cancelled => return self.close(),
            }
        }

        let summary = self.close()?;
        debug!(
            target: "fetchpipe::stats",
            bytes = summary.bytes,
            reads = summary.reads,
            writes = summary.writes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "transfer complete"
        );
        Ok(summary)
    }

    fn activity(&self) -> (TransferPhase, u64, u64) {
        let state = self.coordinator.state();
        (state.phase(), state.reads(), state.writes())
    }

    fn dispatch(&mut self, completion: Completion) {
        match self
            .coordinator
            .on_completion(completion, &mut self.source, &mut self.sink)
        {
            Ok(TransferPhase::Done) => self.finish(),
            Ok(_) => {}
            Err(error) => {
                self.status = match error {
                    TransferError::Cancelled { .. } => TransferStatus::Cancelled,
                    _ => TransferStatus::Failed,
                };
                self.finished = Some(Instant::now());
                debug!(target: "fetchpipe::pipeline", %error, "transfer stopped");
                self.failure = Some(error);
                self.teardown();
            }
        }
    }

    fn finish(&mut self) {
        self.status = TransferStatus::Done;
        self.finished = Some(Instant::now());
        debug!(
            target: "fetchpipe::pipeline",
            bytes = self.coordinator.state().transferred_bytes(),
            "transfer done"
        );
    }

    fn take_failure(&mut self) -> TransferError {
        self.failure.take().unwrap_or(TransferError::Cancelled {
            transferred: self.coordinator.state().transferred_bytes(),
        })
    }
}

impl<S: DataSource, K: DataSink> Drop for TransferSession<S, K> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn close_endpoints<S: DataSource, K: DataSink>(source: &mut S, sink: &mut K) {
    source.close_for_read();
    if let Err(error) = sink.close_for_write() {
        warn!(target: "fetchpipe::io", %error, "closing destination failed");
    }
}

fn open_endpoints<S, K>(source: &mut S, sink: &mut K) -> Result<u64, TransferError>
where
    S: DataSource,
    K: DataSink,
{
    source
        .open_for_read()
        .map_err(|error| TransferError::setup(SetupStage::OpenSource, error))?;
    let total = source
        .remote_size()
        .map_err(|error| TransferError::setup(SetupStage::QuerySize, error))?;
    sink.open_for_write()
        .map_err(|error| TransferError::setup(SetupStage::OpenSink, error))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySink, MemorySource, SharedJournal, journal};
    use std::time::Duration;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn config(capacity: usize) -> TransferConfig {
        TransferConfig::default()
            .with_buffer_capacity(capacity)
            .with_poll_interval(Duration::ZERO)
    }

    fn endpoints(data: Vec<u8>) -> (MemorySource, MemorySink, SharedJournal) {
        let journal = journal();
        let source = MemorySource::new(data, &journal);
        let sink = MemorySink::new(&journal);
        (source, sink, journal)
    }

    fn pump(session: &mut TransferSession<MemorySource, MemorySink>) -> TransferStatus {
        for _ in 0..10_000 {
            let status = session.task();
            if status.is_finished() {
                return status;
            }
        }
        panic!("transfer did not finish");
    }

    #[test]
    fn copies_all_bytes_in_order() {
        let data = patterned(10_000);
        let (source, sink, journal) = endpoints(data.clone());
        let mut session = TransferSession::start(source, sink, &config(4096)).unwrap();

        assert_eq!(session.status(), TransferStatus::Running);
        assert_eq!(pump(&mut session), TransferStatus::Done);
        assert_eq!(session.progress().transferred, 10_000);
        assert_eq!(session.summary().reads, 3);
        assert_eq!(session.summary().writes, 3);

        session.teardown();
        let journal = journal.borrow();
        assert_eq!(journal.output, data);
        assert_eq!(journal.reads, vec![(0, 4096), (4096, 4096), (8192, 1808)]);
        assert_eq!((journal.source_closes, journal.sink_closes), (1, 1));
    }

    #[test]
    fn empty_resource_is_done_immediately() {
        let (source, sink, journal) = endpoints(Vec::new());
        let mut session = TransferSession::start(source, sink, &config(4096)).unwrap();

        assert_eq!(session.status(), TransferStatus::Done);
        assert_eq!(session.task(), TransferStatus::Done);
        assert!(journal.borrow().reads.is_empty());
        assert!(journal.borrow().sink_opened);
    }

    #[test]
    fn teardown_is_idempotent() {
        let (source, sink, journal) = endpoints(patterned(10));
        let mut session = TransferSession::start(source, sink, &config(64)).unwrap();
        pump(&mut session);

        session.teardown();
        session.teardown();
        assert!(session.is_torn_down());
        drop(session);

        let journal = journal.borrow();
        assert_eq!((journal.source_closes, journal.sink_closes), (1, 1));
    }

    #[test]
    fn teardown_while_running_marks_cancelled() {
        let (source, sink, _journal) = endpoints(patterned(1000));
        let mut session = TransferSession::start(source, sink, &config(64)).unwrap();

        session.teardown();
        assert_eq!(session.status(), TransferStatus::Cancelled);
        assert_eq!(session.task(), TransferStatus::Cancelled);
        assert!(matches!(
            session.failure(),
            Some(TransferError::Cancelled { transferred: 0 })
        ));
    }

    #[test]
    fn drop_tears_down() {
        let (source, sink, journal) = endpoints(patterned(1000));
        let session = TransferSession::start(source, sink, &config(64)).unwrap();
        drop(session);
        let journal = journal.borrow();
        assert_eq!((journal.source_closes, journal.sink_closes), (1, 1));
    }

    #[test]
    fn open_failure_is_reported_as_setup_error() {
        let (mut source, sink, journal) = endpoints(patterned(10));
        source.fail_open = true;

        let error = TransferSession::start(source, sink, &config(64)).unwrap_err();
        assert_eq!(error.stage(), Some(SetupStage::OpenSource));
        assert!(error.is_network());
        assert!(!journal.borrow().sink_opened);
    }

    #[test]
    fn unknown_size_stops_before_the_sink_opens() {
        let (mut source, sink, journal) = endpoints(patterned(10));
        source.fail_size = true;

        let error = TransferSession::start(source, sink, &config(64)).unwrap_err();
        assert_eq!(error.stage(), Some(SetupStage::QuerySize));
        let journal = journal.borrow();
        assert!(!journal.sink_opened);
        assert_eq!(journal.source_closes, 1);
    }

    #[test]
    fn sink_open_failure_closes_source() {
        let (source, mut sink, journal) = endpoints(patterned(10));
        sink.fail_open = true;

        let error = TransferSession::start(source, sink, &config(64)).unwrap_err();
        assert_eq!(error.stage(), Some(SetupStage::OpenSink));
        assert_eq!(journal.borrow().source_closes, 1);
    }

    #[test]
    fn rejected_first_read_is_a_start_failure() {
        let (mut source, sink, journal) = endpoints(patterned(10));
        source.reject_reads = true;

        let error = TransferSession::start(source, sink, &config(64)).unwrap_err();
        assert_eq!(error.stage(), Some(SetupStage::Start));
        let journal = journal.borrow();
        assert_eq!((journal.source_closes, journal.sink_closes), (1, 1));
    }

    #[test]
    fn mid_transfer_failure_tears_down() {
        let (mut source, sink, journal) = endpoints(patterned(300));
        source.fail_read_at = Some(128);
        let mut session = TransferSession::start(source, sink, &config(128)).unwrap();

        assert_eq!(pump(&mut session), TransferStatus::Failed);
        assert!(session.is_torn_down());
        assert!(matches!(
            session.failure(),
            Some(TransferError::Io {
                direction: Operation::Read,
                offset: 128,
                ..
            })
        ));
        assert_eq!(session.task(), TransferStatus::Failed);
        assert_eq!(journal.borrow().output.len(), 128);
    }

    #[test]
    fn cancel_stops_the_transfer() {
        let (source, sink, _journal) = endpoints(patterned(1000));
        let mut session = TransferSession::start(source, sink, &config(100)).unwrap();
        session.task();
        session.cancel();

        assert_eq!(pump(&mut session), TransferStatus::Cancelled);
        assert!(session.progress().transferred < 1000);
        assert!(session.is_torn_down());
    }

    #[test]
    fn run_to_completion_reports_progress() {
        let data = patterned(5000);
        let (source, sink, journal) = endpoints(data.clone());
        let session = TransferSession::start(source, sink, &config(1024)).unwrap();

        let mut seen = Vec::new();
        let summary = session
            .run_with_progress(|progress| seen.push(progress.transferred))
            .unwrap();

        assert_eq!(summary.bytes, 5000);
        assert_eq!(summary.reads, 5);
        assert_eq!(seen, vec![0, 1024, 2048, 3072, 4096, 5000]);
        assert_eq!(journal.borrow().output, data);
        assert_eq!(journal.borrow().sink_closes, 1);
    }

    #[test]
    fn cancel_while_a_read_is_stalled_tears_down() {
        let (mut source, sink, journal) = endpoints(patterned(1000));
        source.stall_read_at = Some(100);
        let mut session = TransferSession::start(source, sink, &config(100)).unwrap();

        for _ in 0..10 {
            assert_eq!(session.task(), TransferStatus::Running);
        }
        assert_eq!(session.progress().transferred, 100);

        session.cancel();
        assert_eq!(session.task(), TransferStatus::Cancelled);
        assert!(session.is_torn_down());
        assert!(matches!(
            session.failure(),
            Some(TransferError::Cancelled { transferred: 100 })
        ));
        let journal = journal.borrow();
        assert_eq!((journal.source_closes, journal.sink_closes), (1, 1));
    }

    #[test]
    fn run_to_completion_returns_when_cancelled_during_a_stall() {
        let (mut source, sink, _journal) = endpoints(patterned(1000));
        source.stall_read_at = Some(0);
        let session = TransferSession::start(source, sink, &config(100)).unwrap();
        let cancel = session.cancel_handle();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });
        let error = session.run_to_completion().unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(error, TransferError::Cancelled { transferred: 0 }));
    }

    #[test]
    fn sink_close_failure_fails_a_finished_transfer() {
        let data = patterned(300);
        let (source, mut sink, journal) = endpoints(data.clone());
        sink.fail_close = true;
        let session = TransferSession::start(source, sink, &config(128)).unwrap();

        let error = session.run_to_completion().unwrap_err();
        match error {
            TransferError::Io {
                direction: Operation::Write,
                offset: 300,
                ref source,
                ..
            } => assert_eq!(source.kind(), io::ErrorKind::StorageFull),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(journal.borrow().output, data);
    }

    #[test]
    fn close_keeps_the_original_failure() {
        let (mut source, mut sink, _journal) = endpoints(patterned(300));
        source.fail_read_at = Some(128);
        sink.fail_close = true;
        let mut session = TransferSession::start(source, sink, &config(128)).unwrap();

        assert_eq!(pump(&mut session), TransferStatus::Failed);
        let error = session.close().unwrap_err();
        assert!(matches!(
            error,
            TransferError::Io {
                direction: Operation::Read,
                offset: 128,
                ..
            }
        ));
    }

    #[test]
    fn close_after_done_returns_summary() {
        let (source, sink, _journal) = endpoints(patterned(10));
        let mut session = TransferSession::start(source, sink, &config(64)).unwrap();
        assert_eq!(pump(&mut session), TransferStatus::Done);

        let summary = session.close().unwrap();
        assert_eq!(summary.bytes, 10);
        assert!(session.is_torn_down());
    }

    #[test]
    fn run_to_completion_surfaces_failure() {
        let (source, mut sink, _journal) = endpoints(patterned(100));
        sink.fail_write_at = Some(0);
        let session = TransferSession::start(source, sink, &config(64)).unwrap();

        let error = session.run_to_completion().unwrap_err();
        match error {
            TransferError::Io {
                direction: Operation::Write,
                ref source,
                ..
            } => assert_eq!(source.kind(), io::ErrorKind::StorageFull),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
