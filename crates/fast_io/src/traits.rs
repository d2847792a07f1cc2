//! Endpoint traits for asynchronous, completion-reporting I/O.
//!
//! Both sides of a transfer follow the same contract: a request is submitted
//! together with the buffer it operates on and an opaque [`Tag`], the call
//! returns immediately, and the outcome is observed later as a [`Completion`]
//! returned from `task()`. The tag is echoed back untouched so the owner can
//! carry per-request context (typically the requested byte count) across the
//! completion boundary.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::buffer::TransferBuffer;

/// Opaque value attached to a request and echoed back in its [`Completion`].
pub type Tag = u64;

/// Direction of an endpoint request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fill the buffer from the endpoint.
    Read,
    /// Drain the buffer into the endpoint.
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Outcome of a finished request.
///
/// Carries the buffer back to the owner along with the echoed tag and the
/// number of bytes actually moved (or the error that stopped the request).
#[derive(Debug)]
pub struct Completion {
    operation: Operation,
    buffer: TransferBuffer,
    tag: Tag,
    result: io::Result<usize>,
}

impl Completion {
    /// Creates a completion record.
    #[must_use]
    pub fn new(
        operation: Operation,
        buffer: TransferBuffer,
        tag: Tag,
        result: io::Result<usize>,
    ) -> Self {
        Self {
            operation,
            buffer,
            tag,
            result,
        }
    }

    /// Returns the direction of the finished request.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns the tag supplied when the request was submitted.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Returns true when the request finished without an I/O error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Consumes the completion and returns the buffer, tag and result.
    #[must_use]
    pub fn into_parts(self) -> (TransferBuffer, Tag, io::Result<usize>) {
        (self.buffer, self.tag, self.result)
    }
}

/// A request could not be handed to the endpoint.
///
/// The buffer travels back inside the error so the caller keeps ownership.
#[derive(Debug, Error)]
#[error("failed to submit {operation} request: {source}")]
pub struct SubmitError {
    operation: Operation,
    #[source]
    source: io::Error,
    buffer: TransferBuffer,
}

impl SubmitError {
    /// Creates a submission error that returns `buffer` to the caller.
    #[must_use]
    pub fn new(operation: Operation, source: io::Error, buffer: TransferBuffer) -> Self {
        Self {
            operation,
            source,
            buffer,
        }
    }

    /// Returns the direction of the rejected request.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Consumes the error and returns the underlying cause and the buffer.
    #[must_use]
    pub fn into_parts(self) -> (io::Error, TransferBuffer) {
        (self.source, self.buffer)
    }
}

/// Returns the error used when a request reaches an endpoint that is not open.
pub(crate) fn not_open(operation: Operation) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        format!("endpoint is not open for {operation}"),
    )
}

/// Remote side of a transfer: a read-only endpoint with a known size.
pub trait DataSource {
    /// Opens a read-only path to the endpoint.
    fn open_for_read(&mut self) -> io::Result<()>;

    /// Reports the total size of the remote resource.
    ///
    /// Protocols that cannot report a size return an error rather than zero.
    fn remote_size(&mut self) -> io::Result<u64>;

    /// Starts reading `len` bytes at `offset` into `buffer`.
    ///
    /// Returns immediately; the outcome arrives later through [`task`](Self::task).
    fn read_async(
        &mut self,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError>;

    /// Gives the endpoint a scheduling slice and yields at most one completion.
    ///
    /// A closed endpoint always returns `None`.
    fn task(&mut self) -> Option<Completion>;

    /// Closes the read path. Calling it on a closed endpoint does nothing.
    fn close_for_read(&mut self);

    /// Returns true while the read path is open.
    fn is_open(&self) -> bool;
}

/// Local side of a transfer: a write-only endpoint.
pub trait DataSink {
    /// Opens a write-only path to the endpoint.
    fn open_for_write(&mut self) -> io::Result<()>;

    /// Starts writing the first `len` bytes of `buffer` at `offset`.
    ///
    /// Returns immediately; the outcome arrives later through [`task`](Self::task).
    fn write_async(
        &mut self,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError>;

    /// Gives the endpoint a scheduling slice and yields at most one completion.
    ///
    /// A closed endpoint always returns `None`.
    fn task(&mut self) -> Option<Completion>;

    /// Closes the write path, flushing whatever the endpoint still buffers.
    ///
    /// Calling it on a closed endpoint does nothing and succeeds. An error
    /// means written data may not have reached its final storage; the endpoint
    /// is closed either way.
    fn close_for_write(&mut self) -> io::Result<()>;

    /// Returns true while the write path is open.
    fn is_open(&self) -> bool;
}
