//! Dedicated I/O thread that turns blocking operations into completions.
//!
//! An [`IoWorker`] owns a [`Backend`] on a background thread. Requests are
//! queued over a channel and executed in submission order; each finished
//! request is posted to a completion channel where it waits until the owner
//! collects it with [`IoWorker::try_complete`].
//!
//! ```text
//! ┌──────────────────────┐       Request       ┌──────────────────────┐
//! │ owner thread         │ ──────────────────▶ │ worker thread        │
//! │                      │                     │                      │
//! │ submit()             │                     │ backend.read_at()    │
//! │ try_complete()  ◀──────────────────────────│ backend.write_at()   │
//! │                      │     Completion      │                      │
//! └──────────────────────┘                     └──────────────────────┘
//! ```
//!
//! Nothing is delivered to the owner unprompted: the owner decides when to
//! look at the completion queue, so completion handling always happens on the
//! owner's thread in a well-defined order.

use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender, TryRecvError, unbounded};
use tracing::{debug, trace, warn};

use crate::buffer::TransferBuffer;
use crate::traits::{Completion, Operation, SubmitError, Tag};

/// Blocking, positioned I/O executed on a worker thread.
///
/// Implementors provide only the directions they support; the defaults
/// report [`io::ErrorKind::Unsupported`].
pub trait Backend: Send + 'static {
    /// Reads up to `buf.len()` bytes at `offset`. Returns `Ok(0)` at end of data.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let _ = (offset, buf);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "backend does not support reads",
        ))
    }

    /// Writes up to `buf.len()` bytes at `offset`, returning the count written.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let _ = (offset, buf);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "backend does not support writes",
        ))
    }

    /// Called once on the worker thread before it exits normally.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A queued request.
struct Request {
    operation: Operation,
    buffer: TransferBuffer,
    offset: u64,
    len: usize,
    tag: Tag,
}

/// Handle to a backend running on its own thread.
///
/// Dropping the request sender is the shutdown signal: the worker finishes
/// whatever it is executing, runs [`Backend::finish`], and exits.
pub struct IoWorker {
    name: String,
    sender: Option<Sender<Request>>,
    completions: Receiver<Completion>,
    handle: Option<JoinHandle<io::Result<()>>>,
    in_flight: usize,
}

impl IoWorker {
    /// Spawns a worker thread named `name` that owns `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system refuses to create the thread.
    pub fn spawn<B: Backend>(name: &str, backend: B) -> io::Result<Self> {
        let (sender, receiver) = unbounded::<Request>();
        let (completion_sender, completions) = unbounded::<Completion>();

        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || worker_thread_main(backend, &receiver, &completion_sender))?;

        debug!(target: "fetchpipe::io", worker = name, "spawned I/O worker");

        Ok(Self {
            name: name.to_owned(),
            sender: Some(sender),
            completions,
            handle: Some(handle),
            in_flight: 0,
        })
    }

    /// Queues a request without blocking.
    ///
    /// # Errors
    ///
    /// Returns the buffer inside a [`SubmitError`] if the worker has exited.
    pub fn submit(
        &mut self,
        operation: Operation,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        let terminated = || {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} worker has terminated", self.name),
            )
        };
        let Some(sender) = &self.sender else {
            return Err(SubmitError::new(operation, terminated(), buffer));
        };

        let request = Request {
            operation,
            buffer,
            offset,
            len,
            tag,
        };
        if let Err(SendError(request)) = sender.send(request) {
            return Err(SubmitError::new(operation, terminated(), request.buffer));
        }

        self.in_flight += 1;
        trace!(
            target: "fetchpipe::io",
            worker = %self.name,
            %operation,
            offset,
            len,
            "request queued"
        );
        Ok(())
    }

    /// Collects one finished request without blocking.
    pub fn try_complete(&mut self) -> Option<Completion> {
        match self.completions.try_recv() {
            Ok(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(completion)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks until one request finishes.
    ///
    /// Returns `None` when nothing is in flight or the worker has exited.
    pub fn wait_complete(&mut self) -> Option<Completion> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions.recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(completion)
    }

    /// Returns the number of submitted requests whose completions are still pending.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Stops the worker.
    ///
    /// When the worker is idle the thread is joined and the result of
    /// [`Backend::finish`] is returned. A worker still executing a request is
    /// detached instead: it exits on its own once the request returns, so a
    /// stalled endpoint cannot hang the caller.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> io::Result<()> {
        drop(self.sender.take());

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if self.in_flight > 0 && self.completions.is_empty() {
            debug!(
                target: "fetchpipe::io",
                worker = %self.name,
                in_flight = self.in_flight,
                "detaching I/O worker with a request in flight"
            );
            return Ok(());
        }

        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other(format!(
                "{} worker thread panicked",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for IoWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoWorker")
            .field("name", &self.name)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: "fetchpipe::io", worker = %self.name, %error, "I/O worker shutdown failed");
        }
    }
}

/// Main loop for the worker thread.
fn worker_thread_main<B: Backend>(
    mut backend: B,
    receiver: &Receiver<Request>,
    completions: &Sender<Completion>,
) -> io::Result<()> {
    while let Ok(request) = receiver.recv() {
        let completion = execute(&mut backend, request);
        if completions.send(completion).is_err() {
            // Owner is gone; nobody will collect further results.
            break;
        }
    }

    backend.finish()
}

/// Runs a single request to completion against the backend.
fn execute<B: Backend>(backend: &mut B, request: Request) -> Completion {
    let Request {
        operation,
        mut buffer,
        offset,
        len,
        tag,
    } = request;

    let result = match operation {
        Operation::Read => match buffer.region_mut(len) {
            Some(region) => fill_at(backend, offset, region),
            None => Err(oversized(len)),
        },
        Operation::Write => match buffer.filled(len) {
            Some(region) => drain_at(backend, offset, region),
            None => Err(oversized(len)),
        },
    };

    Completion::new(operation, buffer, tag, result)
}

fn oversized(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("request of {len} bytes exceeds the buffer capacity"),
    )
}

/// Reads until `region` is full or the backend reports end of data.
fn fill_at<B: Backend>(backend: &mut B, offset: u64, region: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < region.len() {
        match backend.read_at(offset + filled as u64, &mut region[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

/// Writes the whole of `region`, failing if the backend stops accepting bytes.
fn drain_at<B: Backend>(backend: &mut B, offset: u64, region: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < region.len() {
        match backend.write_at(offset + written as u64, &region[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "endpoint stopped accepting data",
                ));
            }
            Ok(n) => written += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(written)
}
