//! [`DataSource`] implementation for remote URLs.
//!
//! A [`RemoteSource`] moves through three states:
//!
//! ```text
//! Closed ──open_for_read()──▶ Ready(backend) ──first read_async()──▶ Running(worker)
//!    ▲                             │                                     │
//!    └──────────────close_for_read()───────────────────────────────────┘
//! ```
//!
//! While `Ready`, the backend lives on the caller's thread so the size query
//! can run synchronously during setup. The first read hands it to an
//! [`IoWorker`]; from then on every read completes out-of-band and is observed
//! through [`task`](DataSource::task).

use std::io;
use std::mem;
use std::time::Duration;

use fast_io::{Backend, Completion, DataSource, IoWorker, Operation, SubmitError, Tag, TransferBuffer};
use tracing::{debug, warn};

use crate::descriptor::{RemoteDescriptor, Scheme};
use crate::error::TransportError;
use crate::file::FileSource;
use crate::http::HttpClient;

#[derive(Debug)]
enum SourceBackend {
    Http(HttpClient),
    File(FileSource),
}

impl SourceBackend {
    fn size(&mut self) -> Result<u64, TransportError> {
        match self {
            Self::Http(client) => client.remote_size(),
            Self::File(file) => Ok(file.size()?),
        }
    }
}

impl Backend for SourceBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Http(client) => Ok(client.read_range(offset, buf)?),
            Self::File(file) => file.read_at(offset, buf),
        }
    }
}

#[derive(Debug)]
enum SourceState {
    Closed,
    Ready(SourceBackend),
    Running(IoWorker),
}

/// Read-only endpoint for a remote resource.
#[derive(Debug)]
pub struct RemoteSource {
    descriptor: RemoteDescriptor,
    connect_timeout: Option<Duration>,
    state: SourceState,
    size: Option<u64>,
}

impl RemoteSource {
    /// Creates a closed source for `descriptor`.
    #[must_use]
    pub const fn new(descriptor: RemoteDescriptor) -> Self {
        Self {
            descriptor,
            connect_timeout: None,
            state: SourceState::Closed,
            size: None,
        }
    }

    /// Bounds how long establishing a network connection may take.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the endpoint descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &RemoteDescriptor {
        &self.descriptor
    }

    fn not_open() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "remote source is not open")
    }
}

impl DataSource for RemoteSource {
    fn open_for_read(&mut self) -> io::Result<()> {
        if !matches!(self.state, SourceState::Closed) {
            return Ok(());
        }

        let backend = match self.descriptor.scheme() {
            Scheme::Http => {
                let mut client = HttpClient::new(self.descriptor.clone(), self.connect_timeout);
                client.connect()?;
                SourceBackend::Http(client)
            }
            Scheme::File => {
                let path = self
                    .descriptor
                    .file_path()
                    .ok_or_else(|| TransportError::InvalidFilePath(self.descriptor.to_string()))?;
                let file = FileSource::open(&path)?;
                debug!(target: "fetchpipe::connect", path = %file.path().display(), "local file opened");
                SourceBackend::File(file)
            }
        };

        debug!(target: "fetchpipe::connect", url = %self.descriptor, "source opened");
        self.state = SourceState::Ready(backend);
        Ok(())
    }

    fn remote_size(&mut self) -> io::Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        match &mut self.state {
            SourceState::Ready(backend) => {
                let size = backend.size()?;
                self.size = Some(size);
                Ok(size)
            }
            SourceState::Running(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "remote size must be queried before reads start",
            )),
            SourceState::Closed => Err(Self::not_open()),
        }
    }

    fn read_async(
        &mut self,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        self.state = match mem::replace(&mut self.state, SourceState::Closed) {
            SourceState::Ready(backend) => match IoWorker::spawn("fetchpipe-source", backend) {
                Ok(worker) => SourceState::Running(worker),
                Err(error) => return Err(SubmitError::new(Operation::Read, error, buffer)),
            },
            other => other,
        };

        match &mut self.state {
            SourceState::Running(worker) => worker.submit(Operation::Read, buffer, offset, len, tag),
            SourceState::Closed | SourceState::Ready(_) => {
                Err(SubmitError::new(Operation::Read, Self::not_open(), buffer))
            }
        }
    }

    fn task(&mut self) -> Option<Completion> {
        match &mut self.state {
            SourceState::Running(worker) => worker.try_complete(),
            SourceState::Closed | SourceState::Ready(_) => None,
        }
    }

    fn close_for_read(&mut self) {
        match mem::replace(&mut self.state, SourceState::Closed) {
            SourceState::Closed => return,
            SourceState::Ready(_) => {}
            SourceState::Running(worker) => {
                if let Err(error) = worker.shutdown() {
                    warn!(target: "fetchpipe::io", url = %self.descriptor, %error, "closing source failed");
                }
            }
        }
        debug!(target: "fetchpipe::connect", url = %self.descriptor, "source closed");
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, SourceState::Closed)
    }
}

impl Drop for RemoteSource {
    fn drop(&mut self) {
        self.close_for_read();
    }
}
