//! Error type for transfer setup and execution.

use std::collections::TryReserveError;
use std::fmt;
use std::io;

use fast_io::Operation;
use thiserror::Error;
use transport::TransportError;

/// Setup step that failed before any byte moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetupStage {
    /// Parsing and validating the remote URL.
    ParseUrl,
    /// Removing and recreating the destination file.
    PrepareDestination,
    /// Opening the read path to the remote endpoint.
    OpenSource,
    /// Querying the total size of the remote resource.
    QuerySize,
    /// Opening the write path to the destination.
    OpenSink,
    /// Handing the first request to an endpoint.
    Start,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ParseUrl => "parsing the remote URL",
            Self::PrepareDestination => "preparing the destination",
            Self::OpenSource => "opening the remote source",
            Self::QuerySize => "querying the remote size",
            Self::OpenSink => "opening the destination",
            Self::Start => "starting the transfer",
        })
    }
}

/// Failure of a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A setup step failed; nothing was transferred.
    #[error("{stage} failed: {source}")]
    Setup {
        /// The step that failed.
        stage: SetupStage,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
    /// The transfer buffer could not be allocated.
    #[error("failed to allocate a {capacity}-byte transfer buffer")]
    ResourceExhausted {
        /// Requested capacity.
        capacity: usize,
        /// Allocator diagnostic.
        #[source]
        source: TryReserveError,
    },
    /// A read or write failed once the transfer was running.
    #[error("{direction} of {len} bytes at offset {offset} failed: {source}")]
    Io {
        /// Which side failed.
        direction: Operation,
        /// Byte offset of the failed request.
        offset: u64,
        /// Requested byte count.
        len: u64,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
    /// The transfer was cancelled.
    #[error("transfer cancelled after {transferred} bytes")]
    Cancelled {
        /// Bytes written before cancellation took effect.
        transferred: u64,
    },
}

impl TransferError {
    pub(crate) fn setup(stage: SetupStage, source: impl Into<io::Error>) -> Self {
        Self::Setup {
            stage,
            source: source.into(),
        }
    }

    /// Returns the setup stage for [`TransferError::Setup`].
    #[must_use]
    pub const fn stage(&self) -> Option<SetupStage> {
        match self {
            Self::Setup { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the underlying I/O error, if any.
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Setup { source, .. } | Self::Io { source, .. } => Some(source),
            Self::ResourceExhausted { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Returns true when the failure came from the network peer.
    #[must_use]
    pub fn is_network(&self) -> bool {
        let Some(error) = self.io_error() else {
            return false;
        };
        if let Some(transport) = error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<TransportError>())
        {
            return transport.is_network();
        }
        matches!(
            error.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
                | io::ErrorKind::HostUnreachable
                | io::ErrorKind::NetworkUnreachable
        )
    }
}
