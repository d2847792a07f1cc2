//! Error type for remote endpoints.

use std::io;

use thiserror::Error;

/// Failure while describing, opening or reading a remote endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL string was empty.
    #[error("remote URL is empty")]
    EmptyUrl,
    /// The URL could not be parsed.
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser diagnostic.
        #[source]
        source: url::ParseError,
    },
    /// The URL names a scheme with no backend.
    #[error("unsupported URL scheme '{0}' (expected http or file)")]
    UnsupportedScheme(String),
    /// An `http` URL without a host.
    #[error("URL '{0}' does not name a host")]
    MissingHost(String),
    /// A `file` URL that does not map to a local path.
    #[error("URL '{0}' does not name a local file")]
    InvalidFilePath(String),
    /// Establishing the TCP connection failed.
    #[error("failed to connect to {authority}: {source}")]
    Connect {
        /// `host:port` being dialled.
        authority: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The server answered with a status the client cannot use.
    #[error("server responded {status} {reason}")]
    Status {
        /// Numeric status code.
        status: u16,
        /// Reason phrase from the status line.
        reason: String,
    },
    /// The response did not follow HTTP/1.1 framing.
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),
    /// The server reported a body encoding ranged reads cannot use.
    #[error("chunked transfer encoding is not supported for ranged reads")]
    ChunkedBody,
    /// Neither `HEAD` nor a probing ranged `GET` reported the resource size.
    #[error("size of {0} could not be determined")]
    UnknownSize(String),
    /// Plain I/O failure on an established endpoint.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns the [`io::ErrorKind`] that best describes this failure.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::EmptyUrl
            | Self::InvalidUrl { .. }
            | Self::UnsupportedScheme(_)
            | Self::MissingHost(_)
            | Self::InvalidFilePath(_) => io::ErrorKind::InvalidInput,
            Self::Connect { source, .. } => source.kind(),
            Self::Status { status: 404, .. } => io::ErrorKind::NotFound,
            Self::Status { status: 401 | 403, .. } => io::ErrorKind::PermissionDenied,
            Self::Status { .. } => io::ErrorKind::Other,
            Self::MalformedResponse(_) => io::ErrorKind::InvalidData,
            Self::ChunkedBody | Self::UnknownSize(_) => io::ErrorKind::Unsupported,
            Self::Io(error) => error.kind(),
        }
    }

    /// Returns true for failures reaching or talking to a network peer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Status { .. }
                | Self::MalformedResponse(_)
                | Self::ChunkedBody
        )
    }
}

impl From<TransportError> for io::Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Io(error) => error,
            other => Self::new(other.kind(), other),
        }
    }
}
