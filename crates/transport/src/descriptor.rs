//! Remote endpoint descriptors.
//!
//! A [`RemoteDescriptor`] is the validated form of the URL handed to a
//! transfer. Validation happens once, up front, so an unusable URL fails
//! before any socket or file is touched.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::{Position, Url};

use crate::error::TransportError;

/// Protocol used to reach a remote endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP/1.1 with byte ranges.
    Http,
    /// A file on the local filesystem addressed by URL.
    File,
}

/// Validated location of a remote resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteDescriptor {
    url: Url,
    scheme: Scheme,
}

impl RemoteDescriptor {
    /// Parses and validates `input`.
    ///
    /// # Errors
    ///
    /// Fails for an empty string, unparsable URLs, schemes other than `http`
    /// and `file`, `http` URLs without a host, and `file` URLs that do not map
    /// to a local path.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::EmptyUrl);
        }

        let url = Url::parse(input).map_err(|source| TransportError::InvalidUrl {
            url: input.to_owned(),
            source,
        })?;

        let scheme = match url.scheme() {
            "http" => {
                if url.host_str().is_none_or(str::is_empty) {
                    return Err(TransportError::MissingHost(input.to_owned()));
                }
                Scheme::Http
            }
            "file" => {
                if url.to_file_path().is_err() {
                    return Err(TransportError::InvalidFilePath(input.to_owned()));
                }
                Scheme::File
            }
            other => return Err(TransportError::UnsupportedScheme(other.to_owned())),
        };

        Ok(Self { url, scheme })
    }

    /// Returns the parsed URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the protocol used to reach the endpoint.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the local path for `file` URLs.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.scheme {
            Scheme::File => self.url.to_file_path().ok(),
            Scheme::Http => None,
        }
    }

    /// Returns the `Host` header value (`host[:port]`).
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.url[Position::BeforeHost..Position::AfterPort]
    }

    /// Returns the origin-form request target (path and query).
    #[must_use]
    pub fn request_target(&self) -> &str {
        let target = &self.url[Position::BeforePath..Position::AfterQuery];
        if target.is_empty() { "/" } else { target }
    }
}

impl FromStr for RemoteDescriptor {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
