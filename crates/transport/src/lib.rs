#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `transport` provides the remote side of a fetchpipe transfer: a
//! [`RemoteSource`] that implements [`fast_io::DataSource`] for a URL.
//!
//! # Design
//!
//! - [`descriptor`] parses and validates the URL into a [`RemoteDescriptor`].
//! - The `http` module speaks just enough HTTP/1.1 to query a resource size
//!   and fetch byte ranges over one persistent connection.
//! - The `file` module serves `file://` URLs from the local filesystem.
//! - [`source`] wraps either backend in the completion-driven
//!   [`DataSource`](fast_io::DataSource) contract, moving the backend onto an
//!   [`IoWorker`](fast_io::IoWorker) once reads begin.
//!
//! # Invariants
//!
//! - A size is either reported exactly or the query fails; a missing length is
//!   never reported as zero.
//! - Range responses are validated against the requested offset before any
//!   byte is copied into the caller's buffer.
//!
//! # Errors
//!
//! Endpoint operations return [`std::io::Error`]. Failures originating in this
//! crate wrap a [`TransportError`] that can be recovered with
//! [`std::io::Error::get_ref`] and a downcast.
//!
//! # Examples
//!
//! ```
//! use transport::{RemoteDescriptor, Scheme};
//!
//! let descriptor = RemoteDescriptor::parse("http://example.com/data.bin").unwrap();
//! assert_eq!(descriptor.scheme(), Scheme::Http);
//! assert!(RemoteDescriptor::parse("gopher://example.com/").is_err());
//! ```

pub mod descriptor;
pub mod error;
mod file;
mod http;
pub mod source;

pub use descriptor::{RemoteDescriptor, Scheme};
pub use error::TransportError;
pub use source::RemoteSource;
