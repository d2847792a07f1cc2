#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! crates/transfer/src/lib.rs
//!
//! Single-buffer, completion-driven copy of a remote resource into a local
//! file.
//!
//! # Overview
//!
//! A transfer alternates between the two endpoints using one buffer: a read
//! fills it from the source, the read completion writes exactly those bytes to
//! the sink, and the write completion schedules the next read. Only one request
//! is ever outstanding, so the buffer is never filled and drained at once.
//!
//! # Design
//!
//! - [`state`] holds the counters, phase and idle buffer.
//! - [`plan`] splits the resource into buffer-sized chunks.
//! - [`coordinator`] implements the two completion handlers and the
//!   bootstrap that starts the cycle.
//! - [`session`] runs setup in order, pumps endpoint completions through the
//!   coordinator from [`TransferSession::task`], and tears everything down.
//! - [`destination`] replaces the local file before the copy starts.
//!
//! # Invariants
//!
//! - The transferred count only grows and never passes the total.
//! - Chunks are issued in ascending offset order with no gaps or overlaps.
//! - A completion reporting fewer bytes than requested fails the transfer.
//! - After teardown no endpoint is open and the buffer is released.
//!
//! # Errors
//!
//! Setup failures are reported as [`TransferError::Setup`] naming the failing
//! [`SetupStage`]. Failures while running move the session to
//! [`TransferStatus::Failed`] and are available from
//! [`TransferSession::failure`].
//!
//! # Examples
//!
//! ```no_run
//! use transfer::{TransferConfig, copy_remote_file_to_local};
//!
//! let config = TransferConfig::default().with_buffer_capacity(64 * 1024);
//! let session = copy_remote_file_to_local("http://example.com/data.bin", "data.bin", &config)?;
//! let summary = session.run_to_completion()?;
//! println!("{summary}");
//! # Ok::<(), transfer::TransferError>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod destination;
pub mod error;
pub mod plan;
pub mod progress;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_POLL_INTERVAL, MAX_BUFFER_CAPACITY, MAX_POLL_INTERVAL,
    MIN_BUFFER_CAPACITY, TransferConfig,
};
pub use coordinator::{CancelHandle, PipelineCoordinator};
pub use destination::{ensure_distinct, prepare_destination};
pub use fast_io::Operation;
pub use error::{SetupStage, TransferError};
pub use plan::{ChunkPlan, Chunks};
pub use progress::{TransferProgress, TransferSummary};
pub use session::{RemoteTransfer, TransferSession, TransferStatus, copy_remote_file_to_local};
pub use state::{TransferPhase, TransferState};
