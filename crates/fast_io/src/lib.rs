//! Completion-driven endpoint I/O for fetchpipe.
//!
//! This crate provides the pieces every endpoint shares: the fixed-capacity
//! [`TransferBuffer`] that is handed back and forth between the two sides of a
//! transfer, the [`DataSource`] and [`DataSink`] traits describing an
//! asynchronous endpoint, the [`IoWorker`] thread that executes blocking I/O
//! out-of-band, and [`LocalFileSink`], the local-file implementation of
//! [`DataSink`].
//!
//! # Design Principles
//!
//! 1. **Move, don't share** - a request takes the buffer by value and the
//!    matching [`Completion`] gives it back, so a buffer can never be filled and
//!    drained at the same time.
//! 2. **Completions are pulled** - finished operations queue inside the worker
//!    and are only observed when the owner calls `task()`, keeping every
//!    completion handler on the owner's thread.
//! 3. **Close on drop** - endpoints release their worker and file handles when
//!    dropped, so partially constructed transfers clean up without sentinels.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod buffer;
pub mod file_sink;
pub mod traits;
pub mod worker;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, TransferBuffer};
pub use file_sink::LocalFileSink;
pub use traits::{Completion, DataSink, DataSource, Operation, SubmitError, Tag};
pub use worker::{Backend, IoWorker};
