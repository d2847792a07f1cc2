#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` holds the verbosity model shared by the fetchpipe crates. Output
//! is split into *info* categories meant for users ([`InfoFlag`]) and *debug*
//! categories meant for people diagnosing a transfer ([`DebugFlag`]). Each
//! flag carries a numeric level; higher levels print more detail.
//!
//! # Design
//!
//! - [`VerbosityConfig`] stores the levels and knows how `-v` counts and
//!   `--info`/`--debug` token lists translate into them.
//! - A thread-local copy of the configuration backs cheap [`info_gte`] and
//!   [`debug_gte`] checks, and a thread-local event buffer lets tests
//!   [`drain_events`] to see what was logged.
//! - With the `tracing` feature, `VerbosityLayer` turns `tracing` events whose
//!   target ends in a flag name (`fetchpipe::io`, `fetchpipe::stats`, ...)
//!   into lines on stderr, filtered by the configured level.
//!
//! # Examples
//!
//! ```
//! use logging::{DebugFlag, InfoFlag, VerbosityConfig};
//!
//! let mut config = VerbosityConfig::from_verbose_level(1);
//! config.apply_info_flags("progress2").unwrap();
//! config.apply_debug_flags("pipeline").unwrap();
//!
//! assert_eq!(config.info.get(InfoFlag::Progress), 2);
//! assert_eq!(config.debug.get(DebugFlag::Pipeline), 1);
//! ```

mod config;
mod levels;
mod thread_local;
#[cfg(feature = "tracing")]
mod tracing_bridge;

pub use config::{MAX_VERBOSE_LEVEL, VerbosityConfig};
pub use levels::{DebugFlag, DebugLevels, InfoFlag, InfoLevels};
pub use thread_local::{
    DiagnosticEvent, current, debug_gte, drain_events, emit_debug, emit_info, info_gte, init,
};
#[cfg(feature = "tracing")]
pub use tracing_bridge::{VerbosityLayer, init_tracing, init_tracing_with_filter};
