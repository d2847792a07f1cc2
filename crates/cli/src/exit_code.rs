//! Process exit codes.
//!
//! The numbering follows rsync's `errcode.h` so scripts that already
//! understand those values can interpret fetchpipe failures the same way.

use std::fmt;

use transfer::{Operation, SetupStage, TransferError};

/// Exit status reported by the `fetchpipe` binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// The file was copied completely.
    Ok = 0,
    /// Invalid command line or URL.
    Syntax = 1,
    /// The source or destination could not be opened.
    FileSelect = 3,
    /// Talking to the remote server failed.
    SocketIo = 10,
    /// Writing the destination failed.
    FileIo = 11,
    /// Interrupted by a signal or cancelled.
    Signal = 20,
    /// The transfer buffer could not be allocated.
    Malloc = 22,
    /// The source ended or failed before every byte was read.
    PartialTransfer = 23,
}

impl ExitCode {
    /// Numeric value passed to the operating system.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Short description used in diagnostics.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Syntax => "syntax or usage error",
            Self::FileSelect => "errors selecting input/output files",
            Self::SocketIo => "error in socket IO",
            Self::FileIo => "error in file IO",
            Self::Signal => "received SIGINT, SIGTERM, or SIGHUP",
            Self::Malloc => "error allocating core memory buffers",
            Self::PartialTransfer => "partial transfer",
        }
    }

    /// Classifies a transfer failure.
    #[must_use]
    pub fn for_error(error: &TransferError) -> Self {
        match error {
            TransferError::Setup {
                stage: SetupStage::ParseUrl,
                ..
            } => Self::Syntax,
            TransferError::Setup {
                stage: SetupStage::PrepareDestination | SetupStage::OpenSink,
                ..
            } => Self::FileSelect,
            TransferError::Setup { .. } if error.is_network() => Self::SocketIo,
            TransferError::Setup { .. } => Self::FileSelect,
            TransferError::ResourceExhausted { .. } => Self::Malloc,
            TransferError::Io { .. } if error.is_network() => Self::SocketIo,
            TransferError::Io {
                direction: Operation::Write,
                ..
            } => Self::FileIo,
            TransferError::Io { .. } => Self::PartialTransfer,
            TransferError::Cancelled { .. } => Self::Signal,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}
