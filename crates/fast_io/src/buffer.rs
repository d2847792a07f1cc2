//! Fixed-capacity byte buffer with single-owner hand-off.
//!
//! A [`TransferBuffer`] is allocated once per transfer and then moved between
//! the coordinator and whichever endpoint currently services a request. It is
//! deliberately not `Clone`: ownership of the value is what proves that only
//! one operation can touch the bytes.

use std::collections::TryReserveError;
use std::fmt;

/// Default capacity of the intermediate buffer (10 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 10 * 1024;

/// Owned, fixed-capacity byte region used for a single transfer.
pub struct TransferBuffer {
    bytes: Box<[u8]>,
}

impl TransferBuffer {
    /// Allocates a zeroed buffer of exactly `capacity` bytes.
    ///
    /// Allocation goes through [`Vec::try_reserve_exact`] so an out-of-memory
    /// condition is reported instead of aborting the process.
    pub fn try_allocate(capacity: usize) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(capacity)?;
        bytes.resize(capacity, 0);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Returns the fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Returns the first `len` bytes, or `None` when `len` exceeds the capacity.
    #[must_use]
    pub fn filled(&self, len: usize) -> Option<&[u8]> {
        self.bytes.get(..len)
    }

    /// Returns the first `len` bytes mutably, or `None` when `len` exceeds the capacity.
    pub fn region_mut(&mut self, len: usize) -> Option<&mut [u8]> {
        self.bytes.get_mut(..len)
    }
}

impl fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}
