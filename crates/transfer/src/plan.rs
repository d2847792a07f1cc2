//! Chunking of a resource into buffer-sized requests.

/// Splits `total` bytes into consecutive chunks of at most `capacity` bytes.
///
/// Every chunk except the last is exactly `capacity` bytes long; the last one
/// carries the remainder. An empty resource has no chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    total: u64,
    capacity: u64,
}

impl ChunkPlan {
    /// Creates a plan. A zero capacity is treated as one byte.
    #[must_use]
    pub fn new(total: u64, capacity: usize) -> Self {
        Self {
            total,
            capacity: u64::try_from(capacity).unwrap_or(u64::MAX).max(1),
        }
    }

    /// Total number of bytes covered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Length of the chunk starting at `offset`, or zero past the end.
    #[must_use]
    pub fn chunk_at(&self, offset: u64) -> usize {
        let remaining = self.total.saturating_sub(offset);
        // Bounded by the capacity, which came from a usize.
        usize::try_from(remaining.min(self.capacity)).unwrap_or(usize::MAX)
    }

    /// Number of chunks in the plan.
    #[must_use]
    pub const fn chunk_count(&self) -> u64 {
        self.total.div_ceil(self.capacity)
    }

    /// Iterates over `(offset, len)` pairs in transfer order.
    #[must_use]
    pub const fn chunks(&self) -> Chunks {
        Chunks {
            plan: *self,
            offset: 0,
        }
    }
}

/// Iterator returned by [`ChunkPlan::chunks`].
#[derive(Clone, Debug)]
pub struct Chunks {
    plan: ChunkPlan,
    offset: u64,
}

impl Iterator for Chunks {
    type Item = (u64, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.plan.chunk_at(self.offset);
        if len == 0 {
            return None;
        }
        let offset = self.offset;
        self.offset += len as u64;
        Some((offset, len))
    }
}
