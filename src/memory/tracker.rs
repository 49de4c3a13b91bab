//! Allocation Tracking
//!
//! A running counter of the bytes the engine's structures hold, with an
//! optional ceiling. Allocation itself is left to the global allocator;
//! the tracker only decides whether a new allocation is allowed and keeps
//! the books.
//!
//! ## Failure Policy
//!
//! Exceeding the limit is reported as an [`OutOfMemory`] error and
//! propagated to the caller. No structure in the engine aborts on it, and
//! every structure leaves its state unchanged when a charge is refused.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A charge was refused because it would exceed the configured limit.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("out of memory: requested {requested} bytes with {used} bytes in use (limit: {limit:?})")]
pub struct OutOfMemory {
    /// Size of the refused allocation
    pub requested: usize,
    /// Bytes in use when the allocation was refused
    pub used: usize,
    /// The configured limit, if any
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    /// Bytes currently charged
    used: AtomicUsize,
    /// Highest value `used` has reached
    peak: AtomicUsize,
    /// Ceiling for `used` (None = unlimited)
    limit: Option<usize>,
}

/// Shared used-memory counter.
///
/// Cloning a tracker is cheap and yields a handle to the same counters,
/// so a key space and an event loop built from clones of one tracker are
/// accounted together.
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    counters: Arc<Counters>,
}

impl MemoryTracker {
    /// Creates a tracker without a limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker that refuses charges past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            counters: Arc::new(Counters {
                limit: Some(limit),
                ..Default::default()
            }),
        }
    }

    /// Charges `size` bytes.
    ///
    /// # Returns
    ///
    /// Returns `Err(OutOfMemory)` if the charge would push the counter past
    /// the limit (or overflow it). The counter is unchanged in that case.
    pub fn try_alloc(&self, size: usize) -> Result<(), OutOfMemory> {
        let limit = self.counters.limit;
        let result = self
            .counters
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                let next = used.checked_add(size)?;
                match limit {
                    Some(max) if next > max => None,
                    _ => Some(next),
                }
            });

        match result {
            Ok(previous) => {
                self.counters
                    .peak
                    .fetch_max(previous + size, Ordering::Relaxed);
                Ok(())
            }
            Err(used) => Err(OutOfMemory {
                requested: size,
                used,
                limit,
            }),
        }
    }

    /// Moves a charge from `old_size` to `new_size` bytes.
    ///
    /// Shrinking always succeeds. Growing only charges the difference and
    /// fails like [`try_alloc`](Self::try_alloc).
    pub fn try_realloc(&self, old_size: usize, new_size: usize) -> Result<(), OutOfMemory> {
        if new_size > old_size {
            self.try_alloc(new_size - old_size)
        } else {
            self.free(old_size - new_size);
            Ok(())
        }
    }

    /// Releases `size` bytes. The counter never goes below zero.
    pub fn free(&self, size: usize) {
        let _ = self
            .counters
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(size))
            });
    }

    /// Returns the number of bytes currently charged.
    pub fn used_memory(&self) -> usize {
        self.counters.used.load(Ordering::Relaxed)
    }

    /// Returns the highest number of bytes ever charged at once.
    pub fn peak_memory(&self) -> usize {
        self.counters.peak.load(Ordering::Relaxed)
    }

    /// Returns the configured limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.counters.limit
    }
}
