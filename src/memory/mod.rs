//! Memory Accounting Module
//!
//! Every structure in the engine that owns heap memory on behalf of the
//! server (hash table buckets and entries, reactor event records) charges
//! it against a [`MemoryTracker`]. The tracker is an explicit object: the
//! server creates one and hands clones of it to the structures it builds,
//! and tests can create as many independent trackers as they like.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MemoryTracker                           │
//! │            used / peak counters, optional limit              │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲ try_alloc / free        ▲ try_alloc / free
//!        │                         │
//! ┌──────┴───────┐          ┌──────┴───────┐
//! │  Dict (x N)  │          │  EventLoop   │
//! │ buckets +    │          │ file / time  │
//! │ entries      │          │ events       │
//! └──────────────┘          └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use emberkv::memory::MemoryTracker;
//!
//! let tracker = MemoryTracker::with_limit(1024);
//! tracker.try_alloc(512).unwrap();
//! assert_eq!(tracker.used_memory(), 512);
//!
//! // Going over the limit fails without changing the counter
//! assert!(tracker.try_alloc(1024).is_err());
//! assert_eq!(tracker.used_memory(), 512);
//!
//! tracker.free(512);
//! assert_eq!(tracker.used_memory(), 0);
//! ```

pub mod tracker;

// Re-export commonly used types
pub use tracker::{MemoryTracker, OutOfMemory};
