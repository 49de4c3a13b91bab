//! # EmberKV - The Engine Layer of an In-Memory Key-Value Server
//!
//! EmberKV provides the two building blocks a single-threaded key-value
//! server is made of: an event reactor that multiplexes file descriptor
//! readiness and timers on one thread, and an auto-resizing chained hash
//! table that stores the key space.
//!
//! ## Features
//!
//! - **Event Reactor**: `select(2)` readiness plus millisecond timers, with
//!   callbacks that may add and remove events while being dispatched
//! - **Hash Table**: power-of-two buckets, growth on demand, pluggable
//!   hashing / comparison / ownership hooks
//! - **Memory Accounting**: every structure charges an explicit tracker with
//!   an optional limit; exceeding it is an error, never an abort
//! - **Key Space Cron**: a periodic timer that reports statistics and shrinks
//!   sparse tables
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                    │
//! │                                                                         │
//! │  ┌─────────────────────────┐          ┌───────────────────────────────┐ │
//! │  │        EventLoop        │  timer   │           Keyspace            │ │
//! │  │  file events  (select)  │─────────>│  ┌──────┐ ┌──────┐ ┌──────┐   │ │
//! │  │  time events  (linear)  │ServerCron│  │ DB 0 │ │ DB 1 │ │ ...N │   │ │
//! │  └────────────┬────────────┘          │  │ Dict │ │ Dict │ │ Dict │   │ │
//! │               │                       │  └──────┘ └──────┘ └──────┘   │ │
//! │               │                       └───────────────┬───────────────┘ │
//! │               │                                       │                 │
//! │               ▼                                       ▼                 │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                          MemoryTracker                            │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use emberkv::event::{EventLoop, ProcessFlags, TimerAction};
//! use emberkv::dict::{Dict, StringCopyKey};
//! use bytes::Bytes;
//!
//! // A table
//! let mut dict = Dict::new(StringCopyKey, ());
//! dict.insert(Bytes::from("name"), Bytes::from("Ariz")).unwrap();
//! assert_eq!(dict.get(&Bytes::from("name")), Some(&Bytes::from("Ariz")));
//!
//! // A loop with one timer
//! let mut el = EventLoop::new();
//! el.create_time_event(0, |_el: &mut EventLoop, _id| TimerAction::NoMore, None)
//!     .unwrap();
//! let fired = el.process_events(ProcessFlags::ALL_EVENTS).unwrap();
//! assert_eq!(fired, 1);
//! ```
//!
//! ## Module Overview
//!
//! - [`dict`]: the hash table, its behaviour trait, iteration and stats
//! - [`event`]: the event reactor
//! - [`memory`]: the memory tracker
//! - [`keyspace`]: numbered databases and the maintenance cron
//!
//! ## Design Highlights
//!
//! ### Arena-Owned Chains
//!
//! Table entries live in a generational arena and bucket chains link arena
//! keys. A cursor that outlives the entry it points at finds a dead key,
//! never freed memory.
//!
//! ### Callbacks Get The Loop
//!
//! Every reactor callback receives `&mut EventLoop`. The dispatcher takes the
//! callback out of its event while it runs and puts it back afterwards, so a
//! callback can delete its own event, or any other, safely.

pub mod dict;
pub mod event;
pub mod keyspace;
pub mod memory;

// Re-export commonly used types for convenience
pub use dict::{Dict, DictError, DictType};
pub use event::{EventError, EventLoop, Mask, ProcessFlags, TimerAction, TimerId};
pub use keyspace::{CronConfig, Keyspace, ServerCron};
pub use memory::{MemoryTracker, OutOfMemory};

/// Number of databases a server creates by default
pub const DEFAULT_DBNUM: usize = 16;

/// Default interval of the key space cron, in milliseconds
pub const DEFAULT_CRON_MS: u64 = 1000;

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
