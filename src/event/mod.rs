//! Event Reactor Module
//!
//! A cooperative single-threaded reactor: file descriptor readiness via
//! `select(2)` plus millisecond software timers, all dispatched from one
//! loop on one thread.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │           EventLoop           │
//!                 │                               │
//!  create_file ──>│  file events (fd, mask, cb)   │
//!  create_time ──>│  time events (id, when, cb)   │
//!                 │                               │
//!                 │  process_events(flags)        │
//!                 │    ├── select(2) ─────────────┼──> kernel
//!                 │    ├── ready fds ──> callbacks│
//!                 │    └── due timers ──> callbacks
//!                 └───────────────────────────────┘
//!                          │ reads time from
//!                          ▼
//!                   Clock (system / manual)
//! ```
//!
//! ## Submodules
//!
//! - `event_loop`: the reactor
//! - `mask`: [`Mask`] and [`ProcessFlags`]
//! - `time`: [`When`] and the [`Clock`] implementations
//! - `select`: the `select(2)` wrapper and the standalone [`wait`]

pub mod event_loop;
pub mod mask;
pub mod select;
pub mod time;

// Re-export commonly used types
pub use event_loop::{
    EventError, EventLoop, FileProc, Finalizer, TimeProc, TimerAction, TimerId,
};
pub use mask::{Mask, ProcessFlags};
pub use select::wait;
pub use time::{Clock, ManualClock, SystemClock, When};
