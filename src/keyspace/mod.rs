//! Key Space Module
//!
//! The server-level consumer of the two engine components: a fixed set of
//! numbered databases (hash tables) and a reactor timer that keeps them in
//! shape.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐                │
//! │  │  DB 0  │ │  DB 1  │ │  DB 2  │ │...N    │                │
//! │  │  Dict  │ │  Dict  │ │  Dict  │ │  dbs   │                │
//! │  └────────┘ └────────┘ └────────┘ └────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ Rc<RefCell<_>>
//!              ┌─────────────┴─────────────┐
//!              │        ServerCron         │
//!              │   (EventLoop time event)  │
//!              └───────────────────────────┘
//! ```

pub mod cron;
pub mod space;

// Re-export commonly used types
pub use cron::{CronConfig, CronHandle, ServerCron};
pub use space::{Db, Keyspace, KeyspaceStats, HT_MINFILL};
