//! Hash Table Module
//!
//! The key-value store behind every database of the key space: a chained
//! hash table with power-of-two bucket counts and stop-the-world growth.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dict<T>                              │
//! │  ┌──────────────┐   ┌─────────────────────┐   ┌──────────┐  │
//! │  │ bucket heads │──>│ entry arena (slots) │   │ T: hooks │  │
//! │  │ Vec<Option>  │   │ key, value, next    │   │ + ctx    │  │
//! │  └──────────────┘   └─────────────────────┘   └──────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!          │ charges buckets and entries
//!          ▼
//!   MemoryTracker
//! ```
//!
//! ## Submodules
//!
//! - `table`: the table itself and its operations
//! - `types`: the [`DictType`] trait, hash functions, built-in types
//! - `iter`: [`Cursor`] and [`Iter`]
//! - `stats`: [`DictStats`]
//!
//! ## Example
//!
//! ```
//! use emberkv::dict::{Dict, StringCopyKey};
//! use bytes::Bytes;
//!
//! let mut dict = Dict::new(StringCopyKey, ());
//! for i in 0..5 {
//!     dict.insert(Bytes::from(format!("key:{}", i)), Bytes::from("v")).unwrap();
//! }
//!
//! // The fifth insertion doubled the table
//! assert_eq!(dict.size(), 8);
//! assert_eq!(dict.len(), 5);
//! ```

pub mod iter;
pub mod stats;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use iter::{Cursor, Iter};
pub use stats::{DictStats, STATS_VECTLEN};
pub use table::{Dict, DictError, EntryRef, DICT_HT_INITIAL_SIZE};
pub use types::{
    gen_hash, identity_hash, int_hash, DictType, HeapStrings, StringCopyKey, StringCopyKeyValue,
};
