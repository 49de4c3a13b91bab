//! Numbered Databases
//!
//! The key space is a fixed array of independent hash tables ("databases"),
//! all charging the same memory tracker.
//!
//! ## Shrinking
//!
//! Tables only grow on insertion. A table that was once large and then
//! emptied keeps its bucket array until something shrinks it, which is
//! what [`Keyspace::try_resize_tables`] does for every database whose fill
//! dropped below [`HT_MINFILL`] percent.

use crate::dict::{Dict, StringCopyKey, DICT_HT_INITIAL_SIZE};
use crate::memory::MemoryTracker;
use tracing::{debug, warn};

/// Minimal fill (in percent) below which a table is shrunk.
pub const HT_MINFILL: usize = 10;

/// One database: byte-string keys copied on insert, values stored as given.
pub type Db = Dict<StringCopyKey>;

/// Key space statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyspaceStats {
    /// Number of databases
    pub dbs: usize,
    /// Keys over all databases
    pub keys: usize,
    /// Buckets over all databases
    pub slots: usize,
    /// Bytes charged to the shared tracker
    pub used_memory: usize,
}

/// A fixed set of numbered databases.
///
/// # Example
///
/// ```
/// use emberkv::keyspace::Keyspace;
/// use emberkv::memory::MemoryTracker;
/// use bytes::Bytes;
///
/// let mut keyspace = Keyspace::new(16, MemoryTracker::new());
///
/// let db = keyspace.db_mut(0).unwrap();
/// db.insert(Bytes::from("name"), Bytes::from("Ariz")).unwrap();
///
/// assert_eq!(keyspace.total_keys(), 1);
/// assert!(keyspace.db(16).is_none());
/// ```
#[derive(Debug)]
pub struct Keyspace {
    dbs: Vec<Db>,
    memory: MemoryTracker,
}

impl Keyspace {
    /// Creates `dbnum` empty databases charging `memory`.
    pub fn new(dbnum: usize, memory: MemoryTracker) -> Self {
        let dbs = (0..dbnum)
            .map(|_| Dict::with_memory(StringCopyKey, (), memory.clone()))
            .collect();
        Self { dbs, memory }
    }

    /// Returns database `index`.
    pub fn db(&self, index: usize) -> Option<&Db> {
        self.dbs.get(index)
    }

    /// Returns database `index`, mutably.
    pub fn db_mut(&mut self, index: usize) -> Option<&mut Db> {
        self.dbs.get_mut(index)
    }

    /// Returns the number of databases.
    pub fn len(&self) -> usize {
        self.dbs.len()
    }

    /// Returns true if there are no databases at all.
    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty()
    }

    /// Iterates over `(index, db)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Db)> {
        self.dbs.iter().enumerate()
    }

    /// Returns the number of keys over all databases.
    pub fn total_keys(&self) -> usize {
        self.dbs.iter().map(Dict::len).sum()
    }

    /// Returns the shared memory tracker.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    /// Returns key space statistics.
    pub fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            dbs: self.dbs.len(),
            keys: self.total_keys(),
            slots: self.dbs.iter().map(Dict::size).sum(),
            used_memory: self.memory.used_memory(),
        }
    }

    /// Returns true if `db` is large and mostly empty.
    pub fn needs_resize(db: &Db) -> bool {
        let size = db.size();
        let used = db.len();
        size > DICT_HT_INITIAL_SIZE && used * 100 / size < HT_MINFILL
    }

    /// Shrinks every database that [`needs_resize`](Self::needs_resize).
    ///
    /// # Returns
    ///
    /// The number of databases that were shrunk.
    pub fn try_resize_tables(&mut self) -> usize {
        let mut resized = 0;

        for (index, db) in self.dbs.iter_mut().enumerate() {
            if !Self::needs_resize(db) {
                continue;
            }

            let from = db.size();
            match db.resize_to_fit() {
                Ok(()) => {
                    debug!(db = index, from, to = db.size(), "Database shrunk");
                    resized += 1;
                }
                Err(e) => {
                    warn!(db = index, error = %e, "Failed to shrink database");
                }
            }
        }

        resized
    }
}
