//! Auto-Resizing Chained Hash Table
//!
//! This module implements the hash table every key space is stored in.
//!
//! ## Layout
//!
//! ```text
//!  table (size = 2^n, sizemask = size - 1)
//! ┌─────┐
//! │  0  │──> entry ──> entry ──> ∅
//! ├─────┤
//! │  1  │──> ∅
//! ├─────┤
//! │  2  │──> entry ──> ∅
//! ├─────┤
//! │ ... │
//! └─────┘
//! ```
//!
//! A key always lives in bucket `hash(key) & sizemask`. Collisions are
//! chained, newest entry first. Entries are owned by a generational arena
//! and the chains link arena keys, so unlinking an entry can never leave a
//! dangling link behind: a stale key simply stops resolving.
//!
//! ## Growth Policy
//!
//! - An empty table owns no bucket array (size 0).
//! - The first insertion allocates [`DICT_HT_INITIAL_SIZE`] buckets.
//! - When `used == size` the next insertion first doubles the table.
//! - Rehashing is a single stop-the-world pass; entries are relinked, not
//!   reallocated.
//! - [`Dict::resize_to_fit`] shrinks to the smallest power of two that
//!   holds every entry (never below the initial size).

use crate::dict::types::DictType;
use crate::memory::{MemoryTracker, OutOfMemory};
use rand::Rng;
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::mem;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of buckets allocated by the first insertion.
pub const DICT_HT_INITIAL_SIZE: usize = 4;

new_key_type! {
    /// Arena key of a table entry.
    pub(crate) struct EntryKey;
}

/// Bytes charged per bucket slot.
const BUCKET_SIZE: usize = mem::size_of::<Option<EntryKey>>();

/// Errors returned by hash table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DictError {
    /// A resize was requested below the number of stored entries
    #[error("invalid table size {requested}: table holds {used} entries")]
    InvalidSize { requested: usize, used: usize },

    /// The key is already present
    #[error("key already exists")]
    KeyExists,

    /// The key is not present
    #[error("key not found")]
    NotFound,

    /// The memory tracker refused an allocation
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// A stored key-value pair and the link to the next entry in its bucket.
#[derive(Debug)]
pub(crate) struct DictEntry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Option<EntryKey>,
}

/// A borrowed view of one table entry.
pub struct EntryRef<'a, K, V> {
    key: &'a K,
    value: &'a V,
}

impl<'a, K, V> EntryRef<'a, K, V> {
    pub(crate) fn new(key: &'a K, value: &'a V) -> Self {
        Self { key, value }
    }

    /// Returns the stored key.
    pub fn key(&self) -> &'a K {
        self.key
    }

    /// Returns the stored value.
    pub fn value(&self) -> &'a V {
        self.value
    }
}

impl<K, V> Clone for EntryRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for EntryRef<'_, K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for EntryRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("key", self.key)
            .field("value", self.value)
            .finish()
    }
}

/// A chained hash table with pluggable behaviour.
///
/// # Example
///
/// ```
/// use emberkv::dict::{Dict, DictError, StringCopyKey};
/// use bytes::Bytes;
///
/// let mut dict = Dict::new(StringCopyKey, ());
///
/// dict.insert(Bytes::from("name"), Bytes::from("Ariz")).unwrap();
/// assert_eq!(dict.get(&Bytes::from("name")), Some(&Bytes::from("Ariz")));
///
/// // Inserting an existing key fails, replacing it does not
/// assert_eq!(
///     dict.insert(Bytes::from("name"), Bytes::from("other")),
///     Err(DictError::KeyExists)
/// );
/// dict.replace(Bytes::from("name"), Bytes::from("other")).unwrap();
/// assert_eq!(dict.len(), 1);
/// ```
pub struct Dict<T: DictType> {
    /// Bucket chain heads
    pub(crate) table: Vec<Option<EntryKey>>,

    /// Entry storage
    pub(crate) entries: SlotMap<EntryKey, DictEntry<T::Key, T::Value>>,

    /// `table.len() - 1` once allocated
    sizemask: usize,

    /// Behaviour hooks
    ty: T,

    /// Caller data handed to every hook
    ctx: T::Context,

    /// Accounting for buckets and entries
    memory: MemoryTracker,
}

impl<T: DictType> fmt::Debug for Dict<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("size", &self.size())
            .field("used", &self.len())
            .finish()
    }
}

impl<T: DictType> Dict<T> {
    /// Creates an empty table. No bucket array is allocated until the
    /// first insertion.
    pub fn new(ty: T, ctx: T::Context) -> Self {
        Self::with_memory(ty, ctx, MemoryTracker::new())
    }

    /// Creates an empty table that charges its memory to `memory`.
    pub fn with_memory(ty: T, ctx: T::Context, memory: MemoryTracker) -> Self {
        Self {
            table: Vec::new(),
            entries: SlotMap::with_key(),
            sizemask: 0,
            ty,
            ctx,
            memory,
        }
    }

    /// Returns the number of buckets (0 for a table that never grew).
    #[inline]
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Returns the number of stored entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the context handed to the behaviour hooks.
    pub fn context(&self) -> &T::Context {
        &self.ctx
    }

    /// Returns the memory tracker this table charges.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    #[inline]
    fn entry_size() -> usize {
        mem::size_of::<DictEntry<T::Key, T::Value>>()
    }

    /// Bucket index of `key` under the current size mask.
    #[inline]
    pub(crate) fn bucket_index(&self, key: &T::Key) -> usize {
        (self.ty.hash(key) as usize) & self.sizemask
    }

    /// Resizes the bucket array to hold at least `size` buckets.
    ///
    /// The real size is the next power of two at or above `size` (never
    /// below [`DICT_HT_INITIAL_SIZE`]). Every entry is relinked into the new
    /// array in one pass.
    ///
    /// # Errors
    ///
    /// - `InvalidSize` if `size` is smaller than the number of entries
    /// - `OutOfMemory` if the new bucket array cannot be charged or allocated
    ///
    /// The table is unchanged on error.
    pub fn expand(&mut self, size: usize) -> Result<(), DictError> {
        let used = self.len();
        if used > size {
            return Err(DictError::InvalidSize {
                requested: size,
                used,
            });
        }

        let realsize = size
            .max(DICT_HT_INITIAL_SIZE)
            .checked_next_power_of_two()
            .ok_or_else(|| self.refused(usize::MAX))?;
        let new_bytes = realsize
            .checked_mul(BUCKET_SIZE)
            .ok_or_else(|| self.refused(usize::MAX))?;

        self.memory.try_alloc(new_bytes).inspect_err(|e| {
            warn!(from = self.size(), to = realsize, error = %e, "Hash table expand refused");
        })?;

        let mut table = Vec::new();
        if table.try_reserve_exact(realsize).is_err() {
            self.memory.free(new_bytes);
            return Err(self.refused(new_bytes).into());
        }
        table.resize(realsize, None);

        // Relink every chain into the new array, head-inserting
        let sizemask = realsize - 1;
        let old = mem::take(&mut self.table);
        for head in &old {
            let mut cursor = *head;
            while let Some(key) = cursor {
                let entry = &mut self.entries[key];
                cursor = entry.next;

                let index = (self.ty.hash(&entry.key) as usize) & sizemask;
                entry.next = table[index];
                table[index] = Some(key);
            }
        }

        self.memory.free(old.len() * BUCKET_SIZE);
        self.table = table;
        self.sizemask = sizemask;

        debug!(from = old.len(), to = realsize, used, "Hash table resized");
        Ok(())
    }

    /// Shrinks (or grows) the table to the smallest size that holds every
    /// entry, with a floor of [`DICT_HT_INITIAL_SIZE`].
    pub fn resize_to_fit(&mut self) -> Result<(), DictError> {
        let minimal = self.len().max(DICT_HT_INITIAL_SIZE);
        self.expand(minimal)
    }

    /// Grows the table if the next insertion needs room.
    fn expand_if_needed(&mut self) -> Result<(), DictError> {
        if self.table.is_empty() {
            return self.expand(DICT_HT_INITIAL_SIZE);
        }
        if self.len() == self.size() {
            return self.expand(self.size() * 2);
        }
        Ok(())
    }

    /// Finds the arena key of the entry matching `key`.
    fn lookup(&self, key: &T::Key) -> Option<EntryKey> {
        if self.table.is_empty() {
            return None;
        }

        let mut cursor = self.table[self.bucket_index(key)];
        while let Some(k) = cursor {
            let entry = &self.entries[k];
            if self.ty.key_compare(&self.ctx, key, &entry.key) {
                return Some(k);
            }
            cursor = entry.next;
        }
        None
    }

    /// Adds a new entry.
    ///
    /// The key and value pass through the `dup_key` / `dup_value` hooks
    /// before being stored.
    ///
    /// # Errors
    ///
    /// - `KeyExists` if the key is already present (the table is unchanged)
    /// - `OutOfMemory` if growing the table or storing the entry is refused
    pub fn insert(&mut self, key: T::Key, value: T::Value) -> Result<(), DictError> {
        if self.lookup(&key).is_some() {
            return Err(DictError::KeyExists);
        }

        // Charge the entry first so a refused growth leaves nothing behind
        self.memory.try_alloc(Self::entry_size())?;
        if let Err(e) = self.expand_if_needed() {
            self.memory.free(Self::entry_size());
            return Err(e);
        }

        let key = self.ty.dup_key(&self.ctx, key);
        let value = self.ty.dup_value(&self.ctx, value);

        let index = self.bucket_index(&key);
        let next = self.table[index];
        let k = self.entries.insert(DictEntry { key, value, next });
        self.table[index] = Some(k);

        Ok(())
    }

    /// Adds an entry, or overwrites the value of an existing one.
    ///
    /// When the key exists, the old value goes through `destroy_value` and
    /// the new one through `dup_value`. The number of entries does not
    /// change in that case.
    ///
    /// # Errors
    ///
    /// Only `OutOfMemory`, when a new entry needs room that is refused.
    pub fn replace(&mut self, key: T::Key, value: T::Value) -> Result<(), DictError> {
        match self.lookup(&key) {
            Some(k) => {
                let value = self.ty.dup_value(&self.ctx, value);
                let old = mem::replace(&mut self.entries[k].value, value);
                self.ty.destroy_value(&self.ctx, old);
                Ok(())
            }
            None => self.insert(key, value),
        }
    }

    /// Unlinks the entry matching `key` from its chain and the arena.
    fn unlink(&mut self, key: &T::Key) -> Option<DictEntry<T::Key, T::Value>> {
        if self.table.is_empty() {
            return None;
        }

        let index = self.bucket_index(key);
        let mut prev: Option<EntryKey> = None;
        let mut cursor = self.table[index];

        while let Some(k) = cursor {
            let entry = &self.entries[k];
            if self.ty.key_compare(&self.ctx, key, &entry.key) {
                let next = entry.next;
                match prev {
                    Some(p) => self.entries[p].next = next,
                    None => self.table[index] = next,
                }
                let removed = self.entries.remove(k);
                self.memory.free(Self::entry_size());
                return removed;
            }
            prev = cursor;
            cursor = entry.next;
        }

        None
    }

    /// Removes an entry, releasing its key and value through the
    /// `destroy_key` / `destroy_value` hooks.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is not present (the table is unchanged).
    pub fn delete(&mut self, key: &T::Key) -> Result<(), DictError> {
        let entry = self.unlink(key).ok_or(DictError::NotFound)?;
        self.ty.destroy_key(&self.ctx, entry.key);
        self.ty.destroy_value(&self.ctx, entry.value);
        Ok(())
    }

    /// Removes an entry and hands its key and value back to the caller
    /// instead of releasing them.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is not present (the table is unchanged).
    pub fn take(&mut self, key: &T::Key) -> Result<(T::Key, T::Value), DictError> {
        let entry = self.unlink(key).ok_or(DictError::NotFound)?;
        Ok((entry.key, entry.value))
    }

    /// Looks up the entry for `key`.
    pub fn find(&self, key: &T::Key) -> Result<EntryRef<'_, T::Key, T::Value>, DictError> {
        let k = self.lookup(key).ok_or(DictError::NotFound)?;
        let entry = &self.entries[k];
        Ok(EntryRef::new(&entry.key, &entry.value))
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &T::Key) -> Option<&T::Value> {
        self.lookup(key).map(|k| &self.entries[k].value)
    }

    /// Returns the value stored for `key`, mutably.
    pub fn get_mut(&mut self, key: &T::Key) -> Option<&mut T::Value> {
        let k = self.lookup(key)?;
        Some(&mut self.entries[k].value)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &T::Key) -> bool {
        self.lookup(key).is_some()
    }

    /// Picks a random entry.
    ///
    /// A non-empty bucket is chosen uniformly (by rejection sampling bucket
    /// indices), then an entry is chosen uniformly within its chain. The
    /// result is uniform over non-empty buckets, not over entries: an entry
    /// sharing its bucket with nine others is ten times less likely to be
    /// picked than an entry alone in its bucket.
    pub fn random_entry<R: Rng>(
        &self,
        rng: &mut R,
    ) -> Option<EntryRef<'_, T::Key, T::Value>> {
        if self.is_empty() {
            return None;
        }

        let head = loop {
            let index = rng.random_range(0..self.size());
            if let Some(k) = self.table[index] {
                break k;
            }
        };

        let mut chain_len = 0;
        let mut cursor = Some(head);
        while let Some(k) = cursor {
            chain_len += 1;
            cursor = self.entries[k].next;
        }

        let mut k = head;
        for _ in 0..rng.random_range(0..chain_len) {
            match self.entries[k].next {
                Some(next) => k = next,
                None => break,
            }
        }

        let entry = &self.entries[k];
        Some(EntryRef::new(&entry.key, &entry.value))
    }

    /// Removes every entry through the destroy hooks and releases the
    /// bucket array. The table goes back to size 0.
    pub fn clear(&mut self) {
        let entries = self.entries.len();
        for (_, entry) in self.entries.drain() {
            self.ty.destroy_key(&self.ctx, entry.key);
            self.ty.destroy_value(&self.ctx, entry.value);
        }

        self.memory
            .free(entries * Self::entry_size() + self.table.len() * BUCKET_SIZE);
        self.table = Vec::new();
        self.sizemask = 0;
    }

    fn refused(&self, requested: usize) -> OutOfMemory {
        OutOfMemory {
            requested,
            used: self.memory.used_memory(),
            limit: self.memory.limit(),
        }
    }
}

impl<T: DictType> Drop for Dict<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
