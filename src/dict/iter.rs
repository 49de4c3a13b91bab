//! Table Iteration
//!
//! Two ways to walk a table:
//!
//! - [`Dict::iter`] borrows the table for the whole walk, like any Rust
//!   iterator.
//! - [`Dict::cursor`] returns a [`Cursor`] that borrows the table only for
//!   the duration of each step. Between steps the caller may delete the
//!   entry it was just handed (and nothing else), which is what a sweep
//!   that evicts as it goes needs.
//!
//! ## Why The Cursor Survives Deletion
//!
//! ```text
//!   step N returns  ──>  [A] ──> [B] ──> ∅
//!                              ▲
//!                        next_entry (captured before returning A)
//!
//!   caller deletes A     [B] ──> ∅
//!
//!   step N+1 resumes at B, never looking at A's links again
//! ```

use crate::dict::table::{Dict, EntryKey, EntryRef};
use crate::dict::types::DictType;

/// A detached position in a table walk.
///
/// # Example
///
/// ```
/// use emberkv::dict::{Dict, StringCopyKey};
/// use bytes::Bytes;
///
/// let mut dict = Dict::new(StringCopyKey, ());
/// for i in 0..10 {
///     dict.insert(Bytes::from(format!("key:{}", i)), Bytes::from("v")).unwrap();
/// }
///
/// // Delete every entry while walking
/// let mut cursor = dict.cursor();
/// while let Some(key) = cursor.next(&dict).map(|e| e.key().clone()) {
///     dict.delete(&key).unwrap();
/// }
/// assert!(dict.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Current bucket, -1 before the first one
    index: isize,
    /// Entry returned by the last step
    entry: Option<EntryKey>,
    /// Chain successor of `entry`, captured before it was returned
    next_entry: Option<EntryKey>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    /// Creates a cursor positioned before the first bucket.
    pub fn new() -> Self {
        Self {
            index: -1,
            entry: None,
            next_entry: None,
        }
    }

    /// Advances to the next entry of `dict` and returns it.
    ///
    /// Entries inserted after the cursor was created may or may not be
    /// visited.
    pub fn next<'a, T: DictType>(
        &mut self,
        dict: &'a Dict<T>,
    ) -> Option<EntryRef<'a, T::Key, T::Value>> {
        loop {
            if self.entry.is_none() {
                self.index += 1;
                if self.index < 0 || self.index as usize >= dict.size() {
                    return None;
                }
                self.entry = dict.table[self.index as usize];
            } else {
                self.entry = self.next_entry;
            }

            if let Some(k) = self.entry {
                match dict.entries.get(k) {
                    Some(entry) => {
                        self.next_entry = entry.next;
                        return Some(EntryRef::new(&entry.key, &entry.value));
                    }
                    // The successor itself was removed: finish this bucket
                    None => self.entry = None,
                }
            }
        }
    }
}

/// Borrowing iterator over the entries of a table.
pub struct Iter<'a, T: DictType> {
    dict: &'a Dict<T>,
    cursor: Cursor,
    remaining: usize,
}

impl<'a, T: DictType> Iterator for Iter<'a, T> {
    type Item = (&'a T::Key, &'a T::Value);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next(self.dict)?;
        self.remaining = self.remaining.saturating_sub(1);
        Some((entry.key(), entry.value()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: DictType> ExactSizeIterator for Iter<'_, T> {}

impl<T: DictType> Dict<T> {
    /// Returns a cursor positioned before the first bucket of this table.
    pub fn cursor(&self) -> Cursor {
        Cursor::new()
    }

    /// Returns an iterator over `(key, value)` pairs in bucket order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            dict: self,
            cursor: Cursor::new(),
            remaining: self.len(),
        }
    }
}

impl<'a, T: DictType> IntoIterator for &'a Dict<T> {
    type Item = (&'a T::Key, &'a T::Value);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
