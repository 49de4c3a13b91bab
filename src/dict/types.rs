//! Table Behaviour
//!
//! A [`Dict`](crate::dict::Dict) knows nothing about its keys and values
//! beyond what its [`DictType`] tells it: how to hash a key, how to compare
//! two keys, and what to do with keys and values when they enter or leave
//! the table.
//!
//! ## Hooks
//!
//! | Hook            | Called when                         | Default          |
//! |-----------------|-------------------------------------|------------------|
//! | `hash`          | every lookup, insert and rehash     | (required)       |
//! | `key_compare`   | scanning a bucket chain             | `==`             |
//! | `dup_key`       | a key is stored                     | store as given   |
//! | `dup_value`     | a value is stored or replaced       | store as given   |
//! | `destroy_key`   | an entry is deleted or cleared      | drop             |
//! | `destroy_value` | an entry is deleted, cleared, or its value replaced | drop |
//!
//! Every hook receives the table's context value, so behaviour that needs
//! outside state (counters, pools, configuration) gets it explicitly.

use bytes::Bytes;

/// Pluggable behaviour of a hash table.
///
/// # Example
///
/// ```
/// use emberkv::dict::{int_hash, Dict, DictType};
///
/// struct Counters;
///
/// impl DictType for Counters {
///     type Key = u32;
///     type Value = u64;
///     type Context = ();
///
///     fn hash(&self, key: &u32) -> u64 {
///         u64::from(int_hash(*key))
///     }
/// }
///
/// let mut dict = Dict::new(Counters, ());
/// dict.insert(7, 1).unwrap();
/// assert_eq!(dict.get(&7), Some(&1));
/// ```
pub trait DictType {
    /// Key type stored in the table.
    type Key: PartialEq;
    /// Value type stored in the table.
    type Value;
    /// Caller data threaded through every hook.
    type Context;

    /// Hashes a key. Only the low bits selected by the size mask are used
    /// to pick a bucket, so they must be well distributed.
    fn hash(&self, key: &Self::Key) -> u64;

    /// Returns true if `stored` matches the lookup key `key`.
    fn key_compare(&self, _ctx: &Self::Context, key: &Self::Key, stored: &Self::Key) -> bool {
        key == stored
    }

    /// Produces the key that is actually stored for `key`.
    fn dup_key(&self, _ctx: &Self::Context, key: Self::Key) -> Self::Key {
        key
    }

    /// Produces the value that is actually stored for `value`.
    fn dup_value(&self, _ctx: &Self::Context, value: Self::Value) -> Self::Value {
        value
    }

    /// Releases a key leaving the table.
    fn destroy_key(&self, _ctx: &Self::Context, _key: Self::Key) {}

    /// Releases a value leaving the table.
    fn destroy_value(&self, _ctx: &Self::Context, _value: Self::Value) {}
}

/// Bernstein's djb2 string hash (`hash * 33 + c`, seeded with 5381).
pub fn gen_hash(buf: &[u8]) -> u32 {
    buf.iter().fold(5381u32, |hash, &c| {
        (hash << 5).wrapping_add(hash).wrapping_add(u32::from(c))
    })
}

/// Thomas Wang's 32 bit integer mix.
pub fn int_hash(key: u32) -> u32 {
    let mut key = key;
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Uses an integer key as its own hash.
pub fn identity_hash(key: u32) -> u32 {
    key
}

/// Byte-string keys copied into a buffer of their own, values stored as
/// given.
///
/// `Bytes` handed to the table are often slices of a larger buffer (a
/// network read buffer, for instance). Copying the key detaches it, so a
/// long-lived key does not pin the whole buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCopyKey;

impl DictType for StringCopyKey {
    type Key = Bytes;
    type Value = Bytes;
    type Context = ();

    fn hash(&self, key: &Bytes) -> u64 {
        u64::from(gen_hash(key))
    }

    fn dup_key(&self, _ctx: &(), key: Bytes) -> Bytes {
        Bytes::copy_from_slice(&key)
    }
}

/// Byte-string keys and values, both copied into buffers of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCopyKeyValue;

impl DictType for StringCopyKeyValue {
    type Key = Bytes;
    type Value = Bytes;
    type Context = ();

    fn hash(&self, key: &Bytes) -> u64 {
        u64::from(gen_hash(key))
    }

    fn dup_key(&self, _ctx: &(), key: Bytes) -> Bytes {
        Bytes::copy_from_slice(&key)
    }

    fn dup_value(&self, _ctx: &(), value: Bytes) -> Bytes {
        Bytes::copy_from_slice(&value)
    }
}

/// Byte-string keys and values owned by the table exactly as handed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStrings;

impl DictType for HeapStrings {
    type Key = Bytes;
    type Value = Bytes;
    type Context = ();

    fn hash(&self, key: &Bytes) -> u64 {
        u64::from(gen_hash(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_hash_known_values() {
        assert_eq!(gen_hash(b""), 5381);
        // 5381 * 33 + 'a'
        assert_eq!(gen_hash(b"a"), 5381 * 33 + 97);
        assert_eq!(gen_hash(b"ab"), (5381 * 33 + 97) * 33 + 98);
    }

    #[test]
    fn test_gen_hash_wraps() {
        // Long inputs must not panic on overflow
        let long = vec![0xffu8; 4096];
        let _ = gen_hash(&long);
    }

    #[test]
    fn test_int_hash_mixes() {
        assert_ne!(int_hash(1), int_hash(2));
        assert_eq!(int_hash(12345), int_hash(12345));
        assert_eq!(identity_hash(12345), 12345);
    }

    #[test]
    fn test_string_copy_key_detaches() {
        let buffer = Bytes::from_static(b"GET name\r\n");
        let key = buffer.slice(4..8);

        let copied = StringCopyKey.dup_key(&(), key.clone());
        assert_eq!(copied, key);
        assert_ne!(copied.as_ptr(), key.as_ptr());

        // Values are stored as given
        let value = buffer.slice(0..3);
        let stored = StringCopyKey.dup_value(&(), value.clone());
        assert_eq!(stored.as_ptr(), value.as_ptr());
    }

    #[test]
    fn test_string_copy_key_value_detaches_both() {
        let buffer = Bytes::from_static(b"SET k v");
        let value = buffer.slice(6..7);
        let stored = StringCopyKeyValue.dup_value(&(), value.clone());
        assert_eq!(stored, value);
        assert_ne!(stored.as_ptr(), value.as_ptr());
    }

    #[test]
    fn test_heap_strings_store_as_given() {
        let key = Bytes::from("key");
        let stored = HeapStrings.dup_key(&(), key.clone());
        assert_eq!(stored.as_ptr(), key.as_ptr());
        assert!(HeapStrings.key_compare(&(), &key, &stored));
    }
}
