// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Injected key/value hashing and equality.
//!
//! The map never assumes `K: Hash + Eq` or `V: PartialEq` — every
//! comparison and every routing hash goes through one of these traits, so
//! callers can hash/compare however their on-disk key encoding requires
//! (e.g. hashing the encoded bytes rather than the in-memory value).

/// Computes the 32-bit routing hash for a key and equality between two
/// keys of the same type.
pub trait KeyHasher<K>: Send + Sync {
    /// `seed` is always `0` for routing; the map also calls this with the
    /// configured `hash_seed` for `Entry::hash_code`-style external use.
    fn hash_code(&self, key: &K, seed: u32) -> u32;

    fn equals(&self, a: &K, b: &K) -> bool;
}

/// Computes a hash and equality for values; used by `remove(k, v)`,
/// `replace(k, old, new)`, and the `entries()` view's `contains`.
pub trait ValueHasher<V>: Send + Sync {
    fn hash_code(&self, value: &V, seed: u32) -> u32;

    fn equals(&self, a: &V, b: &V) -> bool;
}

/// A [`KeyHasher`]/[`ValueHasher`] for any `T: Hash + Eq + Clone` using
/// `rustc_hash`'s `FxHash`, the fast non-cryptographic hasher this crate's
/// teacher repo also reaches for internally.
///
/// Useful as a default for tests and for callers whose keys/values are
/// plain Rust types rather than raw encoded bytes.
pub struct DefaultHasher;

impl<T: std::hash::Hash + Eq> KeyHasher<T> for DefaultHasher {
    fn hash_code(&self, key: &T, seed: u32) -> u32 {
        fx_hash(key, seed)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

impl<T: std::hash::Hash + Eq> ValueHasher<T> for DefaultHasher {
    fn hash_code(&self, value: &T, seed: u32) -> u32 {
        fx_hash(value, seed)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

fn fx_hash<T: std::hash::Hash>(value: &T, seed: u32) -> u32 {
    use rustc_hash::FxHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = FxHasher::default();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish() as u32
}

/// A [`KeyHasher`] that always returns the same hash, for exercising
/// collision-chain behavior in tests (spec §8 scenario 2).
pub struct ConstantHasher(pub u32);

impl<T> KeyHasher<T> for ConstantHasher
where
    DefaultHasher: KeyHasher<T>,
{
    fn hash_code(&self, _key: &T, _seed: u32) -> u32 {
        self.0
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        DefaultHasher.equals(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_hasher_is_deterministic() {
        let a = DefaultHasher.hash_code(&"hello".to_string(), 0);
        let b = DefaultHasher.hash_code(&"hello".to_string(), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn default_hasher_seed_changes_output() {
        let a = DefaultHasher.hash_code(&"hello".to_string(), 0);
        let b = DefaultHasher.hash_code(&"hello".to_string(), 7);
        assert_ne!(a, b);
    }

    #[test]
    fn constant_hasher_always_collides() {
        let h = ConstantHasher(0);
        assert_eq!(0, KeyHasher::<String>::hash_code(&h, &"a".to_string(), 0));
        assert_eq!(0, KeyHasher::<String>::hash_code(&h, &"b".to_string(), 0));
    }
}
