// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Snapshot-style iteration over a map's entries, keys, and values.
//!
//! Iteration takes no map-wide lock: the set of leaf recids per segment is
//! captured (under that segment's read lock, released immediately after)
//! when the iterator is constructed, and leaves are then read one at a
//! time as the iterator advances. A put/remove racing with an in-progress
//! iterator may or may not be observed, and a removed leaf may fail to
//! decode if reused for other work in the meantime — ordinary storage
//! errors are surfaced through the `Result` item rather than panicking.

use crate::error::Result;
use crate::map::HMap;
use std::collections::VecDeque;

/// Iterates every `(key, value)` pair the map held when this iterator was
/// constructed, across every segment, in unspecified order.
pub struct Iter<'a, K, V> {
    map: &'a HMap<K, V>,
    pending_leaves: VecDeque<(usize, u64)>,
    current: std::vec::IntoIter<(K, V)>,
}

impl<'a, K, V> Iter<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub(crate) fn new(map: &'a HMap<K, V>) -> Self {
        let mut pending_leaves = VecDeque::new();

        for (seg_idx, segment) in map.segments.iter().enumerate() {
            let _guard = segment.lock.read();
            let mut recids = Vec::new();
            segment.index_tree.for_each(&mut |_index, recid| recids.push(recid));
            pending_leaves.extend(recids.into_iter().map(|recid| (seg_idx, recid)));
        }

        Self { map, pending_leaves, current: Vec::new().into_iter() }
    }

    fn load_next_leaf(&mut self) -> Option<Result<()>> {
        let (seg_idx, leaf_recid) = self.pending_leaves.pop_front()?;
        let segment = &self.map.segments[seg_idx];
        let _guard = segment.lock.read();

        match self.map.read_leaf(segment, leaf_recid) {
            Ok(leaf) => {
                let mut pairs = Vec::with_capacity(leaf.triples.len());
                for triple in leaf.triples {
                    match self.map.unwrap_value(segment, &triple.value) {
                        Ok(value) => pairs.push((triple.key, value)),
                        Err(e) => return Some(Err(e)),
                    }
                }
                self.current = pairs.into_iter();
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.current.next() {
                return Some(Ok(pair));
            }

            match self.load_next_leaf()? {
                Ok(()) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Iterates every key, in the same unspecified order as [`Iter`].
pub struct Keys<'a, K, V>(Iter<'a, K, V>);

impl<'a, K, V> Keys<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub(crate) fn new(map: &'a HMap<K, V>) -> Self {
        Self(Iter::new(map))
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|r| r.map(|(k, _)| k))
    }
}

/// Iterates every value, in the same unspecified order as [`Iter`].
pub struct Values<'a, K, V>(Iter<'a, K, V>);

impl<'a, K, V> Values<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub(crate) fn new(map: &'a HMap<K, V>) -> Self {
        Self(Iter::new(map))
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|r| r.map(|(_, v)| v))
    }
}

impl<K, V> HMap<K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self)
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self)
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self)
    }

    /// A live view of this map's entries: `entries().iter()` yields
    /// `Entry`s that cache their value until `set_value` is called, and
    /// `entries().contains(k, v)` checks membership with `ValueHasher::equals`
    /// rather than requiring `V: PartialEq`.
    pub fn entries(&self) -> Entries<'_, K, V> {
        Entries::new(self)
    }

    /// Structural hash over the whole map: the XOR-sum of
    /// `keyHasher.hashCode(k, hashSeed) ^ valueHasher.hashCode(v, hashSeed)`
    /// across every entry. Independent of iteration order.
    pub fn hash_code(&self) -> Result<u32> {
        let seed = self.config.hash_seed;
        let mut total = 0u32;
        for pair in self.iter() {
            let (k, v) = pair?;
            total ^= self.key_hasher.hash_code(&k, seed) ^ self.value_hasher.hash_code(&v, seed);
        }
        Ok(total)
    }

    /// Structural equality: same size, and the same value (per
    /// `ValueHasher::equals`) at every key.
    pub fn equals_map(&self, other: &HMap<K, V>) -> Result<bool> {
        if self.len()? != other.len()? {
            return Ok(false);
        }

        for pair in self.iter() {
            let (k, v) = pair?;
            match other.get(&k)? {
                Some(other_v) if self.value_hasher.equals(&v, &other_v) => {}
                _ => return Ok(false),
            }
        }

        Ok(true)
    }
}

/// A live view over `(key, value)` pairs. Delegates back to the map rather
/// than holding a snapshot of its own.
pub struct Entries<'a, K, V> {
    map: &'a HMap<K, V>,
}

impl<'a, K, V> Entries<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub(crate) fn new(map: &'a HMap<K, V>) -> Self {
        Self { map }
    }

    pub fn iter(&self) -> EntryIter<'a, K, V> {
        EntryIter::new(self.map)
    }

    /// `valueHasher.equals` against the live value at `key`, not the
    /// snapshot any in-flight iterator may have cached.
    pub fn contains(&self, key: &K, value: &V) -> Result<bool> {
        match self.map.get(key)? {
            Some(current) => Ok(self.map.value_hasher.equals(&current, value)),
            None => Ok(false),
        }
    }
}

/// One entry yielded by [`EntryIter`]. Caches its value until [`Entry::set_value`]
/// is called.
pub struct Entry<'a, K, V> {
    map: &'a HMap<K, V>,
    key: K,
    cached_value: V,
}

impl<'a, K, V> Entry<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.cached_value
    }

    /// Writes `new_value` for this entry's key, invalidates the cache, and
    /// returns the prior value (via `put`).
    pub fn set_value(&mut self, new_value: V) -> Result<Option<V>> {
        let prev = self.map.put(self.key.clone(), new_value.clone())?;
        self.cached_value = new_value;
        Ok(prev)
    }
}

/// Iterates every entry as an [`Entry`]; [`EntryIter::remove`] removes
/// whichever key `next()` last yielded.
pub struct EntryIter<'a, K, V> {
    inner: Iter<'a, K, V>,
    last_key: Option<K>,
}

impl<'a, K, V> EntryIter<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    pub(crate) fn new(map: &'a HMap<K, V>) -> Self {
        Self { inner: Iter::new(map), last_key: None }
    }

    /// Removes the entry `next()` last yielded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::IllegalState`] if called before the
    /// first `next()`.
    pub fn remove(&mut self) -> Result<bool> {
        let Some(key) = self.last_key.take() else {
            return Err(crate::error::Error::IllegalState(
                "EntryIter::remove called before next()",
            ));
        };
        self.inner.map.remove_boolean(&key)
    }
}

impl<'a, K, V> Iterator for EntryIter<'a, K, V>
where
    K: Clone,
    V: Clone + Default,
{
    type Item = Result<Entry<'a, K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok((k, v)) => {
                self.last_key = Some(k.clone());
                Some(Ok(Entry { map: self.inner.map, key: k, cached_value: v }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
