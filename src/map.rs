// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The concurrent segmented hash map itself: construction, and the
//! put/get/remove/replace/clear family.

use crate::collab::{IndexTree, QueueLong, Store};
use crate::coding::{KeySerializer, ValueSerializer};
use crate::config::{HMapConfig, TTL_QUEUED_NO_TIMEOUT};
use crate::counter::Counter;
use crate::error::{Error, Result};
use crate::hash::{hash_to_index, hash_to_segment, warn_if_oversized};
use crate::hasher::{KeyHasher, ValueHasher};
use crate::leaf::{
    decode_leaf, encode_leaf, expire_node_recid, expire_queue_kind, make_expire_id, Leaf,
    QueueKind, Triple, WrappedValue,
};
use crate::listener::ModificationListener;
use crate::segment::Segment;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// The per-segment collaborators a caller assembles before calling
/// [`HMap::new`]. Stores and index trees may alias across segments;
/// queues must not.
pub struct SegmentParts {
    pub store: std::sync::Arc<dyn Store>,
    pub index_tree: std::sync::Arc<dyn IndexTree>,
    pub counter: Option<std::sync::Arc<dyn Counter>>,
    pub create_queue: Option<std::sync::Arc<dyn QueueLong>>,
    pub update_queue: Option<std::sync::Arc<dyn QueueLong>>,
    pub get_queue: Option<std::sync::Arc<dyn QueueLong>>,
}

/// A concurrent, segmented, optionally-persistent, optionally-expiring
/// hash map.
///
/// Generic only over the key/value types; every collaborator
/// (store/index-tree/queue/hasher/serializer) is a trait object, matching
/// the "small interface types, one implementation per segment" design.
pub struct HMap<K, V> {
    pub(crate) config: HMapConfig,
    pub(crate) segments: Vec<Segment>,
    pub(crate) index_bits: u32,
    pub(crate) key_hasher: Box<dyn KeyHasher<K>>,
    pub(crate) value_hasher: Box<dyn ValueHasher<V>>,
    pub(crate) key_serializer: Box<dyn KeySerializer<K>>,
    pub(crate) value_serializer: Box<dyn ValueSerializer<V>>,
    pub(crate) listeners: RwLock<Vec<Box<dyn ModificationListener<K, V>>>>,
    pub(crate) value_loader: Option<Box<dyn Fn(&K) -> Option<V> + Send + Sync>>,
    hash_checked: AtomicBool,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

impl<K, V> HMap<K, V>
where
    K: Clone,
    V: Clone + Default,
{
    /// Builds a map from its configuration and fully-assembled segments.
    ///
    /// `segments.len()` must equal `config.segment_count()`.
    pub fn new(
        config: HMapConfig,
        segments: Vec<SegmentParts>,
        key_hasher: Box<dyn KeyHasher<K>>,
        value_hasher: Box<dyn ValueHasher<V>>,
        key_serializer: Box<dyn KeySerializer<K>>,
        value_serializer: Box<dyn ValueSerializer<V>>,
    ) -> Result<Self> {
        config.validate()?;

        if segments.len() != config.segment_count() {
            return Err(Error::InvalidArgument(
                "segments.len() must equal config.segment_count()",
            ));
        }

        warn_if_oversized(config.segment_count() as u64, config.dir_shift, config.levels);

        let segments = segments
            .into_iter()
            .map(|parts| Segment {
                store: parts.store,
                index_tree: parts.index_tree,
                counter: parts.counter,
                create_queue: parts.create_queue,
                update_queue: parts.update_queue,
                get_queue: parts.get_queue,
                lock: crate::segment::SegLock::new(config.is_thread_safe),
            })
            .collect();

        let index_bits = config.index_bits();

        Ok(Self {
            config,
            segments,
            index_bits,
            key_hasher,
            value_hasher,
            key_serializer,
            value_serializer,
            listeners: RwLock::new(Vec::new()),
            value_loader: None,
            hash_checked: AtomicBool::new(false),
        })
    }

    /// Registers a value loader used by [`Self::get`] to synthesize and
    /// insert a value for a missing key.
    pub fn with_value_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Option<V> + Send + Sync + 'static,
    {
        self.value_loader = Some(Box::new(loader));
        self
    }

    /// Registers a modification listener. Listeners are notified
    /// synchronously, under the segment's write lock, for every observable
    /// change.
    pub fn add_listener(&self, listener: Box<dyn ModificationListener<K, V>>) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        self.listeners.write().expect("lock is poisoned").push(listener);
    }

    pub fn config(&self) -> &HMapConfig {
        &self.config
    }

    pub(crate) fn notify(&self, key: &K, old: Option<&V>, new: Option<&V>, triggered: bool) {
        #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
        for listener in self.listeners.read().expect("lock is poisoned").iter() {
            listener.on_modify(key, old, new, triggered);
        }
    }

    fn locate(&self, key: &K) -> (usize, u64) {
        let h = self.key_hasher.hash_code(key, 0);
        let index = hash_to_index(h, self.index_bits);
        let segment = hash_to_segment(h, self.index_bits, self.config.conc_shift) as usize;

        crate::paranoid_assert!(segment < self.segments.len(), "routed segment out of range");
        crate::paranoid_assert!(
            self.index_bits >= 64 || index < (1u64 << self.index_bits),
            "routed index exceeds index_bits"
        );

        (segment, index)
    }

    /// `hash_code` as §4.9 defines it, for external (e.g. entry-view)
    /// consumption: combines the key and value hash under the configured
    /// `hash_seed`, never the routing seed.
    pub fn entry_hash_code(&self, key: &K, value: &V) -> u32 {
        self.key_hasher.hash_code(key, self.config.hash_seed)
            ^ self.value_hasher.hash_code(value, self.config.hash_seed)
    }

    /// Best-effort, non-thread-safe, harmless-to-repeat check that the key
    /// hashes the same after a serialize/deserialize round-trip. Skipped
    /// once it has passed once, per §4.1.
    fn check_hash_stability(&self, key: &K) -> Result<()> {
        // A trusted serializer is known not to produce aliasing output for
        // any input the map will see, so its round trip is assumed stable
        // and never checked; an untrusted one is checked once.
        if self.key_serializer.is_trusted() {
            return Ok(());
        }

        if self.hash_checked.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut buf = Vec::new();
        self.key_serializer
            .encode(key, &mut buf)
            .map_err(|_| Error::InvalidArgument("key failed to serialize for hash-stability check"))?;

        let mut cursor = &buf[..];
        let clone = self
            .key_serializer
            .decode(&mut cursor)
            .map_err(|_| Error::InvalidArgument("key failed to deserialize for hash-stability check"))?;

        if self.key_hasher.hash_code(key, 0) != self.key_hasher.hash_code(&clone, 0) {
            return Err(Error::InvalidArgument(
                "key hash is not stable across a serialization round-trip",
            ));
        }

        self.hash_checked.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn read_leaf(&self, segment: &Segment, leaf_recid: u64) -> Result<Leaf<K, V>> {
        let bytes = segment
            .store
            .get(leaf_recid)?
            .ok_or_else(|| Error::Corruption(format!("leaf recid {leaf_recid} resolves to no leaf")))?;

        decode_leaf(
            &bytes,
            self.key_serializer.as_ref(),
            self.value_serializer.as_ref(),
            self.config.value_inline,
            self.config.has_values,
        )
        .map_err(|e| Error::Corruption(format!("leaf {leaf_recid} failed to decode: {e}")))
    }

    fn write_new_leaf(&self, segment: &Segment, leaf: &Leaf<K, V>) -> Result<u64> {
        let bytes = self.encode(leaf)?;
        segment.store.put(&bytes)
    }

    pub(crate) fn write_leaf_at(&self, segment: &Segment, recid: u64, leaf: &Leaf<K, V>) -> Result<()> {
        let bytes = self.encode(leaf)?;
        segment.store.update(recid, &bytes)
    }

    fn encode(&self, leaf: &Leaf<K, V>) -> Result<Vec<u8>> {
        encode_leaf(
            leaf,
            self.key_serializer.as_ref(),
            self.value_serializer.as_ref(),
            self.config.value_inline,
            self.config.has_values,
        )
        .map_err(|e| Error::Corruption(format!("leaf failed to encode: {e}")))
    }

    fn wrap_value(&self, segment: &Segment, value: &V) -> Result<WrappedValue<V>> {
        if !self.config.has_values {
            return Ok(WrappedValue::Present);
        }

        if self.config.value_inline {
            return Ok(WrappedValue::Inline(value.clone()));
        }

        let mut buf = Vec::new();
        self.value_serializer
            .encode(value, &mut buf)
            .map_err(|e| Error::Corruption(format!("value failed to encode: {e}")))?;
        let recid = segment.store.put(&buf)?;
        Ok(WrappedValue::External(recid))
    }

    pub(crate) fn unwrap_value(&self, segment: &Segment, wrapped: &WrappedValue<V>) -> Result<V> {
        match wrapped {
            WrappedValue::Inline(v) => Ok(v.clone()),
            WrappedValue::External(recid) => {
                let bytes = segment
                    .store
                    .get(*recid)?
                    .ok_or_else(|| Error::Corruption(format!("value recid {recid} resolves to nothing")))?;
                let mut cursor = &bytes[..];
                self.value_serializer
                    .decode(&mut cursor)
                    .map_err(|e| Error::Corruption(format!("value failed to decode: {e}")))
            }
            WrappedValue::Present => Ok(V::default()),
        }
    }

    fn timestamp_for(ttl_ms: i64, now: u64) -> u64 {
        if ttl_ms == TTL_QUEUED_NO_TIMEOUT {
            0
        } else {
            now + ttl_ms as u64
        }
    }

    /// Registers/bumps/transfers a triple's queue membership towards
    /// `kind`, matching the "bump / transfer / insert" logic shared by
    /// put's UPDATE path and get's GET path (§4.2, §4.4).
    fn touch_queue(
        &self,
        segment: &Segment,
        leaf_recid: u64,
        leaf: &mut Leaf<K, V>,
        pos: usize,
        kind: QueueKind,
        ttl_ms: i64,
    ) -> Result<bool> {
        let Some(queue) = segment.queue_for(kind) else {
            return Ok(false);
        };

        let new_ts = Self::timestamp_for(ttl_ms, now_ms());
        let expire_id = leaf.triples[pos].expire_id;

        if expire_id == 0 {
            let node_recid = queue.put(new_ts, leaf_recid, None)?;
            leaf.triples[pos].expire_id = make_expire_id(node_recid, kind);
            return Ok(true);
        }

        let owning_kind = expire_queue_kind(expire_id)?.expect("nonzero expire_id implies a tag");
        let node_recid = expire_node_recid(expire_id);

        if owning_kind == kind {
            queue.bump(node_recid, new_ts)?;
            Ok(false)
        } else {
            let old_queue = segment.queue_for(owning_kind).ok_or_else(|| {
                Error::Corruption(format!("leaf references a {owning_kind:?} queue the segment does not have"))
            })?;
            let _ = old_queue.remove(node_recid, false)?;
            let new_recid = queue.put(new_ts, leaf_recid, Some(node_recid))?;
            leaf.triples[pos].expire_id = make_expire_id(new_recid, kind);
            Ok(true)
        }
    }

    fn insert_new_leaf(&self, segment: &Segment, index: u64, key: K, value: V, triggered: bool) -> Result<()> {
        let wrapped = self.wrap_value(segment, &value)?;

        match &segment.create_queue {
            None => {
                let leaf = Leaf::single(key.clone(), wrapped, 0);
                let leaf_recid = self.write_new_leaf(segment, &leaf)?;
                segment.index_tree.put(index, leaf_recid);
            }
            Some(create_queue) => {
                // Leaf and queue node must each name the other's recid; the
                // leaf recid is preallocated first to break the cycle.
                let leaf_recid = segment.store.preallocate()?;
                let ts = Self::timestamp_for(self.config.expire_create_ttl, now_ms());
                let node_recid = create_queue.put(ts, leaf_recid, None)?;
                let expire_id = make_expire_id(node_recid, QueueKind::Create);
                let leaf = Leaf::single(key.clone(), wrapped, expire_id);
                self.write_leaf_at(segment, leaf_recid, &leaf)?;
                segment.index_tree.put(index, leaf_recid);
            }
        }

        if let Some(counter) = &segment.counter {
            counter.increment()?;
        }

        self.notify(&key, None, Some(&value), triggered);
        Ok(())
    }

    fn append_to_leaf(
        &self,
        segment: &Segment,
        leaf_recid: u64,
        mut leaf: Leaf<K, V>,
        key: K,
        value: V,
        triggered: bool,
    ) -> Result<()> {
        let wrapped = self.wrap_value(segment, &value)?;
        let mut expire_id = 0u64;

        if let Some(create_queue) = &segment.create_queue {
            let ts = Self::timestamp_for(self.config.expire_create_ttl, now_ms());
            let node_recid = create_queue.put(ts, leaf_recid, None)?;
            expire_id = make_expire_id(node_recid, QueueKind::Create);
        }

        leaf.triples.push(Triple { key: key.clone(), value: wrapped, expire_id });
        self.write_leaf_at(segment, leaf_recid, &leaf)?;

        if let Some(counter) = &segment.counter {
            counter.increment()?;
        }

        self.notify(&key, None, Some(&value), triggered);
        Ok(())
    }

    fn update_existing(
        &self,
        segment: &Segment,
        leaf_recid: u64,
        mut leaf: Leaf<K, V>,
        pos: usize,
        key: &K,
        new_value: V,
        triggered: bool,
    ) -> Result<Option<V>> {
        let old_value = self.unwrap_value(segment, &leaf.triples[pos].value)?;

        let mut leaf_changed =
            self.touch_queue(segment, leaf_recid, &mut leaf, pos, QueueKind::Update, self.config.expire_update_ttl)?;

        match &leaf.triples[pos].value {
            WrappedValue::External(recid) if !self.config.value_inline => {
                let mut buf = Vec::new();
                self.value_serializer
                    .encode(&new_value, &mut buf)
                    .map_err(|e| Error::Corruption(format!("value failed to encode: {e}")))?;
                segment.store.update(*recid, &buf)?;
            }
            WrappedValue::Present => {}
            _ => {
                leaf.triples[pos].value = self.wrap_value(segment, &new_value)?;
                leaf_changed = true;
            }
        }

        if leaf_changed {
            self.write_leaf_at(segment, leaf_recid, &leaf)?;
        }

        self.notify(key, Some(&old_value), Some(&new_value), triggered);
        Ok(Some(old_value))
    }

    /// Shared put path for both `leaf_recid == 0` (brand-new index) and an
    /// existing leaf (key match updates in place, no match appends).
    pub(crate) fn put_locked(
        &self,
        segment: &Segment,
        index: u64,
        key: K,
        value: V,
        triggered: bool,
    ) -> Result<Option<V>> {
        let leaf_recid = segment.index_tree.get(index);

        if leaf_recid == 0 {
            self.insert_new_leaf(segment, index, key, value, triggered)?;
            return Ok(None);
        }

        let leaf = self.read_leaf(segment, leaf_recid)?;
        match leaf.position_of(&key, self.key_hasher.as_ref()) {
            Some(pos) => self.update_existing(segment, leaf_recid, leaf, pos, &key, value, triggered),
            None => {
                self.append_to_leaf(segment, leaf_recid, leaf, key, value, triggered)?;
                Ok(None)
            }
        }
    }

    /// Reads the current value for `key` under the already-held lock,
    /// optionally bumping/transferring the GET queue node. Shared by
    /// `get`, `put_if_absent`, `put_if_absent_boolean`, and `replace`.
    fn touch_on_read(&self, segment: &Segment, index: u64, key: &K, need_value: bool) -> Result<Option<Option<V>>> {
        let leaf_recid = segment.index_tree.get(index);
        if leaf_recid == 0 {
            return Ok(None);
        }

        let mut leaf = self.read_leaf(segment, leaf_recid)?;
        let Some(pos) = leaf.position_of(key, self.key_hasher.as_ref()) else {
            return Ok(None);
        };

        let value = if need_value {
            Some(self.unwrap_value(segment, &leaf.triples[pos].value)?)
        } else {
            None
        };

        if self.touch_queue(segment, leaf_recid, &mut leaf, pos, QueueKind::Get, self.config.expire_get_ttl)? {
            self.write_leaf_at(segment, leaf_recid, &leaf)?;
        }

        Ok(Some(value))
    }

    /// Runs a foreground eviction sweep over a segment already held under
    /// its write lock, if it has any expiration queue at all. The
    /// background scheduler (when attached) does the same sweep
    /// periodically; this is what keeps eviction timely on maps that never
    /// attach one.
    fn maybe_foreground_evict(&self, seg_idx: usize) -> Result<()> {
        if self.segments[seg_idx].has_any_queue() {
            self.expire_evict_segment(seg_idx)?;
        }
        Ok(())
    }

    /// Inserts or updates `key` to `value`, returning the previous value.
    ///
    /// Foreground eviction is swept both before (so a stale expired entry
    /// never blocks this put) and after (so a put that pushes the map over
    /// `expire_max_size`/`expire_store_size` is brought back under the cap
    /// immediately, rather than waiting for the next call to notice).
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.check_hash_stability(&key)?;
        let (seg_idx, index) = self.locate(&key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;
        let old = self.put_locked(segment, index, key, value, false)?;
        self.maybe_foreground_evict(seg_idx)?;
        Ok(old)
    }

    /// Like [`Self::put`], but never materializes the previous value.
    pub fn put_only(&self, key: K, value: V) -> Result<()> {
        self.put(key, value).map(|_| ())
    }

    /// Returns the current value for `key`, invoking the registered value
    /// loader (if any) and inserting its result when the key is absent.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let (seg_idx, index) = self.locate(key);
        let segment = &self.segments[seg_idx];

        let needs_write = segment.has_any_queue() || self.value_loader.is_some();
        let found = if needs_write {
            let _guard = segment.lock.write();
            if segment.has_any_queue() {
                self.expire_evict_segment(seg_idx)?;
            }
            self.touch_on_read(segment, index, key, true)?
        } else {
            let _guard = segment.lock.read();
            self.touch_on_read(segment, index, key, true)?
        };

        match found {
            Some(value) => Ok(value),
            None => {
                let Some(loader) = &self.value_loader else { return Ok(None) };
                let Some(loaded) = loader(key) else { return Ok(None) };

                let _guard = segment.lock.write();
                self.put_locked(segment, index, key.clone(), loaded.clone(), true)?;
                if segment.has_any_queue() {
                    self.expire_evict_segment(seg_idx)?;
                }
                Ok(Some(loaded))
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let (seg_idx, index) = self.locate(key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.read();
        let leaf_recid = segment.index_tree.get(index);
        if leaf_recid == 0 {
            return Ok(false);
        }
        let leaf = self.read_leaf(segment, leaf_recid)?;
        Ok(leaf.position_of(key, self.key_hasher.as_ref()).is_some())
    }

    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        let (seg_idx, index) = self.locate(&key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;

        if let Some(existing) = self.touch_on_read(segment, index, &key, true)? {
            return Ok(existing);
        }

        self.check_hash_stability(&key)?;
        let old = self.put_locked(segment, index, key, value, false)?;
        self.maybe_foreground_evict(seg_idx)?;
        Ok(old)
    }

    pub fn put_if_absent_boolean(&self, key: K, value: V) -> Result<bool> {
        let (seg_idx, index) = self.locate(&key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;

        if self.touch_on_read(segment, index, &key, false)?.is_some() {
            return Ok(false);
        }

        self.check_hash_stability(&key)?;
        self.put_locked(segment, index, key, value, false)?;
        self.maybe_foreground_evict(seg_idx)?;
        Ok(true)
    }

    pub fn replace_if_equals(&self, key: K, old: V, new: V) -> Result<bool> {
        let (seg_idx, index) = self.locate(&key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;

        match self.touch_on_read(segment, index, &key, true)? {
            Some(Some(current)) if self.value_hasher.equals(&current, &old) => {
                self.put_locked(segment, index, key, new, false)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn replace(&self, key: K, new: V) -> Result<Option<V>> {
        let (seg_idx, index) = self.locate(&key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;

        match self.touch_on_read(segment, index, &key, true)? {
            Some(old) => {
                self.put_locked(segment, index, key, new, false)?;
                Ok(old)
            }
            None => Ok(None),
        }
    }

    /// Core remove path, shared by the public `remove*` family and by
    /// eviction (`evicted = true`).
    pub(crate) fn remove_locked(
        &self,
        segment: &Segment,
        index: u64,
        key: &K,
        expected: Option<&V>,
        evicted: bool,
    ) -> Result<Option<V>> {
        let leaf_recid = segment.index_tree.get(index);
        if leaf_recid == 0 {
            return Ok(None);
        }

        let mut leaf = self.read_leaf(segment, leaf_recid)?;
        let Some(pos) = leaf.position_of(key, self.key_hasher.as_ref()) else {
            return Ok(None);
        };

        let old_value = self.unwrap_value(segment, &leaf.triples[pos].value)?;
        if let Some(expected_value) = expected {
            if !self.value_hasher.equals(&old_value, expected_value) {
                return Ok(None);
            }
        }

        let expire_id = leaf.triples[pos].expire_id;
        if !evicted && expire_id != 0 {
            let kind = expire_queue_kind(expire_id)?.expect("nonzero expire_id implies a tag");
            if let Some(queue) = segment.queue_for(kind) {
                let _ = queue.remove(expire_node_recid(expire_id), true)?;
            }
        }

        if let WrappedValue::External(recid) = leaf.triples[pos].value {
            segment.store.delete(recid)?;
        }

        if leaf.triples.len() == 1 {
            segment.index_tree.remove_key(index);
            segment.store.delete(leaf_recid)?;
        } else {
            leaf.triples.remove(pos);
            self.write_leaf_at(segment, leaf_recid, &leaf)?;
        }

        if let Some(counter) = &segment.counter {
            counter.decrement()?;
        }

        self.notify(key, Some(&old_value), None, evicted);
        Ok(Some(old_value))
    }

    fn remove_guarded(&self, key: &K, expected: Option<&V>) -> Result<Option<V>> {
        let (seg_idx, index) = self.locate(key);
        let segment = &self.segments[seg_idx];
        let _guard = segment.lock.write();
        self.maybe_foreground_evict(seg_idx)?;
        self.remove_locked(segment, index, key, expected, false)
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.remove_guarded(key, None)
    }

    pub fn remove_boolean(&self, key: &K) -> Result<bool> {
        Ok(self.remove(key)?.is_some())
    }

    pub fn remove_if_equals(&self, key: &K, value: &V) -> Result<bool> {
        Ok(self.remove_guarded(key, Some(value))?.is_some())
    }

    /// Wipes every segment. `notify_mode`: `0` silent, `1` normal removal
    /// notifications, `2` as-if-evicted notifications (`triggered = true`),
    /// matching the "overflow collection treats entries as evicted" use
    /// case named in §4.6.
    ///
    /// Acquires every segment's write lock, in ascending order, before
    /// wiping any of them — the Open Questions resolution promoting
    /// `clear` to a global write lock rather than leaving the documented
    /// concurrent-mutator hazard unaddressed.
    pub fn clear(&self, notify_mode: u8) -> Result<()> {
        let guards: Vec<_> = self.segments.iter().map(|s| s.lock.write()).collect();

        for segment in &self.segments {
            self.clear_segment(segment, notify_mode)?;
        }

        drop(guards);
        Ok(())
    }

    fn clear_segment(&self, segment: &Segment, notify_mode: u8) -> Result<()> {
        let mut leaf_recids = Vec::new();
        segment.index_tree.for_each(&mut |_index, recid| leaf_recids.push(recid));

        for leaf_recid in leaf_recids {
            let leaf = self.read_leaf(segment, leaf_recid)?;
            for triple in &leaf.triples {
                if notify_mode != 0 {
                    let value = self.unwrap_value(segment, &triple.value)?;
                    self.notify(&triple.key, Some(&value), None, notify_mode == 2);
                }
                if let WrappedValue::External(recid) = triple.value {
                    segment.store.delete(recid)?;
                }
            }
            segment.store.delete(leaf_recid)?;
        }

        segment.index_tree.clear();

        for queue in [&segment.create_queue, &segment.update_queue, &segment.get_queue] {
            if let Some(queue) = queue {
                queue.clear()?;
            }
        }

        if let Some(counter) = &segment.counter {
            counter.set(0)?;
        }

        Ok(())
    }

    /// Sum of per-segment counters, or (if no counters are configured) the
    /// number of triples found by walking every leaf.
    pub fn len(&self) -> Result<u64> {
        let mut total = 0u64;

        for segment in &self.segments {
            let _guard = segment.lock.read();
            total += self.segment_len(segment)?;
        }

        Ok(total)
    }

    /// One segment's entry count: its counter if it has one, else the
    /// number of triples found by walking every leaf its index tree names.
    ///
    /// Takes no lock of its own — callers already hold (or don't need) the
    /// segment's lock, which matters for eviction's size-cap check, run
    /// while that segment's write lock is already held.
    pub(crate) fn segment_len(&self, segment: &Segment) -> Result<u64> {
        match &segment.counter {
            Some(counter) => Ok(counter.get()?.max(0) as u64),
            None => {
                let mut recids = Vec::new();
                segment.index_tree.for_each(&mut |_index, recid| recids.push(recid));
                let mut count = 0u64;
                for recid in recids {
                    count += self.read_leaf(segment, recid)?.triples.len() as u64;
                }
                Ok(count)
            }
        }
    }

    /// `len()`, saturated to `i32::MAX`.
    pub fn size(&self) -> Result<i32> {
        Ok(self.len()?.min(i32::MAX as u64) as i32)
    }

    pub fn is_empty(&self) -> Result<bool> {
        for segment in &self.segments {
            let _guard = segment.lock.read();
            if !segment.index_tree.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
