// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Foreground and background eviction.
//!
//! Foreground eviction runs opportunistically, inline with `put`/`get`,
//! under a segment's write lock, and is always on when a segment has any
//! expiration queue. The background [`BackgroundEviction`] handle is
//! optional: it sweeps every segment periodically so idle segments don't
//! accumulate expired entries indefinitely between calls.

use crate::collab::QueueLong;
use crate::error::{Error, Result};
use crate::hash::hash_to_index;
use crate::hasher::KeyHasher;
use crate::leaf::{decode_leaf, QueueKind};
use crate::map::{now_ms, HMap};
use crate::segment::Segment;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

impl<K, V> HMap<K, V>
where
    K: Clone,
    V: Clone + Default,
{
    /// Sweeps every expired node off of every queue a segment has,
    /// removing the entries (or triples) they guard. Called with the
    /// segment's write lock already held.
    pub(crate) fn expire_evict_segment(&self, seg_idx: usize) -> Result<()> {
        let segment = &self.segments[seg_idx];
        crate::paranoid_assert!(
            segment.lock.is_write_locked(),
            "expire_evict_segment called without the segment's write lock held"
        );
        let now = now_ms();

        for kind in [QueueKind::Get, QueueKind::Update, QueueKind::Create] {
            let Some(queue) = segment.queue_for(kind) else { continue };
            self.evict_from_queue(segment, queue.as_ref(), now)?;
        }

        self.evict_for_size_caps(segment, seg_idx)?;
        Ok(())
    }

    fn evict_from_queue(&self, segment: &Segment, queue: &dyn QueueLong, now: u64) -> Result<()> {
        let expired = queue.take_until(&mut |_recid, node| node.timestamp != 0 && node.timestamp <= now)?;

        for (_node_recid, node) in expired {
            self.evict_leaf_entries(segment, node.value)?;
        }

        Ok(())
    }

    /// Evicts every triple of the leaf at `leaf_recid`. The queue node that
    /// fired has already been unlinked by `take_until`; the leaf is
    /// re-read fresh (rather than assumed gone) because it may still hold
    /// other triples pointing at other, still-live queue nodes.
    fn evict_leaf_entries(&self, segment: &Segment, leaf_recid: u64) -> Result<()> {
        let Some(bytes) = segment.store.get(leaf_recid)? else {
            return Ok(());
        };

        let leaf = decode_leaf(
            &bytes,
            self.key_serializer.as_ref(),
            self.value_serializer.as_ref(),
            self.config.value_inline,
            self.config.has_values,
        )
        .map_err(|e| Error::Corruption(format!("leaf {leaf_recid} failed to decode during eviction: {e}")))?;

        for triple in leaf.triples {
            let index = hash_to_index(self.key_hasher.hash_code(&triple.key, 0), self.index_bits);
            let _ = self.remove_locked(segment, index, &triple.key, None, true)?;
        }

        Ok(())
    }

    /// Evicts whole leaves, oldest-first within whichever queue
    /// (get/update/create, in that order) has one to give up, until the
    /// segment is back under `expire_max_size`, and triggers `compact()`
    /// once a segment's store crosses `expire_store_size` or the
    /// configured free-space threshold.
    fn evict_for_size_caps(&self, segment: &Segment, seg_idx: usize) -> Result<()> {
        if self.config.expire_max_size > 0 {
            // Approximate and segment-local by design: scales the whole-map
            // cap down to this segment's share instead of locking every
            // other segment to compute an exact cross-segment total (which
            // would risk deadlock against a caller that already holds this
            // segment's write lock and is about to touch another one).
            let segment_size = self.segment_len(segment)?;
            let segment_count = self.segment_count() as u64;
            let number_to_take = (segment_size * segment_count).saturating_sub(self.config.expire_max_size) / segment_count;

            for _ in 0..number_to_take {
                if !self.evict_one_oldest(segment)? {
                    break;
                }
            }
        }

        if self.config.expire_store_size > 0 {
            while segment.store.get_total_size().unwrap_or(0) > self.config.expire_store_size {
                if !self.evict_one_oldest(segment)? {
                    break;
                }
            }
        }

        self.maybe_compact(segment, seg_idx)?;
        Ok(())
    }

    fn evict_one_oldest(&self, segment: &Segment) -> Result<bool> {
        for kind in [QueueKind::Get, QueueKind::Update, QueueKind::Create] {
            let Some(queue) = segment.queue_for(kind) else { continue };
            let mut taken_one = false;
            let taken = queue.take_until(&mut |_, _| {
                if taken_one {
                    false
                } else {
                    taken_one = true;
                    true
                }
            })?;
            if let Some((_, node)) = taken.into_iter().next() {
                self.evict_leaf_entries(segment, node.value)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn maybe_compact(&self, segment: &Segment, _seg_idx: usize) -> Result<()> {
        let Some(threshold) = self.config.expire_compact_threshold else { return Ok(()) };
        let (Some(free), Some(total)) = (segment.store.get_free_size(), segment.store.get_total_size()) else {
            return Ok(());
        };

        if total > 0 && (free as f64 / total as f64) > threshold {
            segment.store.compact()?;
        }

        Ok(())
    }
}

/// A background handle that periodically sweeps every segment of an
/// attached map. Dropping the handle (or calling [`BackgroundEviction::stop`])
/// signals the worker thread to exit at its next wakeup; it does not block
/// waiting for the thread to finish.
pub struct BackgroundEviction {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundEviction {
    /// Spawns a worker thread that calls `expire_evict_segment` on every
    /// segment every `period`, with up to 10% random jitter added to each
    /// sleep so that many maps started at once don't all wake in lockstep.
    pub fn spawn<K, V>(map: Arc<HMap<K, V>>, period: Duration) -> Self
    where
        K: Clone + Send + Sync + 'static,
        V: Clone + Default + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let handle = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                let jitter_ms = rand::rng().random_range(0..=(period.as_millis() as u64 / 10).max(1));
                std::thread::sleep(period + Duration::from_millis(jitter_ms));

                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }

                for seg_idx in 0..map.segment_count() {
                    let segment = &map.segments[seg_idx];
                    if !segment.has_any_queue() {
                        continue;
                    }
                    let _guard = segment.lock.write();
                    if let Err(err) = map.expire_evict_segment(seg_idx) {
                        log::warn!("background eviction sweep of segment {seg_idx} failed: {err}");
                    }
                }
            }
        });

        Self { stop, handle: Some(handle) }
    }

    /// Signals the worker to stop at its next wakeup.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for BackgroundEviction {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            drop(handle); // detach; we don't block Drop on the sleep interval
        }
    }
}
