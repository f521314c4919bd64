// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A segment: one shard's store, index tree, counter, three expiration
//! queues, and its independent reader/writer lock.

use crate::collab::{IndexTree, QueueLong, Store};
use crate::counter::Counter;
use crate::leaf::QueueKind;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A segment's reader/writer lock. When the map is configured with
/// `is_thread_safe = false`, this degrades to a no-op guard.
pub struct SegLock {
    inner: Option<RwLock<()>>,
}

impl SegLock {
    pub fn new(is_thread_safe: bool) -> Self {
        Self {
            inner: is_thread_safe.then(RwLock::default),
        }
    }

    pub fn read(&self) -> SegReadGuard<'_> {
        match &self.inner {
            #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
            Some(lock) => SegReadGuard::Real(lock.read().expect("lock is poisoned")),
            None => SegReadGuard::Null,
        }
    }

    pub fn write(&self) -> SegWriteGuard<'_> {
        match &self.inner {
            #[expect(clippy::expect_used, reason = "lock is expected to not be poisoned")]
            Some(lock) => SegWriteGuard::Real(lock.write().expect("lock is poisoned")),
            None => SegWriteGuard::Null,
        }
    }

    /// Best-effort check for `paranoid` assertions: true if a write lock is
    /// currently held by anyone. `RwLock` is not reentrant, so `try_write`
    /// reports `WouldBlock` whether the holder is the calling thread or
    /// another one; either way this segment's write-locked invariant holds.
    pub fn is_write_locked(&self) -> bool {
        match &self.inner {
            Some(lock) => lock.try_write().is_err(),
            None => true,
        }
    }
}

pub enum SegReadGuard<'a> {
    Real(RwLockReadGuard<'a, ()>),
    Null,
}

pub enum SegWriteGuard<'a> {
    Real(RwLockWriteGuard<'a, ()>),
    Null,
}

/// One shard: `(store, index_tree, counter?, create/update/get queue?, lock)`.
///
/// Stores and index trees may alias across segments; queues and locks never
/// do (each segment's lock is independent, and each queue belongs to
/// exactly one segment).
pub struct Segment {
    pub store: Arc<dyn Store>,
    pub index_tree: Arc<dyn IndexTree>,
    pub counter: Option<Arc<dyn Counter>>,
    pub create_queue: Option<Arc<dyn QueueLong>>,
    pub update_queue: Option<Arc<dyn QueueLong>>,
    pub get_queue: Option<Arc<dyn QueueLong>>,
    pub lock: SegLock,
}

impl Segment {
    pub fn queue_for(&self, kind: QueueKind) -> Option<&Arc<dyn QueueLong>> {
        match kind {
            QueueKind::Create => self.create_queue.as_ref(),
            QueueKind::Update => self.update_queue.as_ref(),
            QueueKind::Get => self.get_queue.as_ref(),
        }
    }

    /// Whether at least one expiration queue is configured for this
    /// segment; foreground eviction only runs when this is true.
    pub fn has_any_queue(&self) -> bool {
        self.create_queue.is_some() || self.update_queue.is_some() || self.get_queue.is_some()
    }
}
