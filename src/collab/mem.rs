// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-memory reference implementations of [`Store`], [`IndexTree`], and
//! [`QueueLong`], gated behind `test-util`/`test`.
//!
//! These exist so the crate (and downstream integration tests) can exercise
//! the map without a real on-disk backend; they are not the crate's
//! advertised production backend, which is always supplied by the caller.

use super::{IndexTree, QueueLong, QueueNode, Store};
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// An in-memory [`Store`] backed by a `HashMap<u64, Vec<u8>>`.
///
/// Tracks enough synthetic size bookkeeping (`file_tail`/`get_free_size`)
/// to exercise `expire_store_size`-driven eviction and `compact()` in tests.
#[derive(Default)]
pub struct MemStore {
    next_recid: AtomicU64,
    records: Mutex<HashMap<u64, Option<Vec<u8>>>>,
    live_bytes: AtomicU64,
    written_bytes: AtomicU64,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            next_recid: AtomicU64::new(1),
            ..Default::default()
        }
    }
}

impl Store for MemStore {
    fn put(&self, blob: &[u8]) -> Result<u64> {
        let recid = self.next_recid.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(recid, Some(blob.to_vec()));
        self.live_bytes.fetch_add(blob.len() as u64, Ordering::SeqCst);
        self.written_bytes.fetch_add(blob.len() as u64, Ordering::SeqCst);
        Ok(recid)
    }

    fn get(&self, recid: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.records.lock().unwrap().get(&recid).cloned().flatten())
    }

    fn update(&self, recid: u64, blob: &[u8]) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let old_len = records.get(&recid).and_then(|v| v.as_ref()).map_or(0, Vec::len) as u64;
        records.insert(recid, Some(blob.to_vec()));
        self.live_bytes.fetch_add(blob.len() as u64, Ordering::SeqCst);
        self.live_bytes.fetch_sub(old_len, Ordering::SeqCst);
        self.written_bytes.fetch_add(blob.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn preallocate(&self) -> Result<u64> {
        let recid = self.next_recid.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(recid, None);
        Ok(recid)
    }

    fn delete(&self, recid: u64) -> Result<()> {
        if let Some(Some(old)) = self.records.lock().unwrap().remove(&recid) {
            self.live_bytes.fetch_sub(old.len() as u64, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn file_tail(&self) -> Option<u64> {
        Some(self.written_bytes.load(Ordering::SeqCst))
    }

    fn get_free_size(&self) -> Option<u64> {
        Some(self.written_bytes.load(Ordering::SeqCst) - self.live_bytes.load(Ordering::SeqCst))
    }

    fn get_total_size(&self) -> Option<u64> {
        Some(self.written_bytes.load(Ordering::SeqCst))
    }

    fn compact(&self) -> Result<()> {
        self.written_bytes
            .store(self.live_bytes.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }
}

/// An in-memory [`IndexTree`] backed by a `HashMap<u64, u64>`.
#[derive(Default)]
pub struct MemIndexTree {
    entries: Mutex<HashMap<u64, u64>>,
}

impl MemIndexTree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexTree for MemIndexTree {
    fn get(&self, index: u64) -> u64 {
        *self.entries.lock().unwrap().get(&index).unwrap_or(&0)
    }

    fn put(&self, index: u64, recid: u64) {
        self.entries.lock().unwrap().insert(index, recid);
    }

    fn remove_key(&self, index: u64) {
        self.entries.lock().unwrap().remove(&index);
    }

    fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn for_each(&self, f: &mut dyn FnMut(u64, u64)) {
        for (&index, &recid) in self.entries.lock().unwrap().iter() {
            f(index, recid);
        }
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// An in-memory [`QueueLong`] backed by a `VecDeque`, preserving insertion
/// order the way an intrusive linked list would.
#[derive(Default)]
pub struct MemQueueLong {
    next_node_recid: AtomicU64,
    nodes: Mutex<VecDeque<(u64, QueueNode)>>,
}

impl MemQueueLong {
    pub fn new() -> Self {
        Self {
            next_node_recid: AtomicU64::new(1),
            ..Default::default()
        }
    }
}

impl QueueLong for MemQueueLong {
    fn put(&self, timestamp: u64, value: u64, node_recid: Option<u64>) -> Result<u64> {
        let recid = node_recid.unwrap_or_else(|| self.next_node_recid.fetch_add(1, Ordering::SeqCst));
        self.nodes.lock().unwrap().push_back((recid, QueueNode { value, timestamp }));
        Ok(recid)
    }

    fn bump(&self, node_recid: u64, new_timestamp: u64) -> Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some((_, node)) = nodes.iter_mut().find(|(r, _)| *r == node_recid) {
            node.timestamp = new_timestamp;
        }
        Ok(())
    }

    fn remove(&self, node_recid: u64, _remove_node: bool) -> Result<Option<QueueNode>> {
        // Always unlinks: `remove_node` only distinguishes whether the
        // caller also wants the backing record gone, but there is no
        // separate record here beyond the list entry itself, and the
        // node must come off the list either way (the caller may be about
        // to re-`put` the same recid into a different queue).
        let mut nodes = self.nodes.lock().unwrap();
        let pos = nodes.iter().position(|(r, _)| *r == node_recid);
        match pos {
            Some(idx) => Ok(nodes.remove(idx).map(|(_, n)| n)),
            None => Ok(None),
        }
    }

    fn take_until(
        &self,
        pred: &mut dyn FnMut(u64, &QueueNode) -> bool,
    ) -> Result<Vec<(u64, QueueNode)>> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut taken = Vec::new();
        while let Some((recid, node)) = nodes.front().copied() {
            if pred(recid, &node) {
                nodes.pop_front();
                taken.push((recid, node));
            } else {
                break;
            }
        }
        Ok(taken)
    }

    fn clear(&self) -> Result<()> {
        self.nodes.lock().unwrap().clear();
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(u64, &QueueNode)) {
        for (recid, node) in self.nodes.lock().unwrap().iter() {
            f(*recid, node);
        }
    }
}
