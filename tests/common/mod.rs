// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Test fixtures shared by the integration suite: a plain in-memory
//! `IndexTree`/`QueueLong`, a `u64` serializer, and a disk-backed `Store`
//! that proves the collaborator traits are genuinely backend-agnostic
//! rather than only ever exercised against an in-memory one.

use segmap::{IndexTree, QueueLong, QueueNode, Result, Store};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// An in-memory `Store` that also tracks enough synthetic size
/// bookkeeping to exercise `expire_store_size`-driven eviction and
/// `compact()` in tests (mirrors `segmap::collab::mem::MemStore`, which
/// integration tests cannot reach directly since it is gated behind the
/// crate's own `test-util`/`test` cfg).
#[derive(Default)]
pub struct VecStore {
    next_recid: AtomicU64,
    records: Mutex<HashMap<u64, Option<Vec<u8>>>>,
    live_bytes: AtomicU64,
    written_bytes: AtomicU64,
}

impl VecStore {
    pub fn new() -> Self {
        Self {
            next_recid: AtomicU64::new(1),
            ..Default::default()
        }
    }
}

impl Store for VecStore {
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

/// A `Store` that keeps one file per recid under a `tempfile::TempDir`,
/// so the integration suite exercises the trait against a real
/// filesystem rather than only ever against process memory.
pub struct FileStore {
    dir: tempfile::TempDir,
    next_recid: AtomicU64,
}

impl FileStore {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
            next_recid: AtomicU64::new(1),
        }
    }

    fn path(&self, recid: u64) -> PathBuf {
        self.dir.path().join(recid.to_string())
    }
}

impl Store for FileStore {
    fn put(&self, blob: &[u8]) -> Result<u64> {
        let recid = self.next_recid.fetch_add(1, Ordering::SeqCst);
        std::fs::write(self.path(recid), blob).expect("write to temp file failed");
        Ok(recid)
    }

    fn get(&self, recid: u64) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(recid)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => panic!("unexpected I/O error reading temp file: {e}"),
        }
    }

    fn update(&self, recid: u64, blob: &[u8]) -> Result<()> {
        std::fs::write(self.path(recid), blob).expect("write to temp file failed");
        Ok(())
    }

    fn preallocate(&self) -> Result<u64> {
        Ok(self.next_recid.fetch_add(1, Ordering::SeqCst))
    }

    fn delete(&self, recid: u64) -> Result<()> {
        let _ = std::fs::remove_file(self.path(recid));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct VecIndexTree {
    entries: Mutex<HashMap<u64, u64>>,
}

impl VecIndexTree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexTree for VecIndexTree {
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

#[derive(Default)]
pub struct VecQueueLong {
    next_node_recid: AtomicU64,
    nodes: Mutex<std::collections::VecDeque<(u64, QueueNode)>>,
}

impl VecQueueLong {
    pub fn new() -> Self {
        Self {
            next_node_recid: AtomicU64::new(1),
            ..Default::default()
        }
    }
}

impl QueueLong for VecQueueLong {
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
        let mut nodes = self.nodes.lock().unwrap();
        let pos = nodes.iter().position(|(r, _)| *r == node_recid);
        match pos {
            Some(idx) => Ok(nodes.remove(idx).map(|(_, n)| n)),
            None => Ok(None),
        }
    }

    fn take_until(&self, pred: &mut dyn FnMut(u64, &QueueNode) -> bool) -> Result<Vec<(u64, QueueNode)>> {
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

pub struct U64Ser;

impl segmap::KeySerializer<u64> for U64Ser {
    fn encode(&self, key: &u64, writer: &mut dyn Write) -> std::io::Result<()> {
        writer.write_all(&key.to_le_bytes())
    }

    fn decode(&self, reader: &mut dyn Read) -> std::io::Result<u64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn is_trusted(&self) -> bool {
        true
    }
}

impl segmap::ValueSerializer<u64> for U64Ser {
    fn encode(&self, value: &u64, writer: &mut dyn Write) -> std::io::Result<()> {
        writer.write_all(&value.to_le_bytes())
    }

    fn decode(&self, reader: &mut dyn Read) -> std::io::Result<u64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn is_trusted(&self) -> bool {
        true
    }
}

/// Builds a `u64 -> u64` map over `VecStore`/`VecIndexTree` segments,
/// attaching a `VecQueueLong` to whichever of create/update/get has a
/// nonzero (or `-1`, queued-no-timeout) TTL configured.
pub fn u64_map(config: segmap::HMapConfig) -> segmap::HMap<u64, u64> {
    let segments = (0..config.segment_count())
        .map(|_| segmap::SegmentParts {
            store: std::sync::Arc::new(VecStore::new()),
            index_tree: std::sync::Arc::new(VecIndexTree::new()),
            counter: None,
            create_queue: (config.expire_create_ttl != 0).then(|| {
                std::sync::Arc::new(VecQueueLong::new()) as std::sync::Arc<dyn QueueLong>
            }),
            update_queue: (config.expire_update_ttl != 0).then(|| {
                std::sync::Arc::new(VecQueueLong::new()) as std::sync::Arc<dyn QueueLong>
            }),
            get_queue: (config.expire_get_ttl != 0).then(|| {
                std::sync::Arc::new(VecQueueLong::new()) as std::sync::Arc<dyn QueueLong>
            }),
        })
        .collect();

    segmap::HMap::new(
        config,
        segments,
        Box::new(segmap::DefaultHasher),
        Box::new(segmap::DefaultHasher),
        Box::new(U64Ser),
        Box::new(U64Ser),
    )
    .expect("map construction failed")
}
