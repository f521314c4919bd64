// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-segment entry counters.
//!
//! A counter is optional: when absent, `HMap::len` falls back to summing
//! `leaf.len() / 3` over every leaf in every segment's index tree.

use crate::collab::Store;
use crate::error::Result;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A per-segment atomic counter. One recid's worth of persisted state.
pub trait Counter: Send + Sync {
    fn get(&self) -> Result<i64>;

    fn increment(&self) -> Result<i64>;

    fn decrement(&self) -> Result<i64>;

    fn set(&self, value: i64) -> Result<()>;
}

/// A purely in-memory counter, for tests and for callers who don't need
/// the count to survive a restart.
#[derive(Default)]
pub struct AtomicCounter(AtomicI64);

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for AtomicCounter {
    fn get(&self) -> Result<i64> {
        Ok(self.0.load(Ordering::SeqCst))
    }

    fn increment(&self) -> Result<i64> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn decrement(&self) -> Result<i64> {
        Ok(self.0.fetch_sub(1, Ordering::SeqCst) - 1)
    }

    fn set(&self, value: i64) -> Result<()> {
        self.0.store(value, Ordering::SeqCst);
        Ok(())
    }
}

/// A counter persisted as an 8-byte little-endian record at a caller-supplied
/// recid in a segment's [`Store`].
pub struct StoreCounter {
    store: Arc<dyn Store>,
    recid: u64,
    cache: AtomicI64,
}

impl StoreCounter {
    /// Loads (or initializes to zero) the counter at `recid`.
    pub fn open(store: Arc<dyn Store>, recid: u64) -> Result<Self> {
        let value = match store.get(recid)? {
            Some(bytes) if bytes.len() == 8 => {
                i64::from_le_bytes(bytes.try_into().expect("checked len == 8"))
            }
            _ => {
                store.update(recid, &0i64.to_le_bytes())?;
                0
            }
        };

        Ok(Self {
            store,
            recid,
            cache: AtomicI64::new(value),
        })
    }

    fn persist(&self, value: i64) -> Result<()> {
        self.store.update(self.recid, &value.to_le_bytes())
    }
}

impl Counter for StoreCounter {
    fn get(&self) -> Result<i64> {
        Ok(self.cache.load(Ordering::SeqCst))
    }

    fn increment(&self) -> Result<i64> {
        let value = self.cache.fetch_add(1, Ordering::SeqCst) + 1;
        self.persist(value)?;
        Ok(value)
    }

    fn decrement(&self) -> Result<i64> {
        let value = self.cache.fetch_sub(1, Ordering::SeqCst) - 1;
        self.persist(value)?;
        Ok(value)
    }

    fn set(&self, value: i64) -> Result<()> {
        self.cache.store(value, Ordering::SeqCst);
        self.persist(value)
    }
}
