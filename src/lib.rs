// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A K.I.S.S. concurrent, segmented, persistable hash map for embedded
//! storage.
//!
//! [`HMap`] implements the hash table itself — segmentation, collision
//! chains, optional per-entry expiration, optional size caps — and leaves
//! actual persistence to whatever backend the caller plugs in through the
//! [`collab`] traits ([`collab::Store`], [`collab::IndexTree`],
//! [`collab::QueueLong`]). This crate does not ship a production backend;
//! see `collab::mem` (behind the `test-util` feature) for an in-memory one
//! meant for tests and experimentation.
//!
//! ```ignore
//! use segmap::{HMap, HMapConfig, SegmentParts, DefaultHasher};
//! ```
//!
//! The `paranoid` feature turns on extra `debug_assert!`-based checks
//! (lock-held invariants, hash-routing sanity) that are compiled out of
//! release builds even when enabled, since they walk data structures that
//! would otherwise cost nothing to not check.

pub mod coding;
pub mod collab;
pub mod config;
pub mod counter;
pub mod error;
mod eviction;
mod hash;
pub mod hasher;
pub mod iter;
mod leaf;
pub mod listener;
mod map;
mod segment;
mod verify;

pub use coding::{KeySerializer, ValueSerializer};
pub use collab::{IndexTree, QueueLong, QueueNode, Store};
pub use config::HMapConfig;
pub use counter::{AtomicCounter, Counter, StoreCounter};
pub use error::{Error, Result};
pub use eviction::BackgroundEviction;
pub use hasher::{ConstantHasher, DefaultHasher, KeyHasher, ValueHasher};
pub use iter::{Entries, Entry, EntryIter, Iter, Keys, Values};
pub use listener::{FnListener, ModificationListener};
pub use map::{HMap, SegmentParts};

/// Wraps `debug_assert!` behind the `paranoid` feature, so the extra
/// lock-held and hash-routing invariant checks this crate sprinkles around
/// are off by default even in debug builds and, like any `debug_assert!`,
/// compiled out of release builds regardless of the feature.
macro_rules! paranoid_assert {
    ($($arg:tt)*) => {
        #[cfg(feature = "paranoid")]
        debug_assert!($($arg)*);
    };
}
pub(crate) use paranoid_assert;
