// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Modification-listener notifications.

/// Notified on every observable change to an entry: explicit puts/removes,
/// value-loader-triggered inserts, and evictions.
///
/// `triggered` is true when the change was caused by eviction or a value
/// loader rather than a direct caller mutation (§4.4, §4.7).
pub trait ModificationListener<K, V>: Send + Sync {
    fn on_modify(&self, key: &K, old_value: Option<&V>, new_value: Option<&V>, triggered: bool);
}

/// A listener built from a closure, for ad-hoc registration.
pub struct FnListener<F>(pub F);

impl<K, V, F> ModificationListener<K, V> for FnListener<F>
where
    F: Fn(&K, Option<&V>, Option<&V>, bool) + Send + Sync,
{
    fn on_modify(&self, key: &K, old_value: Option<&V>, new_value: Option<&V>, triggered: bool) {
        (self.0)(key, old_value, new_value, triggered);
    }
}
