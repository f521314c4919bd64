// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::{Error, Result};

/// Sentinel TTL meaning "queue the entry, but with timestamp 0" (never
/// time-expires on its own; only size/store caps can evict it).
pub const TTL_QUEUED_NO_TIMEOUT: i64 = -1;

/// Immutable map configuration, built with [`HMapConfig::new`] and the
/// `with_*` builder methods.
///
/// Mirrors the shape of a storage-engine `Config`: a plain struct with a
/// sane [`Default`], validated once at construction time and never mutated
/// afterwards.
#[derive(Clone, Debug)]
pub struct HMapConfig {
    /// `log2` of the segment count. `segment_count = 1 << conc_shift`.
    pub conc_shift: u32,

    /// `log2` of the fan-out at each index-tree level.
    pub dir_shift: u32,

    /// Number of index-tree levels; together with `dir_shift` this fixes
    /// how many bits of the hash are consumed by the index.
    pub levels: u32,

    /// Seed used only for external hash-based comparisons (e.g. an entry's
    /// `hash_code`). Never used for segment/index routing.
    pub hash_seed: u32,

    /// When true, values live directly in the leaf; when false, each value
    /// is a separate store record addressed by recid.
    pub value_inline: bool,

    /// When false, this is a set: the value serializer is a sentinel and
    /// `value_inline` must be `true`.
    pub has_values: bool,

    /// Milliseconds. `0` disables the create-queue; `-1` queues entries
    /// with timestamp 0 (never time-expires).
    pub expire_create_ttl: i64,

    /// Milliseconds, see `expire_create_ttl`.
    pub expire_update_ttl: i64,

    /// Milliseconds, see `expire_create_ttl`.
    pub expire_get_ttl: i64,

    /// Maximum number of entries across the whole map. `0` disables the cap.
    pub expire_max_size: u64,

    /// Maximum bytes per segment store. `0` disables the cap.
    pub expire_store_size: u64,

    /// Period between background eviction sweeps, required if a
    /// [`crate::eviction::Scheduler`] is attached.
    pub expire_executor_period_ms: u64,

    /// Fraction in `(0, 1)`; when `free_size / total_size` of a segment's
    /// store exceeds this, `compact()` is triggered after eviction.
    pub expire_compact_threshold: Option<f64>,

    /// When false, segment locks are no-ops (single-threaded use).
    pub is_thread_safe: bool,
}

impl Default for HMapConfig {
    fn default() -> Self {
        Self {
            conc_shift: 0,
            dir_shift: 4,
            levels: 1,
            hash_seed: 0,
            value_inline: true,
            has_values: true,
            expire_create_ttl: 0,
            expire_update_ttl: 0,
            expire_get_ttl: 0,
            expire_max_size: 0,
            expire_store_size: 0,
            expire_executor_period_ms: 0,
            expire_compact_threshold: None,
            is_thread_safe: true,
        }
    }
}

impl HMapConfig {
    /// Starts a new config with every cap/TTL disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// `1 << conc_shift`.
    pub fn segment_count(&self) -> usize {
        1usize << self.conc_shift
    }

    /// Number of index bits, `levels * dir_shift`.
    pub fn index_bits(&self) -> u32 {
        self.levels * self.dir_shift
    }

    pub fn with_conc_shift(mut self, conc_shift: u32) -> Self {
        self.conc_shift = conc_shift;
        self
    }

    pub fn with_dir_shift(mut self, dir_shift: u32) -> Self {
        self.dir_shift = dir_shift;
        self
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_hash_seed(mut self, hash_seed: u32) -> Self {
        self.hash_seed = hash_seed;
        self
    }

    pub fn with_value_inline(mut self, value_inline: bool) -> Self {
        self.value_inline = value_inline;
        self
    }

    pub fn with_has_values(mut self, has_values: bool) -> Self {
        self.has_values = has_values;
        self
    }

    pub fn with_expire_create_ttl(mut self, ttl_ms: i64) -> Self {
        self.expire_create_ttl = ttl_ms;
        self
    }

    pub fn with_expire_update_ttl(mut self, ttl_ms: i64) -> Self {
        self.expire_update_ttl = ttl_ms;
        self
    }

    pub fn with_expire_get_ttl(mut self, ttl_ms: i64) -> Self {
        self.expire_get_ttl = ttl_ms;
        self
    }

    pub fn with_expire_max_size(mut self, max_size: u64) -> Self {
        self.expire_max_size = max_size;
        self
    }

    pub fn with_expire_store_size(mut self, store_size: u64) -> Self {
        self.expire_store_size = store_size;
        self
    }

    pub fn with_expire_executor_period_ms(mut self, period_ms: u64) -> Self {
        self.expire_executor_period_ms = period_ms;
        self
    }

    pub fn with_expire_compact_threshold(mut self, threshold: f64) -> Self {
        self.expire_compact_threshold = Some(threshold);
        self
    }

    pub fn with_is_thread_safe(mut self, is_thread_safe: bool) -> Self {
        self.is_thread_safe = is_thread_safe;
        self
    }

    /// Validates the geometry/value invariants that `HMap::new` requires
    /// before it will build any segments.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.has_values && !self.value_inline {
            return Err(Error::InvalidArgument(
                "a key-set (has_values = false) requires value_inline = true",
            ));
        }

        if self.conc_shift as u64 + self.index_bits() as u64 > 62 {
            return Err(Error::InvalidArgument(
                "conc_shift + levels*dir_shift must fit within 62 bits",
            ));
        }

        if self.expire_executor_period_ms == 0
            && self.expire_compact_threshold.is_some()
            && self.expire_store_size == 0
            && self.expire_max_size == 0
        {
            // Compaction threshold without any cap to ever drive an eviction
            // is harmless but almost certainly a mistake; only warn.
            log::warn!(
                "expire_compact_threshold is set but no queue-driving cap (expire_max_size/expire_store_size) is configured"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_has_everything_disabled() {
        let config = HMapConfig::default();
        assert_eq!(0, config.expire_create_ttl);
        assert_eq!(0, config.expire_max_size);
        assert!(config.value_inline);
        assert!(config.has_values);
    }

    #[test]
    fn keyset_requires_inline_values() {
        let config = HMapConfig::new().with_has_values(false).with_value_inline(false);
        assert!(config.validate().is_err());
    }

    #[test]
    fn keyset_with_inline_values_is_fine() {
        let config = HMapConfig::new().with_has_values(false).with_value_inline(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let config = HMapConfig::new().with_conc_shift(32).with_dir_shift(16).with_levels(4);
        assert!(config.validate().is_err());
    }
}
