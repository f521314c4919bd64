// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Hash-to-(segment, index) routing.
//!
//! The routing hash is always computed with seed `0`, never `hash_seed`
//! (the config's `hash_seed` is reserved for external hash-based
//! comparisons such as an entry's `hash_code`). This mirrors a known wart
//! in the structure this crate is modeled on: routing and the externally
//! visible hash are deliberately decoupled, which is surprising enough to
//! call out here rather than silently "fix".

use std::sync::Once;

static GEOMETRY_WARNING: Once = Once::new();

/// `h` masked to its low `index_bits` bits, widened to 64 bits.
///
/// Index occupies the low bits of the hash; segment occupies the bits
/// directly above it (see [`hash_to_segment`]).
pub fn hash_to_index(h: u32, index_bits: u32) -> u64 {
    let h64 = h as u64;
    if index_bits >= 64 {
        h64
    } else {
        h64 & ((1u64 << index_bits) - 1)
    }
}

/// `h >> index_bits`, masked to its low `conc_shift` bits.
pub fn hash_to_segment(h: u32, index_bits: u32, conc_shift: u32) -> u64 {
    let shifted = if index_bits >= 64 { 0 } else { (h as u64) >> index_bits };
    if conc_shift >= 64 {
        shifted
    } else {
        shifted & ((1u64 << conc_shift) - 1)
    }
}

/// Emits a one-shot warning when the addressable space
/// (`segment_count * (1 << dir_shift)^levels`) exceeds `2^31 + 1000`,
/// matching the source's tolerance for "big but probably fine" geometries.
pub fn warn_if_oversized(segment_count: u64, dir_shift: u32, levels: u32) {
    let per_segment = (1u128 << dir_shift).saturating_pow(levels);
    let total = (segment_count as u128).saturating_mul(per_segment);

    if total > (1u128 << 31) + 1000 {
        GEOMETRY_WARNING.call_once(|| {
            log::warn!(
                "map geometry addresses {total} slots, which exceeds 2^31+1000; \
                 this is supported but unusual and may indicate a misconfiguration"
            );
        });
    }
}
