// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::u64_map;
use segmap::HMapConfig;
use std::collections::HashMap;

/// A simple xorshift PRNG so the workload is reproducible without pulling
/// in `rand` as a dependency of the test binary itself (the crate already
/// depends on it; this keeps the test self-contained and deterministic
/// across runs without needing a fixed seed threaded through `rand`).
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

#[test]
fn mixed_workload_stays_consistent_with_a_shadow_hashmap() {
    // TTLs are long enough that nothing expires mid-run; the point here is
    // to exercise the get/update queue bookkeeping paths (touch, bump,
    // transfer) under a mixed workload, not TTL expiry itself (covered by
    // `expiration.rs`).
    let map = u64_map(
        HMapConfig::new()
            .with_conc_shift(3)
            .with_expire_get_ttl(60_000)
            .with_expire_update_ttl(60_000),
    );
    let mut shadow: HashMap<u64, u64> = HashMap::new();
    let mut rng = Xorshift(0x2545F4914F6CDD1D);

    for _ in 0..1000 {
        let key = rng.below(64);
        match rng.below(4) {
            0 => {
                let value = rng.next();
                map.put(key, value).unwrap();
                shadow.insert(key, value);
            }
            1 => {
                let got = map.get(&key).unwrap();
                assert_eq!(shadow.get(&key).copied(), got);
            }
            2 => {
                map.remove(&key).unwrap();
                shadow.remove(&key);
            }
            _ => {
                let present = map.contains_key(&key).unwrap();
                assert_eq!(shadow.contains_key(&key), present);
            }
        }
    }

    assert_eq!(shadow.len() as u64, map.len().unwrap());
    for (&key, &value) in &shadow {
        assert_eq!(Some(value), map.get(&key).unwrap());
    }

    map.verify().unwrap();
}

#[test]
fn mixed_workload_without_queues_matches_a_shadow_hashmap() {
    let map = u64_map(HMapConfig::new().with_conc_shift(2));
    let mut shadow: HashMap<u64, u64> = HashMap::new();
    let mut rng = Xorshift(0xD1342543DE82EF95);

    for _ in 0..500 {
        let key = rng.below(32);
        if rng.below(3) == 0 {
            map.remove(&key).unwrap();
            shadow.remove(&key);
        } else {
            let value = rng.next();
            map.put(key, value).unwrap();
            shadow.insert(key, value);
        }
    }

    let mut collected: Vec<(u64, u64)> = map.iter().collect::<segmap::Result<Vec<_>>>().unwrap();
    collected.sort();
    let mut expected: Vec<(u64, u64)> = shadow.into_iter().collect();
    expected.sort();
    assert_eq!(expected, collected);

    map.verify().unwrap();
}
