// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wire primitives: the `pack`/`unpack` varint helpers the leaf format is
//! built on, and the key/value (de)serialization traits collaborators'
//! stores are handed encoded bytes through.

use std::io::{self, Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// Writes a `u64` as an unsigned LEB128 varint, the `pack(n)` primitive
/// named throughout the leaf wire format.
pub fn pack<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_u64_varint(value)
}

/// Reads a varint written by [`pack`].
pub fn unpack<R: Read>(reader: &mut R) -> io::Result<u64> {
    reader.read_u64_varint()
}

/// Serializes/deserializes application keys to/from the bytes a [`Store`](crate::collab::Store)
/// persists.
///
/// A serializer is "trusted" when it is known not to produce aliasing or
/// malicious output for any input the map will ever see (e.g. a
/// fixed-width integer codec); untrusted serializers force the
/// hash-stability round-trip check described in [`crate::hash`] to run on
/// every first `put` of a key rather than being skipped.
pub trait KeySerializer<K>: Send + Sync {
    /// Serializes `key` into `writer`.
    fn encode(&self, key: &K, writer: &mut dyn Write) -> io::Result<()>;

    /// Deserializes a key previously written by [`Self::encode`].
    fn decode(&self, reader: &mut dyn Read) -> io::Result<K>;

    /// See the trait docs.
    fn is_trusted(&self) -> bool {
        false
    }
}

/// Serializes/deserializes values. See [`KeySerializer`].
pub trait ValueSerializer<V>: Send + Sync {
    fn encode(&self, value: &V, writer: &mut dyn Write) -> io::Result<()>;
    fn decode(&self, reader: &mut dyn Read) -> io::Result<V>;
    fn is_trusted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn pack_unpack_round_trips() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            pack(&mut buf, value).unwrap();
            let mut cursor = &buf[..];
            assert_eq!(value, unpack(&mut cursor).unwrap());
        }
    }

    #[test]
    fn small_values_pack_to_one_byte() {
        let mut buf = Vec::new();
        pack(&mut buf, 42).unwrap();
        assert_eq!(1, buf.len());
    }
}
