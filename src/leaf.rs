// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The leaf record: the on-store unit holding every triple that collided
//! into one `(segment, index)` bucket, plus the `expireId` tagging scheme.

use crate::coding::{pack, unpack, KeySerializer, ValueSerializer};
use crate::error::{Error, Result};
use crate::hasher::KeyHasher;
use std::io;

/// Which expiration queue a triple's `expire_id` currently names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Create,
    Update,
    Get,
}

impl QueueKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::Create => 1,
            Self::Update => 2,
            Self::Get => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Create),
            2 => Ok(Self::Update),
            3 => Ok(Self::Get),
            other => Err(Error::Corruption(format!(
                "expireId tag {other} is outside {{1,2,3}}"
            ))),
        }
    }
}

/// Packs a (nonzero) node recid and a queue tag into the 64-bit `expireId`.
pub fn make_expire_id(node_recid: u64, kind: QueueKind) -> u64 {
    debug_assert!(node_recid != 0, "nodeRecid must be nonzero");
    (node_recid << 2) | kind.tag() as u64
}

/// `None` if `expire_id == 0` (no queue node), else the queue it names.
pub fn expire_queue_kind(expire_id: u64) -> Result<Option<QueueKind>> {
    if expire_id == 0 {
        return Ok(None);
    }
    QueueKind::from_tag((expire_id & 0b11) as u8).map(Some)
}

/// The node recid an `expire_id` points at. Meaningless if `expire_id == 0`.
pub fn expire_node_recid(expire_id: u64) -> u64 {
    expire_id >> 2
}

/// A triple's value, wrapped according to the map's `value_inline`/
/// `has_values` configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WrappedValue<V> {
    /// `value_inline = true`: the value lives directly in the leaf.
    Inline(V),

    /// `value_inline = false`: a recid into the segment's store.
    External(u64),

    /// `has_values = false` (a key-set): the literal "present" marker.
    Present,
}

/// One `(key, wrappedValue, expireId)` entry within a [`Leaf`].
#[derive(Clone, Debug)]
pub struct Triple<K, V> {
    pub key: K,
    pub value: WrappedValue<V>,
    pub expire_id: u64,
}

/// All collisions sharing one `(segment, index)` bucket.
///
/// A leaf is never empty on store: the last triple's removal deletes the
/// whole leaf record rather than leaving a zero-length one behind.
#[derive(Clone, Debug, Default)]
pub struct Leaf<K, V> {
    pub triples: Vec<Triple<K, V>>,
}

impl<K, V> Leaf<K, V> {
    pub fn single(key: K, value: WrappedValue<V>, expire_id: u64) -> Self {
        Self {
            triples: vec![Triple { key, value, expire_id }],
        }
    }

    pub fn position_of(&self, key: &K, key_hasher: &dyn KeyHasher<K>) -> Option<usize> {
        self.triples.iter().position(|t| key_hasher.equals(&t.key, key))
    }

    /// The node recid an `expire_id` slot in this leaf belongs to, if it
    /// matches `wanted` (used by eviction to find the triple a queue node
    /// owns).
    pub fn position_of_node_recid(&self, wanted: u64) -> Option<usize> {
        self.triples.iter().position(|t| {
            t.expire_id != 0 && expire_node_recid(t.expire_id) == wanted
        })
    }
}

/// Serializes a leaf to the wire format §6 describes:
/// `pack(size)` followed by, per triple, the key, the wrapped value
/// (omitted entirely for key-sets), and `pack(expireId)`.
pub fn encode_leaf<K, V>(
    leaf: &Leaf<K, V>,
    key_ser: &dyn KeySerializer<K>,
    value_ser: &dyn ValueSerializer<V>,
    value_inline: bool,
    has_values: bool,
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pack(&mut buf, leaf.triples.len() as u64)?;

    for triple in &leaf.triples {
        key_ser.encode(&triple.key, &mut buf)?;

        if has_values {
            match &triple.value {
                WrappedValue::Inline(v) if value_inline => value_ser.encode(v, &mut buf)?,
                WrappedValue::External(recid) if !value_inline => pack(&mut buf, *recid)?,
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "wrapped value does not match value_inline configuration",
                    ))
                }
            }
        }

        pack(&mut buf, triple.expire_id)?;
    }

    Ok(buf)
}

/// Deserializes a leaf previously written by [`encode_leaf`].
pub fn decode_leaf<K, V>(
    bytes: &[u8],
    key_ser: &dyn KeySerializer<K>,
    value_ser: &dyn ValueSerializer<V>,
    value_inline: bool,
    has_values: bool,
) -> io::Result<Leaf<K, V>> {
    let mut cursor = bytes;
    let count = unpack(&mut cursor)?;

    let mut triples = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = key_ser.decode(&mut cursor)?;

        let value = if !has_values {
            WrappedValue::Present
        } else if value_inline {
            WrappedValue::Inline(value_ser.decode(&mut cursor)?)
        } else {
            WrappedValue::External(unpack(&mut cursor)?)
        };

        let expire_id = unpack(&mut cursor)?;
        triples.push(Triple { key, value, expire_id });
    }

    Ok(Leaf { triples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;
    use crate::hasher::DefaultHasher;
    use std::io::{Read, Write};

    struct StrKeySer;
    impl KeySerializer<String> for StrKeySer {
        fn encode(&self, key: &String, writer: &mut dyn Write) -> io::Result<()> {
            pack(writer, key.len() as u64)?;
            writer.write_all(key.as_bytes())
        }

        fn decode(&self, reader: &mut dyn Read) -> io::Result<String> {
            let len = unpack(reader)?;
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf)?;
            Ok(String::from_utf8(buf).expect("test data is valid utf8"))
        }

        fn is_trusted(&self) -> bool {
            true
        }
    }

    struct I64ValueSer;
    impl ValueSerializer<i64> for I64ValueSer {
        fn encode(&self, value: &i64, writer: &mut dyn Write) -> io::Result<()> {
            writer.write_all(&value.to_le_bytes())
        }

        fn decode(&self, reader: &mut dyn Read) -> io::Result<i64> {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Ok(i64::from_le_bytes(buf))
        }

        fn is_trusted(&self) -> bool {
            true
        }
    }

    #[test]
    fn expire_id_round_trips_every_tag() {
        for (kind, tag) in [
            (QueueKind::Create, 1u8),
            (QueueKind::Update, 2),
            (QueueKind::Get, 3),
        ] {
            let id = make_expire_id(42, kind);
            assert_eq!(tag as u64, id & 0b11);
            assert_eq!(42, expire_node_recid(id));
            assert_eq!(Some(kind), expire_queue_kind(id).unwrap());
        }
    }

    #[test]
    fn zero_expire_id_means_no_queue() {
        assert_eq!(None, expire_queue_kind(0).unwrap());
    }

    #[test]
    fn bad_tag_is_corruption() {
        let bad_id = (7u64 << 2) | 0; // tag 0 is not a valid queue tag
        assert!(expire_queue_kind(bad_id).is_err());
    }

    #[test]
    fn leaf_encode_decode_round_trip_inline() {
        let leaf = Leaf {
            triples: vec![
                Triple {
                    key: "a".to_string(),
                    value: WrappedValue::Inline(1),
                    expire_id: 0,
                },
                Triple {
                    key: "b".to_string(),
                    value: WrappedValue::Inline(2),
                    expire_id: make_expire_id(9, QueueKind::Create),
                },
            ],
        };

        let bytes = encode_leaf(&leaf, &StrKeySer, &I64ValueSer, true, true).unwrap();
        let decoded: Leaf<String, i64> = decode_leaf(&bytes, &StrKeySer, &I64ValueSer, true, true).unwrap();

        assert_eq!(2, decoded.triples.len());
        assert_eq!("a", decoded.triples[0].key);
        assert_eq!(WrappedValue::Inline(1), decoded.triples[0].value);
        assert_eq!(make_expire_id(9, QueueKind::Create), decoded.triples[1].expire_id);
    }

    #[test]
    fn leaf_encode_decode_round_trip_external() {
        let leaf = Leaf::<String, i64>::single("k".to_string(), WrappedValue::External(77), 0);
        let bytes = encode_leaf(&leaf, &StrKeySer, &I64ValueSer, false, true).unwrap();
        let decoded: Leaf<String, i64> = decode_leaf(&bytes, &StrKeySer, &I64ValueSer, false, true).unwrap();
        assert_eq!(WrappedValue::External(77), decoded.triples[0].value);
    }

    #[test]
    fn leaf_encode_decode_round_trip_keyset() {
        let leaf = Leaf::<String, ()>::single("k".to_string(), WrappedValue::Present, 0);
        let bytes = encode_leaf(&leaf, &StrKeySer, &UnitValueSer, true, false).unwrap();
        let decoded: Leaf<String, ()> = decode_leaf(&bytes, &StrKeySer, &UnitValueSer, true, false).unwrap();
        assert_eq!(WrappedValue::Present, decoded.triples[0].value);
    }

    struct UnitValueSer;
    impl ValueSerializer<()> for UnitValueSer {
        fn encode(&self, _value: &(), _writer: &mut dyn Write) -> io::Result<()> {
            Ok(())
        }

        fn decode(&self, _reader: &mut dyn Read) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn position_of_finds_matching_key() {
        let leaf = Leaf {
            triples: vec![
                Triple { key: "a".to_string(), value: WrappedValue::Inline(1), expire_id: 0 },
                Triple { key: "b".to_string(), value: WrappedValue::Inline(2), expire_id: 0 },
            ],
        };
        assert_eq!(Some(1), leaf.position_of(&"b".to_string(), &DefaultHasher));
        assert_eq!(None, leaf.position_of(&"z".to_string(), &DefaultHasher));
    }
}
