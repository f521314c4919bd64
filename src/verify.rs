// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `verify()` consistency check: walks every segment's index tree and
//! queues and confirms the structure is internally coherent. Intended for
//! tests and offline diagnostics, not the hot path — it takes every
//! segment's read lock in turn and decodes every reachable leaf.

use crate::error::{Error, Result};
use crate::hash::{hash_to_index, hash_to_segment};
use crate::leaf::{decode_leaf, expire_node_recid, expire_queue_kind, QueueKind};
use crate::map::HMap;

impl<K, V> HMap<K, V>
where
    K: Clone,
    V: Clone + Default,
{
    /// Checks, for every segment:
    ///
    /// - every leaf its index tree names decodes, is non-empty, and every
    ///   triple in it hashes back to that exact `(segment, index)`;
    /// - every triple's `expire_id`, when nonzero, names a queue node that
    ///   exists in the queue it claims and that node points back at the
    ///   same leaf;
    /// - every queue node, in turn, names a leaf that exists and contains
    ///   a triple pointing back at that node (the reverse direction, to
    ///   catch orphaned queue nodes);
    /// - the segment's counter, if any, agrees with the triple count found
    ///   by walking the leaves.
    ///
    /// Returns the first inconsistency found, if any.
    pub fn verify(&self) -> Result<()> {
        for (seg_idx, segment) in self.segments.iter().enumerate() {
            let _guard = segment.lock.read();

            segment.index_tree.verify()?;
            for queue in [&segment.create_queue, &segment.update_queue, &segment.get_queue] {
                if let Some(queue) = queue {
                    queue.verify()?;
                }
            }

            let mut recids = Vec::new();
            segment.index_tree.for_each(&mut |index, recid| recids.push((index, recid)));

            let mut triple_count = 0u64;

            for (index, leaf_recid) in recids {
                let leaf = self
                    .read_leaf(segment, leaf_recid)
                    .map_err(|e| Error::Corruption(format!("segment {seg_idx} index {index}: {e}")))?;

                if leaf.triples.is_empty() {
                    return Err(Error::Corruption(format!(
                        "leaf {leaf_recid} at segment {seg_idx} index {index} is empty; an empty leaf should have been deleted"
                    )));
                }

                triple_count += leaf.triples.len() as u64;

                for triple in &leaf.triples {
                    let h = self.key_hasher.hash_code(&triple.key, 0);
                    let expected_index = hash_to_index(h, self.index_bits);
                    let expected_segment = hash_to_segment(h, self.index_bits, self.config.conc_shift) as usize;

                    if expected_index != index || expected_segment != seg_idx {
                        return Err(Error::Corruption(format!(
                            "a key in leaf {leaf_recid} routes to segment {expected_segment} index {expected_index}, \
                             but is stored at segment {seg_idx} index {index}"
                        )));
                    }

                    if triple.expire_id == 0 {
                        continue;
                    }

                    let kind = expire_queue_kind(triple.expire_id)?
                        .expect("nonzero expire_id implies expire_queue_kind returns Some");
                    let node_recid = expire_node_recid(triple.expire_id);

                    let queue = segment.queue_for(kind).ok_or_else(|| {
                        Error::Corruption(format!(
                            "leaf {leaf_recid} triple names a {kind:?} queue node, but segment {seg_idx} has no {kind:?} queue"
                        ))
                    })?;

                    match queue.remove(node_recid, false)? {
                        Some(node) if node.value == leaf_recid => {}
                        Some(node) => {
                            return Err(Error::Corruption(format!(
                                "queue node {node_recid} points at leaf {}, but the triple in leaf {leaf_recid} claims it",
                                node.value
                            )))
                        }
                        None => {
                            return Err(Error::Corruption(format!(
                                "leaf {leaf_recid} triple names queue node {node_recid}, which does not exist in its {kind:?} queue"
                            )))
                        }
                    }
                }
            }

            self.verify_queues_point_back(segment, seg_idx)?;

            if let Some(counter) = &segment.counter {
                let counted = counter.get()?;
                if counted < 0 || counted as u64 != triple_count {
                    return Err(Error::Corruption(format!(
                        "segment {seg_idx} counter reports {counted} entries, but {triple_count} were found by walking its leaves"
                    )));
                }
            }
        }

        Ok(())
    }

    fn verify_queues_point_back(&self, segment: &crate::segment::Segment, seg_idx: usize) -> Result<()> {
        for kind in [QueueKind::Create, QueueKind::Update, QueueKind::Get] {
            let Some(queue) = segment.queue_for(kind) else { continue };
            let mut first_error: Option<Error> = None;

            queue.for_each(&mut |node_recid, node| {
                if first_error.is_some() {
                    return;
                }

                first_error = (|| -> Option<Error> {
                    let bytes = match segment.store.get(node.value) {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => {
                            return Some(Error::Corruption(format!(
                                "segment {seg_idx}: {kind:?} queue node {node_recid} points at nonexistent leaf {}",
                                node.value
                            )))
                        }
                        Err(e) => return Some(e),
                    };

                    let leaf = match decode_leaf(
                        &bytes,
                        self.key_serializer.as_ref(),
                        self.value_serializer.as_ref(),
                        self.config.value_inline,
                        self.config.has_values,
                    ) {
                        Ok(leaf) => leaf,
                        Err(e) => {
                            return Some(Error::Corruption(format!(
                                "segment {seg_idx}: leaf {} named by {kind:?} queue node {node_recid} failed to decode: {e}",
                                node.value
                            )))
                        }
                    };

                    if leaf.position_of_node_recid(node_recid).is_none() {
                        return Some(Error::Corruption(format!(
                            "segment {seg_idx}: {kind:?} queue node {node_recid} points at leaf {}, \
                             but no triple in that leaf references it back",
                            node.value
                        )));
                    }

                    None
                })();
            });

            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(())
    }
}
