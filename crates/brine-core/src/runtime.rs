// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mutable e-graph runtime: node registry, class map, hashcons, parent index,
//! worklist, pending-diff buffer.
//!
//! Determinism contract
//! - Every container that feeds iteration is a `BTreeMap`/`BTreeSet`, so all
//!   scans are in ascending id order.
//! - The hashcons is a hash map used strictly for point lookups; it is never
//!   iterated when emitting snapshots or driving rewrites.
//! - Diffs are appended in the order the mutations commit and drained by the
//!   snapshotter.
use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::diff::{Diff, Strategy};
use crate::eclass::{EClass, ParentEntry};
use crate::enode::{ENode, NodeChunks};
use crate::error::EngineError;
use crate::ident::{EClassId, ENodeId};
use crate::union_find::UnionFind;

/// The mutable e-graph state driven by the saturation loop.
#[derive(Debug)]
pub struct Runtime {
    strategy: Strategy,
    record_diffs: bool,
    uf: UnionFind,
    nodes: NodeChunks,
    classes: BTreeMap<EClassId, EClass>,
    hashcons: FxHashMap<ENode, EClassId>,
    worklist: BTreeSet<EClassId>,
    pending: Vec<Diff>,
}

impl Runtime {
    /// Creates an empty runtime for the given strategy.
    ///
    /// When `seed` is set, union tie-breaks are chosen by the seeded coin
    /// flip instead of smaller-id-wins.
    #[must_use]
    pub fn new(strategy: Strategy, record_diffs: bool, seed: Option<u64>) -> Self {
        let uf = seed.map_or_else(UnionFind::new, UnionFind::with_seed);
        Self {
            strategy,
            record_diffs,
            uf,
            nodes: NodeChunks::new(),
            classes: BTreeMap::new(),
            hashcons: FxHashMap::default(),
            worklist: BTreeSet::new(),
            pending: Vec::new(),
        }
    }

    /// The strategy this runtime was created with.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Total number of e-nodes ever allocated.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of entries currently in the class map (canonical classes plus,
    /// in deferred mode, not-yet-compacted ghosts).
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Returns the canonical representative of `id`.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if `id` was never allocated.
    pub fn find(&self, id: ENodeId) -> Result<EClassId, EngineError> {
        self.uf.resolve(id)
    }

    /// Returns a fresh node whose children are all canonical.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if any child was never allocated.
    pub fn canonicalize(&self, node: &ENode) -> Result<ENode, EngineError> {
        let mut args = Vec::with_capacity(node.args.len());
        for &a in &node.args {
            args.push(self.uf.resolve(a)?);
        }
        Ok(ENode::new(node.op.clone(), args))
    }

    /// Renders the canonical key string `"op(c1,c2,…)"` for `node`.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if any child was never allocated.
    pub fn canonical_key(&self, node: &ENode) -> Result<String, EngineError> {
        Ok(self.canonicalize(node)?.key())
    }

    /// Returns the registry node with the given id, if allocated.
    #[must_use]
    pub fn node(&self, id: ENodeId) -> Option<&ENode> {
        self.nodes.get(id)
    }

    /// Returns all parent entries of the class of `id`, in parent-node-id
    /// order.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if `id` was never allocated, or
    /// [`EngineError::InvariantViolation`] if the canonical class is missing
    /// from the class map.
    pub fn get_parents(&self, id: ENodeId) -> Result<Vec<ParentEntry>, EngineError> {
        let canon = self.uf.resolve(id)?;
        let Some(class) = self.classes.get(&canon) else {
            return Err(EngineError::InvariantViolation(
                "canonical class missing from class map",
            ));
        };
        Ok(class.parents.values().cloned().collect())
    }

    /// Adds an e-node, returning the existing id when the canonical key is
    /// already hashconsed.
    ///
    /// New nodes are canonicalized at storage time, allocated the next id,
    /// placed in a fresh singleton class, and indexed as a parent of each
    /// distinct child class. Emits an `Add` diff for new nodes only.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if any child was never allocated.
    pub fn add_enode(&mut self, node: &ENode) -> Result<ENodeId, EngineError> {
        let canon = self.canonicalize(node)?;
        if let Some(&existing) = self.hashcons.get(&canon) {
            return self.uf.resolve(existing);
        }

        #[allow(clippy::cast_possible_truncation)]
        let id = ENodeId(self.nodes.len() as u32);
        self.uf.make_set(id);
        self.nodes.push(canon.clone());
        self.classes.insert(id, EClass::singleton(id));
        self.hashcons.insert(canon.clone(), id);

        let children: BTreeSet<ENodeId> = canon.args.iter().copied().collect();
        for child in children {
            let Some(class) = self.classes.get_mut(&child) else {
                return Err(EngineError::InvariantViolation(
                    "canonical child class missing from class map",
                ));
            };
            class.parents.insert(
                id,
                ParentEntry {
                    class: id,
                    node: canon.clone(),
                },
            );
            class.touch();
        }

        self.record(Diff::Add {
            id,
            node: canon.clone(),
        });
        Ok(id)
    }

    /// Merges the classes of `a` and `b`, returning the canonical survivor.
    ///
    /// In eager mode the absorbed class is deleted from the class map
    /// immediately; in deferred mode it is kept as an empty ghost entry until
    /// the next compaction so snapshots can show it.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownId`] if either id was never allocated, or
    /// [`EngineError::InvariantViolation`] on class-map corruption.
    pub fn merge(&mut self, a: ENodeId, b: ENodeId) -> Result<EClassId, EngineError> {
        let eager_delete = self.strategy == Strategy::Eager;
        self.merge_with_mode(a, b, eager_delete)
    }

    /// Merge with an explicit deletion mode. Congruence repair always uses
    /// `eager_delete = true` so its inner merges never widen the compaction
    /// front.
    pub(crate) fn merge_with_mode(
        &mut self,
        a: ENodeId,
        b: ENodeId,
        eager_delete: bool,
    ) -> Result<EClassId, EngineError> {
        let ra = self.uf.find(a)?;
        let rb = self.uf.find(b)?;
        if ra == rb {
            return Ok(ra);
        }
        let Some(union) = self.uf.union(ra, rb)? else {
            return Err(EngineError::InvariantViolation(
                "union-find disagreed about distinct roots",
            ));
        };
        let (winner, loser) = (union.winner, union.loser);

        let Some(loser_class) = self.classes.remove(&loser) else {
            return Err(EngineError::InvariantViolation(
                "merge loser missing from class map",
            ));
        };

        // Parent classes of the loser: their canonical keys will change.
        let mut parent_classes: BTreeSet<EClassId> = BTreeSet::new();
        for entry in loser_class.parents.values() {
            parent_classes.insert(self.uf.find(entry.class)?);
        }

        let moved: Vec<ENodeId> = loser_class.nodes.iter().copied().collect();
        {
            let Some(winner_class) = self.classes.get_mut(&winner) else {
                return Err(EngineError::InvariantViolation(
                    "merge winner missing from class map",
                ));
            };
            winner_class.nodes.extend(loser_class.nodes.iter().copied());
            winner_class
                .parents
                .extend(loser_class.parents.iter().map(|(k, v)| (*k, v.clone())));
            winner_class.touch();
        }

        for id in moved {
            let Some(stored) = self.nodes.get(id) else {
                return Err(EngineError::InvariantViolation(
                    "class member missing from node registry",
                ));
            };
            self.hashcons.insert(stored.clone(), winner);
        }

        for pc in parent_classes {
            if let Some(class) = self.classes.get_mut(&pc) {
                class.touch();
            }
        }

        if eager_delete {
            if let Some(winner_class) = self.classes.get_mut(&winner) {
                winner_class.absorb_data(loser_class.data);
            }
        } else {
            // Deferred mode keeps the emptied entry so snapshots can render
            // the ghost until compaction deletes it.
            let mut ghost = EClass::singleton(loser);
            ghost.nodes.clear();
            ghost.data = loser_class.data;
            ghost.version = loser_class.version + 1;
            self.classes.insert(loser, ghost);
        }

        self.worklist.insert(winner);
        self.record(Diff::Merge { winner, loser });
        Ok(winner)
    }

    /// Appends a diff to the pending buffer (honoring `record_diffs`).
    pub(crate) fn record(&mut self, diff: Diff) {
        if self.record_diffs {
            self.pending.push(diff);
        }
    }

    /// Moves the pending diff buffer out, leaving it empty.
    pub(crate) fn take_pending(&mut self) -> Vec<Diff> {
        std::mem::take(&mut self.pending)
    }

    /// The current class map.
    pub(crate) fn classes(&self) -> &BTreeMap<EClassId, EClass> {
        &self.classes
    }

    pub(crate) fn class(&self, id: EClassId) -> Option<&EClass> {
        self.classes.get(&id)
    }

    pub(crate) fn class_mut(&mut self, id: EClassId) -> Option<&mut EClass> {
        self.classes.get_mut(&id)
    }

    pub(crate) fn remove_class(&mut self, id: EClassId) -> Option<EClass> {
        self.classes.remove(&id)
    }

    /// The worklist of canonical ids pending congruence repair.
    pub(crate) fn worklist(&self) -> &BTreeSet<EClassId> {
        &self.worklist
    }

    /// Pops the smallest worklist id, if any.
    pub(crate) fn pop_worklist(&mut self) -> Option<EClassId> {
        self.worklist.pop_first()
    }

    pub(crate) fn nodes(&self) -> &NodeChunks {
        &self.nodes
    }

    pub(crate) fn hashcons_get(&self, node: &ENode) -> Option<EClassId> {
        self.hashcons.get(node).copied()
    }

    pub(crate) fn hashcons_len(&self) -> usize {
        self.hashcons.len()
    }

    pub(crate) fn hashcons_remove(&mut self, node: &ENode) {
        self.hashcons.remove(node);
    }

    pub(crate) fn hashcons_insert(&mut self, node: ENode, class: EClassId) {
        self.hashcons.insert(node, class);
    }

    /// Number of ids the union-find has allocated.
    pub(crate) fn num_ids(&self) -> usize {
        self.uf.len()
    }

    pub(crate) fn uf(&self) -> &UnionFind {
        &self.uf
    }

    pub(crate) fn uf_mut(&mut self) -> &mut UnionFind {
        &mut self.uf
    }

    /// Sorted canonical class ids, skipping ghosts.
    pub(crate) fn canonical_class_ids(&self) -> Vec<EClassId> {
        self.classes
            .keys()
            .copied()
            .filter(|&id| matches!(self.uf.is_canonical(id), Ok(true)))
            .collect()
    }
}
