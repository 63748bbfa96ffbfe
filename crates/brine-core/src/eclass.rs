// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mutable e-class record owned by the runtime's class map.
use std::collections::{BTreeMap, BTreeSet};

use crate::enode::ENode;
use crate::ident::{EClassId, ENodeId};

/// Navigation entry from a child class to one e-node that references it.
///
/// Parents are referenced by id, never by pointer: the class map is the sole
/// owner of classes, and this index exists only so that congruence repair can
/// find the nodes whose keys a merge may have invalidated.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParentEntry {
    /// Class id the parent node belonged to when the entry was inserted.
    /// May be stale after merges; resolve through the union-find before use.
    pub class: EClassId,
    /// The parent node as stored at insertion (canonical at that moment).
    pub node: ENode,
}

/// A set of e-nodes known to be semantically equivalent.
#[derive(Clone, Debug)]
pub struct EClass {
    /// Id of this class (the id of its first node).
    pub id: EClassId,
    /// Member node ids.
    pub nodes: BTreeSet<ENodeId>,
    /// Parent index keyed by the parent *node* id, which is unique per node
    /// and keeps iteration deterministic.
    pub parents: BTreeMap<ENodeId, ParentEntry>,
    /// Opaque analysis payload. Merged shallowly on union: the absorbed
    /// class's entries overwrite the survivor's on key conflict.
    pub data: BTreeMap<String, String>,
    /// Bumped on any mutation that would change this class's snapshot view.
    pub version: u64,
}

impl EClass {
    /// Creates a singleton class holding exactly `node_id`.
    #[must_use]
    pub fn singleton(node_id: ENodeId) -> Self {
        let mut nodes = BTreeSet::new();
        nodes.insert(node_id);
        Self {
            id: node_id,
            nodes,
            parents: BTreeMap::new(),
            data: BTreeMap::new(),
            version: 0,
        }
    }

    /// Marks the class's view as stale.
    pub fn touch(&mut self) {
        self.version += 1;
    }

    /// Folds `other`'s payload into this class, `other` winning conflicts.
    pub fn absorb_data(&mut self, other: BTreeMap<String, String>) {
        if other.is_empty() {
            return;
        }
        self.data.extend(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorbed_data_overwrites_on_conflict() {
        let mut c = EClass::singleton(ENodeId(0));
        c.data.insert("depth".into(), "1".into());
        c.data.insert("kind".into(), "leaf".into());
        let mut incoming = BTreeMap::new();
        incoming.insert("depth".into(), "2".into());
        c.absorb_data(incoming);
        assert_eq!(c.data.get("depth").map(String::as_str), Some("2"));
        assert_eq!(c.data.get("kind").map(String::as_str), Some("leaf"));
    }
}
