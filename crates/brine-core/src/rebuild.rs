// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rebuild: compaction of non-canonical classes, then congruence repair.
//!
//! Compaction and repair are strictly sequential: compaction only deletes
//! class-map entries (ghosts left behind by deferred merges), repair only
//! regroups parents of worklist classes. Inner merges during repair always
//! delete their loser immediately, so the compaction front never regrows
//! while the worklist drains; each inner merge strictly decreases the number
//! of canonical classes, which bounds the loop.
use std::collections::BTreeMap;

use crate::eclass::ParentEntry;
use crate::enode::ENode;
use crate::error::EngineError;
use crate::ident::{EClassId, ENodeId};
use crate::runtime::Runtime;

/// Sorted ids of non-canonical entries still present in the class map.
pub(crate) fn compaction_front(rt: &Runtime) -> Vec<EClassId> {
    rt.classes()
        .keys()
        .copied()
        .filter(|&id| matches!(rt.uf().is_canonical(id), Ok(false)))
        .collect()
}

/// Absorbs one non-canonical class into its canonical survivor and deletes
/// it. Returns the survivor (the snapshot's `active_id`).
pub(crate) fn compact_class(rt: &mut Runtime, id: EClassId) -> Result<EClassId, EngineError> {
    let survivor_id = rt.uf_mut().find(id)?;
    let Some(dead) = rt.remove_class(id) else {
        return Err(EngineError::InvariantViolation(
            "compaction target missing from class map",
        ));
    };
    let moved: Vec<ENodeId> = dead.nodes.iter().copied().collect();
    {
        let Some(survivor) = rt.class_mut(survivor_id) else {
            return Err(EngineError::InvariantViolation(
                "compaction survivor missing from class map",
            ));
        };
        survivor.nodes.extend(dead.nodes.iter().copied());
        survivor
            .parents
            .extend(dead.parents.iter().map(|(k, v)| (*k, v.clone())));
        survivor.absorb_data(dead.data);
        survivor.touch();
    }
    for node_id in moved {
        let Some(stored) = rt.node(node_id).cloned() else {
            return Err(EngineError::InvariantViolation(
                "class member missing from node registry",
            ));
        };
        rt.hashcons_insert(stored, survivor_id);
    }
    Ok(survivor_id)
}

/// Repairs congruence around one worklist entry.
///
/// Re-canonicalizes every parent node of the class, groups parents by their
/// new canonical key, merges each group into its first member, and re-keys
/// the hashcons. Returns the canonical class that was repaired (the
/// snapshot's `active_id`).
pub(crate) fn repair_class(rt: &mut Runtime, id: EClassId) -> Result<EClassId, EngineError> {
    let target = rt.uf_mut().find(id)?;
    let parents: Vec<(ENodeId, ParentEntry)> = match rt.class(target) {
        Some(class) => class.parents.iter().map(|(k, v)| (*k, v.clone())).collect(),
        None => {
            return Err(EngineError::InvariantViolation(
                "repair target missing from class map",
            ))
        }
    };

    // Group parent nodes by their re-canonicalized shape. Within a group the
    // members keep parent-node-id order, so the leader choice is stable.
    let mut groups: BTreeMap<ENode, Vec<(ENodeId, EClassId, ENode)>> = BTreeMap::new();
    for (node_id, entry) in parents {
        let canon_node = rt.canonicalize(&entry.node)?;
        let parent_class = rt.uf_mut().find(entry.class)?;
        groups
            .entry(canon_node)
            .or_default()
            .push((node_id, parent_class, entry.node));
    }

    let mut updates: Vec<(ENodeId, ParentEntry)> = Vec::new();
    for (canon_node, members) in groups {
        let mut leader = members[0].1;
        for (_, parent_class, _) in members.iter().skip(1) {
            // Inner merges delete their loser immediately and enqueue the
            // winner, so congruence propagates transitively.
            leader = rt.merge_with_mode(leader, *parent_class, true)?;
        }
        let leader = rt.uf_mut().find(leader)?;
        for (_, _, old) in &members {
            if *old != canon_node {
                rt.hashcons_remove(old);
            }
        }
        rt.hashcons_insert(canon_node.clone(), leader);
        for (node_id, _, _) in &members {
            updates.push((
                *node_id,
                ParentEntry {
                    class: leader,
                    node: canon_node.clone(),
                },
            ));
        }
    }

    // The target itself may have been absorbed by an inner merge (cycles);
    // write the refreshed entries into wherever it lives now.
    let home = rt.uf_mut().find(target)?;
    let Some(class) = rt.class_mut(home) else {
        return Err(EngineError::InvariantViolation(
            "repaired class missing from class map",
        ));
    };
    let mut changed = false;
    for (node_id, entry) in updates {
        let prev = class.parents.insert(node_id, entry.clone());
        changed |= prev.as_ref() != Some(&entry);
    }
    if changed {
        class.touch();
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Strategy;

    fn drain_rebuild(rt: &mut Runtime) {
        for id in compaction_front(rt) {
            compact_class(rt, id).unwrap();
        }
        while let Some(id) = rt.pop_worklist() {
            repair_class(rt, id).unwrap();
        }
    }

    #[test]
    fn congruence_closes_after_leaf_merge() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let b = rt.add_enode(&ENode::leaf("b")).unwrap();
        let fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        let fb = rt.add_enode(&ENode::new("f", vec![b])).unwrap();
        assert_ne!(rt.find(fa).unwrap(), rt.find(fb).unwrap());

        rt.merge(a, b).unwrap();
        drain_rebuild(&mut rt);

        assert_eq!(rt.find(fa).unwrap(), rt.find(fb).unwrap());
        // Ghosts were compacted away.
        assert!(compaction_front(&rt).is_empty());
        assert!(rt.worklist().is_empty());
    }

    #[test]
    fn congruence_propagates_transitively() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let b = rt.add_enode(&ENode::leaf("b")).unwrap();
        let fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        let fb = rt.add_enode(&ENode::new("f", vec![b])).unwrap();
        let gfa = rt.add_enode(&ENode::new("g", vec![fa])).unwrap();
        let gfb = rt.add_enode(&ENode::new("g", vec![fb])).unwrap();

        rt.merge(a, b).unwrap();
        drain_rebuild(&mut rt);

        assert_eq!(rt.find(fa).unwrap(), rt.find(fb).unwrap());
        assert_eq!(rt.find(gfa).unwrap(), rt.find(gfb).unwrap());
    }

    #[test]
    fn repair_tolerates_cycles() {
        let mut rt = Runtime::new(Strategy::Eager, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        // Make a ≡ f(a): the class is now its own parent.
        rt.merge(a, fa).unwrap();
        drain_rebuild(&mut rt);
        assert_eq!(rt.find(fa).unwrap(), rt.find(a).unwrap());
        assert!(rt.worklist().is_empty());
    }

    #[test]
    fn rebuild_on_clean_runtime_is_a_no_op() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let _fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        rt.take_pending();
        drain_rebuild(&mut rt);
        assert!(rt.take_pending().is_empty());
        assert_eq!(rt.num_classes(), 2);
    }
}
