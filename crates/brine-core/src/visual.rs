// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Post-run visual classification.
//!
//! Runs once after the saturation loop halts and fills every snapshot's
//! `visual` map. Classification is a pure function of
//! `(phase, diffs, matches, worklist, union-find image)`, so annotating a
//! timeline twice produces identical labels. Replacement is done with
//! structural sharing: the snapshot record is cloned, but its union-find
//! image, class views, and node chunks are shared with the original.
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::diff::{Diff, Phase};
use crate::ident::ENodeId;
use crate::snapshot::{
    ClassStyle, ClassVisual, NodeStyle, NodeVisual, Snapshot, VisualStates,
};

/// Fills `visual` on every snapshot in place.
pub(crate) fn annotate_timeline(states: &mut [Arc<Snapshot>]) {
    for slot in states {
        let visual = classify(slot);
        Arc::make_mut(slot).visual = visual;
    }
}

/// Computes the classification maps for one snapshot.
pub(crate) fn classify(snapshot: &Snapshot) -> VisualStates {
    let uf = &snapshot.union_find;
    let phase = snapshot.phase;
    let active = snapshot.metadata.active_id;

    let matched: BTreeSet<ENodeId> = if matches!(phase, Phase::Read | Phase::ReadBatch | Phase::Write)
    {
        snapshot
            .metadata
            .matches
            .iter()
            .flat_map(|m| m.matched_nodes.iter().copied())
            .collect()
    } else {
        BTreeSet::new()
    };

    let created: BTreeSet<ENodeId> = if phase == Phase::Write {
        snapshot
            .metadata
            .diffs
            .iter()
            .filter_map(|d| match d {
                Diff::Add { id, .. } => Some(*id),
                Diff::Rewrite { created, .. } => Some(*created),
                Diff::Merge { .. } => None,
            })
            .collect()
    } else {
        BTreeSet::new()
    };

    let slot = |id: ENodeId| uf.get(id.index());
    let canonical_of = |id: ENodeId| slot(id).map_or(id, |s| s.canonical);

    let mut visual = VisualStates::default();
    for class in &snapshot.eclasses {
        let class_id = class.view.id;
        let is_canonical = slot(class_id).is_some_and(|s| s.is_canonical);

        let class_style = if phase == Phase::Compact && !is_canonical {
            ClassStyle::Merged
        } else if matches!(phase, Phase::Compact | Phase::Repair) && active == Some(class_id) {
            ClassStyle::Active
        } else if class.in_worklist {
            ClassStyle::InWorklist
        } else {
            ClassStyle::Default
        };
        visual.classes.insert(
            class_id,
            ClassVisual {
                style: class_style,
                is_canonical,
            },
        );

        for node in &class.view.nodes {
            let style = if phase == Phase::Repair
                && active.is_some()
                && node.args.iter().any(|&a| Some(canonical_of(a)) == active)
            {
                NodeStyle::ParentNode
            } else if phase == Phase::Compact
                && node
                    .args
                    .iter()
                    .any(|&a| slot(a).is_some_and(|s| !s.is_canonical))
            {
                NodeStyle::NonCanonical
            } else if phase == Phase::Write && created.contains(&node.id) {
                NodeStyle::NewNode
            } else if matches!(phase, Phase::Read | Phase::ReadBatch | Phase::Write)
                && matched.contains(&node.id)
            {
                NodeStyle::MatchedLhs
            } else {
                NodeStyle::Default
            };
            let port_targets = node.args.iter().map(|&a| canonical_of(a)).collect();
            visual.nodes.insert(
                node.id,
                NodeVisual {
                    style,
                    port_targets,
                },
            );
        }
    }
    visual
}
