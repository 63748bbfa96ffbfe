// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Visual classifications follow the documented priority ladders.
mod common;

use brine_core::{ClassStyle, NodeStyle, Phase, Snapshot};
use common::{deferred, eager, run, mul_one_preset, cascade_preset};

fn node_style(snapshot: &Snapshot, id: brine_core::ENodeId) -> NodeStyle {
    snapshot
        .visual
        .nodes
        .get(&id)
        .map(|v| v.style)
        .unwrap_or_default()
}

#[test]
fn every_snapshot_is_fully_annotated() {
    let timeline = run(&cascade_preset(), deferred());
    for snapshot in &timeline.states {
        for class in &snapshot.eclasses {
            assert!(
                snapshot.visual.classes.contains_key(&class.view.id),
                "class {} missing at step {}",
                class.view.id,
                snapshot.step_index
            );
            for node in &class.view.nodes {
                let visual = snapshot
                    .visual
                    .nodes
                    .get(&node.id)
                    .unwrap_or_else(|| panic!("node {} missing visual", node.id));
                assert_eq!(visual.port_targets.len(), node.args.len());
                for (&arg, &target) in node.args.iter().zip(&visual.port_targets) {
                    assert_eq!(snapshot.canonical_of(arg), Some(target));
                }
            }
        }
    }
}

#[test]
fn read_and_write_phases_mark_matched_lhs_nodes() {
    let timeline = run(&mul_one_preset(), eager());
    let read = timeline
        .states
        .iter()
        .find(|s| s.phase == Phase::Read && !s.metadata.matches.is_empty())
        .expect("a read snapshot with matches");
    for m in &read.metadata.matches {
        for &node in &m.matched_nodes {
            assert_eq!(node_style(read, node), NodeStyle::MatchedLhs);
        }
    }
}

#[test]
fn write_phase_prefers_new_node_over_matched_lhs() {
    let timeline = run(&mul_one_preset(), eager());
    let write = timeline
        .states
        .iter()
        .find(|s| s.phase == Phase::Write)
        .expect("a write snapshot");
    let created: Vec<_> = write
        .metadata
        .diffs
        .iter()
        .filter_map(|d| match d {
            brine_core::Diff::Add { id, .. } => Some(*id),
            brine_core::Diff::Rewrite { created, .. } => Some(*created),
            brine_core::Diff::Merge { .. } => None,
        })
        .collect();
    assert!(!created.is_empty());
    for id in created {
        assert_eq!(node_style(write, id), NodeStyle::NewNode);
    }
}

#[test]
fn repair_phase_marks_the_active_class_and_its_parents() {
    let timeline = run(&mul_one_preset(), eager());
    let repair = timeline
        .states
        .iter()
        .find(|s| s.phase == Phase::Repair)
        .expect("a repair snapshot");
    let active = repair.metadata.active_id.expect("repair carries active_id");
    let class_visual = repair.visual.classes.get(&active).unwrap();
    assert_eq!(class_visual.style, ClassStyle::Active);

    // Any node whose canonicalized args reference the active class is a
    // parent node.
    for class in &repair.eclasses {
        for node in &class.view.nodes {
            let references_active = node
                .args
                .iter()
                .any(|&a| repair.canonical_of(a) == Some(active));
            if references_active {
                assert_eq!(node_style(repair, node.id), NodeStyle::ParentNode);
            }
        }
    }
}

#[test]
fn compact_phase_marks_ghosts_and_non_canonical_references() {
    let timeline = run(&cascade_preset(), deferred());
    let compacts: Vec<_> = timeline
        .states
        .iter()
        .filter(|s| s.phase == Phase::Compact)
        .collect();
    assert!(compacts.len() >= 2, "the cascade preset leaves two ghosts behind");

    // The first compaction snapshot still shows the remaining ghost.
    let first = compacts[0];
    let ghost = first
        .eclasses
        .iter()
        .find(|c| {
            !first
                .union_find
                .get(c.view.id.index())
                .is_some_and(|s| s.is_canonical)
        })
        .expect("a ghost remains mid-compaction");
    assert_eq!(
        first.visual.classes.get(&ghost.view.id).unwrap().style,
        ClassStyle::Merged
    );
    assert!(!first.visual.classes.get(&ghost.view.id).unwrap().is_canonical);

    // Nodes still pointing at merged-away ids are flagged.
    let flagged = first.eclasses.iter().flat_map(|c| &c.view.nodes).any(|n| {
        n.args.iter().any(|&a| {
            !first
                .union_find
                .get(a.index())
                .is_some_and(|s| s.is_canonical)
        }) && node_style(first, n.id) == NodeStyle::NonCanonical
    });
    assert!(flagged, "no NonCanonical node in the compact snapshot");
}

#[test]
fn worklist_membership_shows_as_in_worklist_outside_active_phases() {
    let timeline = run(&cascade_preset(), deferred());
    let write = timeline
        .states
        .iter()
        .find(|s| s.phase == Phase::Write)
        .expect("a write snapshot");
    let pending: Vec<_> = write.worklist.iter().copied().collect();
    assert!(!pending.is_empty());
    for id in pending {
        assert_eq!(
            write.visual.classes.get(&id).unwrap().style,
            ClassStyle::InWorklist
        );
    }
}

#[test]
fn annotation_is_a_pure_function_of_the_snapshot() {
    let a = run(&cascade_preset(), deferred());
    let b = run(&cascade_preset(), deferred());
    for (sa, sb) in a.states.iter().zip(&b.states) {
        assert_eq!(sa.visual, sb.visual, "step {}", sa.step_index);
    }
}
