// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rebuild idempotence, snapshot monotonicity, structural
//! sharing, and worklist emptiness on `done`.
mod common;

use std::sync::Arc;

use brine_core::{Diff, Phase};
use common::{deferred, eager, phase_labels, run, mul_one_preset, cascade_preset};

#[test]
fn step_indices_increase_by_exactly_one() {
    let timeline = run(&cascade_preset(), deferred());
    for (k, pair) in timeline.states.windows(2).enumerate() {
        assert_eq!(pair[1].step_index, pair[0].step_index + 1, "at step {k}");
    }
    #[allow(clippy::cast_possible_truncation)]
    let last = (timeline.len() - 1) as u32;
    assert_eq!(timeline.final_snapshot().unwrap().step_index, last);
}

#[test]
fn diffs_reference_ids_present_in_their_snapshot() {
    let timeline = run(&cascade_preset(), deferred());
    for snapshot in &timeline.states {
        let in_range = |id: brine_core::ENodeId| (id.index()) < snapshot.union_find.len();
        for diff in &snapshot.metadata.diffs {
            match diff {
                Diff::Add { id, node } => {
                    assert!(in_range(*id));
                    assert!(node.args.iter().all(|&a| in_range(a)));
                }
                Diff::Merge { winner, loser } => {
                    assert!(in_range(*winner) && in_range(*loser));
                }
                Diff::Rewrite {
                    target,
                    created,
                    merged_into,
                    ..
                } => {
                    assert!(in_range(*target) && in_range(*created) && in_range(*merged_into));
                }
            }
        }
    }
}

#[test]
fn unchanged_node_chunks_are_shared_between_snapshots() {
    let timeline = run(&cascade_preset(), deferred());
    for pair in timeline.states.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        // Every chunk of the previous snapshot except a grown tail must be
        // the same allocation in the next snapshot.
        let shared = prev.node_chunks.chunk_count().saturating_sub(1);
        for i in 0..shared {
            assert!(
                Arc::ptr_eq(
                    prev.node_chunks.chunk(i).unwrap(),
                    next.node_chunks.chunk(i).unwrap()
                ),
                "chunk {i} was cloned between steps {} and {}",
                prev.step_index,
                next.step_index
            );
        }
        if prev.node_chunks.len() == next.node_chunks.len()
            && prev.node_chunks.chunk_count() > 0
        {
            let tail = prev.node_chunks.chunk_count() - 1;
            assert!(Arc::ptr_eq(
                prev.node_chunks.chunk(tail).unwrap(),
                next.node_chunks.chunk(tail).unwrap()
            ));
        }
    }
}

#[test]
fn untouched_class_views_are_shared_between_snapshots() {
    let timeline = run(&cascade_preset(), deferred());
    let mut reused = 0usize;
    for pair in timeline.states.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        for class in &next.eclasses {
            if let Some(prev_class) = prev.class(class.view.id) {
                if prev_class.view == class.view {
                    assert!(
                        Arc::ptr_eq(&prev_class.view, &class.view),
                        "equal view rebuilt for class {} at step {}",
                        class.view.id,
                        next.step_index
                    );
                    reused += 1;
                }
            }
        }
    }
    assert!(reused > 0, "the view cache never fired");
}

#[test]
fn immediate_saturation_skips_rebuild_phases_entirely() {
    // A preset whose only rule never matches: the timeline is exactly
    // init → read → done, with no placeholder compact/repair snapshots.
    let preset = common::preset("quiet", "f(a)", &[("never", "zzz", "zzz")]);
    for options in [eager(), deferred()] {
        let timeline = run(&preset, options);
        assert_eq!(phase_labels(&timeline), ["init", "read", "done"]);
    }
}

#[test]
fn done_snapshot_has_an_empty_worklist_and_no_diffs() {
    for (preset, options) in [(mul_one_preset(), eager()), (cascade_preset(), deferred())] {
        let timeline = run(&preset, options);
        let last = timeline.final_snapshot().unwrap();
        assert_eq!(last.phase, Phase::Done);
        assert!(last.worklist.is_empty());
        assert!(last.metadata.diffs.is_empty());
        // No class is left pending repair.
        assert!(last.eclasses.iter().all(|c| !c.in_worklist));
    }
}

#[test]
fn debug_invariants_are_recorded_and_hold_at_done() {
    let mut options = deferred();
    options.debug_invariants = true;
    let timeline = run(&cascade_preset(), options);
    // Every snapshot carries both checks; mid-run snapshots may record
    // failures while invariants are legitimately broken between a merge and
    // its rebuild, but the terminal snapshot must be clean.
    assert!(timeline
        .states
        .iter()
        .all(|s| s.metadata.invariants.len() == 2));
    let last = timeline.final_snapshot().unwrap();
    assert!(last.metadata.invariants.iter().all(|c| c.ok), "{:?}", last.metadata.invariants);
}
