// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Round-trip law: serializing a completed timeline and reloading it
//! reproduces the same snapshot sequence (modulo timestamps; layout is
//! consumer-owned and never persisted).
#![cfg(feature = "serde")]
mod common;

use brine_core::{Layout, Position, Timeline};
use common::{deferred, eager, run, mul_one_preset, cascade_preset};

#[test]
fn cbor_round_trip_reproduces_the_timeline() {
    for (preset, options) in [(mul_one_preset(), eager()), (cascade_preset(), deferred())] {
        let timeline = run(&preset, options);
        let bytes = timeline.to_cbor().expect("encode");
        let back = Timeline::from_cbor(&bytes).expect("decode");
        assert_eq!(back.digest(), timeline.digest());
        assert_eq!(back.preset_id, timeline.preset_id);
        assert_eq!(back.halted_reason, timeline.halted_reason);
        assert_eq!(back.len(), timeline.len());
        for (a, b) in timeline.states.iter().zip(&back.states) {
            assert_eq!(a.as_ref(), b.as_ref());
        }
    }
}

#[test]
fn layout_annotations_are_not_persisted() {
    let timeline = run(&mul_one_preset(), eager());
    let mut annotated = timeline.clone();
    // A consumer attaches positions to the final snapshot.
    let mut positions = std::collections::BTreeMap::new();
    positions.insert(brine_core::ENodeId(0), Position { x: 1.0, y: 2.0 });
    let last = annotated.states.last_mut().expect("non-empty timeline");
    std::sync::Arc::make_mut(last).layout = Some(Layout { positions });

    let bytes = annotated.to_cbor().expect("encode");
    let back = Timeline::from_cbor(&bytes).expect("decode");
    assert!(back.final_snapshot().unwrap().layout.is_none());
    // Stripping layout does not change identity.
    assert_eq!(back.digest(), timeline.digest());
}

#[test]
fn decode_rejects_garbage() {
    assert!(Timeline::from_cbor(&[0xFF, 0x00, 0x13, 0x37]).is_err());
}
