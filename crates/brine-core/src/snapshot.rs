// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Immutable snapshots with structural sharing, and the snapshotter that
//! builds them from the runtime.
//!
//! Determinism contract
//! - A snapshot's digest is a BLAKE3 hash over a canonical little-endian byte
//!   stream of its observable state: union-find image, sorted class views,
//!   worklist, diffs, matches, and the active id. The `timestamp_micros`
//!   field, visual states (a pure function of the rest), and consumer-owned
//!   layout are excluded.
//! - All view lists are sorted: classes by id, nodes by `(op, id)`, parents
//!   by `(class, op)`, worklists ascending.
//! - Changing any of this encoding is a breaking change to snapshot identity
//!   and must be reflected in the digest golden-vector tests.
use std::collections::BTreeMap;
use std::sync::Arc;

use blake3::Hasher;
use rustc_hash::FxHashMap;

use crate::diff::{Diff, Phase, Strategy};
use crate::enode::NodeChunks;
use crate::ident::{EClassId, ENodeId};
use crate::invariants::{check_hashcons, check_parent_closure, InvariantCheck};
use crate::matcher::MatchRecord;
use crate::runtime::Runtime;

/// Per-id union-find image entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UfSlot {
    /// Canonical representative of this id at snapshot time.
    pub canonical: ENodeId,
    /// Whether this id is its own representative.
    pub is_canonical: bool,
}

/// One e-node as shown in a class view.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeView {
    /// Node id.
    pub id: ENodeId,
    /// Operator symbol.
    pub op: String,
    /// Child ids as stored (canonical at storage time; resolve through the
    /// snapshot's union-find image for current canonicals).
    pub args: Vec<ENodeId>,
}

/// One parent reference as shown in a class view.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParentView {
    /// Class id of the parent at index time (may be stale between rebuilds).
    pub class: EClassId,
    /// Operator of the referencing node.
    pub op: String,
}

/// Immutable view of one e-class.
///
/// Cached by `(class id, version)` in the snapshotter and shared by reference
/// across consecutive snapshots while the class is untouched.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EClassView {
    /// Class id (non-canonical for deferred-mode ghosts).
    pub id: EClassId,
    /// Member nodes sorted by `(op, id)` to keep consumer ordering stable.
    pub nodes: Vec<NodeView>,
    /// Deduplicated parent references sorted by `(class, op)`.
    pub parents: Vec<ParentView>,
}

/// A class view plus its per-snapshot worklist membership.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassSnapshot {
    /// The shared view object.
    pub view: Arc<EClassView>,
    /// Whether this class is pending congruence repair.
    pub in_worklist: bool,
}

/// Visual style for a node, assigned by the post-run classification pass.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum NodeStyle {
    /// No special classification.
    #[default]
    Default,
    /// Part of a left-hand-side match in a read or write phase.
    MatchedLhs,
    /// Created by an `Add`/`Rewrite` diff in a write phase.
    NewNode,
    /// Has a non-canonical argument during compaction.
    NonCanonical,
    /// References the class being repaired.
    ParentNode,
}

/// Visual style for a class, assigned by the post-run classification pass.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ClassStyle {
    /// No special classification.
    #[default]
    Default,
    /// The class currently being compacted or repaired.
    Active,
    /// Pending congruence repair.
    InWorklist,
    /// A non-canonical ghost shown during compaction.
    Merged,
}

/// Visual classification of one node.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeVisual {
    /// Style label.
    pub style: NodeStyle,
    /// Canonical target of each argument, aligned with the node's args.
    pub port_targets: Vec<ENodeId>,
}

/// Visual classification of one class.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassVisual {
    /// Style label.
    pub style: ClassStyle,
    /// Whether the class id is canonical in this snapshot.
    pub is_canonical: bool,
}

/// Node and class classifications for one snapshot.
///
/// Empty during a run; filled by the visualizer before the timeline is
/// released. Labels only — they impose no rendering commitments.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisualStates {
    /// Per-node classification.
    pub nodes: BTreeMap<ENodeId, NodeVisual>,
    /// Per-class classification.
    pub classes: BTreeMap<EClassId, ClassVisual>,
}

/// A 2-D position supplied by an external layout collaborator.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Optional layout annotation. The core never reads this.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Layout {
    /// Node positions keyed by id.
    pub positions: BTreeMap<ENodeId, Position>,
}

/// Diffs, matches, and bookkeeping accumulated since the previous snapshot.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotMetadata {
    /// State transitions since the previous snapshot.
    pub diffs: Vec<Diff>,
    /// Pattern matches discovered this phase (reads carry the accumulated
    /// fresh list; writes carry the single applied match).
    pub matches: Vec<MatchRecord>,
    /// The class being processed in compact/repair phases.
    pub active_id: Option<EClassId>,
    /// Invariant verification results (populated under `debug_invariants`).
    pub invariants: Vec<InvariantCheck>,
    /// Free-text note (e.g. why a run halted early).
    pub note: Option<String>,
}

/// Immutable view of the runtime after one logical sub-step.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Position in the timeline, starting at 0.
    pub step_index: u32,
    /// Globally unique id: `"{preset}:{step:04}"`.
    pub id: String,
    /// Owning preset id.
    pub preset_id: String,
    /// Strategy tag of the run.
    pub strategy: Strategy,
    /// Phase that produced this snapshot.
    pub phase: Phase,
    /// Wall-clock micros at emission (zeroed under an injected test clock);
    /// excluded from the digest.
    pub timestamp_micros: u64,
    /// Union-find image for ids `0..len`.
    pub union_find: Arc<Vec<UfSlot>>,
    /// Class views sorted by class id.
    pub eclasses: Vec<ClassSnapshot>,
    /// Every node ever allocated; unchanged chunks are shared by reference
    /// with neighboring snapshots.
    pub node_chunks: NodeChunks,
    /// Sorted ids pending congruence repair.
    pub worklist: Arc<Vec<ENodeId>>,
    /// Diffs and matches accumulated since the previous snapshot.
    pub metadata: SnapshotMetadata,
    /// Visual classification, filled after the run.
    pub visual: VisualStates,
    /// Consumer-owned layout annotation; never serialized.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub layout: Option<Layout>,
}

impl Snapshot {
    /// Canonical representative of `id` in this snapshot, if allocated.
    #[must_use]
    pub fn canonical_of(&self, id: ENodeId) -> Option<ENodeId> {
        self.union_find.get(id.index()).map(|s| s.canonical)
    }

    /// Looks up the class view with the given id.
    #[must_use]
    pub fn class(&self, id: EClassId) -> Option<&ClassSnapshot> {
        self.eclasses
            .binary_search_by_key(&id, |c| c.view.id)
            .ok()
            .map(|i| &self.eclasses[i])
    }

    /// BLAKE3 digest over the snapshot's observable state.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(b"brine:snapshot:v1");
        h.update(&self.step_index.to_le_bytes());
        h.update(&[self.phase.tag(), self.strategy.tag()]);
        hash_str(&mut h, &self.preset_id);

        h.update(&(self.union_find.len() as u64).to_le_bytes());
        for slot in self.union_find.iter() {
            h.update(&slot.canonical.0.to_le_bytes());
            h.update(&[u8::from(slot.is_canonical)]);
        }

        h.update(&(self.eclasses.len() as u64).to_le_bytes());
        for class in &self.eclasses {
            h.update(&class.view.id.0.to_le_bytes());
            h.update(&[u8::from(class.in_worklist)]);
            h.update(&(class.view.nodes.len() as u64).to_le_bytes());
            for node in &class.view.nodes {
                h.update(&node.id.0.to_le_bytes());
                hash_str(&mut h, &node.op);
                hash_ids(&mut h, &node.args);
            }
            h.update(&(class.view.parents.len() as u64).to_le_bytes());
            for parent in &class.view.parents {
                h.update(&parent.class.0.to_le_bytes());
                hash_str(&mut h, &parent.op);
            }
        }

        hash_ids(&mut h, &self.worklist);

        h.update(&(self.metadata.diffs.len() as u64).to_le_bytes());
        for diff in &self.metadata.diffs {
            match diff {
                Diff::Add { id, node } => {
                    h.update(&[0u8]);
                    h.update(&id.0.to_le_bytes());
                    hash_str(&mut h, &node.op);
                    hash_ids(&mut h, &node.args);
                }
                Diff::Merge { winner, loser } => {
                    h.update(&[1u8]);
                    h.update(&winner.0.to_le_bytes());
                    h.update(&loser.0.to_le_bytes());
                }
                Diff::Rewrite {
                    rule,
                    target,
                    created,
                    merged_into,
                } => {
                    h.update(&[2u8]);
                    hash_str(&mut h, rule);
                    h.update(&target.0.to_le_bytes());
                    h.update(&created.0.to_le_bytes());
                    h.update(&merged_into.0.to_le_bytes());
                }
            }
        }

        h.update(&(self.metadata.matches.len() as u64).to_le_bytes());
        for m in &self.metadata.matches {
            hash_str(&mut h, &m.rule);
            h.update(&m.class.0.to_le_bytes());
            h.update(&(m.subst.len() as u64).to_le_bytes());
            for (var, id) in &m.subst {
                hash_str(&mut h, var);
                h.update(&id.0.to_le_bytes());
            }
            hash_ids(&mut h, &m.matched_nodes);
        }

        match self.metadata.active_id {
            None => h.update(&[0u8]),
            Some(id) => {
                h.update(&[1u8]);
                h.update(&id.0.to_le_bytes())
            }
        };
        match &self.metadata.note {
            None => {
                h.update(&[0u8]);
            }
            Some(note) => {
                h.update(&[1u8]);
                hash_str(&mut h, note);
            }
        }

        h.finalize().into()
    }

    /// The digest as a lowercase hex string.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

fn hash_str(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

fn hash_ids(h: &mut Hasher, ids: &[ENodeId]) {
    h.update(&(ids.len() as u64).to_le_bytes());
    for id in ids {
        h.update(&id.0.to_le_bytes());
    }
}

/// Everything the snapshotter needs beyond the runtime for one emission.
pub(crate) struct EmitContext {
    pub step_index: u32,
    pub preset_id: String,
    pub strategy: Strategy,
    pub phase: Phase,
    pub matches: Vec<MatchRecord>,
    pub active_id: Option<EClassId>,
    pub note: Option<String>,
    pub timestamp_micros: u64,
    pub debug_invariants: bool,
}

/// Converts the mutable runtime into immutable snapshots, reusing every view
/// whose source is unchanged.
#[derive(Debug, Default)]
pub(crate) struct Snapshotter {
    view_cache: FxHashMap<EClassId, (u64, Arc<EClassView>)>,
    last_union_find: Option<Arc<Vec<UfSlot>>>,
}

impl Snapshotter {
    /// Drops all cached views (on preset load).
    pub(crate) fn reset(&mut self) {
        self.view_cache.clear();
        self.last_union_find = None;
    }

    /// Builds the next snapshot and drains the runtime's pending diffs.
    pub(crate) fn emit(&mut self, rt: &mut Runtime, ctx: EmitContext) -> Snapshot {
        let union_find = self.union_find_image(rt);
        let eclasses = self.class_views(rt);
        let worklist: Arc<Vec<ENodeId>> = Arc::new(rt.worklist().iter().copied().collect());
        let diffs = rt.take_pending();
        let invariants = if ctx.debug_invariants {
            vec![check_hashcons(rt), check_parent_closure(rt)]
        } else {
            Vec::new()
        };

        Snapshot {
            step_index: ctx.step_index,
            id: format!("{}:{:04}", ctx.preset_id, ctx.step_index),
            preset_id: ctx.preset_id,
            strategy: ctx.strategy,
            phase: ctx.phase,
            timestamp_micros: ctx.timestamp_micros,
            union_find,
            eclasses,
            node_chunks: rt.nodes().clone(),
            worklist,
            metadata: SnapshotMetadata {
                diffs,
                matches: ctx.matches,
                active_id: ctx.active_id,
                invariants,
                note: ctx.note,
            },
            visual: VisualStates::default(),
            layout: None,
        }
    }

    fn union_find_image(&mut self, rt: &Runtime) -> Arc<Vec<UfSlot>> {
        let mut slots = Vec::with_capacity(rt.num_ids());
        for i in 0..rt.num_ids() {
            #[allow(clippy::cast_possible_truncation)]
            let id = ENodeId(i as u32);
            // Ids below num_ids are always allocated.
            let canonical = rt.find(id).unwrap_or(id);
            slots.push(UfSlot {
                canonical,
                is_canonical: canonical == id,
            });
        }
        if let Some(prev) = &self.last_union_find {
            if prev.as_slice() == slots.as_slice() {
                return Arc::clone(prev);
            }
        }
        let arc = Arc::new(slots);
        self.last_union_find = Some(Arc::clone(&arc));
        arc
    }

    fn class_views(&mut self, rt: &Runtime) -> Vec<ClassSnapshot> {
        // Drop cache entries for classes deleted since the last emission.
        self.view_cache.retain(|id, _| rt.class(*id).is_some());

        let mut out = Vec::with_capacity(rt.num_classes());
        for (&id, class) in rt.classes() {
            let cached = self
                .view_cache
                .get(&id)
                .filter(|(version, _)| *version == class.version)
                .map(|(_, view)| Arc::clone(view));
            let view = match cached {
                Some(view) => view,
                None => {
                    let view = Arc::new(build_class_view(rt, id));
                    self.view_cache
                        .insert(id, (class.version, Arc::clone(&view)));
                    view
                }
            };
            out.push(ClassSnapshot {
                view,
                in_worklist: rt.worklist().contains(&id),
            });
        }
        out
    }
}

fn build_class_view(rt: &Runtime, id: EClassId) -> EClassView {
    let Some(class) = rt.class(id) else {
        return EClassView {
            id,
            nodes: Vec::new(),
            parents: Vec::new(),
        };
    };
    let mut nodes: Vec<NodeView> = class
        .nodes
        .iter()
        .filter_map(|&node_id| {
            rt.node(node_id).map(|n| NodeView {
                id: node_id,
                op: n.op.clone(),
                args: n.args.clone(),
            })
        })
        .collect();
    nodes.sort_by(|a, b| a.op.cmp(&b.op).then(a.id.cmp(&b.id)));

    let parents: std::collections::BTreeSet<ParentView> = class
        .parents
        .values()
        .map(|entry| ParentView {
            class: entry.class,
            op: entry.node.op.clone(),
        })
        .collect();

    EClassView {
        id,
        nodes,
        parents: parents.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enode::ENode;

    fn ctx(step: u32, phase: Phase) -> EmitContext {
        EmitContext {
            step_index: step,
            preset_id: "test".into(),
            strategy: Strategy::Deferred,
            phase,
            matches: Vec::new(),
            active_id: None,
            note: None,
            timestamp_micros: 0,
            debug_invariants: false,
        }
    }

    #[test]
    fn unchanged_class_views_are_shared_by_reference() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let _fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        let mut snapper = Snapshotter::default();
        let s0 = snapper.emit(&mut rt, ctx(0, Phase::Init));
        // Nothing changed; every view must be reused.
        let s1 = snapper.emit(&mut rt, ctx(1, Phase::Read));
        for (c0, c1) in s0.eclasses.iter().zip(&s1.eclasses) {
            assert!(Arc::ptr_eq(&c0.view, &c1.view));
        }
        assert!(Arc::ptr_eq(&s0.union_find, &s1.union_find));
    }

    #[test]
    fn touched_classes_get_fresh_views() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let b = rt.add_enode(&ENode::leaf("b")).unwrap();
        let mut snapper = Snapshotter::default();
        let s0 = snapper.emit(&mut rt, ctx(0, Phase::Init));
        rt.merge(a, b).unwrap();
        let s1 = snapper.emit(&mut rt, ctx(1, Phase::Write));
        let v0 = &s0.class(a).unwrap().view;
        let v1 = &s1.class(a).unwrap().view;
        assert!(!Arc::ptr_eq(v0, v1));
        assert_eq!(v1.nodes.len(), 2);
        assert!(s1.class(a).unwrap().in_worklist);
    }

    #[test]
    fn digest_ignores_timestamp() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let _a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let mut snapper = Snapshotter::default();
        let s0 = snapper.emit(&mut rt, ctx(0, Phase::Init));
        let mut stamped = s0.clone();
        stamped.timestamp_micros = 123_456;
        assert_eq!(s0.digest(), stamped.digest());
        assert_ne!(s0.digest(), [0u8; 32]);
    }

    #[test]
    fn digest_covers_structure_not_presentation() {
        let mut rt = Runtime::new(Strategy::Eager, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let one = rt.add_enode(&ENode::leaf("1")).unwrap();
        let _mul = rt.add_enode(&ENode::new("*", vec![a, one])).unwrap();
        let mut snapper = Snapshotter::default();
        let snap = snapper.emit(&mut rt, ctx(0, Phase::Init));
        assert_eq!(snap.digest_hex().len(), 64);

        // The phase tag is part of snapshot identity.
        let mut other = snap.clone();
        other.phase = Phase::Read;
        assert_ne!(snap.digest(), other.digest());

        // Visual annotations are derived data and never shift identity.
        let mut annotated = snap.clone();
        annotated.visual = crate::visual::classify(&snap);
        assert_eq!(snap.digest(), annotated.digest());
    }
}
