// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Backtracking pattern matcher over the class map.
//!
//! The scan walks canonical classes in ascending id order and, inside a
//! class, member nodes in ascending id order, so the produced match list is a
//! pure function of the runtime state. Output ordering is fixed by the
//! accumulator key `(rule name, class, substitution)` regardless of scan
//! interleaving, which is what lets read batching change snapshot granularity
//! without changing semantics.
use std::collections::{BTreeMap, BTreeSet};

use crate::ident::{EClassId, ENodeId};
use crate::pattern::Pattern;
use crate::preset::Rewrite;
use crate::runtime::Runtime;

/// One deduplicated `(rule, class, substitution)` tuple.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchRecord {
    /// Name of the rule whose left-hand side matched.
    pub rule: String,
    /// Canonical id of the matched class.
    pub class: EClassId,
    /// Variable bindings, sorted by variable name.
    pub subst: Vec<(String, ENodeId)>,
    /// Ids of the nodes structurally consumed by the left-hand side.
    pub matched_nodes: Vec<ENodeId>,
}

/// Dedup key for matches: rule name, class, sorted bindings.
pub(crate) type MatchKey = (String, EClassId, Vec<(String, ENodeId)>);

pub(crate) fn match_key(m: &MatchRecord) -> MatchKey {
    (m.rule.clone(), m.class, m.subst.clone())
}

/// Restartable scan over the canonical classes.
///
/// `advance` consumes up to a batch of classes per call and accumulates
/// matches; the driver emits one read snapshot per call. Matches already
/// applied earlier in the run (`seen`) are filtered out so that the final
/// list is the set of *fresh* matches — the saturation signal.
#[derive(Debug)]
pub(crate) struct MatchScan {
    class_ids: Vec<EClassId>,
    cursor: usize,
    acc: BTreeMap<MatchKey, MatchRecord>,
}

impl MatchScan {
    /// Captures the canonical class ids to scan, in ascending order.
    pub(crate) fn new(rt: &Runtime) -> Self {
        Self {
            class_ids: rt.canonical_class_ids(),
            cursor: 0,
            acc: BTreeMap::new(),
        }
    }

    /// Scans up to `batch` further classes. Returns `true` once every class
    /// has been scanned.
    pub(crate) fn advance(
        &mut self,
        rt: &Runtime,
        rules: &[Rewrite],
        seen: &BTreeSet<MatchKey>,
        batch: usize,
    ) -> bool {
        let end = self.cursor.saturating_add(batch).min(self.class_ids.len());
        while self.cursor < end {
            let class = self.class_ids[self.cursor];
            self.cursor += 1;
            for rule in rules {
                for candidate in match_rule_in_class(rt, rule, class) {
                    let record = MatchRecord {
                        rule: rule.name.clone(),
                        class,
                        subst: candidate.subst.into_iter().collect(),
                        matched_nodes: candidate.nodes.into_iter().collect(),
                    };
                    let key = match_key(&record);
                    if seen.contains(&key) {
                        continue;
                    }
                    self.acc.entry(key).or_insert(record);
                }
            }
        }
        self.cursor >= self.class_ids.len()
    }

    /// The matches accumulated so far, in stable order.
    pub(crate) fn matches(&self) -> Vec<MatchRecord> {
        self.acc.values().cloned().collect()
    }

    /// Consumes the scan, yielding the final match list.
    pub(crate) fn into_matches(self) -> Vec<MatchRecord> {
        self.acc.into_values().collect()
    }
}

#[derive(Clone, Debug, Default)]
struct Candidate {
    subst: BTreeMap<String, ENodeId>,
    nodes: BTreeSet<ENodeId>,
}

/// Matches one rule's left-hand side against one canonical class.
fn match_rule_in_class(rt: &Runtime, rule: &Rewrite, class: EClassId) -> Vec<Candidate> {
    match_pattern(rt, &rule.lhs, class, Candidate::default())
}

fn match_pattern(
    rt: &Runtime,
    pattern: &Pattern,
    class: EClassId,
    candidate: Candidate,
) -> Vec<Candidate> {
    match pattern {
        Pattern::Var(name) => match candidate.subst.get(name) {
            Some(&bound) if bound != class => Vec::new(),
            Some(_) => vec![candidate],
            None => {
                let mut next = candidate;
                next.subst.insert(name.clone(), class);
                vec![next]
            }
        },
        Pattern::Literal(op) => {
            let Some(eclass) = rt.class(class) else {
                return Vec::new();
            };
            let leaves: Vec<ENodeId> = eclass
                .nodes
                .iter()
                .copied()
                .filter(|&id| rt.node(id).is_some_and(|n| n.is_leaf() && n.op == *op))
                .collect();
            if leaves.is_empty() {
                return Vec::new();
            }
            let mut next = candidate;
            next.nodes.extend(leaves);
            vec![next]
        }
        Pattern::Pinned(id) => match rt.find(*id) {
            Ok(canon) if canon == class => vec![candidate],
            // Pins to unallocated or foreign ids simply fail to match.
            _ => Vec::new(),
        },
        Pattern::App { op, args } => {
            let Some(eclass) = rt.class(class) else {
                return Vec::new();
            };
            let mut results = Vec::new();
            for &node_id in &eclass.nodes {
                let Some(node) = rt.node(node_id) else {
                    continue;
                };
                if node.op != *op || node.args.len() != args.len() {
                    continue;
                }
                let mut seed = candidate.clone();
                seed.nodes.insert(node_id);
                let mut branch = vec![seed];
                for (sub_pattern, &arg) in args.iter().zip(&node.args) {
                    let Ok(child) = rt.find(arg) else {
                        branch.clear();
                        break;
                    };
                    let mut narrowed = Vec::new();
                    for c in branch {
                        narrowed.extend(match_pattern(rt, sub_pattern, child, c));
                    }
                    branch = narrowed;
                    if branch.is_empty() {
                        break;
                    }
                }
                results.extend(branch);
            }
            results
        }
    }
}
