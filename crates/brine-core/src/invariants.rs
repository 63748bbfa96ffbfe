// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Debug-mode verification of the hashcons and parent-closure invariants.
//!
//! These checks hold after a rebuild and are legitimately violated in the
//! window between a merge and the repair that follows it; results are
//! recorded, not raised, so a timeline can show exactly where an invariant
//! breaks and where it is restored.
use std::collections::BTreeSet;

use crate::runtime::Runtime;

/// Result of one invariant verification.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InvariantCheck {
    /// Stable invariant name.
    pub name: String,
    /// Whether the invariant held at snapshot time.
    pub ok: bool,
    /// First offending key, when it did not hold.
    pub detail: Option<String>,
}

impl InvariantCheck {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ok: true,
            detail: None,
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            name: name.to_owned(),
            ok: false,
            detail: Some(detail),
        }
    }
}

/// Hashcons agreement: every canonical node's key maps to its class's
/// canonical id.
pub(crate) fn check_hashcons(rt: &Runtime) -> InvariantCheck {
    const NAME: &str = "hashcons-agreement";
    // Offenders collected into a sorted set so the reported key does not
    // depend on map iteration order.
    let mut offenders: BTreeSet<String> = BTreeSet::new();
    let mut canonical_keys: BTreeSet<String> = BTreeSet::new();
    for (&class_id, class) in rt.classes() {
        if !matches!(rt.uf().is_canonical(class_id), Ok(true)) {
            continue;
        }
        for &node_id in &class.nodes {
            let Some(stored) = rt.node(node_id) else {
                offenders.insert(format!("missing-node:{node_id}"));
                continue;
            };
            let Ok(canon) = rt.canonicalize(stored) else {
                offenders.insert(format!("unresolvable-node:{node_id}"));
                continue;
            };
            let key = canon.key();
            match rt.hashcons_get(&canon) {
                Some(owner) if matches!(rt.find(owner), Ok(c) if c == class_id) => {}
                Some(_) => {
                    offenders.insert(format!("misowned:{key}"));
                }
                None => {
                    offenders.insert(format!("missing:{key}"));
                }
            }
            canonical_keys.insert(key);
        }
    }
    // The reverse direction: no hashcons entry may outlive its node.
    if rt.hashcons_len() != canonical_keys.len() && offenders.is_empty() {
        offenders.insert(format!(
            "dangling-entries:{}",
            rt.hashcons_len().saturating_sub(canonical_keys.len())
        ));
    }
    match offenders.into_iter().next() {
        None => InvariantCheck::pass(NAME),
        Some(first) => InvariantCheck::fail(NAME, first),
    }
}

/// Parent closure: if class `p` holds a node whose args include class `c`,
/// then `c`'s parent index knows that node.
pub(crate) fn check_parent_closure(rt: &Runtime) -> InvariantCheck {
    const NAME: &str = "parent-closure";
    let mut offenders: BTreeSet<String> = BTreeSet::new();
    for (&class_id, class) in rt.classes() {
        if !matches!(rt.uf().is_canonical(class_id), Ok(true)) {
            continue;
        }
        for &node_id in &class.nodes {
            let Some(stored) = rt.node(node_id) else {
                continue;
            };
            for &arg in &stored.args {
                let Ok(child) = rt.find(arg) else {
                    offenders.insert(format!("unresolvable-arg:{node_id}"));
                    continue;
                };
                let indexed = rt
                    .class(child)
                    .is_some_and(|c| c.parents.contains_key(&node_id));
                if !indexed {
                    offenders.insert(format!("{child}:{node_id}"));
                }
            }
        }
    }
    match offenders.into_iter().next() {
        None => InvariantCheck::pass(NAME),
        Some(first) => InvariantCheck::fail(NAME, first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Strategy;
    use crate::enode::ENode;
    use crate::rebuild::{compact_class, compaction_front, repair_class};

    #[test]
    fn clean_runtime_passes_both_checks() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let _fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        assert!(check_hashcons(&rt).ok);
        assert!(check_parent_closure(&rt).ok);
    }

    #[test]
    fn checks_fail_between_merge_and_rebuild_then_recover() {
        let mut rt = Runtime::new(Strategy::Deferred, true, None);
        let a = rt.add_enode(&ENode::leaf("a")).unwrap();
        let b = rt.add_enode(&ENode::leaf("b")).unwrap();
        let _fa = rt.add_enode(&ENode::new("f", vec![a])).unwrap();
        let _fb = rt.add_enode(&ENode::new("f", vec![b])).unwrap();
        rt.merge(a, b).unwrap();
        // f(a) and f(b) now share a canonical key but two hashcons entries.
        assert!(!check_hashcons(&rt).ok);

        for id in compaction_front(&rt) {
            compact_class(&mut rt, id).unwrap();
        }
        while let Some(id) = rt.pop_worklist() {
            repair_class(&mut rt, id).unwrap();
        }
        assert!(check_hashcons(&rt).ok);
        assert!(check_parent_closure(&rt).ok);
    }
}
