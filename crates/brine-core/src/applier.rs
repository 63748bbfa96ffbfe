// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Right-hand-side instantiation and merge-back.
use std::collections::BTreeMap;

use crate::diff::Diff;
use crate::error::EngineError;
use crate::ident::{EClassId, ENodeId};
use crate::matcher::MatchRecord;
use crate::pattern::Pattern;
use crate::preset::Rewrite;
use crate::runtime::Runtime;

/// What applying one match did to the runtime.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ApplyOutcome {
    /// `false` when the instantiated root was already in the target class.
    pub merged: bool,
    /// Canonical root of the instantiated right-hand side.
    pub created: ENodeId,
    /// Canonical class after the merge (equals `created` for no-ops).
    pub merged_into: EClassId,
}

/// Instantiates a pattern into the runtime under the given bindings.
///
/// Concrete sub-terms go through `add_enode`, so existing structure is
/// hashconsed rather than duplicated.
pub(crate) fn instantiate(
    rt: &mut Runtime,
    pattern: &Pattern,
    subst: &BTreeMap<String, ENodeId>,
) -> Result<ENodeId, EngineError> {
    match pattern {
        Pattern::Var(name) => match subst.get(name) {
            Some(&id) => rt.find(id),
            // Unreachable after preset validation (every rhs var is bound).
            None => Err(EngineError::InvariantViolation(
                "rhs variable unbound after validation",
            )),
        },
        Pattern::Literal(op) => rt.add_enode(&crate::enode::ENode::leaf(op.clone())),
        Pattern::Pinned(id) => rt.find(*id),
        Pattern::App { op, args } => {
            let mut ids = Vec::with_capacity(args.len());
            for a in args {
                ids.push(instantiate(rt, a, subst)?);
            }
            rt.add_enode(&crate::enode::ENode::new(op.clone(), ids))
        }
    }
}

/// Applies one match: instantiate the rhs, then merge it into the target
/// class. No-op merges are skipped and record no diff.
pub(crate) fn apply_match(
    rt: &mut Runtime,
    rewrite: &Rewrite,
    m: &MatchRecord,
) -> Result<ApplyOutcome, EngineError> {
    let subst: BTreeMap<String, ENodeId> = m.subst.iter().cloned().collect();
    let created = instantiate(rt, &rewrite.rhs, &subst)?;
    let target = rt.find(m.class)?;
    if created == target {
        return Ok(ApplyOutcome {
            merged: false,
            created,
            merged_into: target,
        });
    }
    let merged_into = rt.merge(created, target)?;
    rt.record(Diff::Rewrite {
        rule: rewrite.name.clone(),
        target,
        created,
        merged_into,
    });
    Ok(ApplyOutcome {
        merged: true,
        created,
        merged_into,
    })
}
