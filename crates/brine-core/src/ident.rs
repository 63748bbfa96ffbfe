// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core identifier types for e-nodes and e-classes.
use core::fmt;

/// Identifier of an e-node.
///
/// Ids are allocated in strictly increasing order by the runtime and are never
/// recycled. An e-class is identified by the id of any node currently in it;
/// the canonical representative is obtained through the union-find.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ENodeId(pub u32);

impl ENodeId {
    /// Returns the raw index of this id.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ENodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an e-class.
///
/// Definitionally the canonical [`ENodeId`] of any node in the class. The
/// alias exists to make signatures self-describing: a value of this type is
/// expected to be canonical at the point it is produced.
pub type EClassId = ENodeId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_ordering_follows_allocation_order() {
        assert!(ENodeId(0) < ENodeId(1));
        assert!(ENodeId(41) < ENodeId(42));
    }

    #[test]
    fn display_is_the_raw_index() {
        assert_eq!(ENodeId(7).to_string(), "7");
    }
}
