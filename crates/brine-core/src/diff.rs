// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Closed tag vocabularies: phases, strategies, diffs, halt reasons.
use core::fmt;
use std::str::FromStr;

use crate::enode::ENode;
use crate::error::EngineError;
use crate::ident::{EClassId, ENodeId};

/// Execution strategy for invariant restoration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Strategy {
    /// Rebuild after every merge. Historically called `naive`.
    Eager,
    /// Accumulate merges and rebuild once per outer iteration.
    Deferred,
}

impl Strategy {
    /// Stable label used in snapshot ids and timeline records.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Deferred => "deferred",
        }
    }

    /// Returns a small tag byte for digest encoding.
    #[must_use]
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Eager => 0,
            Self::Deferred => 1,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" | "naive" => Ok(Self::Eager),
            "deferred" => Ok(Self::Deferred),
            other => Err(UnknownStrategy(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognized strategy label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy: {0:?} (expected \"eager\", \"naive\", or \"deferred\")")]
pub struct UnknownStrategy(pub String);

/// Phase tag carried by every snapshot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Phase {
    /// Emitted once after the root term is constructed.
    Init,
    /// Single-emission read phase carrying the full match list.
    Read,
    /// One emission per batch of scanned classes; the last batch carries the
    /// complete match list.
    ReadBatch,
    /// One emission per applied match.
    Write,
    /// One emission per non-canonical class removed during compaction.
    Compact,
    /// One emission per worklist pop during congruence repair.
    Repair,
    /// Terminal emission with empty diffs.
    Done,
}

impl Phase {
    /// Stable label used in snapshot ids.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Read => "read",
            Self::ReadBatch => "read-batch",
            Self::Write => "write",
            Self::Compact => "compact",
            Self::Repair => "repair",
            Self::Done => "done",
        }
    }

    /// Returns `true` for the two read-phase variants.
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadBatch)
    }

    /// Returns a small tag byte for digest encoding.
    #[must_use]
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Read => 1,
            Self::ReadBatch => 2,
            Self::Write => 3,
            Self::Compact => 4,
            Self::Repair => 5,
            Self::Done => 6,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a run stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum HaltReason {
    /// The read phase produced zero fresh matches.
    Saturated,
    /// The configured iteration cap (or node cap) was reached.
    IterationCap,
    /// The host requested cancellation.
    Canceled,
}

impl HaltReason {
    /// Stable label used in timeline records.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Saturated => "saturated",
            Self::IterationCap => "iteration-cap",
            Self::Canceled => "canceled",
        }
    }

    /// Escalates a non-success halt into the matching [`EngineError`].
    ///
    /// `Saturated` is a successful finish and returns `Ok(())`. Hosts that
    /// treat capped or canceled runs as failures call this on the returned
    /// timeline's halt reason.
    pub fn into_error(self) -> Result<(), EngineError> {
        match self {
            Self::Saturated => Ok(()),
            Self::IterationCap => Err(EngineError::IterationCapExceeded),
            Self::Canceled => Err(EngineError::ExecutionCanceled),
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single observable state transition, accumulated between snapshots.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Diff {
    /// A new e-node was allocated into a fresh singleton class.
    Add {
        /// Id of the new node (and of its singleton class).
        id: ENodeId,
        /// The canonicalized node as stored in the registry.
        node: ENode,
    },
    /// Two classes were unioned.
    Merge {
        /// Canonical survivor.
        winner: EClassId,
        /// Root absorbed into the winner.
        loser: EClassId,
    },
    /// A rewrite rule instantiated its right-hand side and merged it into the
    /// matched class. Recorded in addition to the underlying [`Diff::Merge`].
    Rewrite {
        /// Name of the rule that fired.
        rule: String,
        /// Class the left-hand side matched.
        target: EClassId,
        /// Root id of the instantiated right-hand side.
        created: ENodeId,
        /// Canonical class after the merge.
        merged_into: EClassId,
    },
}
