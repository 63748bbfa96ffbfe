// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The timeline record returned by a completed run.
use std::sync::Arc;

use blake3::Hasher;

use crate::diff::{HaltReason, Strategy};
use crate::snapshot::Snapshot;

/// Ordered, immutable sequence of snapshots produced by one run.
///
/// Cloning is cheap: snapshots are shared by reference. Consumers are
/// expected to cite snapshots by reference and never deep-clone them.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timeline {
    /// Id of the preset that produced this run.
    pub preset_id: String,
    /// Strategy the run executed under.
    pub implementation: Strategy,
    /// Seed for the union tie-break, when one was set.
    pub seed: Option<u64>,
    /// Snapshots in strictly increasing `step_index` order.
    pub states: Vec<Arc<Snapshot>>,
    /// Why the run stopped.
    pub halted_reason: HaltReason,
}

impl Timeline {
    /// Number of snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` when the timeline holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The terminal `done` snapshot.
    #[must_use]
    pub fn final_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.states.last()
    }

    /// BLAKE3 digest folding every snapshot digest in order.
    ///
    /// Two runs of the same preset, strategy, and seed produce equal timeline
    /// digests; the digest excludes timestamps, visual states, and layout.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(b"brine:timeline:v1");
        hash_label(&mut h, &self.preset_id);
        h.update(&[self.implementation.tag()]);
        match self.seed {
            None => {
                h.update(&[0u8]);
            }
            Some(seed) => {
                h.update(&[1u8]);
                h.update(&seed.to_le_bytes());
            }
        }
        hash_label(&mut h, self.halted_reason.label());
        h.update(&(self.states.len() as u64).to_le_bytes());
        for state in &self.states {
            h.update(&state.digest());
        }
        h.finalize().into()
    }

    /// The timeline digest as a lowercase hex string.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

fn hash_label(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

/// Errors from timeline (de)serialization.
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
pub enum TimelineCodecError {
    /// CBOR encoding failed.
    #[error("timeline encode failed: {0}")]
    Encode(String),
    /// CBOR decoding failed.
    #[error("timeline decode failed: {0}")]
    Decode(String),
}

#[cfg(feature = "serde")]
impl Timeline {
    /// Serializes the timeline as a self-describing CBOR record.
    ///
    /// Layout annotations are consumer-owned and are not persisted; by
    /// determinism, the record round-trips modulo `timestamp_micros`.
    ///
    /// # Errors
    /// Returns [`TimelineCodecError::Encode`] when the encoder fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TimelineCodecError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| TimelineCodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Deserializes a timeline from its CBOR record.
    ///
    /// # Errors
    /// Returns [`TimelineCodecError::Decode`] when the bytes are not a valid
    /// timeline record.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TimelineCodecError> {
        ciborium::de::from_reader(bytes).map_err(|e| TimelineCodecError::Decode(e.to_string()))
    }
}
