// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! brine-core: deterministic equality-saturation engine with a replayable
//! snapshot timeline.
//!
//! Given a rooted term and a set of rewrite rules, the engine builds an
//! e-graph by applying rewrites to a fixed point and emits an immutable,
//! structurally shared snapshot after every logically meaningful sub-step.
//! Same preset, same strategy, same seed ⇒ byte-identical snapshot sequence
//! (modulo timestamps); the eager and deferred strategies are observationally
//! equivalent at saturation.
//!
//! Renderers, timeline scrubbers, and layout engines are external
//! collaborators: they consume the immutable timeline and may attach layout
//! annotations, but the core never reads them.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod applier;
mod diff;
mod driver;
mod eclass;
mod enode;
mod error;
mod ident;
mod invariants;
mod matcher;
mod pattern;
mod preset;
mod rebuild;
mod rng;
mod runtime;
mod snapshot;
mod telemetry;
mod timeline;
mod union_find;
mod visual;

// Re-exports for stable public API
/// Closed tag vocabularies: phases, strategies, diffs, halt reasons.
pub use diff::{Diff, HaltReason, Phase, Strategy, UnknownStrategy};
/// Saturation driver, options, cancellation, and clock injection.
pub use driver::{zero_clock, CancelToken, ClockFn, Engine, EngineBuilder, EngineOptions};
/// Mutable e-class record and parent navigation entries.
pub use eclass::{EClass, ParentEntry};
/// E-node records and the chunked registry.
pub use enode::{ENode, NodeChunks, NODE_CHUNK_SIZE};
/// Engine error surface.
pub use error::EngineError;
/// Core identifier types.
pub use ident::{EClassId, ENodeId};
/// Debug invariant verification results.
pub use invariants::InvariantCheck;
/// Deduplicated pattern-match tuples.
pub use matcher::MatchRecord;
/// Pattern language and its parser.
pub use pattern::{Pattern, PatternError};
/// Preset schema and validation.
pub use preset::{ImplementationHints, Preset, PresetError, PresetViolation, Rewrite};
/// Deterministic PRNG for the seeded union tie-break.
pub use rng::SeededRng;
/// Mutable e-graph runtime.
pub use runtime::Runtime;
/// Immutable snapshots and their view objects.
pub use snapshot::{
    ClassSnapshot, ClassStyle, ClassVisual, EClassView, Layout, NodeStyle, NodeView, NodeVisual,
    ParentView, Position, Snapshot, SnapshotMetadata, UfSlot, VisualStates,
};
/// Timeline record of a completed run.
pub use timeline::Timeline;
#[cfg(feature = "serde")]
pub use timeline::TimelineCodecError;
/// Disjoint-set over monotonically allocated ids.
pub use union_find::{Union, UnionFind};
