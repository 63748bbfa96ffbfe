// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine-level error surface.
use thiserror::Error;

use crate::ident::ENodeId;

/// Errors emitted by the engine and runtime.
///
/// Input faults (invalid presets or patterns) are raised eagerly by
/// [`Engine::load_preset`](crate::Engine::load_preset) through
/// [`PresetError`](crate::PresetError) and never occur during a run. Resource
/// limits and cancellation never propagate as errors from
/// [`run_until_halt`](crate::Engine::run_until_halt): they are signaled
/// through the timeline's halt reason. The variants below cover programming
/// errors by the embedder and internal corruption, plus the two halt reasons
/// kept on the error surface for embedders that escalate halts
/// (see [`HaltReason::into_error`](crate::HaltReason::into_error)).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The preset or options failed validation at load time.
    #[error(transparent)]
    Preset(#[from] crate::preset::PresetError),
    /// An id was used that the union-find has never allocated.
    #[error("unknown id: {0}")]
    UnknownId(ENodeId),
    /// Internal invariant violated (engine state corruption). Fail fast
    /// rather than continue with a corrupt graph.
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
    /// The configured iteration cap was reached.
    ///
    /// Produced only by [`HaltReason::into_error`](crate::HaltReason::into_error);
    /// the driver itself reports the cap through the timeline.
    #[error("iteration cap exceeded")]
    IterationCapExceeded,
    /// The run was canceled by the host.
    ///
    /// Produced only by [`HaltReason::into_error`](crate::HaltReason::into_error);
    /// the driver itself reports cancellation through the timeline.
    #[error("execution canceled")]
    ExecutionCanceled,
    /// A preset or step was requested while no preset is loaded.
    #[error("no preset loaded")]
    NoPresetLoaded,
}
