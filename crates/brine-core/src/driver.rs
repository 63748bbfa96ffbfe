// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The saturation driver: a single-threaded state machine over the runtime.
//!
//! Each call to [`Engine::step`] commits exactly one logical sub-step and
//! emits exactly one snapshot; [`Engine::run_until_halt`] is the trivial loop
//! over `step`. All state transitions between snapshot emissions are atomic
//! from the host's perspective, and the only suspension points are between
//! emissions — which is also where cancellation and the node cap are checked.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::applier::{apply_match, instantiate};
use crate::diff::{HaltReason, Phase, Strategy};
use crate::error::EngineError;
use crate::ident::EClassId;
use crate::matcher::{match_key, MatchKey, MatchRecord, MatchScan};
use crate::preset::{Preset, PresetError, PresetViolation, Rewrite};
use crate::rebuild::{compact_class, compaction_front, repair_class};
use crate::runtime::Runtime;
use crate::snapshot::{EmitContext, Snapshot, Snapshotter};
use crate::timeline::Timeline;
use crate::visual;

/// Injectable time source for snapshot timestamps.
///
/// Defaults to wall-clock micros; tests inject a zero clock so byte-identical
/// timelines compare equal without masking.
pub type ClockFn = fn() -> u64;

fn wall_clock_micros() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A zero clock for deterministic test timelines.
#[must_use]
pub fn zero_clock() -> u64 {
    0
}

/// Cooperative cancellation flag shared between the host and the driver.
///
/// The driver checks the flag at snapshot boundaries only; cancelling mid-step
/// takes effect at the next boundary, where the run emits a terminal `done`
/// snapshot with `HaltReason::Canceled` and returns the partial timeline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Run options accepted by [`Engine::load_preset`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineOptions {
    /// Execution strategy. Required; there is no default.
    pub strategy: Strategy,
    /// Maximum number of outer iterations before halting with
    /// [`HaltReason::IterationCap`]. Default 100.
    pub iteration_cap: u32,
    /// Whether the runtime records diffs into snapshot metadata. Default true.
    pub record_diffs: bool,
    /// When true, hashcons agreement and parent closure are verified after
    /// every snapshot and recorded in its metadata. Default false.
    pub debug_invariants: bool,
    /// Optional node budget; exceeding it halts with
    /// [`HaltReason::IterationCap`] and an explanatory metadata note.
    pub max_nodes: Option<u32>,
    /// Optional seed enabling the seeded union tie-break.
    pub seed: Option<u64>,
    /// Read-phase batching grain (deferred strategy only): one `read-batch`
    /// snapshot per this many scanned classes.
    pub read_batch_size: Option<u32>,
}

impl EngineOptions {
    /// Creates options with the documented defaults for `strategy`.
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            iteration_cap: 100,
            record_diffs: true,
            debug_invariants: false,
            max_nodes: None,
            seed: None,
            read_batch_size: None,
        }
    }

    /// Creates options seeded from a preset's implementation hints.
    #[must_use]
    pub fn for_preset(preset: &Preset) -> Self {
        let hints = preset.implementation_hints.unwrap_or_default();
        let mut options = Self::new(hints.default_strategy.unwrap_or(Strategy::Deferred));
        if let Some(cap) = hints.iteration_cap {
            options.iteration_cap = cap;
        }
        options
    }

    pub(crate) fn violations(&self) -> Vec<PresetViolation> {
        let mut out = Vec::new();
        if self.iteration_cap == 0 {
            out.push(PresetViolation::OptionOutOfRange {
                option: "iterationCap",
                message: "must be a positive integer".to_owned(),
            });
        }
        if self.max_nodes == Some(0) {
            out.push(PresetViolation::OptionOutOfRange {
                option: "maxNodes",
                message: "must be a positive integer".to_owned(),
            });
        }
        if self.read_batch_size == Some(0) {
            out.push(PresetViolation::OptionOutOfRange {
                option: "readBatchSize",
                message: "must be a positive integer".to_owned(),
            });
        }
        if self.read_batch_size.is_some() && self.strategy == Strategy::Eager {
            out.push(PresetViolation::OptionOutOfRange {
                option: "readBatchSize",
                message: "requires the deferred strategy".to_owned(),
            });
        }
        out
    }
}

enum Resume {
    Apply { matches: Vec<MatchRecord>, next: usize },
    IterationEnd,
}

enum DriverState {
    Unloaded,
    ReadScan(MatchScan),
    Apply {
        matches: Vec<MatchRecord>,
        next: usize,
    },
    Compact {
        front: Vec<EClassId>,
        next: usize,
        resume: Resume,
    },
    Repair {
        resume: Resume,
    },
    Finish {
        reason: HaltReason,
        note: Option<String>,
    },
    Halted,
    /// Placeholder while a transition is in flight; never observable.
    Transition,
}

/// Fluent builder for [`Engine`] instances.
///
/// # Example
///
/// ```rust
/// use brine_core::{CancelToken, EngineBuilder};
///
/// let token = CancelToken::new();
/// let _engine = EngineBuilder::new()
///     .clock(brine_core::zero_clock)
///     .cancel_token(token.clone())
///     .build();
/// ```
#[derive(Debug)]
pub struct EngineBuilder {
    clock: ClockFn,
    cancel: CancelToken,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with the wall clock and a fresh cancel token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: wall_clock_micros,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the snapshot timestamp source.
    #[must_use]
    pub fn clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an externally owned cancellation token.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builds the engine. No preset is loaded yet.
    #[must_use]
    pub fn build(self) -> Engine {
        Engine {
            options: EngineOptions::new(Strategy::Eager),
            runtime: Runtime::new(Strategy::Eager, true, None),
            preset: None,
            rules: Vec::new(),
            snapshotter: Snapshotter::default(),
            states: Vec::new(),
            step_index: 0,
            iteration: 0,
            seen: BTreeSet::new(),
            state: DriverState::Unloaded,
            last_timeline: None,
            cancel: self.cancel,
            clock: self.clock,
        }
    }
}

/// The equality-saturation engine.
///
/// Owns the runtime, the loaded preset, and the in-progress timeline. The
/// lifecycle is `load_preset` → (`step`* | `run_until_halt`) → `get_timeline`;
/// loading a new preset resets everything.
pub struct Engine {
    options: EngineOptions,
    runtime: Runtime,
    preset: Option<Preset>,
    rules: Vec<Rewrite>,
    snapshotter: Snapshotter,
    states: Vec<Arc<Snapshot>>,
    step_index: u32,
    iteration: u32,
    seen: BTreeSet<MatchKey>,
    state: DriverState,
    last_timeline: Option<Timeline>,
    cancel: CancelToken,
    clock: ClockFn,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with the wall clock and a fresh cancel token.
    #[must_use]
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    /// Returns a builder for custom clock/cancellation wiring.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// A clone of the engine's cancel token, for handing to the host.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Read-only access to the runtime (for tests and tools).
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Returns `true` once the current run has emitted its `done` snapshot.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        matches!(self.state, DriverState::Halted)
    }

    /// Validates the preset and options, resets all state, instantiates the
    /// root term, and emits the `init` snapshot.
    ///
    /// # Errors
    /// Returns [`EngineError::Preset`] listing every schema and option
    /// violation; the engine is not mutated in that case.
    pub fn load_preset(
        &mut self,
        preset: Preset,
        options: EngineOptions,
    ) -> Result<Arc<Snapshot>, EngineError> {
        let mut violations = preset.violations();
        violations.extend(options.violations());
        if !violations.is_empty() {
            return Err(PresetError { violations }.into());
        }

        self.options = options;
        self.runtime = Runtime::new(options.strategy, options.record_diffs, options.seed);
        self.snapshotter.reset();
        self.states.clear();
        self.step_index = 0;
        self.iteration = 0;
        self.seen.clear();
        self.last_timeline = None;

        let mut rules: Vec<Rewrite> = preset
            .rewrites
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        self.rules = rules;

        let root = preset.root.clone();
        self.preset = Some(preset);
        instantiate(&mut self.runtime, &root, &BTreeMap::new())?;

        let snap = self.emit(Phase::Init, Vec::new(), None, None)?;
        self.state = DriverState::ReadScan(MatchScan::new(&self.runtime));
        self.enforce_node_cap();
        Ok(snap)
    }

    /// Runs the loaded preset to completion and returns the annotated
    /// timeline.
    ///
    /// Resource limits and cancellation do not error: they surface as the
    /// timeline's `halted_reason`.
    ///
    /// # Errors
    /// Returns [`EngineError::NoPresetLoaded`] before any `load_preset`, and
    /// propagates embedder faults ([`EngineError::UnknownId`]) and internal
    /// corruption.
    pub fn run_until_halt(&mut self) -> Result<Timeline, EngineError> {
        if matches!(self.state, DriverState::Unloaded) {
            return Err(EngineError::NoPresetLoaded);
        }
        while self.step()?.is_some() {}
        self.last_timeline
            .clone()
            .ok_or(EngineError::InvariantViolation("halted without a timeline"))
    }

    /// The timeline of the last completed run, if any.
    #[must_use]
    pub fn get_timeline(&self) -> Option<Timeline> {
        self.last_timeline.clone()
    }

    /// Advances the state machine by one phase and returns the new snapshot,
    /// or `None` once halted.
    ///
    /// # Errors
    /// Returns [`EngineError::NoPresetLoaded`] before any `load_preset`, and
    /// propagates embedder faults and internal corruption.
    pub fn step(&mut self) -> Result<Option<Arc<Snapshot>>, EngineError> {
        match self.state {
            DriverState::Unloaded => return Err(EngineError::NoPresetLoaded),
            DriverState::Halted => return Ok(None),
            _ => {}
        }
        if self.cancel.is_canceled() && !matches!(self.state, DriverState::Finish { .. }) {
            self.state = DriverState::Finish {
                reason: HaltReason::Canceled,
                note: None,
            };
        }
        loop {
            match std::mem::replace(&mut self.state, DriverState::Transition) {
                DriverState::Unloaded | DriverState::Transition => {
                    return Err(EngineError::InvariantViolation(
                        "driver stepped in an invalid state",
                    ));
                }
                DriverState::Halted => {
                    self.state = DriverState::Halted;
                    return Ok(None);
                }
                DriverState::ReadScan(mut scan) => {
                    let batching = self.options.strategy == Strategy::Deferred
                        && self.options.read_batch_size.is_some();
                    let batch = if batching {
                        self.options
                            .read_batch_size
                            .map_or(usize::MAX, |b| b as usize)
                    } else {
                        usize::MAX
                    };
                    let done = scan.advance(&self.runtime, &self.rules, &self.seen, batch);
                    let phase = if batching { Phase::ReadBatch } else { Phase::Read };
                    let matches_so_far = scan.matches();
                    if done {
                        let matches = scan.into_matches();
                        if matches.is_empty() {
                            self.state = DriverState::Finish {
                                reason: HaltReason::Saturated,
                                note: None,
                            };
                        } else {
                            self.state = DriverState::Apply { matches, next: 0 };
                        }
                    } else {
                        self.state = DriverState::ReadScan(scan);
                    }
                    let snap = self.emit(phase, matches_so_far, None, None)?;
                    self.enforce_node_cap();
                    return Ok(Some(snap));
                }
                DriverState::Apply { matches, mut next } => {
                    let mut applied: Option<MatchRecord> = None;
                    while next < matches.len() {
                        let m = matches[next].clone();
                        next += 1;
                        self.seen.insert(match_key(&m));
                        let rewrite = self.rule_named(&m.rule)?;
                        let outcome = apply_match(&mut self.runtime, &rewrite, &m)?;
                        if outcome.merged {
                            applied = Some(m);
                            break;
                        }
                        // No-op application: the instantiated rhs was already
                        // in the target class. Skip without emitting.
                    }
                    if let Some(m) = applied {
                        let exhausted = next >= matches.len();
                        self.state = match (self.options.strategy, exhausted) {
                            (Strategy::Deferred, false) => DriverState::Apply { matches, next },
                            (Strategy::Deferred, true) => DriverState::Compact {
                                front: compaction_front(&self.runtime),
                                next: 0,
                                resume: Resume::IterationEnd,
                            },
                            // Eager mode drains a full rebuild after every
                            // single write before touching the next match.
                            (Strategy::Eager, false) => DriverState::Compact {
                                front: compaction_front(&self.runtime),
                                next: 0,
                                resume: Resume::Apply { matches, next },
                            },
                            (Strategy::Eager, true) => DriverState::Compact {
                                front: compaction_front(&self.runtime),
                                next: 0,
                                resume: Resume::IterationEnd,
                            },
                        };
                        let snap = self.emit(Phase::Write, vec![m], None, None)?;
                        self.enforce_node_cap();
                        return Ok(Some(snap));
                    }
                    // The tail of the match list was all no-ops; rebuild
                    // whatever the effective writes left behind.
                    self.state = DriverState::Compact {
                        front: compaction_front(&self.runtime),
                        next: 0,
                        resume: Resume::IterationEnd,
                    };
                }
                DriverState::Compact {
                    front,
                    next,
                    resume,
                } => {
                    if next < front.len() {
                        let id = front[next];
                        let survivor = compact_class(&mut self.runtime, id)?;
                        self.state = DriverState::Compact {
                            front,
                            next: next + 1,
                            resume,
                        };
                        let snap = self.emit(Phase::Compact, Vec::new(), Some(survivor), None)?;
                        self.enforce_node_cap();
                        return Ok(Some(snap));
                    }
                    self.state = DriverState::Repair { resume };
                }
                DriverState::Repair { resume } => {
                    if let Some(id) = self.runtime.pop_worklist() {
                        let repaired = repair_class(&mut self.runtime, id)?;
                        self.state = DriverState::Repair { resume };
                        let snap = self.emit(Phase::Repair, Vec::new(), Some(repaired), None)?;
                        self.enforce_node_cap();
                        return Ok(Some(snap));
                    }
                    match resume {
                        Resume::Apply { matches, next } => {
                            self.state = DriverState::Apply { matches, next };
                        }
                        Resume::IterationEnd => {
                            self.iteration += 1;
                            if self.iteration >= self.options.iteration_cap {
                                self.state = DriverState::Finish {
                                    reason: HaltReason::IterationCap,
                                    note: None,
                                };
                            } else {
                                self.state =
                                    DriverState::ReadScan(MatchScan::new(&self.runtime));
                            }
                        }
                    }
                }
                DriverState::Finish { reason, note } => {
                    self.emit(Phase::Done, Vec::new(), None, note)?;
                    self.state = DriverState::Halted;
                    self.finalize(reason);
                    let last = self
                        .states
                        .last()
                        .cloned()
                        .ok_or(EngineError::InvariantViolation("finished with no snapshots"))?;
                    return Ok(Some(last));
                }
            }
        }
    }

    fn emit(
        &mut self,
        phase: Phase,
        matches: Vec<MatchRecord>,
        active_id: Option<EClassId>,
        note: Option<String>,
    ) -> Result<Arc<Snapshot>, EngineError> {
        let Some(preset) = &self.preset else {
            return Err(EngineError::NoPresetLoaded);
        };
        let ctx = EmitContext {
            step_index: self.step_index,
            preset_id: preset.id.clone(),
            strategy: self.options.strategy,
            phase,
            matches,
            active_id,
            note,
            timestamp_micros: (self.clock)(),
            debug_invariants: self.options.debug_invariants,
        };
        let snap = self.snapshotter.emit(&mut self.runtime, ctx);
        #[cfg(feature = "telemetry")]
        crate::telemetry::snapshot_emitted(
            snap.step_index,
            snap.phase.label(),
            snap.eclasses.len(),
            snap.node_chunks.len(),
            snap.metadata.diffs.len(),
        );
        self.step_index += 1;
        let arc = Arc::new(snap);
        self.states.push(Arc::clone(&arc));
        Ok(arc)
    }

    /// Applies the node budget at a snapshot boundary.
    fn enforce_node_cap(&mut self) {
        let Some(max) = self.options.max_nodes else {
            return;
        };
        if matches!(
            self.state,
            DriverState::Finish { .. } | DriverState::Halted | DriverState::Unloaded
        ) {
            return;
        }
        let count = self.runtime.num_nodes();
        if count > max as usize {
            self.state = DriverState::Finish {
                reason: HaltReason::IterationCap,
                note: Some(format!("max-nodes exceeded: {count} > {max}")),
            };
        }
    }

    fn rule_named(&self, name: &str) -> Result<Rewrite, EngineError> {
        self.rules
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .map(|i| self.rules[i].clone())
            .map_err(|_| EngineError::InvariantViolation("match referenced an unknown rule"))
    }

    fn finalize(&mut self, reason: HaltReason) {
        visual::annotate_timeline(&mut self.states);
        let preset_id = self
            .preset
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        let timeline = Timeline {
            preset_id,
            implementation: self.options.strategy,
            seed: self.options.seed,
            states: self.states.clone(),
            halted_reason: reason,
        };
        #[cfg(feature = "telemetry")]
        crate::telemetry::halted(reason.label(), timeline.states.len());
        self.last_timeline = Some(timeline);
    }
}
