// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Brine CLI entrypoint.
//!
//! Developer-facing commands for working with saturation presets:
//!
//! - `brine run <preset.json>` — run to halt and print a phase summary.
//! - `brine verify <preset.json>` — determinism and strategy-equivalence
//!   drills over repeated runs.
//! - `brine export <preset.json> -o <file>` — write the timeline as a
//!   self-describing CBOR record.
//!
//! Presets are JSON documents with string patterns (`"*(?x, 1)"`); the CLI
//! parses them into the core pattern language before loading. The CLI exits
//! with code `0` on success and non-zero on error.

#![deny(rust_2018_idioms)]
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
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use brine_core::{
    Engine, EngineOptions, ImplementationHints, Pattern, Phase, Preset, Rewrite, Snapshot,
    Strategy, Timeline,
};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "brine", version, about = "Deterministic equality-saturation timelines")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a preset to halt and print a phase summary.
    Run {
        /// Path to the preset JSON document.
        preset: PathBuf,
        #[command(flatten)]
        options: RunFlags,
        /// Print one row per snapshot instead of the phase aggregate.
        #[arg(long)]
        trace: bool,
    },
    /// Check determinism and strategy equivalence for a preset.
    Verify {
        /// Path to the preset JSON document.
        preset: PathBuf,
        #[command(flatten)]
        options: RunFlags,
    },
    /// Run a preset and write the timeline as a CBOR record.
    Export {
        /// Path to the preset JSON document.
        preset: PathBuf,
        /// Output file for the CBOR timeline record.
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        options: RunFlags,
    },
}

#[derive(Args, Debug, Clone)]
struct RunFlags {
    /// Execution strategy: `eager` (aka `naive`) or `deferred`.
    #[arg(long)]
    strategy: Option<String>,
    /// Outer iteration cap.
    #[arg(long)]
    iteration_cap: Option<u32>,
    /// Seed for the union tie-break coin flip.
    #[arg(long)]
    seed: Option<u64>,
    /// Node budget; exceeding it halts the run.
    #[arg(long)]
    max_nodes: Option<u32>,
    /// Read-phase batch size (deferred strategy only).
    #[arg(long)]
    read_batch_size: Option<u32>,
    /// Verify hashcons/parent invariants after every snapshot.
    #[arg(long)]
    debug_invariants: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run {
            preset,
            options,
            trace,
        } => cmd_run(&preset, &options, trace),
        Command::Verify { preset, options } => cmd_verify(&preset, &options),
        Command::Export {
            preset,
            output,
            options,
        } => cmd_export(&preset, &output, &options),
    }
}

// ── Preset loading ───────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TextPreset {
    id: String,
    label: String,
    #[serde(default)]
    description: String,
    root: String,
    rewrites: Vec<TextRewrite>,
    #[serde(default)]
    implementation_hints: Option<TextHints>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TextRewrite {
    name: String,
    lhs: String,
    rhs: String,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    priority: Option<i32>,
}

fn enabled_default() -> bool {
    true
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TextHints {
    #[serde(default)]
    default_strategy: Option<String>,
    #[serde(default)]
    iteration_cap: Option<u32>,
}

fn load_preset(path: &Path) -> Result<Preset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading preset {}", path.display()))?;
    let parsed: TextPreset = serde_json::from_str(&text)
        .with_context(|| format!("parsing preset {}", path.display()))?;

    let root = Pattern::parse(&parsed.root)
        .map_err(|e| anyhow!("root pattern {:?}: {e}", parsed.root))?;
    let mut preset = Preset::new(parsed.id, parsed.label, root);
    preset.description = parsed.description;
    for rule in parsed.rewrites {
        let mut rewrite = Rewrite::parse(&rule.name, &rule.lhs, &rule.rhs)
            .map_err(|e| anyhow!("rule {:?}: {e}", rule.name))?;
        rewrite.enabled = rule.enabled;
        rewrite.priority = rule.priority;
        preset.rewrites.push(rewrite);
    }
    if let Some(hints) = parsed.implementation_hints {
        let default_strategy = hints
            .default_strategy
            .map(|s| s.parse::<Strategy>())
            .transpose()
            .map_err(|e| anyhow!("{e}"))?;
        preset.implementation_hints = Some(ImplementationHints {
            default_strategy,
            iteration_cap: hints.iteration_cap,
        });
    }
    Ok(preset)
}

fn build_options(preset: &Preset, flags: &RunFlags) -> Result<EngineOptions> {
    let mut options = EngineOptions::for_preset(preset);
    if let Some(strategy) = &flags.strategy {
        options.strategy = strategy.parse().map_err(|e| anyhow!("{e}"))?;
    }
    if let Some(cap) = flags.iteration_cap {
        options.iteration_cap = cap;
    }
    options.seed = flags.seed.or(options.seed);
    options.max_nodes = flags.max_nodes.or(options.max_nodes);
    options.read_batch_size = flags.read_batch_size.or(options.read_batch_size);
    options.debug_invariants = flags.debug_invariants;
    Ok(options)
}

fn run_timeline(preset: &Preset, options: EngineOptions) -> Result<Timeline> {
    let mut engine = Engine::new();
    engine.load_preset(preset.clone(), options)?;
    Ok(engine.run_until_halt()?)
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn cmd_run(path: &Path, flags: &RunFlags, trace: bool) -> Result<()> {
    let preset = load_preset(path)?;
    let options = build_options(&preset, flags)?;
    let timeline = run_timeline(&preset, options)?;

    println!(
        "preset {} ({}) under {}: {} snapshots, halted {}",
        timeline.preset_id,
        preset.label,
        options.strategy,
        timeline.len(),
        timeline.halted_reason,
    );

    if trace {
        println!("{}", trace_table(&timeline));
    } else {
        println!("{}", summary_table(&timeline));
    }

    let last = timeline
        .final_snapshot()
        .ok_or_else(|| anyhow!("empty timeline"))?;
    println!(
        "final: {} nodes, {} classes, digest {}",
        last.node_chunks.len(),
        canonical_class_count(last),
        timeline.digest_hex(),
    );
    Ok(())
}

fn cmd_verify(path: &Path, flags: &RunFlags) -> Result<()> {
    let preset = load_preset(path)?;
    let mut failures = 0usize;
    let mut finals: Vec<(Strategy, Timeline)> = Vec::new();

    for strategy in [Strategy::Eager, Strategy::Deferred] {
        let mut options = build_options(&preset, flags)?;
        options.strategy = strategy;
        options.read_batch_size = match strategy {
            Strategy::Eager => None,
            Strategy::Deferred => options.read_batch_size,
        };
        let first = run_timeline(&preset, options)?;
        let second = run_timeline(&preset, options)?;
        let deterministic = first.digest() == second.digest();
        println!(
            "determinism [{}]: {} ({} snapshots, digest {})",
            strategy,
            verdict(deterministic),
            first.len(),
            &first.digest_hex()[..16],
        );
        if !deterministic {
            failures += 1;
        }
        finals.push((strategy, first));
    }

    let (eager_run, deferred_run) = (&finals[0].1, &finals[1].1);
    let ef = eager_run
        .final_snapshot()
        .ok_or_else(|| anyhow!("empty eager timeline"))?;
    let df = deferred_run
        .final_snapshot()
        .ok_or_else(|| anyhow!("empty deferred timeline"))?;
    let classes_agree = canonical_class_count(ef) == canonical_class_count(df);
    let reasons_agree = eager_run.halted_reason == deferred_run.halted_reason;
    println!(
        "equivalence [eager vs deferred]: {} ({} vs {} classes, {} vs {})",
        verdict(classes_agree && reasons_agree),
        canonical_class_count(ef),
        canonical_class_count(df),
        eager_run.halted_reason,
        deferred_run.halted_reason,
    );
    if !(classes_agree && reasons_agree) {
        failures += 1;
    }

    if failures > 0 {
        bail!("{failures} verification check(s) failed");
    }
    println!("all checks passed");
    Ok(())
}

fn cmd_export(path: &Path, output: &Path, flags: &RunFlags) -> Result<()> {
    let preset = load_preset(path)?;
    let options = build_options(&preset, flags)?;
    let timeline = run_timeline(&preset, options)?;
    let bytes = timeline.to_cbor()?;
    fs::write(output, &bytes)
        .with_context(|| format!("writing timeline to {}", output.display()))?;
    println!(
        "wrote {} snapshots ({} bytes) to {} [{}]",
        timeline.len(),
        bytes.len(),
        output.display(),
        timeline.halted_reason,
    );
    Ok(())
}

// ── Reporting helpers ────────────────────────────────────────────────────────

fn verdict(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAILED"
    }
}

fn canonical_class_count(snapshot: &Snapshot) -> usize {
    snapshot
        .eclasses
        .iter()
        .filter(|c| {
            snapshot
                .union_find
                .get(c.view.id.index())
                .is_some_and(|s| s.is_canonical)
        })
        .count()
}

fn summary_table(timeline: &Timeline) -> Table {
    let mut counts: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for snapshot in &timeline.states {
        let entry = counts.entry(snapshot.phase.label()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += snapshot.metadata.diffs.len();
    }
    let mut table = Table::new();
    table.set_header(vec!["phase", "snapshots", "diffs"]);
    // Render in execution order rather than alphabetically.
    for phase in [
        Phase::Init,
        Phase::Read,
        Phase::ReadBatch,
        Phase::Write,
        Phase::Compact,
        Phase::Repair,
        Phase::Done,
    ] {
        if let Some((snapshots, diffs)) = counts.get(phase.label()) {
            table.add_row(vec![
                phase.label().to_owned(),
                snapshots.to_string(),
                diffs.to_string(),
            ]);
        }
    }
    table
}

fn trace_table(timeline: &Timeline) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "step", "phase", "classes", "nodes", "worklist", "diffs", "active",
    ]);
    for snapshot in &timeline.states {
        table.add_row(vec![
            snapshot.step_index.to_string(),
            snapshot.phase.label().to_owned(),
            snapshot.eclasses.len().to_string(),
            snapshot.node_chunks.len().to_string(),
            snapshot.worklist.len().to_string(),
            snapshot.metadata.diffs.len().to_string(),
            snapshot
                .metadata
                .active_id
                .map_or_else(|| "-".to_owned(), |id| id.to_string()),
        ]);
    }
    table
}
