// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

// Telemetry helpers for JSONL logging when the `telemetry` feature is enabled.
// Manually formats JSON to avoid non-deterministic serde_json dependency.

#[cfg(feature = "telemetry")]
fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

/// Emits a snapshot telemetry event after each emission.
///
/// Logs the step index, phase label, and coarse state counts as a JSON line
/// to stdout when the `telemetry` feature is enabled. Best-effort: I/O errors
/// are ignored and timestamps fall back to 0 on clock errors.
#[cfg(feature = "telemetry")]
pub(crate) fn snapshot_emitted(step: u32, phase: &str, classes: usize, nodes: usize, diffs: usize) {
    use std::io::Write as _;
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"snapshot","step":{},"phase":"{}","classes":{},"nodes":{},"diffs":{}}}"#,
        ts_micros(),
        step,
        phase,
        classes,
        nodes,
        diffs
    );
    let _ = out.write_all(b"\n");
}

/// Emits a halt telemetry event when a run stops.
///
/// Logs the halt reason and total snapshot count as a JSON line to stdout
/// when the `telemetry` feature is enabled. Best-effort: I/O errors are
/// ignored.
#[cfg(feature = "telemetry")]
pub(crate) fn halted(reason: &str, steps: usize) {
    use std::io::Write as _;
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"halt","reason":"{}","steps":{}}}"#,
        ts_micros(),
        reason,
        steps
    );
    let _ = out.write_all(b"\n");
}
