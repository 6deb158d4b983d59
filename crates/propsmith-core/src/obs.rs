//! Structured observability hooks for stage lifecycle events.
//!
//! This module provides:
//! - Stage-scoped tracing spans via [`stage_span`]
//! - Emission functions for key lifecycle events: stage start/finish, unit
//!   progress and failure, partial aggregation
//!
//! Level is controlled by `RUST_LOG`; JSON output via the binary's `--json`.

use tracing::{info, warn};

use crate::aggregate::StageKind;

/// Stage-scoped span carrying the stage name and run id.
///
/// # Example
///
/// ```ignore
/// stage_future.instrument(stage_span(StageKind::Suggest, "run-12345")).await
/// // every event inside carries stage = suggest, run_id = run-12345
/// ```
pub fn stage_span(stage: StageKind, run_id: &str) -> tracing::Span {
    tracing::info_span!("propsmith.stage", stage = %stage, run_id = %run_id)
}

/// Emit event: stage started with its number of request units.
pub fn emit_stage_started(stage: StageKind, units: usize) {
    info!(event = "stage.started", stage = %stage, units = units);
}

/// Emit event: stage finished.
pub fn emit_stage_finished(stage: StageKind, succeeded: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "stage.finished",
        stage = %stage,
        succeeded = succeeded,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: one unit settled; `completed` of `total` units are done.
pub fn emit_unit_finished(stage: StageKind, key: &str, completed: usize, total: usize) {
    info!(
        event = "unit.finished",
        stage = %stage,
        key = %key,
        completed = completed,
        total = total,
        "processed {key} ({completed}/{total})"
    );
}

/// Emit event: one unit failed (warning level).
pub fn emit_unit_failed(stage: StageKind, key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "unit.failed", stage = %stage, key = %key, error = %error);
}

/// Emit event: the stage artifact is missing some units' contributions.
pub fn emit_stage_partial(stage: StageKind, failed: usize, total: usize) {
    warn!(
        event = "stage.partial",
        stage = %stage,
        failed = failed,
        total = total,
        "stage completed with failed units; artifact is best-effort"
    );
}
