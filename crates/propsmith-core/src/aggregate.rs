//! Merging per-unit outcomes into a stage artifact.
//!
//! Two rules hold for every stage:
//! - list-shaped output follows submission order, never completion order;
//! - a failed unit is never silently dropped: it lands in the stage's
//!   failure manifest and is logged, while every success is still merged.

use serde::{Deserialize, Serialize};

use crate::obs::{emit_stage_partial, emit_unit_failed};
use crate::scheduler::{Outcome, UnitOutcome};

/// The four pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Suggest,
    Write,
    Review,
    Improve,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Suggest => "suggest",
            StageKind::Write => "write",
            StageKind::Review => "review",
            StageKind::Improve => "improve",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a stage's failure manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub stage: StageKind,
    /// Key of the failed unit (function, property or test name).
    pub key: String,
    pub reason: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.key, self.reason)
    }
}

/// Best-effort artifact of one stage plus the manifest of failed units.
#[derive(Debug, Clone)]
pub struct StageReport<A> {
    pub stage: StageKind,
    pub artifact: A,
    /// Failed units, in submission order.
    pub failures: Vec<UnitFailure>,
    pub succeeded: usize,
}

impl<A> StageReport<A> {
    /// `true` when no unit failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_units(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// One `key: reason` line per failed unit.
    pub fn render_manifest(&self) -> String {
        let mut out = String::new();
        if self.failures.is_empty() {
            return out;
        }
        out.push_str(&format!(
            "{} of {} {} unit(s) failed:\n",
            self.failures.len(),
            self.total_units(),
            self.stage
        ));
        for failure in &self.failures {
            out.push_str(&format!("  - {}: {}\n", failure.key, failure.reason));
        }
        out
    }
}

/// Successes and failures of one scheduler batch, in submission order.
#[derive(Debug)]
pub struct Collected<T> {
    pub successes: Vec<(String, T)>,
    pub failures: Vec<UnitFailure>,
}

impl<T> Collected<T> {
    pub fn empty() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Folds scheduler outcomes into stage reports.
#[derive(Debug, Clone, Copy)]
pub struct StageAggregator {
    stage: StageKind,
}

impl StageAggregator {
    pub fn new(stage: StageKind) -> Self {
        Self { stage }
    }

    /// Re-sort outcomes by submission position and split them into
    /// successes and failures. Each failure is logged as it is collected.
    pub fn collect<T>(&self, mut outcomes: Vec<UnitOutcome<T>>) -> Collected<T> {
        outcomes.sort_by_key(|o| o.index);

        let mut collected = Collected::empty();
        for UnitOutcome { key, outcome, .. } in outcomes {
            match outcome {
                Outcome::Success(value) => collected.successes.push((key, value)),
                Outcome::Failure(err) => {
                    emit_unit_failed(self.stage, &key, &err);
                    collected.failures.push(UnitFailure {
                        stage: self.stage,
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }
        collected
    }

    /// Wrap the merged artifact into a report; warns when it is partial.
    pub fn finish<A>(&self, artifact: A, succeeded: usize, failures: Vec<UnitFailure>) -> StageReport<A> {
        if !failures.is_empty() {
            emit_stage_partial(self.stage, failures.len(), succeeded + failures.len());
        }
        StageReport {
            stage: self.stage,
            artifact,
            failures,
            succeeded,
        }
    }
}
