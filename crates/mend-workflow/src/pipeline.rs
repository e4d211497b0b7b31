//! Result model shared by every pipeline.

use mend_hal::CommandOutcome;
use serde::Serialize;
use std::fmt;

/// What a step failure does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort and unwind.
    Fatal,
    /// Record and continue.
    Recoverable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Forward,
    /// Releases performed after a fatal stop.
    Unwind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    /// The command ran to completion (successfully or not).
    Ran(CommandOutcome),
    /// The command could not be run at all (missing tool, spawn failure, timeout).
    Unavailable { error: String, environment: bool },
}

/// One attempted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: &'static str,
    /// Command line (or action) attempted for this step.
    pub detail: String,
    pub severity: Severity,
    pub phase: Phase,
    pub result: StepResult,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, StepResult::Ran(outcome) if outcome.succeeded())
    }

    pub fn outcome(&self) -> Option<&CommandOutcome> {
        match &self.result {
            StepResult::Ran(outcome) => Some(outcome),
            StepResult::Unavailable { .. } => None,
        }
    }

    /// The step's tool could not be located or started.
    pub fn is_environment_failure(&self) -> bool {
        matches!(self.result, StepResult::Unavailable { environment: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Success,
    PartialFailure,
    Fatal,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalStatus::Success => "Success",
            TerminalStatus::PartialFailure => "PartialFailure",
            TerminalStatus::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_ENVIRONMENT: i32 = 3;

/// Terminal state name reported for successful runs.
pub const DONE: &str = "Done";
/// Step name shared by every mount release.
pub const UNMOUNTED: &str = "Unmounted";

/// Everything a pipeline run attempted, in order, plus its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub pipeline: &'static str,
    /// Branch taken, for pipelines that branch.
    pub branch: Option<&'static str>,
    pub steps: Vec<StepRecord>,
    pub unwind: Vec<StepRecord>,
    pub status: TerminalStatus,
}

impl PipelineResult {
    /// Forward steps followed by unwind steps.
    pub fn entries(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().chain(self.unwind.iter())
    }

    /// First forward step that did not succeed.
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.succeeded())
    }

    /// `Done` for a successful run, otherwise the name of the step that failed first.
    pub fn terminal_step(&self) -> &'static str {
        match (self.status, self.failed_step()) {
            (TerminalStatus::Success, _) => DONE,
            (_, Some(failed)) => failed.step,
            (_, None) => self
                .unwind
                .iter()
                .find(|s| !s.succeeded())
                .map_or(DONE, |s| s.step),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            TerminalStatus::Success => EXIT_SUCCESS,
            TerminalStatus::PartialFailure => EXIT_PARTIAL_FAILURE,
            TerminalStatus::Fatal => {
                if self.failed_step().is_some_and(StepRecord::is_environment_failure) {
                    EXIT_ENVIRONMENT
                } else {
                    EXIT_FATAL
                }
            }
        }
    }

    /// Releases (forward or unwind) that left something mounted.
    pub fn failed_releases(&self) -> Vec<&StepRecord> {
        self.entries()
            .filter(|s| s.step == UNMOUNTED && !s.succeeded())
            .collect()
    }
}
