//! Step execution and journaling.
//!
//! Every pipeline drives its commands through a [`StepRunner`], which records each attempt in
//! order and turns failures into a [`StepFailed`] that the pipeline can `?`-propagate (fatal
//! steps) or ignore (recoverable steps).

use crate::pipeline::{Phase, PipelineResult, Severity, StepRecord, StepResult, TerminalStatus};
use mend_hal::{
    mount_spec, umount_spec, Acquired, CommandOutcome, CommandRunner, CommandSpec, HalError, HalResult,
    MountOptions, MountPoint, MountSession, Release,
};
use std::path::Path;

/// A step did not succeed; its record is already in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFailed {
    pub step: &'static str,
    pub severity: Severity,
}

pub struct StepRunner<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    pipeline: &'static str,
    steps: Vec<StepRecord>,
    unwind: Vec<StepRecord>,
}

impl<'a, R: CommandRunner + ?Sized> StepRunner<'a, R> {
    pub fn new(runner: &'a R, pipeline: &'static str) -> Self {
        Self {
            runner,
            pipeline,
            steps: Vec::new(),
            unwind: Vec::new(),
        }
    }

    pub fn runner(&self) -> &'a R {
        self.runner
    }

    /// Run one command as (part of) `step`.
    pub fn run(
        &mut self,
        step: &'static str,
        severity: Severity,
        spec: &CommandSpec,
    ) -> Result<CommandOutcome, StepFailed> {
        log::info!("[{}] {}: {}", self.pipeline, step, spec);
        let result = self.runner.run(spec);
        self.record(step, severity, spec.to_string(), result)
    }

    /// Mount through `session` as `step`, returning the new mount point.
    pub fn mount(
        &mut self,
        session: &mut MountSession<'_, R>,
        step: &'static str,
        severity: Severity,
        device: &str,
        target: &Path,
        options: MountOptions,
    ) -> Result<MountPoint, StepFailed> {
        let detail = mount_spec(device, target, &options).to_string();
        log::info!("[{}] {}: {}", self.pipeline, step, detail);
        let (mount_point, result) = match session.acquire(device, target, options) {
            Ok(Acquired {
                mount_point,
                outcome,
            }) => (Some(mount_point), Ok(outcome)),
            Err(HalError::MountFailed { outcome, .. }) => (None, Ok(outcome)),
            Err(err) => (None, Err(err)),
        };
        self.record(step, severity, detail, result)?;
        mount_point.ok_or(StepFailed { step, severity })
    }

    /// Record a mount release as `step`. Returns whether the mount point is gone.
    pub fn record_release(
        &mut self,
        step: &'static str,
        phase: Phase,
        severity: Severity,
        release: Release,
    ) -> bool {
        let record = StepRecord {
            step,
            detail: umount_spec(release.mount_point.target()).to_string(),
            severity,
            phase,
            result: to_step_result(release.result),
        };
        let ok = record.succeeded();
        if !ok {
            log::warn!(
                "[{}] {}: {} did not succeed",
                self.pipeline,
                step,
                record.detail
            );
        }
        match phase {
            Phase::Forward => self.steps.push(record),
            Phase::Unwind => self.unwind.push(record),
        }
        ok
    }

    /// Record a step that failed before any command could run (e.g. a scratch directory
    /// could not be created).
    pub fn record_unavailable(
        &mut self,
        step: &'static str,
        severity: Severity,
        detail: String,
        error: String,
    ) -> StepFailed {
        log::warn!("[{}] {}: {}: {}", self.pipeline, step, detail, error);
        self.steps.push(StepRecord {
            step,
            detail,
            severity,
            phase: Phase::Forward,
            result: StepResult::Unavailable {
                error,
                environment: false,
            },
        });
        StepFailed { step, severity }
    }

    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .chain(self.unwind.iter())
            .any(|s| !s.succeeded())
    }

    pub fn finish(self, status: TerminalStatus, branch: Option<&'static str>) -> PipelineResult {
        log::info!(
            "[{}] finished: {} ({} step(s), {} unwind)",
            self.pipeline,
            status,
            self.steps.len(),
            self.unwind.len()
        );
        PipelineResult {
            pipeline: self.pipeline,
            branch,
            steps: self.steps,
            unwind: self.unwind,
            status,
        }
    }

    fn record(
        &mut self,
        step: &'static str,
        severity: Severity,
        detail: String,
        result: HalResult<CommandOutcome>,
    ) -> Result<CommandOutcome, StepFailed> {
        let outcome = result.as_ref().ok().filter(|o| o.succeeded()).cloned();
        let record = StepRecord {
            step,
            detail,
            severity,
            phase: Phase::Forward,
            result: to_step_result(result),
        };
        if outcome.is_none() {
            log::warn!(
                "[{}] {} failed ({:?}): {}",
                self.pipeline,
                step,
                severity,
                record.detail
            );
        }
        self.steps.push(record);
        outcome.ok_or(StepFailed { step, severity })
    }
}

pub(crate) fn to_step_result(result: HalResult<CommandOutcome>) -> StepResult {
    match result {
        Ok(outcome) => StepResult::Ran(outcome),
        Err(err) => StepResult::Unavailable {
            environment: err.is_environment(),
            error: err.to_string(),
        },
    }
}
