//! Post-repair reboot. Never automatic: it needs a fully successful run and a typed
//! confirmation.

use crate::pipeline::{Phase, PipelineResult, Severity, StepRecord, TerminalStatus};
use crate::step_runner::to_step_result;
use anyhow::Result;
use mend_core::config_states::RebootToken;
use mend_core::errors::MendError;
use mend_hal::{CommandRunner, CommandSpec};

pub const REBOOTED: &str = "Rebooted";

pub fn reboot_spec() -> CommandSpec {
    CommandSpec::new("systemctl").arg("reboot").elevated()
}

pub fn reboot<R: CommandRunner + ?Sized>(
    runner: &R,
    result: &PipelineResult,
    _token: RebootToken,
) -> Result<StepRecord> {
    if result.status != TerminalStatus::Success {
        return Err(MendError::RebootAfterFailure(result.status.to_string()).into());
    }

    let spec = reboot_spec();
    log::warn!("🔁 Rebooting: {}", spec);
    let record = StepRecord {
        step: REBOOTED,
        detail: spec.to_string(),
        severity: Severity::Fatal,
        phase: Phase::Forward,
        result: to_step_result(runner.run(&spec)),
    };
    if !record.succeeded() {
        log::error!("reboot did not go through: {}", record.detail);
    }
    Ok(record)
}
