//! Dry-run runner: logs what would run and reports success.

use super::{CommandOutcome, CommandRunner, CommandSpec};
use crate::HalResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunHal;

impl DryRunHal {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for DryRunHal {
    fn run(&self, spec: &CommandSpec) -> HalResult<CommandOutcome> {
        log::info!("DRY RUN: {}", spec);
        Ok(CommandOutcome::success())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
