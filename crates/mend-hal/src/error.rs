use crate::CommandOutcome;
use std::path::PathBuf;
use thiserror::Error;

pub type HalResult<T> = std::result::Result<T, HalError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("Mount failed: {device} -> {} (exit={:?}): {}", target.display(), outcome.exit_code, outcome.stderr.trim())]
    MountFailed {
        device: String,
        target: PathBuf,
        outcome: CommandOutcome,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalError {
    /// The executable could not be located or started at all.
    pub fn is_environment(&self) -> bool {
        matches!(self, HalError::CommandNotFound(_) | HalError::Spawn { .. })
    }

    /// Outcome of the failed command, when one ran to completion.
    pub fn outcome(&self) -> Option<&CommandOutcome> {
        match self {
            HalError::MountFailed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}
