use thiserror::Error;

/// Result type alias for mend operations
pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum MendError {
    #[error("Missing --yes-i-know flag. Reformatting a defective device is destructive!")]
    MissingYesIKnow,

    #[error("Reboot requires --confirm-reboot {expected}")]
    MissingRebootConfirmation { expected: &'static str },

    #[error("Refusing to reboot: pipeline ended {0}")]
    RebootAfterFailure(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Preflight failed: {0}")]
    PreflightFailed(String),
}
