//! TypeState helpers (validation -> arming).
//!
//! Destructive or disruptive actions can only be invoked with a token that proves the operator
//! confirmed them explicitly.

use crate::errors::MendError;
use anyhow::Result;

pub const REBOOT_CONFIRMATION: &str = "REBOOT";

/// Proof that the operator accepted reformatting a device that fails its scan.
#[derive(Debug, Clone, Copy)]
pub struct FormatArmToken(());

impl FormatArmToken {
    pub fn try_new(yes_i_know: bool) -> Result<Self> {
        if !yes_i_know {
            return Err(MendError::MissingYesIKnow.into());
        }
        Ok(Self(()))
    }

    /// Dry runs never touch a device, so they need no confirmation.
    pub fn for_dry_run() -> Self {
        Self(())
    }
}

/// Proof that the operator typed the reboot confirmation.
#[derive(Debug, Clone, Copy)]
pub struct RebootToken(());

impl RebootToken {
    pub fn try_new(typed_confirmation: Option<&str>) -> Result<Self> {
        match typed_confirmation {
            Some(text) if text.trim() == REBOOT_CONFIRMATION => Ok(Self(())),
            _ => Err(MendError::MissingRebootConfirmation {
                expected: REBOOT_CONFIRMATION,
            }
            .into()),
        }
    }
}

pub trait ValidateConfig {
    fn validate_cfg(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct UnvalidatedConfig<T>(pub T);

#[derive(Debug, Clone)]
pub struct ValidatedConfig<T>(pub T);

impl<T> UnvalidatedConfig<T> {
    pub fn new(cfg: T) -> Self {
        Self(cfg)
    }
}

impl<T: ValidateConfig> UnvalidatedConfig<T> {
    pub fn validate(self) -> Result<ValidatedConfig<T>> {
        self.0.validate_cfg()?;
        Ok(ValidatedConfig(self.0))
    }
}

impl<T> ValidatedConfig<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for ValidatedConfig<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
