//! Block device / partition identifiers.

use crate::{HalError, HalResult};
use serde::Serialize;
use std::fmt;

/// Opaque handle naming a block device or partition (e.g. `/dev/sdb1`).
///
/// Only emptiness is rejected; a name that does not exist surfaces later as a
/// failed command, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> HalResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(HalError::ValidationFailed(
                "device identifier must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_identifier() {
        assert!(matches!(
            DeviceId::new("  "),
            Err(HalError::ValidationFailed(_))
        ));
    }

    #[test]
    fn keeps_identifier_verbatim() {
        let dev: DeviceId = "/dev/does-not-exist".parse().unwrap();
        assert_eq!(dev.as_str(), "/dev/does-not-exist");
        assert_eq!(dev.to_string(), "/dev/does-not-exist");
    }
}
