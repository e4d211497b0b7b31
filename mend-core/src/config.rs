//! On-disk configuration (`mend.toml`).
//!
//! Every field has a default matching the classic Debian/GRUB + exFAT workflow, so an empty
//! file (or no file at all) is a valid configuration.

use crate::config_states::{UnvalidatedConfig, ValidateConfig, ValidatedConfig};
use crate::errors::MendError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mend/mend.toml";

/// How a defect scan's output is turned into a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DefectPolicy {
    /// Any diagnostic text at all means "defective". Conservative: informational output
    /// counts as a defect too.
    #[default]
    AnyOutput,
    /// Parse badblocks' "N bad blocks found" summary; unparseable output counts as defective.
    BadBlockCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Program used to elevate privileged commands when not root. Empty disables escalation.
    pub escalate_with: String,
    pub log_file: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            escalate_with: "sudo".to_string(),
            log_file: None,
        }
    }
}

impl RunnerConfig {
    pub fn escalation(&self) -> Option<String> {
        let program = self.escalate_with.trim();
        (!program.is_empty()).then(|| program.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootloaderConfig {
    /// Where the damaged root filesystem is mounted.
    pub target_root: PathBuf,
    /// EFI directory as seen from inside the target root.
    pub efi_directory: PathBuf,
    pub grub_target: String,
    pub bootloader_id: String,
    /// Package refresh/upgrade commands run inside the target root, in order.
    pub upgrade_commands: Vec<Vec<String>>,
    /// Regenerates the boot configuration inside the target root.
    pub config_command: Vec<String>,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            target_root: PathBuf::from("/mnt"),
            efi_directory: PathBuf::from("/boot"),
            grub_target: "x86_64-efi".to_string(),
            bootloader_id: "grub".to_string(),
            upgrade_commands: vec![
                vec!["apt".to_string(), "update".to_string()],
                vec!["apt".to_string(), "upgrade".to_string(), "-y".to_string()],
            ],
            config_command: vec!["update-grub".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditioningConfig {
    /// Parent directory for the private mount point used while labelling.
    pub mount_base: PathBuf,
    /// Volume label given to a device reformatted after a failed scan.
    pub format_label: String,
    /// Volume label marking a device that passed its scan.
    pub pass_label: String,
    pub policy: DefectPolicy,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            mount_base: PathBuf::from("/mnt"),
            format_label: "flashed".to_string(),
            pass_label: "pass".to_string(),
            policy: DefectPolicy::AnyOutput,
        }
    }
}

/// Email relay used to notify an operator when a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub endpoint: String,
    pub name: String,
    pub email: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

fn default_relay_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MendConfig {
    pub runner: RunnerConfig,
    pub bootloader: BootloaderConfig,
    pub conditioning: ConditioningConfig,
    pub relay: Option<RelayConfig>,
}

impl ValidateConfig for MendConfig {
    fn validate_cfg(&self) -> Result<()> {
        let invalid = |msg: String| -> anyhow::Error { MendError::ValidationFailed(msg).into() };

        if !self.bootloader.target_root.is_absolute() {
            return Err(invalid(format!(
                "bootloader.target_root must be absolute: {}",
                self.bootloader.target_root.display()
            )));
        }
        if !self.bootloader.efi_directory.is_absolute() {
            return Err(invalid(format!(
                "bootloader.efi_directory must be absolute: {}",
                self.bootloader.efi_directory.display()
            )));
        }
        if self.bootloader.upgrade_commands.is_empty() {
            return Err(invalid(
                "bootloader.upgrade_commands must not be empty".to_string(),
            ));
        }
        if self
            .bootloader
            .upgrade_commands
            .iter()
            .any(|argv| argv.first().map_or(true, |p| p.trim().is_empty()))
        {
            return Err(invalid(
                "bootloader.upgrade_commands entries must name a program".to_string(),
            ));
        }
        if self.bootloader.config_command.is_empty() {
            return Err(invalid("bootloader.config_command must not be empty".to_string()));
        }
        if self.conditioning.format_label.trim().is_empty()
            || self.conditioning.pass_label.trim().is_empty()
        {
            return Err(invalid("conditioning labels must not be empty".to_string()));
        }
        // exFAT volume labels hold at most 11 UTF-16 code units.
        for label in [&self.conditioning.format_label, &self.conditioning.pass_label] {
            if label.encode_utf16().count() > 11 {
                return Err(invalid(format!("volume label too long (max 11): {label}")));
            }
        }
        if let Some(relay) = &self.relay {
            let url = url::Url::parse(&relay.endpoint)
                .with_context(|| format!("invalid relay.endpoint: {}", relay.endpoint))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!(
                    "relay.endpoint must be http(s): {}",
                    relay.endpoint
                )));
            }
            if !relay.email.contains('@') {
                return Err(invalid(format!("relay.email is not an address: {}", relay.email)));
            }
        }
        Ok(())
    }
}

pub fn parse_config_toml(toml_str: &str) -> Result<ValidatedConfig<MendConfig>> {
    let cfg: MendConfig = toml::from_str(toml_str).context("failed to parse mend config")?;
    UnvalidatedConfig::new(cfg).validate()
}

/// File [`load`] reads for `path`: the named one, or [`DEFAULT_CONFIG_PATH`] when it exists.
/// `None` means built-in defaults apply.
pub fn source_path(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        }
    }
}

/// Load the config from [`source_path`], or defaults.
///
/// An explicitly named file that does not exist is an error; a missing default file is not.
pub fn load(path: Option<&Path>) -> Result<ValidatedConfig<MendConfig>> {
    let Some(path) = source_path(path) else {
        log::debug!("no config at {}; using defaults", DEFAULT_CONFIG_PATH);
        return UnvalidatedConfig::new(MendConfig::default()).validate();
    };
    if !path.exists() {
        return Err(MendError::Config(format!("config file not found: {}", path.display())).into());
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config_toml(&text).with_context(|| format!("in {}", path.display()))
}
