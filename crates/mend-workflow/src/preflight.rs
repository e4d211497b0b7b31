use anyhow::{Context, Result};
use log::{info, warn};
use mend_core::cli::PipelineKind;
use mend_core::config::MendConfig;
use mend_hal::path::{find_in_paths, search_dirs};
use mend_hal::procfs::mountinfo;
use mend_hal::DeviceId;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Host tools the bootloader pipeline spawns directly. Commands run through `chroot` resolve
/// inside the target and cannot be checked from here.
const BOOTLOADER_BINARIES: &[&str] = &["mount", "umount", "chroot"];

const CONDITIONING_BINARIES: &[&str] = &[
    "badblocks",
    "fsck",
    "mkfs.exfat",
    "exfatlabel",
    "mount",
    "umount",
];

#[derive(Clone, Debug)]
pub struct PreflightConfig {
    pub required_binaries: Vec<String>,
    /// Root mount target that should not already be in use.
    pub target_root: Option<PathBuf>,
    /// Device that should not already be mounted.
    pub device: Option<DeviceId>,
    /// Directory that must exist to hold a private mount point.
    pub mount_base: Option<PathBuf>,
}

impl PreflightConfig {
    /// Requirements for `pipeline` under `cfg`. `escalation` is the program prefixed to
    /// elevated commands, when one will be used.
    pub fn for_pipeline(
        pipeline: PipelineKind,
        cfg: &MendConfig,
        device: Option<DeviceId>,
        escalation: Option<&str>,
    ) -> Self {
        let (bins, target_root, mount_base) = match pipeline {
            PipelineKind::Bootloader => (
                BOOTLOADER_BINARIES,
                Some(cfg.bootloader.target_root.clone()),
                None,
            ),
            PipelineKind::Condition => (
                CONDITIONING_BINARIES,
                None,
                Some(cfg.conditioning.mount_base.clone()),
            ),
        };
        let mut required_binaries: Vec<String> = bins.iter().map(|b| b.to_string()).collect();
        if let Some(program) = escalation {
            required_binaries.push(program.to_string());
        }
        Self {
            required_binaries,
            target_root,
            device,
            mount_base,
        }
    }
}

pub fn run(cfg: &PreflightConfig) -> Result<()> {
    info!("🧪 Preflight checks");

    check_binaries(&cfg.required_binaries, &env::var_os("PATH").unwrap_or_default())?;
    if let Some(base) = &cfg.mount_base {
        check_mount_base(base)?;
    }

    match mountinfo::read_mountinfo() {
        Ok(content) => {
            for warning in stale_mount_warnings(&content, cfg) {
                warn!("⚠️  {}", warning);
            }
        }
        Err(err) => warn!("Skipping mount check: {}", err),
    }

    info!("✅ Preflight complete");
    Ok(())
}

/// Existing mounts that suggest an earlier run was interrupted.
pub fn stale_mount_warnings(mountinfo_content: &str, cfg: &PreflightConfig) -> Vec<String> {
    let entries = mountinfo::parse_mountinfo(mountinfo_content);
    let mut warnings = Vec::new();
    if let Some(root) = &cfg.target_root {
        if mountinfo::is_mounted_from_info(root, &entries) {
            warnings.push(format!(
                "{} is already a mount point; a previous run may not have cleaned up",
                root.display()
            ));
        }
    }
    if let Some(device) = &cfg.device {
        let points = mountinfo::mount_points_of(device.as_str(), &entries);
        if !points.is_empty() {
            let points: Vec<String> = points.iter().map(|p| p.display().to_string()).collect();
            warnings.push(format!(
                "{} is already mounted at {}",
                device,
                points.join(", ")
            ));
        }
    }
    warnings
}

fn check_mount_base(base: &Path) -> Result<()> {
    let md = fs::metadata(base)
        .with_context(|| format!("mount base {} not accessible", base.display()))?;
    if !md.is_dir() {
        anyhow::bail!("mount base {} is not a directory", base.display());
    }
    Ok(())
}

/// Looks in `path_var` and then the escalation wrapper's default directories.
pub fn check_binaries(bins: &[String], path_var: &OsStr) -> Result<()> {
    let entries = search_dirs(path_var);
    for bin in bins {
        let Some(found) = find_in_paths(bin, &entries) else {
            anyhow::bail!("Required binary '{}' not found in PATH", bin);
        };
        ensure_executable(&found).with_context(|| {
            format!(
                "Required binary '{}' was found at {} but is not executable",
                bin,
                found.display()
            )
        })?;
    }
    Ok(())
}

fn ensure_executable(path: &Path) -> Result<()> {
    let md = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if !md.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if md.permissions().mode() & 0o111 == 0 {
            anyhow::bail!("{} is not executable", path.display());
        }
    }
    Ok(())
}
