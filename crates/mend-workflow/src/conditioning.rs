//! Storage-device conditioning.
//!
//! `Init -> Scanned -> {Defective -> Repaired -> Formatted -> Done}
//!                  | {Clean -> Mounted -> Labeled -> Unmounted -> Done}`
//!
//! A scan that cannot run or exits nonzero is fatal. Every later failure is recorded and ends
//! the run as a partial failure.

use crate::pipeline::{Phase, PipelineResult, Severity, TerminalStatus, UNMOUNTED};
use crate::step_runner::StepRunner;
use mend_core::config::{ConditioningConfig, DefectPolicy};
use mend_core::config_states::FormatArmToken;
use mend_hal::{CommandOutcome, CommandRunner, CommandSpec, DeviceId, MountOptions, MountSession};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const PIPELINE: &str = "condition";

pub const DEFECTIVE: &str = "Defective";
pub const CLEAN: &str = "Clean";

pub const SCANNED: &str = "Scanned";
pub const REPAIRED: &str = "Repaired";
pub const FORMATTED: &str = "Formatted";
pub const MOUNTED: &str = "Mounted";
pub const LABELED: &str = "Labeled";

const MOUNT_DIR_PREFIX: &str = "mend-label-";
const DRY_RUN_MOUNT_DIR: &str = "mend-dry-run";

/// Verdict of a defect scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub has_defects: bool,
    /// Everything the scanner printed, stdout then stderr.
    pub diagnostics: String,
}

impl ScanReport {
    pub fn evaluate(outcome: &CommandOutcome, policy: DefectPolicy) -> Self {
        let diagnostics = outcome.combined_output();
        let has_defects = match policy {
            DefectPolicy::AnyOutput => !diagnostics.trim().is_empty(),
            DefectPolicy::BadBlockCount => {
                parse_bad_block_count(&diagnostics).map_or(true, |count| count > 0)
            }
        };
        Self {
            has_defects,
            diagnostics,
        }
    }
}

/// Bad-block total from the last `Pass completed, N bad blocks found.` line.
pub fn parse_bad_block_count(diagnostics: &str) -> Option<u64> {
    diagnostics.lines().rev().find_map(|line| {
        let rest = line.trim().strip_prefix("Pass completed, ")?;
        let (count, tail) = rest.split_once(' ')?;
        if !tail.starts_with("bad blocks found") {
            return None;
        }
        count.parse().ok()
    })
}

pub fn scan_spec(device: &DeviceId) -> CommandSpec {
    CommandSpec::new("badblocks")
        .arg("-v")
        .arg(device.as_str())
        .elevated()
}

pub fn repair_spec(device: &DeviceId) -> CommandSpec {
    CommandSpec::new("fsck")
        .arg("-vcck")
        .arg(device.as_str())
        .elevated()
}

pub fn format_spec(device: &DeviceId, label: &str) -> CommandSpec {
    CommandSpec::new("mkfs.exfat")
        .args(["-n", label])
        .arg(device.as_str())
        .elevated()
}

pub fn label_spec(device: &DeviceId, label: &str) -> CommandSpec {
    CommandSpec::new("exfatlabel")
        .arg(device.as_str())
        .arg(label)
        .elevated()
}

/// Scan `device` and either rebuild its filesystem or label it as good.
///
/// The arm token is proof the operator accepted that a failed scan reformats the device.
pub fn run_conditioning<R: CommandRunner + ?Sized>(
    runner: &R,
    device: &DeviceId,
    cfg: &ConditioningConfig,
    policy: DefectPolicy,
    _armed: FormatArmToken,
) -> PipelineResult {
    log::info!("💾 Conditioning {} (policy {:?})", device, policy);
    let mut steps = StepRunner::new(runner, PIPELINE);

    let Ok(outcome) = steps.run(SCANNED, Severity::Fatal, &scan_spec(device)) else {
        return steps.finish(TerminalStatus::Fatal, None);
    };

    let report = ScanReport::evaluate(&outcome, policy);
    let branch = if report.has_defects {
        log::warn!("{} reported defects; repairing and reformatting", device);
        defective(&mut steps, device, cfg);
        DEFECTIVE
    } else {
        log::info!("{} scanned clean; labelling {:?}", device, cfg.pass_label);
        clean(&mut steps, device, cfg);
        CLEAN
    };

    let status = if steps.has_failures() {
        TerminalStatus::PartialFailure
    } else {
        TerminalStatus::Success
    };
    steps.finish(status, Some(branch))
}

fn defective<R: CommandRunner + ?Sized>(
    steps: &mut StepRunner<'_, R>,
    device: &DeviceId,
    cfg: &ConditioningConfig,
) {
    // Formatting is attempted whatever the repair did.
    let _ = steps.run(REPAIRED, Severity::Recoverable, &repair_spec(device));
    let _ = steps.run(
        FORMATTED,
        Severity::Recoverable,
        &format_spec(device, &cfg.format_label),
    );
}

fn clean<R: CommandRunner + ?Sized>(
    steps: &mut StepRunner<'_, R>,
    device: &DeviceId,
    cfg: &ConditioningConfig,
) {
    let runner = steps.runner();
    let dir = match MountDir::create(&cfg.mount_base, runner.is_dry_run()) {
        Ok(dir) => dir,
        Err(err) => {
            steps.record_unavailable(
                MOUNTED,
                Severity::Recoverable,
                format!("create mount directory in {}", cfg.mount_base.display()),
                err.to_string(),
            );
            return;
        }
    };

    let mut session = MountSession::new(runner);
    let mounted = steps.mount(
        &mut session,
        MOUNTED,
        Severity::Recoverable,
        device.as_str(),
        dir.path(),
        MountOptions::new(),
    );
    if mounted.is_ok() {
        let _ = steps.run(
            LABELED,
            Severity::Recoverable,
            &label_spec(device, &cfg.pass_label),
        );
        while let Some(rel) = session.release_last() {
            steps.record_release(UNMOUNTED, Phase::Forward, Severity::Recoverable, rel);
        }
    }

    // Unmount before the directory goes away.
    drop(session);
    drop(dir);
}

/// Private mount point for the clean branch. Removed (non-recursively) on drop, so a device
/// that failed to unmount is never touched.
struct MountDir {
    path: PathBuf,
    created: bool,
}

impl MountDir {
    fn create(base: &Path, dry_run: bool) -> io::Result<Self> {
        if dry_run {
            return Ok(Self {
                path: base.join(DRY_RUN_MOUNT_DIR),
                created: false,
            });
        }
        let dir = tempfile::Builder::new()
            .prefix(MOUNT_DIR_PREFIX)
            .disable_cleanup(true)
            .tempdir_in(base)?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            created: true,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MountDir {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        if let Err(err) = fs::remove_dir(&self.path) {
            log::warn!(
                "could not remove mount directory {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_hal::{DryRunHal, FakeHal, FakeResponse};
    use tempfile::tempdir;

    const CLEAN_SCAN: &str = "Checking blocks 0 to 7815167\nChecking for bad blocks (read-only test): done\nPass completed, 0 bad blocks found. (0/0/0 errors)\n";
    const BAD_SCAN: &str = "Checking blocks 0 to 7815167\nChecking for bad blocks (read-only test): 1024\n2048\ndone\nPass completed, 2 bad blocks found. (2/0/0 errors)\n";

    fn device() -> DeviceId {
        "/dev/sdb1".parse().unwrap()
    }

    #[test]
    fn bad_block_count_is_parsed_from_summary() {
        assert_eq!(parse_bad_block_count(CLEAN_SCAN), Some(0));
        assert_eq!(parse_bad_block_count(BAD_SCAN), Some(2));
        assert_eq!(parse_bad_block_count("badblocks: No such file or directory"), None);
    }

    #[test]
    fn any_output_policy_is_conservative() {
        let outcome = CommandOutcome::new(Some(0), "", CLEAN_SCAN);
        assert!(ScanReport::evaluate(&outcome, DefectPolicy::AnyOutput).has_defects);
        assert!(!ScanReport::evaluate(&CommandOutcome::success(), DefectPolicy::AnyOutput).has_defects);
    }

    #[test]
    fn bad_block_count_policy_reads_the_summary() {
        let clean = CommandOutcome::new(Some(0), "", CLEAN_SCAN);
        let bad = CommandOutcome::new(Some(0), "", BAD_SCAN);
        let garbled = CommandOutcome::new(Some(0), "", "something odd happened");
        assert!(!ScanReport::evaluate(&clean, DefectPolicy::BadBlockCount).has_defects);
        assert!(ScanReport::evaluate(&bad, DefectPolicy::BadBlockCount).has_defects);
        assert!(ScanReport::evaluate(&garbled, DefectPolicy::BadBlockCount).has_defects);
    }

    #[test]
    fn nonzero_scan_exit_is_fatal() {
        let hal = FakeHal::new();
        hal.respond_to("badblocks", FakeResponse::exit(1, "badblocks: Permission denied"));

        let result = run_conditioning(
            &hal,
            &device(),
            &ConditioningConfig::default(),
            DefectPolicy::AnyOutput,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.status, TerminalStatus::Fatal);
        assert_eq!(result.terminal_step(), SCANNED);
        assert_eq!(result.branch, None);
        assert_eq!(hal.operation_count(), 1);
    }

    #[test]
    fn clean_scan_under_count_policy_takes_clean_branch() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::new();
        hal.respond_to("badblocks", FakeResponse::ok_with_output("", CLEAN_SCAN));
        let cfg = ConditioningConfig {
            mount_base: tmp.path().to_path_buf(),
            ..ConditioningConfig::default()
        };

        let result = run_conditioning(
            &hal,
            &device(),
            &cfg,
            DefectPolicy::BadBlockCount,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.branch, Some(CLEAN));
        assert_eq!(result.status, TerminalStatus::Success);
    }

    #[test]
    fn mount_failure_skips_label_and_reports_partial() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::new();
        hal.respond_to("mount", FakeResponse::exit(32, "mount: wrong fs type"));
        let cfg = ConditioningConfig {
            mount_base: tmp.path().to_path_buf(),
            ..ConditioningConfig::default()
        };

        let result = run_conditioning(
            &hal,
            &device(),
            &cfg,
            DefectPolicy::AnyOutput,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.status, TerminalStatus::PartialFailure);
        assert_eq!(result.terminal_step(), MOUNTED);
        assert!(!hal.has_operation(|op| op.program == "exfatlabel"));
        assert!(!hal.has_operation(|op| op.program == "umount"));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn label_failure_still_unmounts() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::new();
        hal.respond_to("exfatlabel", FakeResponse::exit(1, "exfatlabel: invalid label"));
        let cfg = ConditioningConfig {
            mount_base: tmp.path().to_path_buf(),
            ..ConditioningConfig::default()
        };

        let result = run_conditioning(
            &hal,
            &device(),
            &cfg,
            DefectPolicy::AnyOutput,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.status, TerminalStatus::PartialFailure);
        assert_eq!(result.terminal_step(), LABELED);
        let last = result.steps.last().unwrap();
        assert_eq!(last.step, UNMOUNTED);
        assert!(last.succeeded());
        assert!(hal.mounted_paths().is_empty());
    }

    #[test]
    fn missing_mount_base_is_a_partial_failure() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::new();
        let cfg = ConditioningConfig {
            mount_base: tmp.path().join("missing"),
            ..ConditioningConfig::default()
        };

        let result = run_conditioning(
            &hal,
            &device(),
            &cfg,
            DefectPolicy::AnyOutput,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.status, TerminalStatus::PartialFailure);
        assert_eq!(result.terminal_step(), MOUNTED);
        assert!(!result.steps[1].is_environment_failure());
        assert!(!hal.has_operation(|op| op.program == "mount"));
    }

    #[test]
    fn dry_run_never_creates_the_mount_directory() {
        let tmp = tempdir().unwrap();
        let cfg = ConditioningConfig {
            mount_base: tmp.path().to_path_buf(),
            ..ConditioningConfig::default()
        };

        let result = run_conditioning(
            &DryRunHal::new(),
            &device(),
            &cfg,
            DefectPolicy::AnyOutput,
            FormatArmToken::for_dry_run(),
        );
        assert_eq!(result.branch, Some(CLEAN));
        assert_eq!(result.status, TerminalStatus::Success);
        assert!(result.steps[1]
            .detail
            .ends_with(&format!("/{}", DRY_RUN_MOUNT_DIR)));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn mount_dir_lives_until_dropped() {
        let tmp = tempdir().unwrap();
        let dir = MountDir::create(tmp.path(), false).unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(MOUNT_DIR_PREFIX)));

        drop(dir);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
