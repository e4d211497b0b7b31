//! Bootloader repair for an unbootable root filesystem.
//!
//! `Init -> RootMounted -> DevBound -> ProcBound -> SysBound -> EfiMounted -> PackagesUpgraded
//! -> BootloaderInstalled -> BootConfigUpdated -> Unmounted -> Done`
//!
//! Every step is fatal. A failure stops the forward sequence and unwinds whatever was mounted,
//! newest first. Commands that must run inside the target are each wrapped in their own
//! `chroot` invocation.

use crate::pipeline::{Phase, PipelineResult, Severity, TerminalStatus, UNMOUNTED};
use crate::step_runner::{StepFailed, StepRunner};
use mend_core::config::BootloaderConfig;
use mend_hal::{CommandRunner, CommandSpec, DeviceId, MountOptions, MountSession};
use std::path::Path;

pub const PIPELINE: &str = "bootloader";

pub const ROOT_MOUNTED: &str = "RootMounted";
pub const DEV_BOUND: &str = "DevBound";
pub const PROC_BOUND: &str = "ProcBound";
pub const SYS_BOUND: &str = "SysBound";
pub const EFI_MOUNTED: &str = "EfiMounted";
pub const PACKAGES_UPGRADED: &str = "PackagesUpgraded";
pub const BOOTLOADER_INSTALLED: &str = "BootloaderInstalled";
pub const BOOT_CONFIG_UPDATED: &str = "BootConfigUpdated";

/// Host pseudo-filesystems bind-mounted into the target, in acquisition order.
const BIND_MOUNTS: [(&str, &str); 3] = [
    (DEV_BOUND, "/dev"),
    (PROC_BOUND, "/proc"),
    (SYS_BOUND, "/sys"),
];

/// Devices the repair operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderTargets {
    /// Root partition of the broken system.
    pub root: DeviceId,
    /// EFI system partition.
    pub efi: DeviceId,
    /// Whole drive the bootloader is written to.
    pub drive: DeviceId,
}

pub fn run_bootloader_repair<R: CommandRunner + ?Sized>(
    runner: &R,
    targets: &BootloaderTargets,
    cfg: &BootloaderConfig,
) -> PipelineResult {
    log::info!(
        "🥾 Bootloader repair: root={} efi={} drive={}",
        targets.root,
        targets.efi,
        targets.drive
    );

    let mut steps = StepRunner::new(runner, PIPELINE);
    let mut session = MountSession::new(runner);

    let status = match forward(&mut steps, &mut session, targets, cfg) {
        Ok(()) => {
            // Release every mount as a forward step; keep going past failures so nothing
            // is left mounted that could have been released.
            let mut released = true;
            while let Some(rel) = session.release_last() {
                released &= steps.record_release(UNMOUNTED, Phase::Forward, Severity::Fatal, rel);
            }
            if released {
                TerminalStatus::Success
            } else {
                TerminalStatus::Fatal
            }
        }
        Err(StepFailed { step, .. }) => {
            log::error!(
                "[{}] {} failed; unmounting {} mount(s)",
                PIPELINE,
                step,
                session.mounted().len()
            );
            for rel in session.unwind() {
                steps.record_release(UNMOUNTED, Phase::Unwind, Severity::Fatal, rel);
            }
            TerminalStatus::Fatal
        }
    };

    steps.finish(status, None)
}

fn forward<R: CommandRunner + ?Sized>(
    steps: &mut StepRunner<'_, R>,
    session: &mut MountSession<'_, R>,
    targets: &BootloaderTargets,
    cfg: &BootloaderConfig,
) -> Result<(), StepFailed> {
    let root = steps.mount(
        session,
        ROOT_MOUNTED,
        Severity::Fatal,
        targets.root.as_str(),
        &cfg.target_root,
        MountOptions::new(),
    )?;

    for (step, source) in BIND_MOUNTS {
        steps.mount(
            session,
            step,
            Severity::Fatal,
            source,
            &root.join(source),
            MountOptions::bind(),
        )?;
    }

    steps.mount(
        session,
        EFI_MOUNTED,
        Severity::Fatal,
        targets.efi.as_str(),
        &root.join(&cfg.efi_directory),
        MountOptions::new(),
    )?;

    for argv in &cfg.upgrade_commands {
        run_in_target(steps, PACKAGES_UPGRADED, argv, root.target())?;
    }

    let install = grub_install_spec(cfg, &targets.drive).chrooted(root.target());
    steps.run(BOOTLOADER_INSTALLED, Severity::Fatal, &install)?;

    run_in_target(steps, BOOT_CONFIG_UPDATED, &cfg.config_command, root.target())?;
    Ok(())
}

fn run_in_target<R: CommandRunner + ?Sized>(
    steps: &mut StepRunner<'_, R>,
    step: &'static str,
    argv: &[String],
    root: &Path,
) -> Result<(), StepFailed> {
    let Some(spec) = CommandSpec::from_argv(argv) else {
        return Err(steps.record_unavailable(
            step,
            Severity::Fatal,
            format!("chroot {}", root.display()),
            "empty command".to_string(),
        ));
    };
    steps.run(step, Severity::Fatal, &spec.chrooted(root))?;
    Ok(())
}

/// `grub-install` as run inside the target root.
pub fn grub_install_spec(cfg: &BootloaderConfig, drive: &DeviceId) -> CommandSpec {
    CommandSpec::new("grub-install")
        .arg(format!("--target={}", cfg.grub_target))
        .arg(format!("--efi-directory={}", cfg.efi_directory.display()))
        .arg(format!("--bootloader-id={}", cfg.bootloader_id))
        .arg("--recheck")
        .arg(drive.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_hal::{FakeHal, FakeResponse};

    fn targets() -> BootloaderTargets {
        BootloaderTargets {
            root: "/dev/sda2".parse().unwrap(),
            efi: "/dev/sda1".parse().unwrap(),
            drive: "/dev/sda".parse().unwrap(),
        }
    }

    #[test]
    fn grub_install_arguments() {
        let spec = grub_install_spec(&BootloaderConfig::default(), &"/dev/sda".parse().unwrap());
        assert_eq!(
            spec.to_string(),
            "grub-install --target=x86_64-efi --efi-directory=/boot --bootloader-id=grub --recheck /dev/sda"
        );
    }

    #[test]
    fn bind_mounts_derive_from_root_mount_point() {
        let hal = FakeHal::new();
        let cfg = BootloaderConfig {
            target_root: "/srv/rescue".into(),
            ..BootloaderConfig::default()
        };
        let result = run_bootloader_repair(&hal, &targets(), &cfg);
        assert_eq!(result.status, TerminalStatus::Success);

        let lines = hal.command_lines();
        assert_eq!(
            &lines[..5],
            &[
                "mount /dev/sda2 /srv/rescue".to_string(),
                "mount --bind /dev /srv/rescue/dev".to_string(),
                "mount --bind /proc /srv/rescue/proc".to_string(),
                "mount --bind /sys /srv/rescue/sys".to_string(),
                "mount /dev/sda1 /srv/rescue/boot".to_string(),
            ]
        );
        assert!(lines.contains(&"chroot /srv/rescue apt update".to_string()));
        assert!(lines.contains(&"chroot /srv/rescue update-grub".to_string()));
    }

    #[test]
    fn root_mount_failure_has_nothing_to_unwind() {
        let hal = FakeHal::new();
        hal.respond_when(
            |spec| spec.program == "mount" && spec.mentions("/dev/sda2"),
            FakeResponse::exit(32, "mount: /mnt: special device /dev/sda2 does not exist."),
        );

        let result = run_bootloader_repair(&hal, &targets(), &BootloaderConfig::default());
        assert_eq!(result.status, TerminalStatus::Fatal);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.terminal_step(), ROOT_MOUNTED);
        assert!(result.unwind.is_empty());
        assert!(!hal.has_operation(|op| op.program == "umount"));
    }

    #[test]
    fn failed_release_on_success_path_is_fatal_but_others_still_run() {
        let hal = FakeHal::new();
        hal.respond_when(
            |spec| spec.program == "umount" && spec.mentions("/mnt/proc"),
            FakeResponse::exit(32, "umount: /mnt/proc: target is busy."),
        );

        let result = run_bootloader_repair(&hal, &targets(), &BootloaderConfig::default());
        assert_eq!(result.status, TerminalStatus::Fatal);
        let releases: Vec<_> = result.steps.iter().filter(|s| s.step == UNMOUNTED).collect();
        assert_eq!(releases.len(), 5);
        assert_eq!(result.failed_releases().len(), 1);
        assert!(hal.has_operation(|op| op.program == "umount" && op.mentions("/mnt")));
    }

    #[test]
    fn custom_upgrade_commands_each_get_their_own_chroot() {
        let hal = FakeHal::new();
        let cfg = BootloaderConfig {
            upgrade_commands: vec![
                vec!["dnf".into(), "-y".into(), "upgrade".into()],
                vec!["dracut".into(), "--regenerate-all".into()],
            ],
            ..BootloaderConfig::default()
        };
        let result = run_bootloader_repair(&hal, &targets(), &cfg);
        assert_eq!(result.status, TerminalStatus::Success);

        let upgrades: Vec<_> = result
            .steps
            .iter()
            .filter(|s| s.step == PACKAGES_UPGRADED)
            .map(|s| s.detail.as_str())
            .collect();
        assert_eq!(
            upgrades,
            vec!["chroot /mnt dnf -y upgrade", "chroot /mnt dracut --regenerate-all"]
        );
    }
}
