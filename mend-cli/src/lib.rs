//! 🩹 mend binary library: argument handling, reporting and notification around the
//! workflow pipelines.

pub mod notify;
pub mod report;

use anyhow::{Context, Result};
use log::{info, warn};
use mend_core::cli::{Cli, Command, PipelineKind};
use mend_core::config::{self, MendConfig};
use mend_core::config_states::{FormatArmToken, RebootToken};
use mend_core::errors::MendError;
use mend_core::logging;
use mend_hal::{CommandRunner, DeviceId, DryRunHal, LinuxHal};
use mend_workflow::pipeline::EXIT_ENVIRONMENT;
use mend_workflow::preflight::{self, PreflightConfig};
use mend_workflow::{reboot, run_bootloader_repair, run_conditioning, BootloaderTargets};
use mend_workflow::{PipelineResult, TerminalStatus};

/// Exit code for bad arguments, bad configuration or a refused precondition.
pub const EXIT_USAGE: i32 = 4;

/// Exit code for an error returned from [`run`] before any pipeline produced a result.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MendError>() {
        Some(MendError::PreflightFailed(_)) => EXIT_ENVIRONMENT,
        _ => EXIT_USAGE,
    }
}

/// Run the selected subcommand and return the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let cfg = config::load(cli.config.as_deref())?.into_inner();
    logging::init_with(cli.log_file.clone().or_else(|| cfg.runner.log_file.clone()));
    match config::source_path(cli.config.as_deref()) {
        Some(path) => info!("Using config {}", path.display()),
        None => info!("No config at {}; using defaults", config::DEFAULT_CONFIG_PATH),
    }

    let linux = LinuxHal::with_escalation(cfg.runner.escalation());
    let dry_run = DryRunHal::new();
    let runner: &dyn CommandRunner = if cli.dry_run { &dry_run } else { &linux };
    if cli.dry_run {
        info!("DRY RUN: no command will be executed");
    }

    match &cli.command {
        Command::Preflight { pipeline, device } => {
            let device = device.as_deref().map(parse_device).transpose()?;
            check_host(*pipeline, &cfg, device, &linux, false)?;
            println!("✅ Preflight passed");
            Ok(0)
        }
        Command::Bootloader {
            root,
            efi,
            drive,
            reboot: wants_reboot,
            confirm_reboot,
        } => {
            let targets = BootloaderTargets {
                root: parse_device(root)?,
                efi: parse_device(efi)?,
                drive: parse_device(drive)?,
            };
            let reboot_token = if *wants_reboot {
                Some(RebootToken::try_new(confirm_reboot.as_deref())?)
            } else {
                None
            };
            if !cli.skip_preflight {
                check_host(PipelineKind::Bootloader, &cfg, None, &linux, cli.dry_run)?;
            }

            let mut result = run_bootloader_repair(runner, &targets, &cfg.bootloader);
            if let Some(token) = reboot_token {
                // `systemctl reboot` only queues the job, so the report still gets out.
                reboot_after_repair(runner, &mut result, token)?;
            }
            finish(&cli, &cfg, &result)?;
            Ok(result.exit_code())
        }
        Command::Condition {
            device,
            yes_i_know,
            policy,
        } => {
            let device = parse_device(device)?;
            let armed = if cli.dry_run {
                FormatArmToken::for_dry_run()
            } else {
                FormatArmToken::try_new(*yes_i_know)?
            };
            let policy = policy.unwrap_or(cfg.conditioning.policy);
            if !cli.skip_preflight {
                check_host(
                    PipelineKind::Condition,
                    &cfg,
                    Some(device.clone()),
                    &linux,
                    cli.dry_run,
                )?;
            }

            let result = run_conditioning(runner, &device, &cfg.conditioning, policy, armed);
            finish(&cli, &cfg, &result)?;
            Ok(result.exit_code())
        }
    }
}

fn parse_device(raw: &str) -> Result<DeviceId> {
    raw.parse::<DeviceId>()
        .with_context(|| format!("invalid device {raw:?}"))
}

/// Reboot after a successful repair and add the attempt to `result`. A reboot that does not
/// go through turns the run into a partial failure.
pub fn reboot_after_repair<R: CommandRunner + ?Sized>(
    runner: &R,
    result: &mut PipelineResult,
    token: RebootToken,
) -> Result<()> {
    if result.status != TerminalStatus::Success {
        warn!("Not rebooting: repair ended {}", result.status);
        return Ok(());
    }
    let record = reboot::reboot(runner, result, token)?;
    if !record.succeeded() {
        result.status = TerminalStatus::PartialFailure;
    }
    result.steps.push(record);
    Ok(())
}

/// Under `--dry-run` nothing touches the host, so a failed check only warns.
fn check_host(
    pipeline: PipelineKind,
    cfg: &MendConfig,
    device: Option<DeviceId>,
    linux: &LinuxHal,
    dry_run: bool,
) -> Result<()> {
    let preflight_cfg =
        PreflightConfig::for_pipeline(pipeline, cfg, device, linux.escalation_program());
    match preflight::run(&preflight_cfg) {
        Ok(()) => Ok(()),
        Err(err) if dry_run => {
            warn!("DRY RUN: preflight would fail: {err:#}");
            Ok(())
        }
        Err(err) => Err(MendError::PreflightFailed(format!("{err:#}")).into()),
    }
}

fn finish(cli: &Cli, cfg: &MendConfig, result: &PipelineResult) -> Result<()> {
    if cli.json {
        println!("{}", report::render_json(result)?);
    } else {
        print!("{}", report::render_human(result));
    }

    for failed in result.failed_releases() {
        warn!("Still mounted, unmount by hand: {}", failed.detail);
    }

    if cli.notify {
        match &cfg.relay {
            Some(relay) => {
                notify::notify_run(relay, result);
            }
            None => warn!("--notify given but no [relay] section is configured"),
        }
    }
    Ok(())
}
