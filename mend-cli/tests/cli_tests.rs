use clap::Parser;
use mend_cli::{exit_code_for, reboot_after_repair, report, run, EXIT_USAGE};
use mend_core::cli::Cli;
use mend_core::config_states::RebootToken;
use mend_core::errors::MendError;
use mend_hal::{FakeHal, FakeResponse};
use mend_workflow::pipeline::{EXIT_ENVIRONMENT, EXIT_PARTIAL_FAILURE};
use mend_workflow::{PipelineResult, TerminalStatus};
use std::fs;
use tempfile::tempdir;

fn cli(args: &[&str], config: &std::path::Path) -> Cli {
    let mut argv = vec!["mend"];
    argv.extend_from_slice(args);
    argv.extend_from_slice(&["--config", config.to_str().unwrap()]);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn condition_without_confirmation_is_refused() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("mend.toml");
    fs::write(&config, "").unwrap();

    let err = run(cli(&["condition", "--device", "/dev/sdb1", "--skip-preflight"], &config))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MendError>(),
        Some(MendError::MissingYesIKnow)
    ));
    assert_eq!(exit_code_for(&err), EXIT_USAGE);
}

#[test]
fn reboot_needs_typed_confirmation() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("mend.toml");
    fs::write(&config, "").unwrap();

    let err = run(cli(
        &[
            "bootloader", "--root", "/dev/sda2", "--efi", "/dev/sda1", "--drive", "/dev/sda",
            "--reboot", "--confirm-reboot", "yes", "--dry-run", "--skip-preflight",
        ],
        &config,
    ))
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MendError>(),
        Some(MendError::MissingRebootConfirmation { .. })
    ));
}

#[test]
fn dry_run_condition_succeeds_without_touching_the_device() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("mend.toml");
    fs::write(
        &config,
        format!(
            "[conditioning]\nmount_base = {:?}\n",
            tmp.path().display().to_string()
        ),
    )
    .unwrap();

    let code = run(cli(
        &["condition", "--device", "/dev/sdb1", "--dry-run", "--skip-preflight", "--json"],
        &config,
    ))
    .unwrap();
    assert_eq!(code, 0);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn unknown_config_keys_are_usage_errors() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("mend.toml");
    fs::write(&config, "[runner]\nescalate = \"doas\"\n").unwrap();

    let err = run(cli(&["preflight", "condition"], &config)).unwrap_err();
    assert_eq!(exit_code_for(&err), EXIT_USAGE);
}

#[test]
fn dry_run_only_warns_when_preflight_fails() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("mend.toml");
    fs::write(
        &config,
        format!(
            "[conditioning]\nmount_base = {:?}\n",
            tmp.path().join("missing").display().to_string()
        ),
    )
    .unwrap();

    let code = run(cli(&["condition", "--device", "/dev/sdb1", "--dry-run"], &config)).unwrap();
    assert_eq!(code, 0);

    let err = run(cli(&["preflight", "condition"], &config)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MendError>(),
        Some(MendError::PreflightFailed(_))
    ));
    assert_eq!(exit_code_for(&err), EXIT_ENVIRONMENT);
}

fn repaired(status: TerminalStatus) -> PipelineResult {
    PipelineResult {
        pipeline: "bootloader",
        branch: None,
        steps: Vec::new(),
        unwind: Vec::new(),
        status,
    }
}

fn reboot_token() -> RebootToken {
    RebootToken::try_new(Some("REBOOT")).unwrap()
}

#[test]
fn reboot_attempt_is_part_of_the_report() {
    let hal = FakeHal::new();
    let mut result = repaired(TerminalStatus::Success);
    reboot_after_repair(&hal, &mut result, reboot_token()).unwrap();

    assert_eq!(result.status, TerminalStatus::Success);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.steps.len(), 1);
    assert!(report::render_json(&result).unwrap().contains("Rebooted"));
}

#[test]
fn failed_reboot_is_a_partial_failure() {
    let hal = FakeHal::new();
    hal.respond_to("systemctl", FakeResponse::exit(1, "Failed to reboot"));
    let mut result = repaired(TerminalStatus::Success);
    reboot_after_repair(&hal, &mut result, reboot_token()).unwrap();

    assert_eq!(result.status, TerminalStatus::PartialFailure);
    assert_eq!(result.exit_code(), EXIT_PARTIAL_FAILURE);
    assert_eq!(result.terminal_step(), "Rebooted");
    assert!(report::render_human(&result).contains("Failed to reboot"));
}

#[test]
fn no_reboot_after_failed_repair() {
    let hal = FakeHal::new();
    let mut result = repaired(TerminalStatus::Fatal);
    reboot_after_repair(&hal, &mut result, reboot_token()).unwrap();

    assert_eq!(hal.operation_count(), 0);
    assert!(result.steps.is_empty());
    assert_eq!(result.status, TerminalStatus::Fatal);
}
