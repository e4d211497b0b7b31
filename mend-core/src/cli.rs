//! CLI argument parsing for mend

use crate::config::DefectPolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PipelineKind {
    /// Bootloader reinstallation
    Bootloader,
    /// Storage-device conditioning
    Condition,
}

#[derive(Debug, Parser)]
#[command(name = "mend")]
#[command(about = "🩹 mend - bootloader repair and storage-device conditioning")]
#[command(long_about = "🩹 mend - bootloader repair and storage-device conditioning\n\n\
    Runs a fixed, logged sequence of system tools against one root filesystem or one\n\
    removable device and reports every step it attempted.\n\n\
    Exit codes: 0 success, 1 partial failure, 2 fatal, 3 missing tool, 4 usage/config error.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: /etc/mend/mend.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log every command instead of running it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Skip the required-tools check before a pipeline
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    /// Send the run report to the configured email relay
    #[arg(long, global = true)]
    pub notify: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 🥾 Reinstall the bootloader of an unbootable root filesystem
    Bootloader {
        /// Root partition of the broken system (e.g., /dev/sda2)
        #[arg(long)]
        root: String,

        /// EFI system partition (e.g., /dev/sda1)
        #[arg(long)]
        efi: String,

        /// Whole drive the bootloader is installed to (e.g., /dev/sda)
        #[arg(long)]
        drive: String,

        /// Reboot after a fully successful repair
        #[arg(long)]
        reboot: bool,

        /// Type REBOOT to confirm --reboot
        #[arg(long, requires = "reboot")]
        confirm_reboot: Option<String>,
    },

    /// 💾 Scan a storage device, then reformat it or label it as good
    Condition {
        /// Device or partition to condition (e.g., /dev/sdb1)
        #[arg(long)]
        device: String,

        /// Confirm reformatting when the scan reports defects (required for non-dry-run)
        #[arg(long)]
        yes_i_know: bool,

        /// How scan output is judged (overrides the config file)
        #[arg(long, value_enum)]
        policy: Option<DefectPolicy>,
    },

    /// 🔍 Check that the tools a pipeline needs are installed
    Preflight {
        #[arg(value_enum)]
        pipeline: PipelineKind,

        /// Device to check for existing mounts (condition pipeline)
        #[arg(long)]
        device: Option<String>,
    },
}
