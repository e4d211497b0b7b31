//! Command runners and mount scoping.
//!
//! Every world-touching action goes through a [`CommandRunner`]: the real one (`LinuxHal`),
//! a logging dry-run (`DryRunHal`) and a recording fake (`FakeHal`).

pub mod dry_run_hal;
pub mod fake_hal;
pub mod guards;
pub mod linux_hal;
pub mod mount_ops;
pub mod process_ops;

pub use dry_run_hal::DryRunHal;
pub use fake_hal::{FakeHal, FakeResponse};
pub use guards::{release, Acquired, MountSession, Release};
pub use linux_hal::{LinuxHal, DEFAULT_ESCALATION};
pub use mount_ops::{mount_spec, umount_spec, MountOptions, MountPoint};
pub use process_ops::{CommandOutcome, CommandRunner, CommandSpec};
