//! mend workflow orchestration.
//!
//! This crate holds the two repair pipelines and the step journal they share. Pipelines take
//! any [`mend_hal::CommandRunner`], so they run unchanged against real hosts, dry runs and
//! the fake runner used in tests.

pub mod bootloader;
pub mod conditioning;
pub mod pipeline;
pub mod preflight;
pub mod reboot;
pub mod step_runner;

pub use bootloader::{run_bootloader_repair, BootloaderTargets};
pub use conditioning::{run_conditioning, ScanReport};
pub use pipeline::{PipelineResult, Severity, StepRecord, StepResult, TerminalStatus};
