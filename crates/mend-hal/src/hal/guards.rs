use super::mount_ops::{mount_spec, umount_spec};
use super::{CommandOutcome, CommandRunner, MountOptions, MountPoint};
use crate::{HalError, HalResult};
use std::path::Path;

/// A successful mount: the new mount point plus the mount command's outcome.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub mount_point: MountPoint,
    pub outcome: CommandOutcome,
}

/// Result of unmounting one mount point.
#[derive(Debug)]
pub struct Release {
    pub mount_point: MountPoint,
    pub result: HalResult<CommandOutcome>,
}

impl Release {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.succeeded())
    }
}

/// Unmount a single mount point.
pub fn release<R: CommandRunner + ?Sized>(runner: &R, mp: &MountPoint) -> HalResult<CommandOutcome> {
    runner.run(&umount_spec(mp.target()))
}

/// Scoped owner of every mount made during one pipeline run.
///
/// Mount points are released in reverse acquisition order, each exactly once: either through
/// [`MountSession::release_last`] / [`MountSession::unwind`], or when the session is dropped.
pub struct MountSession<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    stack: Vec<MountPoint>,
}

impl<'a, R: CommandRunner + ?Sized> MountSession<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            stack: Vec::new(),
        }
    }

    /// Mount `device` on `target`. On failure nothing is recorded for release.
    pub fn acquire(
        &mut self,
        device: &str,
        target: &Path,
        options: MountOptions,
    ) -> HalResult<Acquired> {
        let outcome = self.runner.run(&mount_spec(device, target, &options))?;
        if !outcome.succeeded() {
            return Err(HalError::MountFailed {
                device: device.to_string(),
                target: target.to_path_buf(),
                outcome,
            });
        }

        let mount_point = MountPoint::new(device, target, options);
        self.stack.push(mount_point.clone());
        Ok(Acquired {
            mount_point,
            outcome,
        })
    }

    /// Unmount the most recently acquired mount point.
    pub fn release_last(&mut self) -> Option<Release> {
        let mount_point = self.stack.pop()?;
        let result = release(self.runner, &mount_point);
        Some(Release {
            mount_point,
            result,
        })
    }

    /// Unmount everything still held, newest first. A failed release never stops the rest.
    pub fn unwind(&mut self) -> Vec<Release> {
        let mut releases = Vec::with_capacity(self.stack.len());
        while let Some(rel) = self.release_last() {
            if !rel.succeeded() {
                log::warn!(
                    "failed to unmount {}: {}",
                    rel.mount_point.target().display(),
                    describe_failure(&rel.result)
                );
            }
            releases.push(rel);
        }
        releases
    }

    pub fn mounted(&self) -> &[MountPoint] {
        &self.stack
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl<'a, R: CommandRunner + ?Sized> Drop for MountSession<'a, R> {
    fn drop(&mut self) {
        if self.stack.is_empty() {
            return;
        }
        log::warn!(
            "mount session dropped with {} mount(s) held; unmounting",
            self.stack.len()
        );
        let _ = self.unwind();
    }
}

fn describe_failure(result: &HalResult<CommandOutcome>) -> String {
    match result {
        Ok(outcome) => format!(
            "exit={:?}: {}",
            outcome.exit_code,
            outcome.stderr.trim()
        ),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeHal, FakeResponse};
    use std::path::Path;

    #[test]
    fn session_unmounts_on_drop_in_reverse_order() {
        let hal = FakeHal::new();
        {
            let mut session = MountSession::new(&hal);
            session
                .acquire("/dev/sda2", Path::new("/mnt"), MountOptions::new())
                .unwrap();
            session
                .acquire("/dev", Path::new("/mnt/dev"), MountOptions::bind())
                .unwrap();
            assert_eq!(hal.mounted_paths().len(), 2);
        }

        assert!(hal.mounted_paths().is_empty());
        let lines = hal.command_lines();
        assert_eq!(
            &lines[2..],
            &["umount /mnt/dev".to_string(), "umount /mnt".to_string()]
        );
    }

    #[test]
    fn failed_acquire_is_never_released() {
        let hal = FakeHal::new();
        hal.respond_to("mount", FakeResponse::exit(32, "mount: can't find /dev/nope"));
        {
            let mut session = MountSession::new(&hal);
            let err = session
                .acquire("/dev/nope", Path::new("/mnt"), MountOptions::new())
                .unwrap_err();
            assert!(matches!(err, HalError::MountFailed { .. }));
            assert!(session.is_empty());
        }
        assert!(!hal.has_operation(|op| op.program == "umount"));
    }

    #[test]
    fn unwind_continues_past_failed_release() {
        let hal = FakeHal::new();
        hal.respond_when(
            |spec| spec.program == "umount" && spec.mentions("/mnt/proc"),
            FakeResponse::exit(32, "umount: /mnt/proc: target is busy"),
        );

        let mut session = MountSession::new(&hal);
        for (device, target) in [("/dev/sda2", "/mnt"), ("/proc", "/mnt/proc"), ("/sys", "/mnt/sys")] {
            session
                .acquire(device, Path::new(target), MountOptions::new())
                .unwrap();
        }

        let releases = session.unwind();
        let targets: Vec<_> = releases
            .iter()
            .map(|r| r.mount_point.target().to_path_buf())
            .collect();
        assert_eq!(
            targets,
            vec![
                Path::new("/mnt/sys").to_path_buf(),
                Path::new("/mnt/proc").to_path_buf(),
                Path::new("/mnt").to_path_buf(),
            ]
        );
        assert!(releases[0].succeeded());
        assert!(!releases[1].succeeded());
        assert!(releases[2].succeeded());
        assert!(session.is_empty());
    }

    #[test]
    fn each_mount_is_released_once() {
        let hal = FakeHal::new();
        {
            let mut session = MountSession::new(&hal);
            session
                .acquire("/dev/sdb1", Path::new("/mnt/flash"), MountOptions::new())
                .unwrap();
            assert!(session.release_last().unwrap().succeeded());
            assert!(session.release_last().is_none());
        }
        let umounts = hal
            .operations()
            .iter()
            .filter(|op| op.program == "umount")
            .count();
        assert_eq!(umounts, 1);
    }
}
