//! Mount and unmount command construction.

use super::CommandSpec;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Mount options and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountOptions {
    /// `mount --bind`
    pub bind: bool,
    /// Filesystem type (e.g. `"ext4"`, `"vfat"`); `None` lets mount probe.
    pub fstype: Option<String>,
    /// Additional mount options as a comma-separated string (e.g. `"ro,noexec"`)
    pub options: Option<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind() -> Self {
        Self {
            bind: true,
            ..Self::default()
        }
    }

    pub fn with_fstype(mut self, fstype: impl Into<String>) -> Self {
        self.fstype = Some(fstype.into());
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }
}

/// A filesystem mounted by a [`super::MountSession`].
///
/// The session, not this value, carries the obligation to unmount; a `MountPoint` can be
/// cloned freely and handed to later steps to derive paths from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPoint {
    device: String,
    target: PathBuf,
    options: MountOptions,
}

impl MountPoint {
    pub(crate) fn new(device: impl Into<String>, target: impl Into<PathBuf>, options: MountOptions) -> Self {
        Self {
            device: device.into(),
            target: target.into(),
            options,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// Path below this mount point. Absolute `rel` paths are re-rooted here.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        let rel = rel.as_ref();
        self.target.join(rel.strip_prefix("/").unwrap_or(rel))
    }
}

pub fn mount_spec(device: &str, target: &Path, options: &MountOptions) -> CommandSpec {
    let mut spec = CommandSpec::new("mount").elevated();
    if options.bind {
        spec = spec.arg("--bind");
    }
    if let Some(fstype) = &options.fstype {
        spec = spec.args(["-t", fstype.as_str()]);
    }
    if let Some(opts) = &options.options {
        spec = spec.args(["-o", opts.as_str()]);
    }
    spec.arg(device).path_arg(target)
}

pub fn umount_spec(target: &Path) -> CommandSpec {
    CommandSpec::new("umount").elevated().path_arg(target)
}
