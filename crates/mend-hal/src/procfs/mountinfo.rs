//! Parsing helpers for `/proc/self/mountinfo`.

use crate::HalResult;
use std::path::{Path, PathBuf};

pub const PROC_MOUNTINFO: &str = "/proc/self/mountinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub source: String,
}

pub fn read_mountinfo() -> HalResult<String> {
    Ok(std::fs::read_to_string(PROC_MOUNTINFO)?)
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            // <id> <parent> <major:minor> <root> <mount point> <opts...> - <fstype> <source> <superopts>
            let (pre, post) = line.split_once(" - ")?;
            let mount_point = pre.split_whitespace().nth(4)?;
            let source = post.split_whitespace().nth(1).unwrap_or_default();
            Some(MountInfo {
                mount_point: PathBuf::from(unescape_mount_path(mount_point)),
                source: unescape_mount_path(source),
            })
        })
        .collect()
}

pub fn is_mounted_from_info(path: &Path, entries: &[MountInfo]) -> bool {
    let target = normalize_path(path);
    entries
        .iter()
        .any(|entry| normalize_path(&entry.mount_point) == target)
}

/// Mount points whose source is exactly `device`.
pub fn mount_points_of(device: &str, entries: &[MountInfo]) -> Vec<PathBuf> {
    let mut points: Vec<PathBuf> = entries
        .iter()
        .filter(|entry| entry.source == device)
        .map(|entry| entry.mount_point.clone())
        .collect();
    points.sort();
    points.dedup();
    points
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}
