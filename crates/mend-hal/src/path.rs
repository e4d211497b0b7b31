//! Executable lookup on `PATH`.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Directories sudo searches by default (`secure_path`). Administrative tools such as
/// `badblocks` live here even when an unprivileged `PATH` leaves them out.
pub const SECURE_PATH: &[&str] = &[
    "/usr/local/sbin",
    "/usr/local/bin",
    "/usr/sbin",
    "/usr/bin",
    "/sbin",
    "/bin",
];

/// `path_var` entries followed by [`SECURE_PATH`], without duplicates.
pub fn search_dirs(path_var: &OsStr) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in env::split_paths(path_var).chain(SECURE_PATH.iter().map(PathBuf::from)) {
        if !dir.as_os_str().is_empty() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

pub fn find_in_paths(binary: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Locate `program` the way an escalation wrapper would. Names containing `/` are taken
/// as paths.
pub fn resolve_program(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    find_in_paths(program, &search_dirs(path_var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_dirs_appends_secure_path_once() {
        let dirs = search_dirs(OsStr::new("/opt/tools:/usr/bin"));
        assert_eq!(dirs[0], PathBuf::from("/opt/tools"));
        assert_eq!(dirs[1], PathBuf::from("/usr/bin"));
        assert_eq!(dirs.iter().filter(|d| d.as_path() == Path::new("/usr/bin")).count(), 1);
        assert!(dirs.contains(&PathBuf::from("/usr/sbin")));
    }

    #[test]
    fn resolves_shell_without_path() {
        assert!(resolve_program("sh", OsStr::new("")).is_some());
        assert!(resolve_program("/bin/sh", OsStr::new("")).is_some());
    }

    #[test]
    fn missing_program_does_not_resolve() {
        assert!(resolve_program("mend-definitely-not-a-real-binary-42", OsStr::new("/nonexistent")).is_none());
        assert!(resolve_program("/nonexistent/badblocks", OsStr::new("")).is_none());
    }
}
