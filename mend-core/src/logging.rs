use env_logger::{Env, Target};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILTER: &str = "info";

/// Initialise logging with stderr output.
pub fn init() {
    init_with(None);
}

/// Initialise logging, appending to `log_file` when given.
///
/// If the file cannot be opened (permissions, read-only FS, etc.) logs fall back to stderr.
/// `RUST_LOG` overrides the default `info` filter. Calling this twice is harmless.
pub fn init_with(log_file: Option<PathBuf>) {
    let target = log_file
        .as_deref()
        .and_then(|path| match open_log_target(path) {
            Ok(target) => Some(target),
            Err(err) => {
                eprintln!(
                    "mend: cannot open log file {}: {err}; logging to stderr",
                    path.display()
                );
                None
            }
        })
        .unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .target(target)
        .try_init();
}

fn open_log_target(path: &Path) -> io::Result<Target> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Target::Pipe(Box::new(file)))
}
