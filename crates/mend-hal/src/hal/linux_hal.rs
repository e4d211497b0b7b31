//! Real command runner for Linux hosts.

use super::{CommandOutcome, CommandRunner, CommandSpec};
use crate::{path, HalError, HalResult};
use std::env;
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

pub const DEFAULT_ESCALATION: &str = "sudo";

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct LinuxHal {
    /// Program prepended to elevated commands when not already root. `None` runs them as-is.
    escalate_with: Option<String>,
}

impl Default for LinuxHal {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxHal {
    pub fn new() -> Self {
        Self {
            escalate_with: Some(DEFAULT_ESCALATION.to_string()),
        }
    }

    pub fn with_escalation(escalate_with: Option<String>) -> Self {
        Self { escalate_with }
    }

    /// Program that will actually be spawned for elevated commands, if any.
    pub fn escalation_program(&self) -> Option<&str> {
        if nix::unistd::geteuid().is_root() {
            return None;
        }
        self.escalate_with.as_deref()
    }

    /// Argv to spawn for `spec`. An escalation wrapper reports a missing tool as its own
    /// nonzero exit, so the wrapped program is resolved first.
    fn spawn_argv(
        &self,
        spec: &CommandSpec,
        is_root: bool,
        path_var: &OsStr,
    ) -> HalResult<(String, Vec<String>)> {
        let argv = self.argv_for(spec, is_root);
        if argv.0 != spec.program && path::resolve_program(&spec.program, path_var).is_none() {
            return Err(HalError::CommandNotFound(spec.program.clone()));
        }
        Ok(argv)
    }

    fn argv_for(&self, spec: &CommandSpec, is_root: bool) -> (String, Vec<String>) {
        match &self.escalate_with {
            Some(escalate) if spec.elevated && !is_root => {
                let mut args = Vec::with_capacity(spec.args.len() + 1);
                args.push(spec.program.clone());
                args.extend(spec.args.iter().cloned());
                (escalate.clone(), args)
            }
            _ => (spec.program.clone(), spec.args.clone()),
        }
    }
}

fn map_spawn_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Spawn {
        program: program.to_string(),
        source: err,
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_child(program: &str, child: &mut Child, timeout: Option<Duration>) -> HalResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };
    match child.wait_timeout(timeout)? {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

impl CommandRunner for LinuxHal {
    fn run(&self, spec: &CommandSpec) -> HalResult<CommandOutcome> {
        log::info!("▶ {}", spec);
        let (program, args) = self
            .spawn_argv(
                spec,
                nix::unistd::geteuid().is_root(),
                &env::var_os("PATH").unwrap_or_default(),
            )
            .map_err(|err| {
                log::error!("✖ {}: {}", spec, err);
                err
            })?;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            let err = map_spawn_err(&program, e);
            log::error!("✖ {}: {}", spec, err);
            err
        })?;

        // Drain pipes concurrently to avoid deadlocks on large output.
        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        let status = match wait_child(&spec.program, &mut child, spec.timeout) {
            Ok(status) => status,
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                log::error!("✖ {}: {}", spec, err);
                return Err(err);
            }
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();
        let outcome = CommandOutcome::new(
            status.code(),
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr),
        );

        if outcome.succeeded() {
            log::info!("✔ {} (exit=0)", spec.program);
        } else {
            log::warn!(
                "✖ {} (exit={:?}): {}",
                spec.program,
                outcome.exit_code,
                outcome.stderr.trim()
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_command_not_found() {
        let hal = LinuxHal::with_escalation(None);
        let err = hal
            .run(&CommandSpec::new("mend-definitely-not-a-real-binary-42"))
            .unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(ref p) if p == "mend-definitely-not-a-real-binary-42"));
        assert!(err.is_environment());
    }

    #[test]
    fn nonzero_exit_is_an_outcome_not_an_error() {
        let hal = LinuxHal::with_escalation(None);
        let outcome = hal
            .run(&CommandSpec::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.succeeded());
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[test]
    fn captures_stdout() {
        let hal = LinuxHal::with_escalation(None);
        let outcome = hal
            .run(&CommandSpec::new("sh").args(["-c", "printf hello"]))
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout, "hello");
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let hal = LinuxHal::with_escalation(None);
        let err = hal
            .run(&CommandSpec::new("sleep").arg("5").with_timeout(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, HalError::CommandTimeout { .. }));
    }

    #[test]
    fn elevated_commands_are_wrapped_when_not_root() {
        let hal = LinuxHal::new();
        let spec = CommandSpec::new("badblocks").arg("-v").arg("/dev/sdb1").elevated();

        let (program, args) = hal.argv_for(&spec, false);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["badblocks", "-v", "/dev/sdb1"]);

        let (program, args) = hal.argv_for(&spec, true);
        assert_eq!(program, "badblocks");
        assert_eq!(args, vec!["-v", "/dev/sdb1"]);
    }

    #[test]
    fn missing_tool_behind_escalation_is_command_not_found() {
        let hal = LinuxHal::with_escalation(Some("env".to_string()));
        let spec = CommandSpec::new("mend-definitely-not-a-real-binary-42").elevated();

        let err = hal
            .spawn_argv(&spec, false, OsStr::new("/nonexistent"))
            .unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(ref p) if p == "mend-definitely-not-a-real-binary-42"));
        assert!(err.is_environment());

        // Same outcome through run(), whether or not the test runs as root.
        let err = hal.run(&spec).unwrap_err();
        assert!(err.is_environment());
    }

    #[test]
    fn present_tool_behind_escalation_is_wrapped() {
        let hal = LinuxHal::with_escalation(Some("env".to_string()));
        let spec = CommandSpec::new("sh").args(["-c", "exit 0"]).elevated();

        let (program, args) = hal.spawn_argv(&spec, false, OsStr::new("")).unwrap();
        assert_eq!(program, "env");
        assert_eq!(args, vec!["sh", "-c", "exit 0"]);
        assert!(hal.run(&spec).unwrap().succeeded());
    }

    #[test]
    fn plain_commands_are_never_wrapped() {
        let hal = LinuxHal::new();
        let (program, _) = hal.argv_for(&CommandSpec::new("lsblk"), false);
        assert_eq!(program, "lsblk");
    }
}
