//! Process execution.
//!
//! External commands are "world-touching" and must go through a [`CommandRunner`] so the
//! pipelines can be exercised without spawning real processes or touching real devices.

use crate::HalResult;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// One external command: a program plus discrete argument tokens.
///
/// There is deliberately no way to build one from a shell string; arguments are never
/// interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Needs root. Runners escalate when the current user is not root.
    pub elevated: bool,
    /// `None` waits for the command to finish, however long it takes.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevated: false,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a spec from an argv-style list (first token is the program).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    /// Run this command inside `root` as `chroot <root> <program> <args...>`.
    ///
    /// Each in-target command is wrapped on its own; no shell is ever held open inside the
    /// chroot.
    pub fn chrooted(self, root: &Path) -> Self {
        let mut wrapped = CommandSpec::new("chroot")
            .path_arg(root)
            .arg(self.program)
            .args(self.args);
        wrapped.elevated = true;
        wrapped.timeout = self.timeout;
        wrapped
    }

    /// True when the program or any argument is exactly `token`.
    pub fn mentions(&self, token: &str) -> bool {
        self.program == token || self.args.iter().any(|a| a == token)
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Terminal result of a command that was actually started.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn new(exit_code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(Some(0), "", "")
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, the way a terminal would interleave them for a quiet tool.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !self.stderr.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// External command runner.
///
/// A nonzero exit status is reported through [`CommandOutcome`], never as an error. `Err` is
/// reserved for commands that could not be run at all.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> HalResult<CommandOutcome>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> HalResult<CommandOutcome> {
        (**self).run(spec)
    }

    fn is_dry_run(&self) -> bool {
        (**self).is_dry_run()
    }
}
