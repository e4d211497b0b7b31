//! Fake runner for testing.
//!
//! Records every command without executing it, so workflows can be tested in CI without root
//! privileges or real hardware. Responses are scripted per command with predicates.

use super::{CommandOutcome, CommandRunner, CommandSpec};
use crate::{HalError, HalResult};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

/// What a scripted command does when run.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Outcome(CommandOutcome),
    /// Behave as if the executable does not exist.
    NotFound,
}

impl FakeResponse {
    pub fn ok() -> Self {
        FakeResponse::Outcome(CommandOutcome::success())
    }

    pub fn ok_with_output(stdout: &str, stderr: &str) -> Self {
        FakeResponse::Outcome(CommandOutcome::new(Some(0), stdout, stderr))
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        FakeResponse::Outcome(CommandOutcome::new(Some(code), "", stderr))
    }
}

#[derive(Default)]
struct FakeHalState {
    operations: Vec<CommandSpec>,
    mounted_paths: BTreeSet<PathBuf>,
    rules: Vec<(Matcher, FakeResponse)>,
}

/// Fake runner that records operations instead of executing them.
///
/// Unscripted commands succeed with empty output. `mount`/`umount` successes are tracked so
/// tests can assert that nothing was left mounted.
#[derive(Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl fmt::Debug for FakeHal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeHal")
            .field("operations", &state.operations.len())
            .field("mounted_paths", &state.mounted_paths)
            .finish()
    }
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Script the response for every command matching `matcher`. Earlier rules win.
    pub fn respond_when(
        &self,
        matcher: impl Fn(&CommandSpec) -> bool + Send + Sync + 'static,
        response: FakeResponse,
    ) -> &Self {
        self.lock().rules.push((Box::new(matcher), response));
        self
    }

    /// Script the response for every command that mentions `token` (program or argument).
    pub fn respond_to(&self, token: &str, response: FakeResponse) -> &Self {
        let token = token.to_string();
        self.respond_when(move |spec| spec.mentions(&token), response)
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<CommandSpec> {
        self.lock().operations.clone()
    }

    /// Recorded operations rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().operations.iter().map(|op| op.to_string()).collect()
    }

    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    pub fn has_operation(&self, check: impl Fn(&CommandSpec) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        self.lock().mounted_paths.iter().cloned().collect()
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.lock().mounted_paths.contains(path)
    }

    /// Clear recorded operations and mount state; scripted responses are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.operations.clear();
        state.mounted_paths.clear();
    }

    fn track_mounts(state: &mut FakeHalState, spec: &CommandSpec) {
        let Some(target) = spec.args.last().map(PathBuf::from) else {
            return;
        };
        match spec.program.as_str() {
            "mount" => {
                state.mounted_paths.insert(target);
            }
            "umount" => {
                state.mounted_paths.remove(&target);
            }
            _ => {}
        }
    }
}

impl CommandRunner for FakeHal {
    fn run(&self, spec: &CommandSpec) -> HalResult<CommandOutcome> {
        let mut state = self.lock();
        state.operations.push(spec.clone());

        let response = state
            .rules
            .iter()
            .find(|(matcher, _)| matcher(spec))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(FakeResponse::ok);

        match response {
            FakeResponse::NotFound => {
                log::info!("FAKE HAL: {} (not found)", spec);
                Err(HalError::CommandNotFound(spec.program.clone()))
            }
            FakeResponse::Outcome(outcome) => {
                log::info!("FAKE HAL: {} (exit={:?})", spec, outcome.exit_code);
                if outcome.succeeded() {
                    Self::track_mounts(&mut state, spec);
                }
                Ok(outcome)
            }
        }
    }
}
