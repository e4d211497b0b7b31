//! Human and JSON rendering of a pipeline run.

use anyhow::{Context, Result};
use mend_workflow::pipeline::{Phase, PipelineResult, StepRecord, StepResult, TerminalStatus};
use std::fmt::Write;

const STEP_WIDTH: usize = 20;

pub fn render_json(result: &PipelineResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize run report")
}

/// One header line, then one line per step in the order attempted.
pub fn render_human(result: &PipelineResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", headline(result));
    for record in result.entries() {
        let _ = writeln!(out, "{}", step_line(record));
    }
    out
}

pub fn headline(result: &PipelineResult) -> String {
    let icon = match result.status {
        TerminalStatus::Success => "✅",
        TerminalStatus::PartialFailure => "⚠️",
        TerminalStatus::Fatal => "❌",
    };
    let mut line = format!("{icon} {}: {}", result.pipeline, result.status);
    if let Some(branch) = result.branch {
        let _ = write!(line, " [{branch}]");
    }
    if result.status != TerminalStatus::Success {
        let _ = write!(line, " at {}", result.terminal_step());
    }
    line
}

pub fn step_line(record: &StepRecord) -> String {
    let mark = if record.succeeded() { "✔" } else { "✖" };
    let phase = match record.phase {
        Phase::Forward => "  ",
        Phase::Unwind => "↩ ",
    };
    let mut line = format!(
        "  {phase}{mark} {:<width$} {}",
        record.step,
        record.detail,
        width = STEP_WIDTH
    );
    if !record.succeeded() {
        let _ = write!(line, " ({})", failure_reason(&record.result));
    }
    line
}

fn failure_reason(result: &StepResult) -> String {
    match result {
        StepResult::Ran(outcome) => {
            let code = match outcome.exit_code {
                Some(code) => format!("exit {code}"),
                None => "killed by signal".to_string(),
            };
            match outcome.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                Some(last) => format!("{code}: {}", last.trim()),
                None => code,
            }
        }
        StepResult::Unavailable { error, .. } => error.clone(),
    }
}
