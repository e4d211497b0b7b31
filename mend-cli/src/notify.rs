//! Email relay notification.
//!
//! The relay takes `{name, email, message}` as JSON and answers `200` once the mail is queued.
//! Delivery problems are logged and never change the run's exit code.

use crate::report;
use anyhow::{Context, Result};
use log::{info, warn};
use mend_core::config::RelayConfig;
use mend_workflow::PipelineResult;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub message: String,
}

pub fn send(relay: &RelayConfig, message: String) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent("mend")
        .timeout(Duration::from_secs(relay.timeout_secs))
        .build()?;

    let body = Notification {
        name: &relay.name,
        email: &relay.email,
        message,
    };
    let response = client
        .post(&relay.endpoint)
        .json(&body)
        .send()
        .with_context(|| format!("failed to reach relay {}", relay.endpoint))?;

    let status = response.status();
    if status != StatusCode::OK {
        anyhow::bail!("relay {} answered {}", relay.endpoint, status);
    }
    Ok(())
}

/// Send the run report. Returns whether the relay accepted it.
pub fn notify_run(relay: &RelayConfig, result: &PipelineResult) -> bool {
    match send(relay, report::render_human(result)) {
        Ok(()) => {
            info!("📧 Run report sent to {}", relay.email);
            true
        }
        Err(err) => {
            warn!("📧 Run report not delivered: {:#}", err);
            false
        }
    }
}
