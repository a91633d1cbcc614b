//! Structured log events for the release lifecycle.
//!
//! Every function here emits one `tracing` event with an `event` field so
//! JSON output can be filtered by lifecycle step. Secret values never reach
//! these functions; callers pass names or already-redacted text.

use tracing::{info, warn};

use crate::domain::config::{Secrets, Variables};
use crate::domain::dispatch::{DispatchEvent, RepoRef};
use crate::domain::secret::{redact_all, SecretValue, MASK};

/// Span tagged with the release run id. Attach with `Instrument::instrument`
/// so every event of the run carries `run_id`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("release.run", run_id = %run_id)
}

/// Section header in the run log.
pub fn header(title: &str) {
    info!("==== {title} ====");
}

/// Log every resolved configuration value, masking any secret it embeds.
pub fn print_variables(variables: &Variables, secrets: &[SecretValue]) {
    for value in variables.iter() {
        let shown = match value.value.as_deref() {
            Some(raw) => redact_all(secrets, raw),
            None => "<unset>".to_string(),
        };
        info!(
            event = "config.variable",
            name = %value.name,
            required = value.required,
            value = %shown,
        );
    }
}

/// Log every resolved secret by name, with the value masked.
pub fn print_secrets(secrets: &Secrets) {
    for name in secrets.names() {
        info!(event = "config.secret", name = %name, value = %MASK);
    }
}

pub fn emit_release_started(run_id: &str, git_ref: &str) {
    info!(event = "release.started", run_id = %run_id, git_ref = %git_ref);
}

pub fn emit_stage_entered(stage: &str) {
    info!(event = "release.stage", stage = %stage);
}

pub fn emit_release_finished(run_id: &str, tag: &str, duration_ms: u64) {
    info!(
        event = "release.finished",
        run_id = %run_id,
        tag = %tag,
        duration_ms = duration_ms,
    );
    info!("Script completed successfully");
}

pub fn emit_release_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "release.failed",
        run_id = %run_id,
        stage = %stage,
        error = %error,
    );
    tracing::error!("Script Failed");
}

pub fn emit_dispatch_sent(target: &RepoRef, event: &DispatchEvent) {
    info!(
        event = "dispatch.sent",
        target = %target,
        event_type = %event.event_type(),
        payload = %event.payload(),
        "Sent [{}] repository dispatch to [{}]",
        event.event_type(),
        target,
    );
}

pub fn emit_dispatch_failed(target: &RepoRef, event: &DispatchEvent, reason: &str) {
    warn!(
        event = "dispatch.failed",
        target = %target,
        event_type = %event.event_type(),
        reason = %reason,
    );
}

pub fn emit_dispatch_skipped(target: &RepoRef, event: &DispatchEvent) {
    info!(
        event = "dispatch.skipped",
        target = %target,
        event_type = %event.event_type(),
        payload = %event.payload(),
        "Skipping [{}] repository dispatch to [{}]",
        event.event_type(),
        target,
    );
}
