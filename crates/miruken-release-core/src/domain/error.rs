//! Error taxonomy for a release run.

use std::fmt;
use std::time::Duration;

/// Why an external command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The process ran and exited with a non-zero code.
    ExitCode(i32),
    /// The process was terminated without an exit code (signal).
    Terminated,
    /// The process could not be started at all.
    Launch(String),
    /// The process exceeded its time budget and was killed.
    TimedOut { after: Duration },
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::ExitCode(code) => write!(f, "exit code {code}"),
            CommandFailure::Terminated => write!(f, "terminated by signal"),
            CommandFailure::Launch(reason) => write!(f, "failed to launch: {reason}"),
            CommandFailure::TimedOut { after } => write!(f, "timed out after {after:?}"),
        }
    }
}

/// A dispatch target that did not receive its event.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FailedTarget {
    /// `owner/repo` of the target.
    pub target: String,
    /// Status code or transport error.
    pub reason: String,
}

impl fmt::Display for FailedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.target, self.reason)
    }
}

/// Errors that end (or, for tolerated partial dispatch, annotate) a release run.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("missing configuration: {}", .names.join(", "))]
    MissingConfiguration { names: Vec<String> },

    #[error("invalid configuration {name}: {reason}")]
    InvalidConfiguration { name: String, reason: String },

    #[error("command `{command}` failed ({failure})\n{stderr_tail}")]
    CommandFailed {
        command: String,
        failure: CommandFailure,
        stderr_tail: String,
    },

    #[error("invalid version output: {raw:?}")]
    InvalidVersionOutput { raw: String },

    #[error("tag {tag} already exists")]
    TagAlreadyExists { tag: String },

    #[error("authentication rejected by remote {remote}: {detail}")]
    AuthenticationFailed { remote: String, detail: String },

    #[error("failed to push tag {tag}: {detail}")]
    PushFailed { tag: String, detail: String },

    #[error("failed to list repositories of {organization}: {reason}")]
    TargetResolutionFailed {
        organization: String,
        reason: String,
    },

    #[error("dispatch failed for {} target(s): {}", .failed.len(), render_failed(.failed))]
    PartialDispatchFailure { failed: Vec<FailedTarget> },

    #[error("http client error: {0}")]
    HttpClient(String),
}

fn render_failed(failed: &[FailedTarget]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReleaseError {
    /// Whether the run may still succeed when this error is tolerated.
    pub fn is_partial_dispatch(&self) -> bool {
        matches!(self, ReleaseError::PartialDispatchFailure { .. })
    }
}

/// Result type for release operations.
pub type Result<T> = std::result::Result<T, ReleaseError>;
