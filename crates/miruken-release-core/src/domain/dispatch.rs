//! Repository dispatch targets, events and delivery reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{FailedTarget, ReleaseError, Result};
use super::version::TagName;

/// A single `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Who receives a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// One repository.
    Repository(RepoRef),
    /// Every repository the organization owns, listed at send time.
    Organization(String),
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Repository(repo) => repo.fmt(f),
            DispatchTarget::Organization(org) => write!(f, "org:{org}"),
        }
    }
}

/// How an organization's repositories are listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectorySource {
    /// GitHub REST API.
    #[default]
    Api,
    /// `gh repo list`.
    GhCli,
}

impl FromStr for DirectorySource {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(DirectorySource::Api),
            "gh" | "gh-cli" => Ok(DirectorySource::GhCli),
            other => Err(ReleaseError::InvalidConfiguration {
                name: "repositoryDirectory".to_string(),
                reason: format!("expected `api` or `gh`, got {other:?}"),
            }),
        }
    }
}

/// The dispatch events this release pipeline knows how to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchEventKind {
    #[default]
    BuiltMiruken,
    MirukenVersionCreated,
}

impl DispatchEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            DispatchEventKind::BuiltMiruken => "built-miruken",
            DispatchEventKind::MirukenVersionCreated => "miruken-version-created",
        }
    }

    /// Build the event announcing `tag`.
    pub fn for_tag(&self, tag: &TagName) -> DispatchEvent {
        match self {
            DispatchEventKind::BuiltMiruken => DispatchEvent::BuiltMiruken {
                miruken_version: tag.clone(),
            },
            DispatchEventKind::MirukenVersionCreated => DispatchEvent::MirukenVersionCreated {
                version: tag.clone(),
            },
        }
    }
}

impl FromStr for DispatchEventKind {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "built-miruken" => Ok(DispatchEventKind::BuiltMiruken),
            "miruken-version-created" => Ok(DispatchEventKind::MirukenVersionCreated),
            other => Err(ReleaseError::InvalidConfiguration {
                name: "dispatchEventType".to_string(),
                reason: format!("unknown event type {other:?}"),
            }),
        }
    }
}

/// A repository dispatch event.
///
/// Serializes to the exact request body of the dispatches endpoint:
/// `{"event_type": "...", "client_payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "client_payload")]
pub enum DispatchEvent {
    #[serde(rename = "built-miruken", rename_all = "camelCase")]
    BuiltMiruken { miruken_version: TagName },

    #[serde(rename = "miruken-version-created")]
    MirukenVersionCreated { version: TagName },
}

impl DispatchEvent {
    pub fn kind(&self) -> DispatchEventKind {
        match self {
            DispatchEvent::BuiltMiruken { .. } => DispatchEventKind::BuiltMiruken,
            DispatchEvent::MirukenVersionCreated { .. } => DispatchEventKind::MirukenVersionCreated,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind().event_type()
    }

    /// The `client_payload` object alone, for logging.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut body| body.get_mut("client_payload").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
    /// Dispatching is switched off for this run.
    Skipped,
}

/// Delivery record for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub target: RepoRef,
    pub outcome: DeliveryOutcome,
}

/// Per-target results of one dispatch step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub event_type: String,
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome == DeliveryOutcome::Delivered)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome == DeliveryOutcome::Skipped)
            .count()
    }

    pub fn failed_targets(&self) -> Vec<FailedTarget> {
        self.deliveries
            .iter()
            .filter_map(|d| match &d.outcome {
                DeliveryOutcome::Failed { reason } => Some(FailedTarget {
                    target: d.target.to_string(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// `PartialDispatchFailure` naming every failed target, if any failed.
    pub fn check(&self) -> Result<()> {
        let failed = self.failed_targets();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::PartialDispatchFailure { failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::version::Version;
    use serde_json::json;

    fn tag(raw: &str) -> TagName {
        Version::parse_tool_output(raw).unwrap().tag_name()
    }

    #[test]
    fn built_miruken_wire_body() {
        let event = DispatchEventKind::BuiltMiruken.for_tag(&tag("2.0.0"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event_type": "built-miruken",
                "client_payload": { "mirukenVersion": "v2.0.0" }
            })
        );
        assert_eq!(event.payload(), json!({ "mirukenVersion": "v2.0.0" }));
    }

    #[test]
    fn version_created_wire_body() {
        let event = DispatchEventKind::MirukenVersionCreated.for_tag(&tag("0.3.1"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event_type": "miruken-version-created",
                "client_payload": { "version": "v0.3.1" }
            })
        );
        assert_eq!(event.event_type(), "miruken-version-created");
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!("built-something".parse::<DispatchEventKind>().is_err());
        assert_eq!(
            "built-miruken".parse::<DispatchEventKind>().unwrap(),
            DispatchEventKind::BuiltMiruken
        );
    }

    #[test]
    fn report_checks_failed_targets() {
        let report = DispatchReport {
            event_type: "built-miruken".to_string(),
            deliveries: vec![
                Delivery {
                    target: RepoRef::new("org", "a"),
                    outcome: DeliveryOutcome::Delivered,
                },
                Delivery {
                    target: RepoRef::new("org", "b"),
                    outcome: DeliveryOutcome::Failed {
                        reason: "HTTP 500".to_string(),
                    },
                },
            ],
        };
        assert_eq!(report.delivered_count(), 1);
        match report.check() {
            Err(ReleaseError::PartialDispatchFailure { failed }) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].target, "org/b");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn skipped_report_passes_check() {
        let report = DispatchReport {
            event_type: "built-miruken".to_string(),
            deliveries: vec![Delivery {
                target: RepoRef::new("y", "x"),
                outcome: DeliveryOutcome::Skipped,
            }],
        };
        assert_eq!(report.skipped_count(), 1);
        assert!(report.check().is_ok());
    }

    #[test]
    fn target_display() {
        assert_eq!(
            DispatchTarget::Repository(RepoRef::new("y", "x")).to_string(),
            "y/x"
        );
        assert_eq!(
            DispatchTarget::Organization("Miruken-Go".to_string()).to_string(),
            "org:Miruken-Go"
        );
    }
}
