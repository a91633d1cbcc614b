//! Repository dispatch fan-out.
//!
//! A [`DispatchNotifier`] expands a [`DispatchTarget`] into repositories and
//! sends one event to each. Targets are independent: a failed delivery is
//! recorded in the [`DispatchReport`] and the remaining targets are still
//! attempted. Failing to list an organization's repositories is fatal, since
//! a partial target list cannot be told apart from a complete one.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use miruken_release_core::obs;
use miruken_release_core::{
    Delivery, DeliveryOutcome, DispatchEvent, DispatchReport, DispatchTarget, RepoRef, Result,
};
use std::sync::Arc;
use tracing::info;

/// Why one delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends a dispatch event to one repository.
#[async_trait]
pub trait DispatchSender: Send + Sync {
    async fn send(
        &self,
        target: &RepoRef,
        event: &DispatchEvent,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Lists the repositories an organization currently owns.
#[async_trait]
pub trait RepoDirectory: Send + Sync {
    /// Fails with `TargetResolutionFailed` when the listing is unavailable.
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepoRef>>;
}

/// Fans a dispatch event out to every resolved target.
pub struct DispatchNotifier {
    sender: Arc<dyn DispatchSender>,
    directory: Arc<dyn RepoDirectory>,
    concurrency: usize,
    skip: bool,
}

impl DispatchNotifier {
    pub fn new(sender: Arc<dyn DispatchSender>, directory: Arc<dyn RepoDirectory>) -> Self {
        Self {
            sender,
            directory,
            concurrency: 1,
            skip: false,
        }
    }

    /// Deliver to at most `concurrency` targets at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolve and log targets without sending anything.
    pub fn skip_sending(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Expand `target` into the repositories that should receive the event.
    pub async fn resolve_targets(&self, target: &DispatchTarget) -> Result<Vec<RepoRef>> {
        match target {
            DispatchTarget::Repository(repo) => Ok(vec![repo.clone()]),
            DispatchTarget::Organization(org) => {
                let repos = self.directory.list_repositories(org).await?;
                info!(organization = %org, count = repos.len(), "Resolved dispatch targets");
                Ok(repos)
            }
        }
    }

    /// Send `event` to every repository `target` names.
    ///
    /// Returns the per-target report; callers decide whether failed
    /// deliveries are fatal via [`DispatchReport::check`].
    pub async fn send_dispatch(
        &self,
        target: &DispatchTarget,
        event: &DispatchEvent,
    ) -> Result<DispatchReport> {
        let repos = self.resolve_targets(target).await?;

        let deliveries = if self.skip {
            repos
                .into_iter()
                .map(|repo| {
                    obs::emit_dispatch_skipped(&repo, event);
                    Delivery {
                        target: repo,
                        outcome: DeliveryOutcome::Skipped,
                    }
                })
                .collect()
        } else {
            let sender = &self.sender;
            stream::iter(repos)
                .map(|repo| async move {
                    let outcome = match sender.send(&repo, event).await {
                        Ok(()) => {
                            obs::emit_dispatch_sent(&repo, event);
                            DeliveryOutcome::Delivered
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            obs::emit_dispatch_failed(&repo, event, &reason);
                            DeliveryOutcome::Failed { reason }
                        }
                    };
                    Delivery {
                        target: repo,
                        outcome,
                    }
                })
                .buffered(self.concurrency)
                .collect::<Vec<_>>()
                .await
        };

        Ok(DispatchReport {
            event_type: event.event_type().to_string(),
            deliveries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miruken_release_core::{ReleaseError, Version};
    use std::sync::Mutex;

    struct RecordingSender {
        failing: Vec<&'static str>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DispatchSender for RecordingSender {
        async fn send(
            &self,
            target: &RepoRef,
            _event: &DispatchEvent,
        ) -> std::result::Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(target.to_string());
            if self.failing.contains(&target.repo.as_str()) {
                Err(DeliveryError::Status {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct StaticDirectory(Option<Vec<&'static str>>);

    #[async_trait]
    impl RepoDirectory for StaticDirectory {
        async fn list_repositories(&self, organization: &str) -> Result<Vec<RepoRef>> {
            match &self.0 {
                Some(names) => Ok(names.iter().map(|n| RepoRef::new(organization, *n)).collect()),
                None => Err(ReleaseError::TargetResolutionFailed {
                    organization: organization.to_string(),
                    reason: "HTTP 404".to_string(),
                }),
            }
        }
    }

    fn event() -> DispatchEvent {
        let tag = Version::parse_tool_output("2.0.0").unwrap().tag_name();
        DispatchEvent::BuiltMiruken {
            miruken_version: tag,
        }
    }

    fn notifier(
        failing: Vec<&'static str>,
        repos: Option<Vec<&'static str>>,
    ) -> (DispatchNotifier, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender {
            failing,
            sent: Mutex::new(Vec::new()),
        });
        let notifier = DispatchNotifier::new(sender.clone(), Arc::new(StaticDirectory(repos)));
        (notifier, sender)
    }

    #[tokio::test]
    async fn single_repository_target_sends_once() {
        let (notifier, sender) = notifier(vec![], None);
        let report = notifier
            .send_dispatch(
                &DispatchTarget::Repository(RepoRef::new("y", "x")),
                &event(),
            )
            .await
            .unwrap();

        assert_eq!(*sender.sent.lock().unwrap(), vec!["y/x".to_string()]);
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.event_type, "built-miruken");
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let (notifier, sender) = notifier(vec!["b"], Some(vec!["a", "b", "c"]));
        let notifier = notifier.with_concurrency(2);
        let report = notifier
            .send_dispatch(&DispatchTarget::Organization("org".to_string()), &event())
            .await
            .unwrap();

        let mut sent = sender.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["org/a", "org/b", "org/c"]);

        let targets: Vec<String> = report.deliveries.iter().map(|d| d.target.to_string()).collect();
        assert_eq!(targets, vec!["org/a", "org/b", "org/c"]);
        assert_eq!(report.delivered_count(), 2);

        let failed = report.failed_targets();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, "org/b");
        assert!(matches!(
            report.check(),
            Err(ReleaseError::PartialDispatchFailure { .. })
        ));
    }

    #[tokio::test]
    async fn directory_failure_is_fatal() {
        let (notifier, sender) = notifier(vec![], None);
        let err = notifier
            .send_dispatch(&DispatchTarget::Organization("org".to_string()), &event())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::TargetResolutionFailed { .. }));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_reports_targets_without_sending() {
        let (notifier, sender) = notifier(vec![], Some(vec!["a", "b"]));
        let report = notifier
            .skip_sending(true)
            .send_dispatch(&DispatchTarget::Organization("org".to_string()), &event())
            .await
            .unwrap();

        assert!(sender.sent.lock().unwrap().is_empty());
        assert_eq!(report.skipped_count(), 2);
        assert!(report.check().is_ok());
    }
}
