//! Release orchestration.
//!
//! A run moves through `Validating -> Testing -> VersionResolving -> Tagging
//! -> Dispatching -> Done`. Each step is awaited before the next starts and
//! the first error moves the run to `Failed`; no later step executes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use miruken_release_core::obs;
use miruken_release_core::{
    DirectorySource, DispatchReport, EnvSnapshot, FailedTarget, ReleaseConfig, ReleaseError,
    Result, TagName,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::dispatch::{DispatchNotifier, RepoDirectory};
use crate::gh_cli::GhCliDirectory;
use crate::git::{GitTagger, Tagger};
use crate::github::GithubClient;
use crate::runner::{CommandExecutor, ProcessRunner};
use crate::stage::{self, ReleaseStage};
use crate::version::VersionResolver;

/// Collaborators a release run drives.
pub struct ReleaseServices {
    pub executor: Arc<dyn CommandExecutor>,
    pub tagger: Arc<dyn Tagger>,
    pub notifier: DispatchNotifier,
}

impl ReleaseServices {
    /// Child processes, the `git` CLI and the GitHub REST API.
    pub fn production(config: &ReleaseConfig) -> Result<Self> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessRunner);
        let github = Arc::new(GithubClient::from_config(config)?);

        let directory: Arc<dyn RepoDirectory> = match config.directory_source {
            DirectorySource::Api => github.clone() as Arc<dyn RepoDirectory>,
            DirectorySource::GhCli => {
                Arc::new(GhCliDirectory::from_config(executor.clone(), config))
            }
        };

        let notifier = DispatchNotifier::new(github, directory)
            .with_concurrency(config.dispatch_concurrency)
            .skip_sending(config.skip_dispatch);

        Ok(Self {
            tagger: Arc::new(GitTagger::from_config(executor.clone(), config)),
            executor,
            notifier,
        })
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    pub run_id: String,
    pub tag: TagName,
    pub dispatch: DispatchReport,
    /// Failed deliveries the run was configured to tolerate.
    pub tolerated_failures: Vec<FailedTarget>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal state of a release run.
#[derive(Debug)]
pub enum RunResult {
    Success(ReleaseSummary),
    Failure {
        run_id: String,
        /// Stage that was executing when the error occurred.
        stage: ReleaseStage,
        error: ReleaseError,
    },
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success(_))
    }

    /// One-line JSON rendering: the summary on success, otherwise the run
    /// id, failing stage and error message.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            RunResult::Success(summary) => serde_json::to_string(summary),
            RunResult::Failure {
                run_id,
                stage,
                error,
            } => serde_json::to_string(&serde_json::json!({
                "run_id": run_id,
                "stage": stage,
                "error": error.to_string(),
            })),
        }
    }

    /// Process exit status for this result.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunResult::Success(_) => 0,
            RunResult::Failure { .. } => 1,
        }
    }
}

/// Drives one release run through its stages.
pub struct ReleaseOrchestrator {
    run_id: String,
    stage: ReleaseStage,
}

impl Default for ReleaseOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseOrchestrator {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4().to_string())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stage: ReleaseStage::Validating,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> ReleaseStage {
        self.stage
    }

    /// Validate `env`, build collaborators with `wire`, then run every stage.
    ///
    /// `wire` runs only after validation succeeds, so no collaborator exists
    /// (and no side effect can happen) for an invalid environment.
    pub async fn run<F>(mut self, env: &EnvSnapshot, wire: F) -> RunResult
    where
        F: FnOnce(&ReleaseConfig) -> Result<ReleaseServices>,
    {
        let span = obs::run_span(&self.run_id);
        let started = Instant::now();
        let started_at = Utc::now();

        let outcome = self
            .execute(env, wire, started_at)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match outcome {
            Ok(summary) => {
                obs::emit_release_finished(
                    &self.run_id,
                    summary.tag.as_str(),
                    started.elapsed().as_millis() as u64,
                );
                RunResult::Success(summary)
            }
            Err(error) => {
                let stage = self.stage;
                obs::emit_release_failed(&self.run_id, stage.name(), &error);
                RunResult::Failure {
                    run_id: self.run_id,
                    stage,
                    error,
                }
            }
        })
    }

    async fn execute<F>(
        &mut self,
        env: &EnvSnapshot,
        wire: F,
        started_at: DateTime<Utc>,
    ) -> Result<ReleaseSummary>
    where
        F: FnOnce(&ReleaseConfig) -> Result<ReleaseServices>,
    {
        obs::emit_stage_entered(self.stage.name());
        let config = ReleaseConfig::resolve(env)?;
        obs::emit_release_started(&self.run_id, &config.git_ref);
        let services = wire(&config)?;

        self.advance();
        obs::header("Building miruken");
        services
            .executor
            .run(&stage::test_command(&config))
            .await?;

        self.advance();
        let version = VersionResolver::from_config(services.executor.as_ref(), &config)
            .resolve_version(&config.repository_path)
            .await?;
        let tag = version.tag_name();

        self.advance();
        services.tagger.tag_and_push(&tag).await?;

        self.advance();
        let event = config.event_kind.for_tag(&tag);
        let dispatch = services
            .notifier
            .send_dispatch(&config.dispatch_target, &event)
            .await?;
        let tolerated_failures = match dispatch.check() {
            Ok(()) => Vec::new(),
            Err(e) if config.tolerate_dispatch_failures => {
                warn!(error = %e, "Continuing past failed dispatches");
                dispatch.failed_targets()
            }
            Err(e) => return Err(e),
        };

        self.advance();
        Ok(ReleaseSummary {
            run_id: self.run_id.clone(),
            tag,
            dispatch,
            tolerated_failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            self.stage = next;
            obs::emit_stage_entered(next.name());
        }
    }
}
