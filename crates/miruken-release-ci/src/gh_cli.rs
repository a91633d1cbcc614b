//! Organization listing through the `gh` CLI.

use async_trait::async_trait;
use miruken_release_core::{ReleaseConfig, ReleaseError, RepoRef, Result, SecretValue};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::RepoDirectory;
use crate::runner::{CommandExecutor, CommandSpec};

/// Upper bound on repositories `gh repo list` returns. A listing that
/// reaches it may be truncated and is rejected.
pub const LIST_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedRepo {
    name: String,
    #[serde(default)]
    is_archived: bool,
}

/// [`RepoDirectory`] that shells out to `gh repo list`.
pub struct GhCliDirectory {
    executor: Arc<dyn CommandExecutor>,
    token: SecretValue,
    timeout: Duration,
}

impl GhCliDirectory {
    pub fn new(executor: Arc<dyn CommandExecutor>, token: SecretValue, timeout: Duration) -> Self {
        Self {
            executor,
            token,
            timeout,
        }
    }

    pub fn from_config(executor: Arc<dyn CommandExecutor>, config: &ReleaseConfig) -> Self {
        Self::new(executor, config.token.clone(), config.command_timeout)
    }

    pub fn command(&self, organization: &str) -> CommandSpec {
        CommandSpec::new("gh")
            .args([
                "repo".to_string(),
                "list".to_string(),
                organization.to_string(),
                "--json".to_string(),
                "name,isArchived".to_string(),
                "--limit".to_string(),
                LIST_LIMIT.to_string(),
            ])
            .secret_env("GH_TOKEN", self.token.clone())
            .timeout(self.timeout)
    }
}

#[async_trait]
impl RepoDirectory for GhCliDirectory {
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepoRef>> {
        let resolution_failed = |reason: String| ReleaseError::TargetResolutionFailed {
            organization: organization.to_string(),
            reason,
        };

        let raw = self
            .executor
            .run(&self.command(organization))
            .await
            .map_err(|e| resolution_failed(e.to_string()))?;

        let listed: Vec<ListedRepo> = serde_json::from_str(&raw)
            .map_err(|e| resolution_failed(format!("invalid `gh repo list` output: {e}")))?;
        if listed.len() >= LIST_LIMIT {
            return Err(resolution_failed(format!(
                "`gh repo list` returned {} repositories, the listing may be truncated at {LIST_LIMIT}",
                listed.len()
            )));
        }

        Ok(listed
            .into_iter()
            .filter(|r| !r.is_archived)
            .map(|r| RepoRef::new(organization, r.name))
            .collect())
    }
}
