//! Version resolution through the containerized GitVersion tool.

use miruken_release_core::{ReleaseConfig, Result, SecretValue, Version};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::runner::{CommandExecutor, CommandSpec};

/// Mount point of the repository inside the tool container.
pub const CONTAINER_REPO_PATH: &str = "/repo";

/// Asks GitVersion for the semantic version of a checkout.
///
/// The checkout is bind-mounted by its host path. The release job itself may
/// run inside a container, so its own working directory does not name the
/// checkout on the docker host.
pub struct VersionResolver<'a> {
    executor: &'a dyn CommandExecutor,
    image: String,
    timeout: Duration,
    redactions: Vec<SecretValue>,
}

impl<'a> VersionResolver<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, image: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            image: image.into(),
            timeout,
            redactions: Vec::new(),
        }
    }

    pub fn from_config(executor: &'a dyn CommandExecutor, config: &ReleaseConfig) -> Self {
        Self::new(executor, config.git_version_image.clone(), config.command_timeout)
            .with_redaction(config.token.clone())
    }

    /// Mask `secret` in the tool's output and errors.
    pub fn with_redaction(mut self, secret: SecretValue) -> Self {
        self.redactions.push(secret);
        self
    }

    /// The `docker run` invocation for `repository_path`.
    pub fn command(&self, repository_path: &Path) -> CommandSpec {
        let spec = CommandSpec::new("docker")
            .args([
                "run".to_string(),
                "--rm".to_string(),
                "-v".to_string(),
                format!("{}:{CONTAINER_REPO_PATH}", repository_path.display()),
                self.image.clone(),
                CONTAINER_REPO_PATH.to_string(),
                "/showvariable".to_string(),
                "SemVer".to_string(),
            ])
            .timeout(self.timeout);
        self.redactions
            .iter()
            .cloned()
            .fold(spec, CommandSpec::redact)
    }

    pub async fn resolve_version(&self, repository_path: &Path) -> Result<Version> {
        let raw = self.executor.run(&self.command(repository_path)).await?;
        let version = Version::parse_tool_output(&raw)?;
        info!(version = %version, tag = %version.tag_name(), "Resolved version");
        Ok(version)
    }
}
