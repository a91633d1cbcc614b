//! Annotated tag creation and push.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use miruken_release_core::{CommandFailure, ReleaseConfig, ReleaseError, Result, SecretValue, TagName};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::runner::{CommandExecutor, CommandSpec};

/// Identity used for the annotated tag when the checkout has none configured.
pub const DEFAULT_TAGGER_NAME: &str = "miruken-release";
pub const DEFAULT_TAGGER_EMAIL: &str = "release@miruken.com";

/// Header key `actions/checkout` persists for GitHub remotes.
const GITHUB_EXTRAHEADER_KEY: &str = "http.https://github.com/.extraheader";

/// Publishes a tag for the current commit.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Create `tag` at `HEAD` and push it to the remote.
    ///
    /// Fails with `TagAlreadyExists` when the tag is present locally or on
    /// the remote; nothing is overwritten.
    async fn tag_and_push(&self, tag: &TagName) -> Result<()>;
}

/// [`Tagger`] backed by the `git` CLI.
///
/// Every call passes `-c safe.directory=<workspace>` so checkouts owned by
/// another user (container mounts) work without touching global config.
/// The credential travels as an `http.extraheader` set through `GIT_CONFIG_*`
/// environment variables, never on the command line.
pub struct GitTagger {
    executor: Arc<dyn CommandExecutor>,
    workspace: PathBuf,
    remote: String,
    token: Option<SecretValue>,
    timeout: Duration,
}

impl GitTagger {
    pub fn new(executor: Arc<dyn CommandExecutor>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            workspace: workspace.into(),
            remote: "origin".to_string(),
            token: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(executor: Arc<dyn CommandExecutor>, config: &ReleaseConfig) -> Self {
        Self::new(executor, config.workspace_path.clone())
            .with_remote(config.git_remote.clone())
            .with_token(config.token.clone())
            .with_timeout(config.command_timeout)
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_token(mut self, token: SecretValue) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new("git")
            .arg("-c")
            .arg(format!("safe.directory={}", self.workspace.display()))
            .args(args)
            .current_dir(&self.workspace)
            .env("GIT_TERMINAL_PROMPT", "0")
            .timeout(self.timeout);

        if let Some(token) = &self.token {
            // An empty value resets the header list, dropping the one a
            // checkout step persisted for the same URL.
            spec = spec
                .env("GIT_CONFIG_COUNT", "3")
                .env("GIT_CONFIG_KEY_0", "http.extraheader")
                .secret_env("GIT_CONFIG_VALUE_0", auth_header(token))
                .env("GIT_CONFIG_KEY_1", GITHUB_EXTRAHEADER_KEY)
                .env("GIT_CONFIG_VALUE_1", "")
                .env("GIT_CONFIG_KEY_2", GITHUB_EXTRAHEADER_KEY)
                .secret_env("GIT_CONFIG_VALUE_2", auth_header(token))
                .redact(token.clone());
        }
        spec
    }

    async fn local_tag_exists(&self, tag: &TagName) -> Result<bool> {
        let git_ref = tag.git_ref();
        let lookup = self.git(["rev-parse", "-q", "--verify", git_ref.as_str()]);
        match self.executor.run(&lookup).await {
            Ok(_) => Ok(true),
            Err(ReleaseError::CommandFailed {
                failure: CommandFailure::ExitCode(1),
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn remote_tag_exists(&self, tag: &TagName) -> Result<bool> {
        let git_ref = tag.git_ref();
        let lookup = self.git(["ls-remote", "--tags", self.remote.as_str(), git_ref.as_str()]);
        match self.executor.run(&lookup).await {
            Ok(out) => Ok(!out.trim().is_empty()),
            Err(e) => Err(classify_remote_error(tag, &self.remote, e)),
        }
    }

    /// `-c user.name/-c user.email` when the checkout has no identity.
    async fn identity_args(&self) -> Vec<String> {
        let lookup = self.git(["config", "--get", "user.email"]);
        match self.executor.run(&lookup).await {
            Ok(email) if !email.trim().is_empty() => Vec::new(),
            _ => vec![
                "-c".to_string(),
                format!("user.name={DEFAULT_TAGGER_NAME}"),
                "-c".to_string(),
                format!("user.email={DEFAULT_TAGGER_EMAIL}"),
            ],
        }
    }

    async fn delete_local_tag(&self, tag: &TagName) {
        let delete = self.git(["tag", "-d", tag.as_str()]);
        if let Err(e) = self.executor.run(&delete).await {
            warn!(tag = %tag, error = %e, "Failed to remove local tag after push failure");
        }
    }
}

#[async_trait]
impl Tagger for GitTagger {
    async fn tag_and_push(&self, tag: &TagName) -> Result<()> {
        info!(tag = %tag, remote = %self.remote, "Tagging and pushing");

        if self.local_tag_exists(tag).await? || self.remote_tag_exists(tag).await? {
            return Err(ReleaseError::TagAlreadyExists {
                tag: tag.to_string(),
            });
        }

        let mut create = self.identity_args().await;
        create.extend([
            "tag".to_string(),
            "-a".to_string(),
            tag.to_string(),
            "-m".to_string(),
            tag.to_string(),
        ]);
        if let Err(e) = self.executor.run(&self.git(create)).await {
            return Err(match e {
                ReleaseError::CommandFailed { stderr_tail, .. }
                    if stderr_tail.contains("already exists") =>
                {
                    ReleaseError::TagAlreadyExists {
                        tag: tag.to_string(),
                    }
                }
                other => other,
            });
        }

        let push = self.git(["push".to_string(), self.remote.clone(), tag.git_ref()]);
        if let Err(e) = self.executor.run(&push).await {
            self.delete_local_tag(tag).await;
            return Err(classify_remote_error(tag, &self.remote, e));
        }

        info!(tag = %tag, remote = %self.remote, "Pushed tag");
        Ok(())
    }
}

/// `AUTHORIZATION: basic base64(x-access-token:<token>)`.
fn auth_header(token: &SecretValue) -> SecretValue {
    let encoded = STANDARD.encode(format!("x-access-token:{}", token.expose()));
    SecretValue::new(format!("AUTHORIZATION: basic {encoded}"))
}

const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "could not read username",
    "could not read password",
    "invalid username or password",
    "permission denied",
    "terminal prompts disabled",
    "returned error: 401",
    "returned error: 403",
];

const EXISTS_MARKERS: &[&str] = &["already exists", "[rejected]"];

/// Map a failed remote git call onto the tagging error taxonomy.
pub fn classify_remote_error(tag: &TagName, remote: &str, err: ReleaseError) -> ReleaseError {
    match err {
        ReleaseError::CommandFailed {
            failure,
            stderr_tail,
            ..
        } => {
            let lowered = stderr_tail.to_ascii_lowercase();
            if EXISTS_MARKERS.iter().any(|m| lowered.contains(m)) {
                ReleaseError::TagAlreadyExists {
                    tag: tag.to_string(),
                }
            } else if AUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
                ReleaseError::AuthenticationFailed {
                    remote: remote.to_string(),
                    detail: stderr_tail,
                }
            } else {
                ReleaseError::PushFailed {
                    tag: tag.to_string(),
                    detail: format!("{failure}: {stderr_tail}"),
                }
            }
        }
        other => other,
    }
}
