//! Miruken Release CI - release pipeline execution
//!
//! Provides the release orchestrator that:
//! - Runs the test suite and resolves the version from git history
//! - Creates and pushes an annotated `v<version>` tag
//! - Fans a repository dispatch event out to dependent repositories

pub mod dispatch;
pub mod gh_cli;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod version;

// Re-export key types
pub use dispatch::{DeliveryError, DispatchNotifier, DispatchSender, RepoDirectory};
pub use gh_cli::GhCliDirectory;
pub use git::{classify_remote_error, GitTagger, Tagger};
pub use github::GithubClient;
pub use pipeline::{ReleaseOrchestrator, ReleaseServices, ReleaseSummary, RunResult};
pub use runner::{CommandExecutor, CommandOutput, CommandSpec, ProcessRunner};
pub use stage::ReleaseStage;
pub use version::VersionResolver;
