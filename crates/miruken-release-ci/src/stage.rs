//! Release stages and the commands the built-in stages run.

use miruken_release_core::ReleaseConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::runner::CommandSpec;

/// States of a release run. Steps run strictly in declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    Validating,
    Testing,
    VersionResolving,
    Tagging,
    Dispatching,
    Done,
    Failed,
}

impl ReleaseStage {
    pub fn name(&self) -> &'static str {
        match self {
            ReleaseStage::Validating => "validating",
            ReleaseStage::Testing => "testing",
            ReleaseStage::VersionResolving => "version_resolving",
            ReleaseStage::Tagging => "tagging",
            ReleaseStage::Dispatching => "dispatching",
            ReleaseStage::Done => "done",
            ReleaseStage::Failed => "failed",
        }
    }

    /// The stage after this one on the success path.
    pub fn next(&self) -> Option<ReleaseStage> {
        match self {
            ReleaseStage::Validating => Some(ReleaseStage::Testing),
            ReleaseStage::Testing => Some(ReleaseStage::VersionResolving),
            ReleaseStage::VersionResolving => Some(ReleaseStage::Tagging),
            ReleaseStage::Tagging => Some(ReleaseStage::Dispatching),
            ReleaseStage::Dispatching => Some(ReleaseStage::Done),
            ReleaseStage::Done | ReleaseStage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReleaseStage::Done | ReleaseStage::Failed)
    }
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The full test suite, run from the workspace checkout.
///
/// The suite inherits `GH_TOKEN` from the job, so its output is masked.
pub fn test_command(config: &ReleaseConfig) -> CommandSpec {
    CommandSpec::shell(config.test_command.clone())
        .current_dir(&config.workspace_path)
        .timeout(config.command_timeout)
        .redact(config.token.clone())
}
