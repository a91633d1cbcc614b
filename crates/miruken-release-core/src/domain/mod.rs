//! Domain model for a release run.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod secret;
pub mod version;

pub use config::{ConfigValue, EnvSnapshot, ReleaseConfig, Secrets, Variables};
pub use dispatch::{
    Delivery, DeliveryOutcome, DirectorySource, DispatchEvent, DispatchEventKind, DispatchReport,
    DispatchTarget, RepoRef,
};
pub use error::{CommandFailure, FailedTarget, ReleaseError, Result};
pub use secret::{SecretValue, MASK};
pub use version::{TagName, Version, TAG_PREFIX};
