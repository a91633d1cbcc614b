//! Miruken Release Core
//!
//! Domain model shared by the release pipeline:
//! - Environment and secret resolution into a typed `ReleaseConfig`
//! - Version identifiers and `v`-prefixed tag names
//! - Repository dispatch targets, typed events and delivery reports
//! - The error taxonomy every release step reports through
//! - Tracing setup and lifecycle log events

pub mod domain;
pub mod obs;
pub mod telemetry;

pub use domain::{
    CommandFailure, ConfigValue, Delivery, DeliveryOutcome, DirectorySource, DispatchEvent,
    DispatchEventKind, DispatchReport, DispatchTarget, EnvSnapshot, FailedTarget, ReleaseConfig,
    ReleaseError, RepoRef, Result, SecretValue, Secrets, TagName, Variables, Version, MASK,
    TAG_PREFIX,
};
pub use obs::run_span;
pub use telemetry::init_tracing;

/// Miruken release version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
