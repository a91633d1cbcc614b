//! Environment resolution.
//!
//! The process environment is captured once into an [`EnvSnapshot`], validated
//! into a typed [`ReleaseConfig`], and that value is passed to every component.
//! Nothing reads the environment after validation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::dispatch::{DirectorySource, DispatchEventKind, DispatchTarget, RepoRef};
use super::error::{ReleaseError, Result};
use super::secret::SecretValue;
use crate::obs;

/// Environment keys read by a release run.
pub mod names {
    pub const REPOSITORY_PATH: &str = "repositoryPath";
    pub const REPOSITORY: &str = "repository";
    pub const REPOSITORY_OWNER: &str = "repositoryOwner";
    pub const REF: &str = "ref";

    pub const SKIP_REPOSITORY_DISPATCHES: &str = "skipRepositoryDispatches";
    pub const TOLERATE_DISPATCH_FAILURES: &str = "tolerateDispatchFailures";
    pub const DISPATCH_ORGANIZATION: &str = "dispatchOrganization";
    pub const DISPATCH_EVENT_TYPE: &str = "dispatchEventType";
    pub const DISPATCH_CONCURRENCY: &str = "dispatchConcurrency";
    pub const REPOSITORY_DIRECTORY: &str = "repositoryDirectory";
    pub const TEST_COMMAND: &str = "testCommand";
    pub const WORKSPACE_PATH: &str = "workspacePath";
    pub const GIT_VERSION_IMAGE: &str = "gitVersionImage";
    pub const GIT_REMOTE: &str = "gitRemote";
    pub const COMMAND_TIMEOUT_SECS: &str = "commandTimeoutSecs";
    pub const GITHUB_API_URL: &str = "githubApiUrl";

    pub const GH_TOKEN: &str = "GH_TOKEN";

    pub const REQUIRED: &[&str] = &[REPOSITORY_PATH, REPOSITORY, REPOSITORY_OWNER, REF];

    pub const OPTIONAL: &[&str] = &[
        SKIP_REPOSITORY_DISPATCHES,
        TOLERATE_DISPATCH_FAILURES,
        DISPATCH_ORGANIZATION,
        DISPATCH_EVENT_TYPE,
        DISPATCH_CONCURRENCY,
        REPOSITORY_DIRECTORY,
        TEST_COMMAND,
        WORKSPACE_PATH,
        GIT_VERSION_IMAGE,
        GIT_REMOTE,
        COMMAND_TIMEOUT_SECS,
        GITHUB_API_URL,
    ];

    pub const SECRETS: &[&str] = &[GH_TOKEN];
}

pub const DEFAULT_TEST_COMMAND: &str = "go test ./...";
pub const DEFAULT_GIT_VERSION_IMAGE: &str = "gittools/gitversion:5.12.0-alpine.3.14-6.0";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GIT_REMOTE: &str = "origin";
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 1800;

/// Captured process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`, treating blank values as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Resolve configuration values, failing with every missing required name.
    ///
    /// Logs the resolved listing.
    pub fn resolve(&self, required: &[&str], optional: &[&str]) -> Result<Variables> {
        let variables = self.collect_variables(required, optional);
        let missing = variables.missing();
        if !missing.is_empty() {
            return Err(ReleaseError::MissingConfiguration { names: missing });
        }
        obs::print_variables(&variables, &[]);
        Ok(variables)
    }

    /// Resolve secrets, failing with every missing name. Logs names only.
    pub fn resolve_secrets(&self, required: &[&str]) -> Result<Secrets> {
        let (secrets, missing) = self.collect_secrets(required);
        if !missing.is_empty() {
            return Err(ReleaseError::MissingConfiguration { names: missing });
        }
        obs::print_secrets(&secrets);
        Ok(secrets)
    }

    fn collect_variables(&self, required: &[&str], optional: &[&str]) -> Variables {
        let mut values = BTreeMap::new();
        for (names, is_required) in [(required, true), (optional, false)] {
            for name in names {
                values.insert(
                    (*name).to_string(),
                    ConfigValue {
                        name: (*name).to_string(),
                        required: is_required,
                        value: self.get(name).map(str::to_string),
                    },
                );
            }
        }
        Variables { values }
    }

    fn collect_secrets(&self, required: &[&str]) -> (Secrets, Vec<String>) {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();
        for name in required {
            match self.get(name) {
                Some(v) => {
                    values.insert((*name).to_string(), SecretValue::new(v));
                }
                None => missing.push((*name).to_string()),
            }
        }
        (Secrets { values }, missing)
    }
}

/// A named configuration value read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub name: String,
    pub required: bool,
    pub value: Option<String>,
}

/// Resolved configuration values keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, ConfigValue>,
}

impl Variables {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigValue> {
        self.values.values()
    }

    fn missing(&self) -> Vec<String> {
        self.values
            .values()
            .filter(|v| v.required && v.value.is_none())
            .map(|v| v.name.clone())
            .collect()
    }

    fn required(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            None => Ok(false),
            Some(raw) => parse_flag(name, raw),
        }
    }

    fn number<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ReleaseError::InvalidConfiguration {
                    name: name.to_string(),
                    reason: format!("expected a number, got {raw:?}"),
                }),
        }
    }
}

/// Resolved secrets keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, SecretValue>,
}

impl Secrets {
    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> Vec<SecretValue> {
        self.values.values().cloned().collect()
    }
}

/// Parse a boolean-like environment value.
pub fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReleaseError::InvalidConfiguration {
            name: name.to_string(),
            reason: format!("expected a boolean, got {raw:?}"),
        }),
    }
}

/// Typed configuration for one release run.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Host path of the checkout, bind-mounted into the version tool.
    pub repository_path: PathBuf,
    pub repository: String,
    pub repository_owner: String,
    pub git_ref: String,
    /// Checkout the test command and git run in.
    pub workspace_path: PathBuf,
    pub test_command: String,
    pub git_version_image: String,
    pub git_remote: String,
    pub command_timeout: Duration,
    pub github_api_url: String,
    pub dispatch_target: DispatchTarget,
    pub event_kind: DispatchEventKind,
    pub dispatch_concurrency: usize,
    pub directory_source: DirectorySource,
    pub skip_dispatch: bool,
    pub tolerate_dispatch_failures: bool,
    pub token: SecretValue,
}

impl ReleaseConfig {
    /// Validate the environment into a release configuration.
    ///
    /// Missing required variables and secrets are reported together.
    pub fn resolve(env: &EnvSnapshot) -> Result<Self> {
        let variables = env.collect_variables(names::REQUIRED, names::OPTIONAL);
        let (secrets, missing_secrets) = env.collect_secrets(names::SECRETS);

        let mut missing = variables.missing();
        missing.extend(missing_secrets);
        if !missing.is_empty() {
            return Err(ReleaseError::MissingConfiguration { names: missing });
        }
        // A variable may embed a secret, e.g. a test command carrying the token.
        obs::print_variables(&variables, &secrets.values());
        obs::print_secrets(&secrets);

        let repository = variables.required(names::REPOSITORY);
        let repository_owner = variables.required(names::REPOSITORY_OWNER);

        let dispatch_target = match variables.get(names::DISPATCH_ORGANIZATION) {
            Some(org) => DispatchTarget::Organization(org.trim().to_string()),
            None => DispatchTarget::Repository(RepoRef::new(&repository_owner, &repository)),
        };

        let event_kind = match variables.get(names::DISPATCH_EVENT_TYPE) {
            None => DispatchEventKind::default(),
            Some(raw) => raw.parse()?,
        };

        let directory_source = match variables.get(names::REPOSITORY_DIRECTORY) {
            None => DirectorySource::default(),
            Some(raw) => raw.parse()?,
        };

        let dispatch_concurrency =
            variables.number(names::DISPATCH_CONCURRENCY, DEFAULT_DISPATCH_CONCURRENCY)?;
        if dispatch_concurrency == 0 {
            return Err(ReleaseError::InvalidConfiguration {
                name: names::DISPATCH_CONCURRENCY.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let command_timeout_secs =
            variables.number(names::COMMAND_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS)?;
        if command_timeout_secs == 0 {
            return Err(ReleaseError::InvalidConfiguration {
                name: names::COMMAND_TIMEOUT_SECS.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let command_timeout = Duration::from_secs(command_timeout_secs);

        let token = secrets
            .get(names::GH_TOKEN)
            .cloned()
            .ok_or_else(|| ReleaseError::MissingConfiguration {
                names: vec![names::GH_TOKEN.to_string()],
            })?;

        Ok(Self {
            repository_path: PathBuf::from(variables.required(names::REPOSITORY_PATH)),
            repository,
            repository_owner,
            git_ref: variables.required(names::REF),
            workspace_path: PathBuf::from(variables.get(names::WORKSPACE_PATH).unwrap_or(".")),
            test_command: variables
                .get(names::TEST_COMMAND)
                .unwrap_or(DEFAULT_TEST_COMMAND)
                .to_string(),
            git_version_image: variables
                .get(names::GIT_VERSION_IMAGE)
                .unwrap_or(DEFAULT_GIT_VERSION_IMAGE)
                .to_string(),
            git_remote: variables
                .get(names::GIT_REMOTE)
                .unwrap_or(DEFAULT_GIT_REMOTE)
                .to_string(),
            command_timeout,
            github_api_url: variables
                .get(names::GITHUB_API_URL)
                .unwrap_or(DEFAULT_GITHUB_API_URL)
                .trim_end_matches('/')
                .to_string(),
            dispatch_target,
            event_kind,
            dispatch_concurrency,
            directory_source,
            skip_dispatch: variables.flag(names::SKIP_REPOSITORY_DISPATCHES)?,
            tolerate_dispatch_failures: variables.flag(names::TOLERATE_DISPATCH_FAILURES)?,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("repositoryPath", "/repo"),
            ("repository", "x"),
            ("repositoryOwner", "y"),
            ("ref", "refs/heads/main"),
            ("GH_TOKEN", "abc"),
        ]
    }

    #[test]
    fn resolves_complete_environment_with_defaults() {
        let config = ReleaseConfig::resolve(&EnvSnapshot::from_pairs(complete_env())).unwrap();
        assert_eq!(config.repository_path, PathBuf::from("/repo"));
        assert_eq!(config.git_ref, "refs/heads/main");
        assert_eq!(
            config.dispatch_target,
            DispatchTarget::Repository(RepoRef::new("y", "x"))
        );
        assert_eq!(config.event_kind, DispatchEventKind::BuiltMiruken);
        assert_eq!(config.test_command, DEFAULT_TEST_COMMAND);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert!(!config.skip_dispatch);
        assert!(!config.tolerate_dispatch_failures);
        assert_eq!(config.token.expose(), "abc");
    }

    #[test]
    fn reports_every_missing_name_including_secrets() {
        let env = EnvSnapshot::from_pairs([("repository", "x")]);
        let err = ReleaseConfig::resolve(&env).unwrap_err();
        match err {
            ReleaseError::MissingConfiguration { names } => {
                assert_eq!(
                    names,
                    vec!["ref", "repositoryOwner", "repositoryPath", "GH_TOKEN"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn every_subset_missing_a_required_key_fails_listing_all() {
        let required = ["repositoryPath", "repository", "repositoryOwner", "ref", "GH_TOKEN"];
        for mask in 1u32..(1 << required.len()) {
            let dropped: Vec<&str> = required
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            let env = EnvSnapshot::from_pairs(
                complete_env()
                    .into_iter()
                    .filter(|(k, _)| !dropped.contains(k)),
            );
            match ReleaseConfig::resolve(&env) {
                Err(ReleaseError::MissingConfiguration { names }) => {
                    let mut names = names;
                    names.sort();
                    let mut expected: Vec<String> =
                        dropped.iter().map(|s| s.to_string()).collect();
                    expected.sort();
                    assert_eq!(names, expected);
                }
                other => panic!("expected missing configuration, got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = complete_env();
        env.retain(|(k, _)| *k != "repository");
        env.push(("repository", "   "));
        let err = ReleaseConfig::resolve(&EnvSnapshot::from_pairs(env)).unwrap_err();
        assert!(matches!(err, ReleaseError::MissingConfiguration { names } if names == ["repository"]));
    }

    #[test]
    fn optional_values_override_defaults() {
        let mut env = complete_env();
        env.extend([
            ("skipRepositoryDispatches", "true"),
            ("tolerateDispatchFailures", "1"),
            ("dispatchOrganization", "Miruken-Go"),
            ("dispatchEventType", "miruken-version-created"),
            ("dispatchConcurrency", "2"),
            ("repositoryDirectory", "gh"),
            ("githubApiUrl", "http://localhost:8080/"),
            ("commandTimeoutSecs", "60"),
        ]);
        let config = ReleaseConfig::resolve(&EnvSnapshot::from_pairs(env)).unwrap();
        assert!(config.skip_dispatch);
        assert!(config.tolerate_dispatch_failures);
        assert_eq!(
            config.dispatch_target,
            DispatchTarget::Organization("Miruken-Go".to_string())
        );
        assert_eq!(config.event_kind, DispatchEventKind::MirukenVersionCreated);
        assert_eq!(config.dispatch_concurrency, 2);
        assert_eq!(config.directory_source, DirectorySource::GhCli);
        assert_eq!(config.github_api_url, "http://localhost:8080");
        assert_eq!(config.command_timeout, Duration::from_secs(60));
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("f", "TRUE").unwrap());
        assert!(parse_flag("f", "on").unwrap());
        assert!(!parse_flag("f", "false").unwrap());
        assert!(!parse_flag("f", "0").unwrap());
        assert!(matches!(
            parse_flag("f", "maybe"),
            Err(ReleaseError::InvalidConfiguration { name, .. }) if name == "f"
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut env = complete_env();
        env.push(("dispatchConcurrency", "0"));
        assert!(matches!(
            ReleaseConfig::resolve(&EnvSnapshot::from_pairs(env)),
            Err(ReleaseError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn zero_command_timeout_is_rejected() {
        let mut env = complete_env();
        env.push(("commandTimeoutSecs", "0"));
        match ReleaseConfig::resolve(&EnvSnapshot::from_pairs(env)) {
            Err(ReleaseError::InvalidConfiguration { name, reason }) => {
                assert_eq!(name, "commandTimeoutSecs");
                assert_eq!(reason, "must be at least 1");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn standalone_resolution_lists_missing_names() {
        let env = EnvSnapshot::from_pairs([("repository", "x"), ("GH_TOKEN", "abc")]);

        let variables = env.resolve(&["repository"], &["ref"]).unwrap();
        assert_eq!(variables.get("repository"), Some("x"));
        assert_eq!(variables.get("ref"), None);

        let secrets = env.resolve_secrets(&["GH_TOKEN"]).unwrap();
        assert_eq!(secrets.get("GH_TOKEN").map(SecretValue::expose), Some("abc"));

        match env.resolve_secrets(&["GH_TOKEN", "NPM_TOKEN"]) {
            Err(ReleaseError::MissingConfiguration { names }) => assert_eq!(names, vec!["NPM_TOKEN"]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
