//! GitHub REST client for repository dispatch and organization listings.

use async_trait::async_trait;
use miruken_release_core::{
    DispatchEvent, ReleaseConfig, ReleaseError, RepoRef, Result, SecretValue,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::dispatch::{DeliveryError, DispatchSender, RepoDirectory};

pub const ACCEPT: &str = "application/vnd.github+json";
pub const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
pub const API_VERSION: &str = "2022-11-28";
pub const USER_AGENT: &str = concat!("miruken-release/", env!("CARGO_PKG_VERSION"));

/// Repositories requested per listing page (the API maximum).
pub const PAGE_SIZE: usize = 100;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 200;

/// Authenticated client for the GitHub REST API.
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: SecretValue,
}

#[derive(Debug, Deserialize)]
struct RepoSummary {
    name: String,
    #[serde(default)]
    archived: bool,
}

impl GithubClient {
    pub fn new(api_url: impl Into<String>, token: SecretValue, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ReleaseError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &ReleaseConfig) -> Result<Self> {
        Self::new(config.github_api_url.clone(), config.token.clone(), HTTP_TIMEOUT)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(API_VERSION_HEADER, API_VERSION)
            .bearer_auth(self.token.expose())
    }

    async fn error_body(&self, response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        let mut body = self.token.redact(body.trim());
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        body
    }

    async fn list_page(&self, organization: &str, page: usize) -> Result<Vec<RepoSummary>> {
        let url = format!(
            "{}/orgs/{}/repos?per_page={PAGE_SIZE}&page={page}",
            self.api_url, organization
        );
        let resolution_failed = |reason: String| ReleaseError::TargetResolutionFailed {
            organization: organization.to_string(),
            reason,
        };

        debug!(url = %url, "Listing organization repositories");
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| resolution_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = self.error_body(response).await;
            return Err(resolution_failed(format!("HTTP {}: {body}", status.as_u16())));
        }

        response
            .json::<Vec<RepoSummary>>()
            .await
            .map_err(|e| resolution_failed(format!("invalid listing: {e}")))
    }
}

#[async_trait]
impl DispatchSender for GithubClient {
    async fn send(
        &self,
        target: &RepoRef,
        event: &DispatchEvent,
    ) -> std::result::Result<(), DeliveryError> {
        let url = format!(
            "{}/repos/{}/{}/dispatches",
            self.api_url, target.owner, target.repo
        );

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(event)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body: self.error_body(response).await,
            })
        }
    }
}

#[async_trait]
impl RepoDirectory for GithubClient {
    /// Every non-archived repository of `organization`, following pagination.
    async fn list_repositories(&self, organization: &str) -> Result<Vec<RepoRef>> {
        let mut repos = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.list_page(organization, page).await?;
            let full_page = batch.len() == PAGE_SIZE;
            repos.extend(
                batch
                    .into_iter()
                    .filter(|r| !r.archived)
                    .map(|r| RepoRef::new(organization, r.name)),
            );
            if !full_page {
                break;
            }
            page += 1;
        }
        Ok(repos)
    }
}
