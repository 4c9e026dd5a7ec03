use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use super::repo::RepoId;
use super::types::{CheckRun, CheckRunsPage, CheckSuite, CheckSuitesPage, CombinedStatus, PullRequest};
use crate::http::{HttpClient, HttpError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: &str = "100";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn get_pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest>;
    async fn get_combined_status(&self, repo: &RepoId, sha: &str) -> Result<CombinedStatus>;
    async fn get_check_suites(&self, repo: &RepoId, sha: &str) -> Result<Vec<CheckSuite>>;
    async fn get_check_runs(&self, repo: &RepoId, sha: &str) -> Result<Vec<CheckRun>>;
    fn api_url(&self) -> &str;
}

pub struct GitHub {
    pub http: HttpClient,
    pub api_url: String,
}

impl GitHub {
    #[tracing::instrument(skip(http, api_url))]
    pub fn new(http: HttpClient, api_url: Option<String>) -> Self {
        let api_url = api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self { http, api_url }
    }

    fn commit_url(&self, repo: &RepoId, sha: &str, endpoint: &str) -> String {
        format!("{}/commits/{}/{}", repo.api_path(&self.api_url), sha, endpoint)
    }
}

/// Points an exhausted anonymous quota at GITHUB_TOKEN.
fn rate_limit_hint(error: anyhow::Error) -> anyhow::Error {
    if matches!(
        error.downcast_ref::<HttpError>(),
        Some(HttpError::RateLimited { .. })
    ) {
        error.context("GitHub rate limit exceeded. Try again later or set GITHUB_TOKEN environment variable.")
    } else {
        error
    }
}

#[async_trait]
impl GitHubApi for GitHub {
    #[tracing::instrument(skip(self))]
    async fn get_pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest> {
        let url = format!("{}/pulls/{}", repo.api_path(&self.api_url), number);
        debug!("Fetching pull request from {}...", url);

        self.http
            .get_json(&url)
            .await
            .map_err(rate_limit_hint)
            .with_context(|| format!("Failed to fetch pull request #{} of {}", number, repo))
    }

    #[tracing::instrument(skip(self))]
    async fn get_combined_status(&self, repo: &RepoId, sha: &str) -> Result<CombinedStatus> {
        let url = self.commit_url(repo, sha, "status");
        debug!("Fetching combined status from {}...", url);

        self.http
            .get_json_with_query(&url, &[("per_page", PER_PAGE)])
            .await
            .map_err(rate_limit_hint)
            .with_context(|| format!("Failed to fetch combined status of {} in {}", sha, repo))
    }

    #[tracing::instrument(skip(self))]
    async fn get_check_suites(&self, repo: &RepoId, sha: &str) -> Result<Vec<CheckSuite>> {
        let url = self.commit_url(repo, sha, "check-suites");
        debug!("Fetching check suites from {}...", url);

        let page: CheckSuitesPage = self
            .http
            .get_json_with_query(&url, &[("per_page", PER_PAGE)])
            .await
            .map_err(rate_limit_hint)
            .with_context(|| format!("Failed to fetch check suites of {} in {}", sha, repo))?;
        Ok(page.check_suites)
    }

    #[tracing::instrument(skip(self))]
    async fn get_check_runs(&self, repo: &RepoId, sha: &str) -> Result<Vec<CheckRun>> {
        let url = self.commit_url(repo, sha, "check-runs");
        debug!("Fetching check runs from {}...", url);

        let page: CheckRunsPage = self
            .http
            .get_json_with_query(&url, &[("per_page", PER_PAGE)])
            .await
            .map_err(rate_limit_hint)
            .with_context(|| format!("Failed to fetch check runs of {} in {}", sha, repo))?;
        Ok(page.check_runs)
    }

    fn api_url(&self) -> &str {
        &self.api_url
    }
}
