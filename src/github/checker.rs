use anyhow::{Context, Result};
use log::{info, warn};

use super::client::GitHubApi;
use super::repo::RepoId;
use super::validation::{StatusReport, ValidationFilter, collect};
use crate::http::execute_logged;
use crate::retry::{RetryConfig, RetryPolicy, Retryability};

#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error("validations of {} are still pending", .0.sha)]
    Pending(StatusReport),
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

impl PollError {
    fn classify(&self) -> Retryability {
        matches!(self, PollError::Pending(_)).into()
    }
}

/// Answers "did the tests pass" for commits and pull requests of one repo.
pub struct StatusChecker<G> {
    api: G,
    repo: RepoId,
    filter: ValidationFilter,
    poll: RetryConfig,
}

impl<G: GitHubApi> StatusChecker<G> {
    pub fn new(api: G, repo: RepoId, filter: ValidationFilter, poll: RetryConfig) -> Self {
        Self {
            api,
            repo,
            filter,
            poll,
        }
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    #[tracing::instrument(skip(self))]
    pub async fn head_sha(&self, number: u64) -> Result<String> {
        let pr = self.api.get_pull_request(&self.repo, number).await?;
        Ok(pr.head.sha)
    }

    #[tracing::instrument(skip(self))]
    pub async fn check_commit(&self, sha: &str) -> Result<StatusReport> {
        let combined = self.api.get_combined_status(&self.repo, sha).await?;
        let suites = self.api.get_check_suites(&self.repo, sha).await?;
        let runs = self.api.get_check_runs(&self.repo, sha).await?;

        let validations = self.filter.apply(collect(&combined, &suites, &runs));
        let report = StatusReport::new(sha, validations);
        info!(
            "{} has {} validations, aggregate state {}",
            sha,
            report.validations.len(),
            report.state
        );
        Ok(report)
    }

    pub async fn check_pull_request(&self, number: u64) -> Result<StatusReport> {
        let sha = self.head_sha(number).await?;
        self.check_commit(&sha).await
    }

    /// Re-checks `sha` at the poll interval while its validations are
    /// pending. If they are still pending once polling is exhausted, the last
    /// report is returned.
    #[tracing::instrument(skip(self))]
    pub async fn poll_commit(&self, sha: &str) -> Result<StatusReport> {
        let policy = RetryPolicy::new(self.poll.clone(), |error: &PollError| error.classify())
            .context("Invalid poll settings")?;

        let result = execute_logged(&policy, "Polling validations", || async move {
            let report = self.check_commit(sha).await?;
            if report.is_pending() {
                return Err(PollError::Pending(report));
            }
            Ok(report)
        })
        .await;

        match result {
            Ok(report) => Ok(report),
            Err(PollError::Pending(report)) => {
                warn!(
                    "Validations of {} still pending after {} polls",
                    sha, self.poll.max_attempts
                );
                Ok(report)
            }
            Err(PollError::Request(e)) => Err(e),
        }
    }

    pub async fn poll_pull_request(&self, number: u64) -> Result<StatusReport> {
        let sha = self.head_sha(number).await?;
        self.poll_commit(&sha).await
    }

    /// Whether pull request `number` targets `branch` of this repo's org.
    #[tracing::instrument(skip(self))]
    pub async fn is_branch_base_of_pull_request(&self, number: u64, branch: &str) -> Result<bool> {
        let pr = self.api.get_pull_request(&self.repo, number).await?;
        Ok(pr.base.label == self.repo.branch_label(branch))
    }
}
