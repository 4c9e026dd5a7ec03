use anyhow::Result;

use super::config::Config;
use crate::{
    github::{GitHubApi, RepoId, StatusChecker, ValidationFilter},
    runtime::Runtime,
};

#[tracing::instrument(skip(runtime, api_url))]
pub async fn check_pr_against_branch<R: Runtime + ?Sized>(
    runtime: &R,
    repo: RepoId,
    pr_number: u64,
    branch: &str,
    api_url: Option<String>,
) -> Result<bool> {
    let config = Config::load(runtime)?;
    let checker = StatusChecker::new(
        config.github(api_url)?,
        repo,
        ValidationFilter::default(),
        config.settings.poll.retry_config(),
    );
    is_base(&checker, pr_number, branch).await
}

/// Prints whether `branch` is the base of the pull request.
pub async fn is_base<G: GitHubApi>(
    checker: &StatusChecker<G>,
    pr_number: u64,
    branch: &str,
) -> Result<bool> {
    let is_base = checker
        .is_branch_base_of_pull_request(pr_number, branch)
        .await?;
    println!(
        "Is branch '{}' the base of PR #{} ? {}!",
        branch,
        pr_number,
        if is_base { "Yes" } else { "No" }
    );
    Ok(is_base)
}
