use anyhow::{Result, bail};
use log::info;
use std::fmt;

use super::config::Config;
use crate::{
    github::{GitHub, GitHubApi, RepoId, StatusChecker, StatusReport, ValidationFilter},
    runtime::Runtime,
};

/// Failures from these contexts never fail a check.
const IGNORED_FAILURES: &[&str] = &["GitHub Actions"];

/// What to check: a pull request's head commit or a bare commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    PullRequest(u64),
    Commit(String),
}

impl Target {
    /// Exactly one of `pr_number` and `commit_hash` must be given.
    pub fn from_args(pr_number: Option<u64>, commit_hash: Option<String>) -> Result<Self> {
        match (pr_number, commit_hash) {
            (Some(number), None) => Ok(Target::PullRequest(number)),
            (None, Some(sha)) => Ok(Target::Commit(sha)),
            (pr_number, commit_hash) => bail!(
                "Exactly one of pr_number ({:?}) and commit_hash ({:?}) should be specified.",
                pr_number,
                commit_hash
            ),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::PullRequest(number) => write!(f, "PR #{}", number),
            Target::Commit(sha) => write!(f, "commit hash {}", sha),
        }
    }
}

/// Arguments shared by the check and poll commands.
#[derive(Debug, Clone)]
pub struct StatusQuery {
    pub repo: RepoId,
    pub target: Target,
    pub include_contexts: Option<String>,
    pub exclude_contexts: Option<String>,
}

#[tracing::instrument(skip(runtime, api_url))]
pub async fn check_pr_tests_status<R: Runtime + ?Sized>(
    runtime: &R,
    query: StatusQuery,
    api_url: Option<String>,
) -> Result<bool> {
    let checker = status_checker(runtime, &query, api_url)?;
    check(&checker, &query.target).await
}

#[tracing::instrument(skip(runtime, api_url))]
pub async fn poll_pr_tests_status<R: Runtime + ?Sized>(
    runtime: &R,
    query: StatusQuery,
    api_url: Option<String>,
) -> Result<bool> {
    let checker = status_checker(runtime, &query, api_url)?;
    poll(&checker, &query.target).await
}

fn status_checker<R: Runtime + ?Sized>(
    runtime: &R,
    query: &StatusQuery,
    api_url: Option<String>,
) -> Result<StatusChecker<GitHub>> {
    let config = Config::load(runtime)?;
    let filter = ValidationFilter::new(
        query.include_contexts.as_deref(),
        query.exclude_contexts.as_deref(),
    )?;
    Ok(StatusChecker::new(
        config.github(api_url)?,
        query.repo.clone(),
        filter,
        config.settings.poll.retry_config(),
    ))
}

/// Checks `target` once and prints every validation.
pub async fn check<G: GitHubApi>(checker: &StatusChecker<G>, target: &Target) -> Result<bool> {
    let report = match target {
        Target::PullRequest(number) => checker.check_pull_request(*number).await?,
        Target::Commit(sha) => checker.check_commit(sha).await?,
    };
    Ok(conclude(checker.repo(), target, &report))
}

/// Re-checks `target` while its validations are pending.
pub async fn poll<G: GitHubApi>(checker: &StatusChecker<G>, target: &Target) -> Result<bool> {
    let report = match target {
        Target::PullRequest(number) => checker.poll_pull_request(*number).await?,
        Target::Commit(sha) => checker.poll_commit(sha).await?,
    };
    Ok(conclude(checker.repo(), target, &report))
}

fn conclude(repo: &RepoId, target: &Target, report: &StatusReport) -> bool {
    for (context, validation) in &report.validations {
        println!("{}: {}", context, validation);
    }

    let success = passes(report);
    info!(
        "Combined status of {} for {} is {} ({}).",
        target,
        repo,
        if success { "success" } else { "failed" },
        report.state
    );
    success
}

/// Every kept validation passed, ignoring failures of [`IGNORED_FAILURES`].
/// Neutral check runs count as passed. A commit without validations has not
/// been tested yet.
fn passes(report: &StatusReport) -> bool {
    if report.validations.is_empty() {
        info!("No validations reported for {} yet", report.sha);
        return false;
    }

    let mut success = true;
    for (context, validation) in report.unsuccessful() {
        if IGNORED_FAILURES.contains(&context.as_str()) {
            info!("Ignoring failure of \"{}\" because it is in the ignore list", context);
        } else {
            info!("Commit failed due to \"{}\": {}", context, validation);
            success = false;
        }
    }
    success
}
