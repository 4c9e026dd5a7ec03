//! GitHub REST access for pull request and commit validation status.

mod checker;
mod client;
mod repo;
mod types;
mod validation;

pub use checker::StatusChecker;
#[cfg(test)]
pub use client::MockGitHubApi;
pub use client::{DEFAULT_API_URL, GitHub, GitHubApi};
pub use repo::RepoId;
pub use types::{App, CheckRun, CheckSuite, CombinedStatus, CommitStatus, GitRef, PullRequest};
pub use validation::{
    AggregateState, DEFAULT_EXCLUDE_CONTEXTS, StatusReport, Validation, ValidationFilter,
    ValidationState, Validations, aggregate, collect,
};
