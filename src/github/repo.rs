use anyhow::{Result, anyhow};
use std::str::FromStr;

/// A repository addressed as `org/repo`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RepoId {
    pub org: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
        }
    }

    /// The `org:branch` label GitHub reports for a pull request base.
    pub fn branch_label(&self, branch: &str) -> String {
        format!("{}:{}", self.org, branch)
    }

    pub(crate) fn api_path(&self, api_url: &str) -> String {
        format!("{}/repos/{}/{}", api_url.trim_end_matches('/'), self.org, self.repo)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((org, repo)) if !org.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(RepoId::new(org, repo))
            }
            _ => Err(anyhow!(
                "Invalid repository format {:?}. Expected 'org/repo'.",
                s
            )),
        }
    }
}
