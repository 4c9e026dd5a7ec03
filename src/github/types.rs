use serde::{Deserialize, Serialize};

/// One side of a pull request.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct GitRef {
    /// `org:branch`
    pub label: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
}

/// Result of `GET /repos/{org}/{repo}/commits/{sha}/status`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct CombinedStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub statuses: Vec<CommitStatus>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct CommitStatus {
    pub context: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct App {
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct CheckSuite {
    pub app: App,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct CheckRun {
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CheckSuitesPage {
    pub check_suites: Vec<CheckSuite>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CheckRunsPage {
    pub check_runs: Vec<CheckRun>,
}
