//! Collecting, filtering and aggregating CI validations of a commit.
//!
//! A validation is anything GitHub reports against a commit: a commit
//! status (keyed by context), a check suite (keyed by app name) or a check
//! run (keyed by run name). Later sources overwrite earlier ones with the
//! same key.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use super::types::{CheckRun, CheckSuite, CombinedStatus};

/// Contexts ignored unless explicitly included.
pub const DEFAULT_EXCLUDE_CONTEXTS: &str = "datreeio|Renovate|[Cc]odecov|Dependabot";

// Matrix placeholder name GitHub Actions reports for jobs that never expanded.
const IGNORED_CHECK_RUNS: &[&str] = &[
    "gh-hosted-python-${{ matrix.python-version }},django-${{ matrix.django-version }},${{ matrix.shard_name }}",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationState {
    Success,
    Neutral,
    Pending,
    Failure,
    Error,
    /// Any other conclusion, e.g. `cancelled` or `timed_out`.
    Other(String),
}

impl ValidationState {
    /// A missing state means the validation has not reported yet.
    pub fn from_api(state: Option<&str>) -> Self {
        let Some(state) = state else {
            return ValidationState::Pending;
        };
        match state.to_lowercase().as_str() {
            "success" => ValidationState::Success,
            "neutral" => ValidationState::Neutral,
            "pending" | "queued" | "in_progress" => ValidationState::Pending,
            "failure" => ValidationState::Failure,
            "error" => ValidationState::Error,
            other => ValidationState::Other(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        *self == ValidationState::Pending
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, ValidationState::Success | ValidationState::Neutral)
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationState::Success => write!(f, "success"),
            ValidationState::Neutral => write!(f, "neutral"),
            ValidationState::Pending => write!(f, "pending"),
            ValidationState::Failure => write!(f, "failure"),
            ValidationState::Error => write!(f, "error"),
            ValidationState::Other(state) => write!(f, "{}", state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub state: ValidationState,
    pub url: Option<String>,
}

impl Validation {
    pub fn new(state: ValidationState, url: Option<String>) -> Self {
        Self { state, url }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} {}", url, self.state),
            None => write!(f, "{}", self.state),
        }
    }
}

/// Validations keyed by context name.
pub type Validations = BTreeMap<String, Validation>;

pub fn collect(combined: &CombinedStatus, suites: &[CheckSuite], runs: &[CheckRun]) -> Validations {
    let mut validations = Validations::new();

    for status in &combined.statuses {
        validations.insert(
            status.context.clone(),
            Validation::new(
                ValidationState::from_api(status.state.as_deref()),
                status.target_url.clone(),
            ),
        );
    }
    for suite in suites {
        validations.insert(
            suite.app.name.clone(),
            Validation::new(
                ValidationState::from_api(suite.conclusion.as_deref()),
                suite.url.clone(),
            ),
        );
    }
    for run in runs
        .iter()
        .filter(|run| !IGNORED_CHECK_RUNS.contains(&run.name.as_str()))
    {
        validations.insert(
            run.name.clone(),
            Validation::new(
                ValidationState::from_api(run.conclusion.as_deref()),
                run.url.clone(),
            ),
        );
    }

    validations
}

/// Selects which contexts count towards the aggregate.
///
/// A context matching `include` is always kept, even when it also matches
/// `exclude`.
#[derive(Debug, Clone, Default)]
pub struct ValidationFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ValidationFilter {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        let compile = |pattern: Option<&str>, name: &str| -> Result<Option<Regex>> {
            pattern
                .filter(|p| !p.is_empty())
                .map(|p| {
                    Regex::new(p).with_context(|| format!("Invalid {} regex {:?}", name, p))
                })
                .transpose()
        };
        Ok(Self {
            include: compile(include, "include-contexts")?,
            exclude: compile(exclude, "exclude-contexts")?,
        })
    }

    pub fn keeps(&self, context: &str) -> bool {
        if self.include.as_ref().is_some_and(|re| re.is_match(context)) {
            return true;
        }
        !self.exclude.as_ref().is_some_and(|re| re.is_match(context))
    }

    pub fn apply(&self, validations: Validations) -> Validations {
        validations
            .into_iter()
            .filter(|(context, _)| self.keeps(context))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    Success,
    Pending,
    Failure,
}

impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateState::Success => write!(f, "success"),
            AggregateState::Pending => write!(f, "pending"),
            AggregateState::Failure => write!(f, "failure"),
        }
    }
}

/// No validations at all means the tests have not started.
pub fn aggregate(validations: &Validations) -> AggregateState {
    if validations.is_empty() || validations.values().any(|v| v.state.is_pending()) {
        return AggregateState::Pending;
    }
    if validations.values().all(|v| v.state.is_passing()) {
        return AggregateState::Success;
    }
    AggregateState::Failure
}

/// Filtered validations of one commit with their aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub sha: String,
    pub state: AggregateState,
    pub validations: Validations,
}

impl StatusReport {
    pub fn new(sha: impl Into<String>, validations: Validations) -> Self {
        Self {
            sha: sha.into(),
            state: aggregate(&validations),
            validations,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == AggregateState::Success
    }

    pub fn is_pending(&self) -> bool {
        self.state == AggregateState::Pending
    }

    /// Contexts whose state is anything but success or neutral.
    pub fn unsuccessful(&self) -> impl Iterator<Item = (&String, &Validation)> {
        self.validations.iter().filter(|(_, v)| !v.state.is_passing())
    }
}
