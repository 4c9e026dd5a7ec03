use serde::{Deserialize, Serialize};

/// An ASG as listed in a cluster.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AsgSummary {
    pub auto_scaling_group_name: String,
    #[serde(default)]
    pub desired_capacity: i64,
    #[serde(default)]
    pub min_size: i64,
}

/// `autoScaling/show/{asg}.json`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AsgInfo {
    #[serde(default)]
    pub cluster_name: String,
    pub group: AsgGroup,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AsgGroup {
    #[serde(default)]
    pub launching_suspended: bool,
    /// Non-null while the ASG is being deleted.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub load_balancer_names: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Task {
    pub status: String,
    #[serde(default)]
    pub log: Vec<String>,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    pub fn last_log_entry(&self) -> &str {
        self.log.last().map(String::as_str).unwrap_or_default()
    }
}

/// Options for deleting an ASG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    pub fail_if_active: bool,
    pub fail_if_last: bool,
    pub wait_for_deletion: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            fail_if_active: true,
            fail_if_last: true,
            wait_for_deletion: true,
        }
    }
}
