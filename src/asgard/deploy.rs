//! Red/black deploys and rollbacks across clusters.
//!
//! New ASGs start disabled ("black"). They are enabled next to the running
//! ones, and only once every new ASG is still healthy are the old ones
//! disabled. Any failure before that point disables the new ASGs again and
//! leaves the old ones serving.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::client::Asgard;
use super::error::AsgardError;

/// ASG names keyed by cluster name.
pub type ClusteredAsgs = BTreeMap<String, Vec<String>>;

/// What a deploy or rollback left behind. A deploy record doubles as the
/// plan for rolling that deploy back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeployInfo {
    #[serde(default)]
    pub ami_id: Option<String>,
    #[serde(default)]
    pub current_asgs: ClusteredAsgs,
    #[serde(default)]
    pub disabled_asgs: ClusteredAsgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedBlackOutcome {
    pub success: bool,
    pub enabled: ClusteredAsgs,
    pub disabled: ClusteredAsgs,
}

impl Asgard {
    /// Enables `new` alongside `baseline`, then disables `baseline`.
    ///
    /// A failure to enable any new ASG disables all new ASGs again and reports
    /// `success: false`. Failing to disable an old ASG only logs a warning.
    #[tracing::instrument(skip(self))]
    pub async fn red_black_deploy(
        &self,
        new: &ClusteredAsgs,
        baseline: &ClusteredAsgs,
    ) -> Result<RedBlackOutcome, AsgardError> {
        let mut enabled = baseline.clone();
        let mut disabled = new.clone();
        let mut newly_enabled = ClusteredAsgs::new();
        let mut elbs = Vec::new();

        for (cluster, asgs) in new {
            for asg in asgs {
                let result = match self.enable_asg(asg).await {
                    Ok(()) => {
                        move_asg(&mut disabled, &mut enabled, cluster, asg);
                        self.elbs_for_asg(asg).await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(asg_elbs) => {
                        elbs.extend(asg_elbs);
                        newly_enabled
                            .entry(cluster.clone())
                            .or_default()
                            .push(asg.clone());
                    }
                    Err(e) => {
                        error!(
                            "Error enabling ASG '{}': {}. Disabling traffic to all new ASGs.",
                            asg, e
                        );
                        self.disable_quietly(&mut enabled, &mut disabled, cluster, asg)
                            .await;
                        for (cluster, asgs) in &newly_enabled {
                            for asg in asgs {
                                self.disable_quietly(&mut enabled, &mut disabled, cluster, asg)
                                    .await;
                            }
                        }
                        return Ok(RedBlackOutcome {
                            success: false,
                            enabled,
                            disabled,
                        });
                    }
                }
            }
        }

        info!(
            "New ASGs {:?} are active behind ELBs {:?} and will be available after passing the healthchecks.",
            newly_enabled, elbs
        );

        let settle = self.disable_old_asg_wait();
        if !settle.is_zero() {
            info!("Waiting {:?} before disabling old ASGs...", settle);
            tokio::time::sleep(settle).await;
        }

        for asg in newly_enabled.values().flatten() {
            let problem = if self.is_asg_pending_delete(asg).await? {
                Some(format!("New ASG '{}' is pending delete.", asg))
            } else if !self.is_asg_enabled(asg).await? {
                Some(format!("New ASG '{}' is not enabled.", asg))
            } else {
                None
            };
            if let Some(problem) = problem {
                error!("{} Aborting disabling of old ASGs.", problem);
                return Ok(RedBlackOutcome {
                    success: false,
                    enabled,
                    disabled,
                });
            }
        }

        info!("New ASGs have passed the healthchecks. Now disabling old ASGs.");

        for (cluster, asgs) in baseline {
            for asg in asgs {
                if self.is_asg_enabled(asg).await? {
                    match self.disable_asg(asg).await {
                        Ok(()) => move_asg(&mut enabled, &mut disabled, cluster, asg),
                        Err(e) => warn!(
                            "Unable to disable ASG '{}' after enabling new ASGs: {}",
                            asg, e
                        ),
                    }
                } else if contains(&enabled, cluster, asg) {
                    // disabled or removed since the baseline was listed
                    move_asg(&mut enabled, &mut disabled, cluster, asg);
                }
            }
        }

        Ok(RedBlackOutcome {
            success: true,
            enabled,
            disabled,
        })
    }

    /// Creates a new ASG from `ami_id` in every cluster holding one of
    /// `existing_asgs`, then red/black deploys them over the whole clusters.
    #[tracing::instrument(skip(self))]
    pub async fn deploy(
        &self,
        ami_id: &str,
        existing_asgs: &[String],
    ) -> Result<DeployInfo, AsgardError> {
        info!("Processing request to deploy {}.", ami_id);

        let existing = self.clusters_for_asgs(existing_asgs).await?;
        if existing.is_empty() {
            return Err(AsgardError::BackendData(format!(
                "No cluster contains any of the ASGs {:?}",
                existing_asgs
            )));
        }
        info!("Deploying to cluster(s) {:?}", existing.keys());

        let mut new = ClusteredAsgs::new();
        for cluster in existing.keys() {
            match self.new_asg(cluster, ami_id).await {
                Ok(asg) => new.entry(cluster.clone()).or_default().push(asg),
                Err(e) => {
                    error!(
                        "ASG creation failed for cluster '{}' but succeeded for cluster(s) {:?}.",
                        cluster,
                        new.keys()
                    );
                    return Err(e);
                }
            }
        }
        info!("New ASGs created: {:?}", new);

        let outcome = self.red_black_deploy(&new, &existing).await?;
        if !outcome.success {
            return Err(AsgardError::Backend(format!(
                "Error performing red/black deploy - deploy was unsuccessful. \
                 enabled_asgs: {:?} - disabled_asgs: {:?}",
                outcome.enabled, outcome.disabled
            )));
        }

        info!("Deploy of {} done.", ami_id);
        Ok(DeployInfo {
            ami_id: Some(ami_id.to_string()),
            current_asgs: outcome.enabled,
            disabled_asgs: outcome.disabled,
        })
    }

    /// Re-enables `rollback_to` and disables `current`. When those ASGs are
    /// gone or being deleted, or the switch fails, deploys `ami_id` afresh
    /// instead. Without an AMI the record is returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn rollback(
        &self,
        current: &ClusteredAsgs,
        rollback_to: &ClusteredAsgs,
        ami_id: Option<&str>,
    ) -> Result<DeployInfo, AsgardError> {
        if self.rollback_ready(rollback_to).await? {
            let outcome = self.red_black_deploy(rollback_to, current).await?;
            if outcome.success {
                info!("Rollback done.");
                return Ok(DeployInfo {
                    ami_id: ami_id.map(str::to_string),
                    current_asgs: outcome.enabled,
                    disabled_asgs: outcome.disabled,
                });
            }
            info!("Rollback failed for cluster(s) {:?}.", current.keys());
        }

        match ami_id {
            Some(ami_id) => {
                info!("Attempting rollback via deploy of AMI {}.", ami_id);
                let existing: Vec<String> = current
                    .values()
                    .chain(rollback_to.values())
                    .flatten()
                    .cloned()
                    .collect();
                self.deploy(ami_id, &existing).await
            }
            None => {
                info!("No AMI id specified - so no deploy occurred during rollback.");
                Ok(DeployInfo {
                    ami_id: None,
                    current_asgs: current.clone(),
                    disabled_asgs: rollback_to.clone(),
                })
            }
        }
    }

    async fn rollback_ready(&self, rollback_to: &ClusteredAsgs) -> Result<bool, AsgardError> {
        for asg in rollback_to.values().flatten() {
            match self.is_asg_pending_delete(asg).await {
                Ok(false) => {}
                Ok(true) => {
                    info!("Rollback ASG '{}' is pending delete. Aborting rollback to ASGs.", asg);
                    return Ok(false);
                }
                Err(AsgardError::AsgDoesNotExist(_)) => {
                    info!("Rollback ASG '{}' has been removed. Aborting rollback to ASGs.", asg);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    async fn disable_quietly(
        &self,
        enabled: &mut ClusteredAsgs,
        disabled: &mut ClusteredAsgs,
        cluster: &str,
        asg: &str,
    ) {
        match self.disable_asg(asg).await {
            Ok(()) => move_asg(enabled, disabled, cluster, asg),
            Err(e) => warn!("Unable to disable ASG '{}' after failure: {}", asg, e),
        }
    }
}

fn contains(asgs: &ClusteredAsgs, cluster: &str, asg: &str) -> bool {
    asgs.get(cluster).is_some_and(|asgs| asgs.iter().any(|a| a == asg))
}

/// Moves `asg` between the lists of `cluster`, keeping each list duplicate-free.
fn move_asg(from: &mut ClusteredAsgs, to: &mut ClusteredAsgs, cluster: &str, asg: &str) {
    if let Some(asgs) = from.get_mut(cluster) {
        asgs.retain(|a| a != asg);
    }
    let target = to.entry(cluster.to_string()).or_default();
    if !target.iter().any(|a| a == asg) {
        target.push(asg.to_string());
    }
}
