use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use super::config::Config;
use crate::{asgard::DeployInfo, runtime::Runtime};

/// Deploys `ami_id` next to the clusters of `asgs` and records the result.
#[tracing::instrument(skip(runtime, endpoint))]
pub async fn deploy_asg<R: Runtime + ?Sized>(
    runtime: &R,
    ami_id: &str,
    asgs: &[String],
    out_file: Option<&Path>,
    endpoint: Option<String>,
) -> Result<()> {
    let ami_id = ami_id.trim();
    let asgard = Config::load(runtime)?.asgard(endpoint)?;
    let record = asgard
        .deploy(ami_id, asgs)
        .await
        .with_context(|| format!("Error deploying AMI: {}", ami_id))?;
    write_deploy_info(runtime, &record, out_file)
}

/// Rolls back the deploy recorded in `config_file`.
#[tracing::instrument(skip(runtime, endpoint))]
pub async fn rollback_asg<R: Runtime + ?Sized>(
    runtime: &R,
    config_file: &Path,
    out_file: Option<&Path>,
    endpoint: Option<String>,
) -> Result<()> {
    let plan = read_deploy_info(runtime, config_file)?;
    let ami_id = plan.ami_id.as_deref();
    let asgard = Config::load(runtime)?.asgard(endpoint)?;
    let record = asgard
        .rollback(&plan.current_asgs, &plan.disabled_asgs, ami_id)
        .await
        .with_context(|| format!("Error rolling back AMI: {}", ami_id.unwrap_or("none")))?;
    write_deploy_info(runtime, &record, out_file)
}

pub fn read_deploy_info<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<DeployInfo> {
    let contents = runtime.read_to_string(path)?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid deploy record in {}", path.display()))
}

/// Prints the record, or writes it to `out_file`.
pub fn write_deploy_info<R: Runtime + ?Sized>(
    runtime: &R,
    record: &DeployInfo,
    out_file: Option<&Path>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    match out_file {
        Some(path) => {
            runtime.write(path, json.as_bytes())?;
            info!("Deploy record written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
