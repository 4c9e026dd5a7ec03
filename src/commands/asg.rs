use anyhow::{Context, Result};
use log::info;

use super::config::Config;
use crate::{asgard::DeleteOptions, runtime::Runtime};

#[tracing::instrument(skip(runtime, endpoint))]
pub async fn enable_asg<R: Runtime + ?Sized>(
    runtime: &R,
    asg: &str,
    endpoint: Option<String>,
) -> Result<()> {
    let asg = asg.trim();
    let asgard = Config::load(runtime)?.asgard(endpoint)?;
    asgard
        .enable_asg(asg)
        .await
        .with_context(|| format!("Error enabling ASG: {}", asg))?;
    info!("ASG {} enabled", asg);
    Ok(())
}

#[tracing::instrument(skip(runtime, endpoint))]
pub async fn disable_asg<R: Runtime + ?Sized>(
    runtime: &R,
    asg: &str,
    endpoint: Option<String>,
) -> Result<()> {
    let asg = asg.trim();
    let asgard = Config::load(runtime)?.asgard(endpoint)?;
    asgard
        .disable_asg(asg)
        .await
        .with_context(|| format!("Error disabling ASG: {}", asg))
}

#[tracing::instrument(skip(runtime, endpoint))]
pub async fn delete_asg<R: Runtime + ?Sized>(
    runtime: &R,
    asg: &str,
    options: DeleteOptions,
    endpoint: Option<String>,
) -> Result<()> {
    let asg = asg.trim();
    let asgard = Config::load(runtime)?.asgard(endpoint)?;
    asgard
        .delete_asg(asg, options)
        .await
        .with_context(|| format!("Error deleting ASG: {}", asg))
}
