use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::error::{AsgardError, AsgardErrorKind};
use super::types::{AsgInfo, AsgSummary, DeleteOptions, Task};
use crate::http::{self, RawResponse, execute_logged};
use crate::retry::{Outcome, RetryConfig, RetryPolicy, Retryability};
use crate::settings::AsgardSettings;

use AsgardErrorKind::*;

const LOOKUP_RETRYABLE: &[AsgardErrorKind] = &[RateLimited, BackendData];
const INFO_RETRYABLE: &[AsgardErrorKind] = &[RateLimited, Timeout, Backend, AsgCountZero];
const ACTION_RETRYABLE: &[AsgardErrorKind] = &[RateLimited, Timeout, Backend];
const CREATE_RETRYABLE: &[AsgardErrorKind] = &[JavaSocket];
const TASK_POLL_RETRYABLE: &[AsgardErrorKind] = &[RateLimited, Backend];

const ENABLE_TASK_TIMEOUT: Duration = Duration::from_secs(301);
const DISABLE_TASK_TIMEOUT: Duration = Duration::from_secs(300);
const DELETE_TASK_TIMEOUT: Duration = Duration::from_secs(300);

const TOKEN_PARAM: &str = "asgardApiToken";

#[derive(Debug, thiserror::Error)]
enum TaskPoll {
    #[error("task is still running")]
    Running,
    /// A failed poll still within the retry budget.
    #[error(transparent)]
    Transient(AsgardError),
    #[error(transparent)]
    Failed(AsgardError),
}

/// Client for the Asgard REST API of one region.
pub struct Asgard {
    http: Client,
    endpoint: String,
    token: Option<String>,
    task_poll_interval: Duration,
    new_asg_timeout: Duration,
    disable_old_asg_wait: Duration,
    retry: RetryConfig,
}

impl Asgard {
    pub fn new(http: Client, settings: &AsgardSettings, retry: RetryConfig) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .context("No Asgard endpoint configured; set ASGARD_API_ENDPOINTS")?;
        retry.validate().context("Invalid Asgard retry settings")?;
        if settings.token.is_none() {
            warn!("ASGARD_API_TOKEN is not set, calling Asgard without a token");
        }
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            task_poll_interval: settings.task_poll_interval,
            new_asg_timeout: settings.new_asg_timeout,
            disable_old_asg_wait: settings.disable_old_asg_wait,
            retry,
        })
    }

    /// Maps each cluster containing any of `asgs` to all of its ASGs.
    #[tracing::instrument(skip(self))]
    pub async fn clusters_for_asgs(
        &self,
        asgs: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, AsgardError> {
        let url = &format!("{}/cluster/list.json", self.endpoint);
        debug!("Getting cluster list from {}...", url);

        self.run("Listing clusters", LOOKUP_RETRYABLE, || async move {
            let value = self.get_value(&url).await?;
            let clusters = value.as_array().ok_or_else(|| {
                AsgardError::BackendData(format!("Expected a list of clusters, got: {}", value))
            })?;

            let mut relevant = BTreeMap::new();
            for cluster in clusters {
                let name = cluster.get("cluster").and_then(Value::as_str);
                let groups = cluster.get("autoScalingGroups").and_then(Value::as_array);
                let (Some(name), Some(groups)) = (name, groups) else {
                    return Err(AsgardError::BackendData(format!(
                        "Expected 'cluster' and 'autoScalingGroups' keys in dict: {}",
                        cluster
                    )));
                };
                let groups: Vec<String> = groups
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if groups.iter().any(|group| asgs.contains(group)) {
                    relevant.insert(name.to_string(), groups);
                }
            }
            Ok(relevant)
        })
        .await
    }

    /// All ASGs of `cluster`, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn asgs_for_cluster(&self, cluster: &str) -> Result<Vec<AsgSummary>, AsgardError> {
        let url = &self.cluster_url(cluster);

        self.run("Listing ASGs of cluster", LOOKUP_RETRYABLE, || async move {
            let value = self.get_value(&url).await?;
            let asgs: Vec<AsgSummary> = decode(value)?;
            if asgs.is_empty() {
                return Err(AsgardError::BackendData(format!(
                    "Expected a list of dicts with an 'autoScalingGroupName' attribute for cluster {}",
                    cluster
                )));
            }
            Ok(asgs)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn asg_info(&self, asg: &str) -> Result<AsgInfo, AsgardError> {
        let url = &self.asg_url(asg);
        self.run("Fetching ASG info", INFO_RETRYABLE, || async move {
            self.resource_info(&url, || AsgardError::AsgDoesNotExist(asg.to_string()))
                .await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cluster_info(&self, cluster: &str) -> Result<Vec<AsgSummary>, AsgardError> {
        let url = &self.cluster_url(cluster);
        self.run("Fetching cluster info", INFO_RETRYABLE, || async move {
            self.resource_info(&url, || AsgardError::ClusterDoesNotExist(cluster.to_string()))
                .await
        })
        .await
    }

    /// A missing ASG is not enabled.
    pub async fn is_asg_enabled(&self, asg: &str) -> Result<bool, AsgardError> {
        match self.asg_info(asg).await {
            Ok(info) => Ok(!info.group.launching_suspended),
            Err(AsgardError::AsgDoesNotExist(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_asg_pending_delete(&self, asg: &str) -> Result<bool, AsgardError> {
        Ok(self.asg_info(asg).await?.group.status.is_some())
    }

    /// Whether `asg` is the only ASG left in its cluster.
    pub async fn is_last_asg(&self, asg: &str) -> Result<bool, AsgardError> {
        let info = self.asg_info(asg).await?;
        let cluster = self.cluster_info(&info.cluster_name).await?;
        Ok(cluster.len() == 1)
    }

    #[tracing::instrument(skip(self))]
    pub async fn elbs_for_asg(&self, asg: &str) -> Result<Vec<String>, AsgardError> {
        let url = &self.asg_url(asg);

        self.run("Listing ELBs of ASG", LOOKUP_RETRYABLE, || async move {
            let value = self.get_value(&url).await?;
            let elbs = value
                .pointer("/group/loadBalancerNames")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AsgardError::BackendData(format!(
                        "Expected a dict with path ['group']['loadBalancerNames']. Got: {}",
                        value
                    ))
                })?;
            Ok(elbs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect())
        })
        .await
    }

    /// Polls `task_url` until the task completes or fails, giving up with
    /// [`AsgardError::Timeout`] after `timeout`.
    ///
    /// A running task is polled until the deadline. Failed polls count
    /// against the Asgard retry budget; the counter resets on any answer.
    #[tracing::instrument(skip(self))]
    pub async fn wait_for_task_completion(
        &self,
        task_url: &str,
        timeout: Duration,
    ) -> Result<Task, AsgardError> {
        let url = task_json_url(task_url)?;
        let url = url.as_str();
        debug!("Waiting for task {}...", url);

        let config = RetryConfig {
            max_attempts: u32::MAX,
            base_delay: self.task_poll_interval,
            max_total: Some(timeout),
            backoff_factor: 1.0,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::new(config, |poll: &TaskPoll| match poll {
            TaskPoll::Running | TaskPoll::Transient(_) => Retryability::Retryable,
            TaskPoll::Failed(_) => Retryability::Fatal,
        })?;

        let max_failures = self.retry.max_attempts;
        let failures = &AtomicU32::new(0);
        let result = policy
            .execute_observed(
                || async move {
                    match self.get_json::<Task>(url).await {
                        Ok(task) => {
                            failures.store(0, Ordering::Relaxed);
                            if task.is_finished() {
                                Ok(task)
                            } else {
                                Err(TaskPoll::Running)
                            }
                        }
                        Err(e) => {
                            let failed = failures.fetch_add(1, Ordering::Relaxed) + 1;
                            if failed < max_failures && TASK_POLL_RETRYABLE.contains(&e.kind()) {
                                Err(TaskPoll::Transient(e))
                            } else {
                                Err(TaskPoll::Failed(e))
                            }
                        }
                    }
                },
                |attempt, error| match error {
                    Some(TaskPoll::Running) => {
                        debug!("Task {} still running after {:?}", url, attempt.elapsed)
                    }
                    Some(e) if attempt.outcome == Outcome::RetryableFailure => {
                        warn!("Polling task {} failed ({}), trying again...", url, e)
                    }
                    _ => {}
                },
            )
            .await;

        match result {
            Ok(task) => Ok(task),
            Err(TaskPoll::Running) => Err(AsgardError::Timeout(format!(
                "Timed out while waiting for task {}",
                url
            ))),
            Err(TaskPoll::Transient(e)) | Err(TaskPoll::Failed(e)) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn enable_asg(&self, asg: &str) -> Result<(), AsgardError> {
        self.run("Enabling ASG", ACTION_RETRYABLE, || async move {
            let response = self.post_cluster_action("activate", asg).await?;
            let task = self
                .wait_for_task_completion(&response.url, ENABLE_TASK_TIMEOUT)
                .await?;
            ensure_succeeded(&task, "enabling")?;
            info!("Enabled ASG {}", asg);
            Ok(())
        })
        .await
    }

    /// Disables `asg` unless it is already being deleted or gone. Refuses to
    /// disable the last ASG of a cluster.
    #[tracing::instrument(skip(self))]
    pub async fn disable_asg(&self, asg: &str) -> Result<(), AsgardError> {
        self.run("Disabling ASG", ACTION_RETRYABLE, || async move {
            match self.is_asg_pending_delete(asg).await {
                Ok(true) => {
                    info!("Not disabling old ASG {} due to its pending deletion.", asg);
                    return Ok(());
                }
                Err(AsgardError::AsgDoesNotExist(_)) => {
                    info!("Not disabling ASG {}, it no longer exists.", asg);
                    return Ok(());
                }
                Err(e) => return Err(e),
                Ok(false) => {}
            }

            if self.is_last_asg(asg).await? {
                return Err(AsgardError::CannotDisableActiveAsg(format!(
                    "Not disabling ASG {}, it is the last ASG in this cluster.",
                    asg
                )));
            }

            let response = self.post_cluster_action("deactivate", asg).await?;
            let task = self
                .wait_for_task_completion(&response.url, DISABLE_TASK_TIMEOUT)
                .await?;
            ensure_succeeded(&task, "disabling")?;
            info!("Disabled ASG {}", asg);
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_asg(&self, asg: &str, options: DeleteOptions) -> Result<(), AsgardError> {
        self.run("Deleting ASG", ACTION_RETRYABLE, || async move {
            if self.is_asg_pending_delete(asg).await? {
                info!("Not deleting ASG {} due to its already pending deletion.", asg);
                return Ok(());
            }
            if options.fail_if_active && self.is_asg_enabled(asg).await? {
                let msg = format!("Not deleting ASG {} as it is currently active.", asg);
                warn!("{}", msg);
                return Err(AsgardError::CannotDeleteActiveAsg(msg));
            }
            if options.fail_if_last && self.is_last_asg(asg).await? {
                let msg = format!(
                    "Not deleting ASG {} since it is the last ASG in this cluster.",
                    asg
                );
                warn!("{}", msg);
                return Err(AsgardError::CannotDeleteLastAsg(msg));
            }

            let response = self.post_cluster_action("delete", asg).await?;
            if options.wait_for_deletion {
                let task = self
                    .wait_for_task_completion(&response.url, DELETE_TASK_TIMEOUT)
                    .await?;
                ensure_succeeded(&task, "deleting")?;
                info!("Deleted ASG {}", asg);
            }
            Ok(())
        })
        .await
    }

    /// Creates the next ASG of `cluster` from `ami_id` and returns its name.
    #[tracing::instrument(skip(self))]
    pub async fn new_asg(&self, cluster: &str, ami_id: &str) -> Result<String, AsgardError> {
        let url = &format!("{}/cluster/createNextGroup", self.endpoint);

        self.run("Creating ASG", CREATE_RETRYABLE, || async move {
            let form = [("name", cluster), ("imageId", ami_id)];
            let response = http::post_form_once(&self.http, &url, &self.token_query(), &form)
                .await
                .map_err(AsgardError::from_http)?;
            debug!("Sent request to create new ASG in cluster {}.", cluster);

            if response.status == StatusCode::NOT_FOUND {
                return Err(AsgardError::Backend(format!(
                    "Can't create more ASGs for cluster {}. Please either wait until older ASGs \
                     have been removed automatically or remove old ASGs manually via Asgard.",
                    cluster
                )));
            }
            // redirects are followed, so success is the task page
            if response.status != StatusCode::OK {
                return Err(AsgardError::Backend(format!(
                    "Error occurred attempting to create new ASG for cluster {}.\nResponse: {}",
                    cluster, response.body
                )));
            }

            let task = self
                .wait_for_task_completion(&response.url, self.new_asg_timeout)
                .await?;
            if task.is_failed() {
                let msg = format!(
                    "Failure during new ASG creation. Task Log: \n{}",
                    task.log.join("\n")
                );
                if task.last_log_entry().contains("java.net.SocketException") {
                    return Err(AsgardError::JavaSocket(msg));
                }
                return Err(AsgardError::Backend(msg));
            }

            let asgs = self.asgs_for_cluster(cluster).await?;
            let newest = asgs.last().ok_or_else(|| {
                AsgardError::BackendData(format!("Cluster {} has no ASGs", cluster))
            })?;
            debug!(
                "New ASG {} created in cluster {}.",
                newest.auto_scaling_group_name, cluster
            );

            if newest.desired_capacity <= 0 || newest.min_size <= 0 {
                return Err(AsgardError::AsgCountZero(format!(
                    "New ASG {} created with 0 instances, aborting. Please check Asgard for more information",
                    newest.auto_scaling_group_name
                )));
            }
            Ok(newest.auto_scaling_group_name.clone())
        })
        .await
    }

    pub(super) fn disable_old_asg_wait(&self) -> Duration {
        self.disable_old_asg_wait
    }

    async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        retryable: &'static [AsgardErrorKind],
        operation: F,
    ) -> Result<T, AsgardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AsgardError>>,
    {
        let policy = RetryPolicy::new(self.retry.clone(), move |e: &AsgardError| {
            Retryability::from(retryable.contains(&e.kind()))
        })?;
        execute_logged(&policy, operation_name, operation).await
    }

    fn token_query(&self) -> Vec<(&str, &str)> {
        self.token
            .as_deref()
            .map(|token| vec![(TOKEN_PARAM, token)])
            .unwrap_or_default()
    }

    fn asg_url(&self, asg: &str) -> String {
        format!("{}/autoScaling/show/{}.json", self.endpoint, asg)
    }

    fn cluster_url(&self, cluster: &str) -> String {
        format!("{}/cluster/show/{}.json", self.endpoint, cluster)
    }

    async fn get(&self, url: &str) -> Result<RawResponse, AsgardError> {
        http::get_once(&self.http, url, &self.token_query())
            .await
            .map_err(AsgardError::from_http)
    }

    async fn get_value(&self, url: &str) -> Result<Value, AsgardError> {
        parse_response(&self.get(url).await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AsgardError> {
        decode(self.get_value(url).await?)
    }

    async fn resource_info<T, M>(&self, url: &str, missing: M) -> Result<T, AsgardError>
    where
        T: DeserializeOwned,
        M: FnOnce() -> AsgardError,
    {
        let response = self.get(url).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(missing());
        }
        if response.status.is_server_error() {
            return Err(AsgardError::Backend(format!(
                "Asgard experienced an error: {}",
                response.body
            )));
        }
        if response.status != StatusCode::OK {
            return Err(AsgardError::Backend(format!(
                "Call to asgard failed with status code: {}: {}",
                response.status.as_u16(),
                response.body
            )));
        }
        decode(parse_response(&response)?)
    }

    async fn post_cluster_action(&self, action: &str, asg: &str) -> Result<RawResponse, AsgardError> {
        let url = format!("{}/cluster/{}", self.endpoint, action);
        http::post_form_once(&self.http, &url, &self.token_query(), &[("name", asg)])
            .await
            .map_err(AsgardError::from_http)
    }
}

/// Asgard sometimes answers with an HTML error page, and reports AWS
/// throttling only inside a failed task's log.
fn parse_response(response: &RawResponse) -> Result<Value, AsgardError> {
    let value: Value = serde_json::from_str(&response.body).map_err(|_| {
        AsgardError::Backend(format!(
            "Expected json response from url: '{}' - but got the following:\n{}",
            response.url, response.body
        ))
    })?;

    let failed = value.get("status").and_then(Value::as_str) == Some("failed");
    let last_log = value
        .get("log")
        .and_then(Value::as_array)
        .and_then(|log| log.last())
        .and_then(Value::as_str)
        .unwrap_or_default();
    if failed
        && last_log.contains("com.amazonaws.AmazonServiceException")
        && last_log.contains("Throttling")
    {
        return Err(AsgardError::RateLimited(
            "AWS is throttling requests from Asgard".to_string(),
        ));
    }
    Ok(value)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AsgardError> {
    serde_json::from_value(value).map_err(|e| AsgardError::BackendData(e.to_string()))
}

fn task_json_url(task_url: &str) -> Result<String, AsgardError> {
    let mut url = Url::parse(task_url)
        .map_err(|e| AsgardError::BackendData(format!("Invalid task URL {:?}: {}", task_url, e)))?;
    if !url.path().ends_with(".json") {
        let path = format!("{}.json", url.path());
        url.set_path(&path);
    }
    Ok(url.to_string())
}

fn ensure_succeeded(task: &Task, action: &str) -> Result<(), AsgardError> {
    if task.is_failed() {
        return Err(AsgardError::Backend(format!(
            "Failure while {} ASG. Task Log: \n{}",
            action,
            task.log.join("\n")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, ServerGuard};
    use serde_json::json;

    const TOKEN: &str = "test-token";

    fn token() -> Matcher {
        Matcher::UrlEncoded(TOKEN_PARAM.into(), TOKEN.into())
    }

    fn asgard(server: &ServerGuard) -> Asgard {
        asgard_with(server, RetryConfig::constant(3, Duration::ZERO))
    }

    fn asgard_with(server: &ServerGuard, retry: RetryConfig) -> Asgard {
        let settings = AsgardSettings {
            endpoint: Some(server.url()),
            token: Some(TOKEN.to_string()),
            request_timeout: Duration::from_secs(5),
            task_poll_interval: Duration::from_millis(10),
            new_asg_timeout: Duration::from_secs(2),
            ..AsgardSettings::default()
        };
        Asgard::new(Client::new(), &settings, retry).unwrap()
    }

    fn completed_task() -> Value {
        json!({
            "log": ["2016-02-11_02:31:11 Started", "2016-02-11_02:31:12 Completed in 0s."],
            "status": "completed",
        })
    }

    fn failed_task(last_line: &str) -> Value {
        json!({
            "log": ["2016-02-11_02:31:18 Started", last_line],
            "status": "failed",
        })
    }

    fn running_task() -> Value {
        json!({
            "log": ["2016-02-11_19:03:37 Group has 0 instances. Waiting for 4 to exist."],
            "status": "running",
        })
    }

    fn cluster_json() -> Value {
        json!([
            {"autoScalingGroupName": "loadtest-edx-edxapp-v058", "desiredCapacity": 4, "minSize": 4},
            {"autoScalingGroupName": "loadtest-edx-edxapp-v059", "desiredCapacity": 4, "minSize": 4}
        ])
    }

    fn asg_json(cluster: &str, launching_suspended: bool, status: Option<&str>) -> Value {
        json!({
            "clusterName": cluster,
            "group": {
                "launchingSuspended": launching_suspended,
                "status": status,
                "loadBalancerNames": ["app_elb"],
            }
        })
    }

    async fn mock_json(server: &mut ServerGuard, method: &str, path: &str, body: Value) -> Mock {
        server
            .mock(method, path)
            .match_query(token())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// POST to a cluster action redirecting to a task that has finished.
    async fn mock_action(server: &mut ServerGuard, action: &str, task: Value) -> (Mock, Mock, Mock) {
        let post = server
            .mock("POST", format!("/cluster/{}", action).as_str())
            .match_query(token())
            .with_status(302)
            .with_header("location", "/task/show/1")
            .create_async()
            .await;
        let redirect = server
            .mock("GET", "/task/show/1")
            .with_status(200)
            .with_body("<html>task page</html>")
            .create_async()
            .await;
        let task = mock_json(server, "GET", "/task/show/1.json", task).await;
        (post, task, redirect)
    }

    #[tokio::test]
    async fn test_clusters_for_asgs() {
        let mut server = mockito::Server::new_async().await;
        let mock = mock_json(
            &mut server,
            "GET",
            "/cluster/list.json",
            json!([
                {"cluster": "loadtest-edx-edxapp", "autoScalingGroups": ["loadtest-edx-edxapp-v058", "loadtest-edx-edxapp-v059"]},
                {"cluster": "loadtest-edx-insights", "autoScalingGroups": ["loadtest-edx-insights-v002"]},
                {"cluster": "loadtest-edx-worker", "autoScalingGroups": ["loadtest-edx-worker-v034"]}
            ]),
        )
        .await;

        let asgs = vec![
            "loadtest-edx-edxapp-v059".to_string(),
            "loadtest-edx-worker-v034".to_string(),
        ];
        let clusters = asgard(&server).clusters_for_asgs(&asgs).await.unwrap();

        mock.assert_async().await;
        assert_eq!(clusters.len(), 2);
        assert_eq!(
            clusters["loadtest-edx-edxapp"],
            vec!["loadtest-edx-edxapp-v058", "loadtest-edx-edxapp-v059"]
        );
        assert_eq!(clusters["loadtest-edx-worker"], vec!["loadtest-edx-worker-v034"]);
    }

    #[tokio::test]
    async fn test_clusters_for_asgs_bad_data_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cluster/list.json")
            .match_query(token())
            .with_status(200)
            .with_body(json!([{"autoScalingGroups": ["loadtest-edx-edxapp-v058"]}]).to_string())
            .expect(3)
            .create_async()
            .await;

        let result = asgard(&server)
            .clusters_for_asgs(&["loadtest-edx-edxapp-v058".to_string()])
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap_err().kind(), AsgardErrorKind::BackendData);
    }

    #[tokio::test]
    async fn test_non_json_response_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cluster/list.json")
            .match_query(token())
            .with_status(200)
            .with_body("<HTML><HEAD>Have some HTML</HEAD></HTML>")
            .expect(1)
            .create_async()
            .await;

        let result = asgard(&server).clusters_for_asgs(&[]).await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), AsgardErrorKind::Backend);
        assert!(err.to_string().contains("Expected json response"));
    }

    #[tokio::test]
    async fn test_asgs_for_cluster() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "GET",
            "/cluster/show/loadtest-edx-edxapp.json",
            cluster_json(),
        )
        .await;
        let _empty = mock_json(&mut server, "GET", "/cluster/show/empty.json", json!([])).await;

        let asgard = asgard(&server);
        let asgs = asgard.asgs_for_cluster("loadtest-edx-edxapp").await.unwrap();
        assert_eq!(asgs.len(), 2);
        assert_eq!(asgs[1].auto_scaling_group_name, "loadtest-edx-edxapp-v059");

        let err = asgard.asgs_for_cluster("empty").await.unwrap_err();
        assert_eq!(err.kind(), AsgardErrorKind::BackendData);
    }

    #[tokio::test]
    async fn test_asg_info_missing_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/autoScaling/show/test-asg.json")
            .match_query(token())
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result = asgard(&server).asg_info("test-asg").await;

        mock.assert_async().await;
        assert_eq!(
            result.unwrap_err(),
            AsgardError::AsgDoesNotExist("test-asg".to_string())
        );
    }

    #[tokio::test]
    async fn test_cluster_info_missing() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/cluster/show/gone.json")
            .match_query(token())
            .with_status(404)
            .create_async()
            .await;

        let err = asgard(&server).cluster_info("gone").await.unwrap_err();
        assert_eq!(err.kind(), AsgardErrorKind::ClusterDoesNotExist);
    }

    #[test_log::test(tokio::test)]
    async fn test_asg_info_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/autoScaling/show/test-asg.json")
            .match_query(token())
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(3)
            .create_async()
            .await;

        let result = asgard(&server).asg_info("test-asg").await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), AsgardErrorKind::Backend);
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[tokio::test]
    async fn test_is_asg_enabled() {
        let mut server = mockito::Server::new_async().await;
        let _enabled = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/enabled.json",
            asg_json("app", false, None),
        )
        .await;
        let _disabled = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/disabled.json",
            asg_json("app", true, None),
        )
        .await;
        let _missing = server
            .mock("GET", "/autoScaling/show/missing.json")
            .match_query(token())
            .with_status(404)
            .create_async()
            .await;

        let asgard = asgard(&server);
        assert!(asgard.is_asg_enabled("enabled").await.unwrap());
        assert!(!asgard.is_asg_enabled("disabled").await.unwrap());
        assert!(!asgard.is_asg_enabled("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_asg_pending_delete_and_is_last_asg() {
        let mut server = mockito::Server::new_async().await;
        let _deleting = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/deleting.json",
            asg_json("app", true, Some("deleting")),
        )
        .await;
        let _single = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/only.json",
            asg_json("solo", false, None),
        )
        .await;
        let _solo = mock_json(
            &mut server,
            "GET",
            "/cluster/show/solo.json",
            json!([{"autoScalingGroupName": "only", "desiredCapacity": 4}]),
        )
        .await;
        let _app = mock_json(&mut server, "GET", "/cluster/show/app.json", cluster_json()).await;

        let asgard = asgard(&server);
        assert!(asgard.is_asg_pending_delete("deleting").await.unwrap());
        assert!(!asgard.is_asg_pending_delete("only").await.unwrap());
        assert!(asgard.is_last_asg("only").await.unwrap());
        assert!(!asgard.is_last_asg("deleting").await.unwrap());
    }

    #[tokio::test]
    async fn test_elbs_for_asg() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/app.json",
            json!({"group": {"loadBalancerNames": ["app_elb"], "desiredCapacity": 4}}),
        )
        .await;
        let _bad = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/bad.json",
            json!({"group": null}),
        )
        .await;

        let asgard = asgard(&server);
        assert_eq!(asgard.elbs_for_asg("app").await.unwrap(), vec!["app_elb"]);
        assert_eq!(
            asgard.elbs_for_asg("bad").await.unwrap_err().kind(),
            AsgardErrorKind::BackendData
        );
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_polls_until_finished() {
        let mut server = mockito::Server::new_async().await;
        let running = server
            .mock("GET", "/task/show/7.json")
            .match_query(token())
            .with_status(200)
            .with_body(running_task().to_string())
            .expect(2)
            .create_async()
            .await;
        let completed = mock_json(&mut server, "GET", "/task/show/7.json", completed_task()).await;

        let task = asgard(&server)
            .wait_for_task_completion(&format!("{}/task/show/7", server.url()), Duration::from_secs(5))
            .await
            .unwrap();

        running.assert_async().await;
        completed.assert_async().await;
        assert_eq!(task.status, "completed");
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_returns_failed_task() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "GET",
            "/task/show/7.json",
            failed_task("Exception: com.netflix.asgard.push.PushException: Timeout"),
        )
        .await;

        let task = asgard(&server)
            .wait_for_task_completion(&format!("{}/task/show/7.json", server.url()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(task.is_failed());
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_times_out() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_json(&mut server, "GET", "/task/show/7.json", running_task()).await;

        let result = asgard(&server)
            .wait_for_task_completion(&format!("{}/task/show/7", server.url()), Duration::from_millis(50))
            .await;

        assert_eq!(result.unwrap_err().kind(), AsgardErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_bounds_failed_polls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/task/show/7.json")
            .match_query(token())
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(3)
            .create_async()
            .await;

        let result = asgard(&server)
            .wait_for_task_completion(&format!("{}/task/show/7", server.url()), Duration::from_secs(5))
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap_err().kind(), AsgardErrorKind::Backend);
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_single_attempt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/task/show/7.json")
            .match_query(token())
            .with_status(502)
            .expect(1)
            .create_async()
            .await;

        let result = asgard_with(&server, RetryConfig::single_attempt())
            .wait_for_task_completion(&format!("{}/task/show/7", server.url()), Duration::from_secs(5))
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap_err().kind(), AsgardErrorKind::Backend);
    }

    #[tokio::test]
    async fn test_wait_for_task_completion_bad_task_data_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/task/show/7.json")
            .match_query(token())
            .with_status(200)
            .with_body("[1, 2]")
            .expect(1)
            .create_async()
            .await;

        let result = asgard(&server)
            .wait_for_task_completion(&format!("{}/task/show/7", server.url()), Duration::from_secs(5))
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap_err().kind(), AsgardErrorKind::BackendData);
    }

    #[test]
    fn test_parse_response_detects_throttling() {
        let response = RawResponse {
            status: StatusCode::OK,
            url: "http://asgard/task/show/1.json".to_string(),
            body: failed_task(
                "Exception: com.amazonaws.AmazonServiceException: Rate exceeded (Service: \
                 AmazonAutoScaling; Status Code: 400; Error Code: Throttling)",
            )
            .to_string(),
        };
        assert_eq!(
            parse_response(&response).unwrap_err().kind(),
            AsgardErrorKind::RateLimited
        );

        let response = RawResponse {
            body: completed_task().to_string(),
            ..response
        };
        assert!(parse_response(&response).is_ok());
    }

    #[test]
    fn test_task_json_url() {
        assert_eq!(
            task_json_url("http://asgard:8091/us-east-1/task/show/12").unwrap(),
            "http://asgard:8091/us-east-1/task/show/12.json"
        );
        assert_eq!(
            task_json_url("http://asgard/task/show/12.json?x=1").unwrap(),
            "http://asgard/task/show/12.json?x=1"
        );
        assert!(task_json_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_enable_asg() {
        let mut server = mockito::Server::new_async().await;
        let (post, task, _redirect) = mock_action(&mut server, "activate", completed_task()).await;

        asgard(&server).enable_asg("test-asg").await.unwrap();

        post.assert_async().await;
        task.assert_async().await;
    }

    #[tokio::test]
    async fn test_enable_asg_failed_task_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/cluster/activate")
            .match_query(token())
            .match_body(Matcher::UrlEncoded("name".into(), "test-asg".into()))
            .with_status(302)
            .with_header("location", "/task/show/1")
            .expect(3)
            .create_async()
            .await;
        let _redirect = server
            .mock("GET", "/task/show/1")
            .with_status(200)
            .create_async()
            .await;
        let _task = mock_json(&mut server, "GET", "/task/show/1.json", failed_task("boom")).await;

        let err = asgard(&server).enable_asg("test-asg").await.unwrap_err();

        post.assert_async().await;
        assert_eq!(err.kind(), AsgardErrorKind::Backend);
        assert!(err.to_string().contains("Failure while enabling ASG"));
    }

    #[tokio::test]
    async fn test_disable_asg() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/loadtest-edx-edxapp-v058.json",
            asg_json("loadtest-edx-edxapp", false, None),
        )
        .await;
        let _cluster = mock_json(
            &mut server,
            "GET",
            "/cluster/show/loadtest-edx-edxapp.json",
            cluster_json(),
        )
        .await;
        let (post, _task, _redirect) = mock_action(&mut server, "deactivate", completed_task()).await;

        asgard(&server)
            .disable_asg("loadtest-edx-edxapp-v058")
            .await
            .unwrap();

        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_disable_asg_skips_pending_delete_and_missing() {
        let mut server = mockito::Server::new_async().await;
        let _deleting = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/deleting.json",
            asg_json("app", true, Some("deleting")),
        )
        .await;
        let _missing = server
            .mock("GET", "/autoScaling/show/missing.json")
            .match_query(token())
            .with_status(404)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/cluster/deactivate")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let asgard = asgard(&server);
        asgard.disable_asg("deleting").await.unwrap();
        asgard.disable_asg("missing").await.unwrap();

        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_disable_last_asg_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/only.json",
            asg_json("solo", false, None),
        )
        .await;
        let _cluster = mock_json(
            &mut server,
            "GET",
            "/cluster/show/solo.json",
            json!([{"autoScalingGroupName": "only"}]),
        )
        .await;

        let err = asgard(&server).disable_asg("only").await.unwrap_err();
        assert_eq!(err.kind(), AsgardErrorKind::CannotDisableActiveAsg);
    }

    #[tokio::test]
    async fn test_delete_active_asg_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/active.json",
            asg_json("app", false, None),
        )
        .await;
        let post = server
            .mock("POST", "/cluster/delete")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = asgard(&server)
            .delete_asg("active", DeleteOptions::default())
            .await
            .unwrap_err();

        post.assert_async().await;
        assert_eq!(err.kind(), AsgardErrorKind::CannotDeleteActiveAsg);
    }

    #[tokio::test]
    async fn test_delete_asg_without_waiting() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/old.json",
            asg_json("app", true, None),
        )
        .await;
        let _cluster = mock_json(&mut server, "GET", "/cluster/show/app.json", cluster_json()).await;
        let post = server
            .mock("POST", "/cluster/delete")
            .match_query(token())
            .match_body(Matcher::UrlEncoded("name".into(), "old".into()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let task = server
            .mock("GET", Matcher::Regex(r"^/cluster/delete\.json".to_string()))
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let options = DeleteOptions {
            wait_for_deletion: false,
            ..DeleteOptions::default()
        };
        asgard(&server).delete_asg("old", options).await.unwrap();

        post.assert_async().await;
        task.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_asg_already_pending_delete() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_json(
            &mut server,
            "GET",
            "/autoScaling/show/deleting.json",
            asg_json("app", true, Some("deleting")),
        )
        .await;

        asgard(&server)
            .delete_asg("deleting", DeleteOptions::default())
            .await
            .unwrap();
    }

    async fn mock_create(server: &mut ServerGuard, status: usize, hits: usize) -> Mock {
        server
            .mock("POST", "/cluster/createNextGroup")
            .match_query(token())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "loadtest-edx-edxapp".into()),
                Matcher::UrlEncoded("imageId".into(), "ami-abc123".into()),
            ]))
            .with_status(status)
            .with_header("location", "/task/show/1")
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_new_asg() {
        let mut server = mockito::Server::new_async().await;
        let post = mock_create(&mut server, 302, 1).await;
        let _redirect = server
            .mock("GET", "/task/show/1")
            .with_status(200)
            .create_async()
            .await;
        let _task = mock_json(&mut server, "GET", "/task/show/1.json", completed_task()).await;
        let _cluster = mock_json(
            &mut server,
            "GET",
            "/cluster/show/loadtest-edx-edxapp.json",
            cluster_json(),
        )
        .await;

        let name = asgard(&server)
            .new_asg("loadtest-edx-edxapp", "ami-abc123")
            .await
            .unwrap();

        post.assert_async().await;
        assert_eq!(name, "loadtest-edx-edxapp-v059");
    }

    #[tokio::test]
    async fn test_new_asg_limit_reached() {
        let mut server = mockito::Server::new_async().await;
        let post = mock_create(&mut server, 404, 1).await;

        let err = asgard(&server)
            .new_asg("loadtest-edx-edxapp", "ami-abc123")
            .await
            .unwrap_err();

        post.assert_async().await;
        assert_eq!(err.kind(), AsgardErrorKind::Backend);
        assert!(err.to_string().contains("Can't create more ASGs"));
    }

    #[tokio::test]
    async fn test_new_asg_java_socket_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let post = mock_create(&mut server, 302, 3).await;
        let _redirect = server
            .mock("GET", "/task/show/1")
            .with_status(200)
            .create_async()
            .await;
        let _task = mock_json(
            &mut server,
            "GET",
            "/task/show/1.json",
            failed_task("Exception: java.net.SocketException: Connection reset"),
        )
        .await;

        let err = asgard(&server)
            .new_asg("loadtest-edx-edxapp", "ami-abc123")
            .await
            .unwrap_err();

        post.assert_async().await;
        assert_eq!(err.kind(), AsgardErrorKind::JavaSocket);
    }

    #[tokio::test]
    async fn test_new_asg_with_zero_instances() {
        let mut server = mockito::Server::new_async().await;
        let _post = mock_create(&mut server, 302, 1).await;
        let _redirect = server
            .mock("GET", "/task/show/1")
            .with_status(200)
            .create_async()
            .await;
        let _task = mock_json(&mut server, "GET", "/task/show/1.json", completed_task()).await;
        let _cluster = mock_json(
            &mut server,
            "GET",
            "/cluster/show/loadtest-edx-edxapp.json",
            json!([
                {"autoScalingGroupName": "loadtest-edx-edxapp-v058", "desiredCapacity": 4, "minSize": 4},
                {"autoScalingGroupName": "loadtest-edx-edxapp-v059", "desiredCapacity": 0, "minSize": 0}
            ]),
        )
        .await;

        let err = asgard(&server)
            .new_asg("loadtest-edx-edxapp", "ami-abc123")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AsgardErrorKind::AsgCountZero);
        assert!(err.to_string().contains("loadtest-edx-edxapp-v059"));
    }

    #[test]
    fn test_new_requires_endpoint() {
        let result = Asgard::new(Client::new(), &AsgardSettings::default(), RetryConfig::default());
        assert!(result.is_err());
    }
}
