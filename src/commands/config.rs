use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    asgard::Asgard,
    github::GitHub,
    http::HttpClient,
    runtime::Runtime,
    settings::Settings,
};

const USER_AGENT: &str = concat!("tubular/", env!("TUBULAR_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Settings plus the service clients built from them.
pub struct Config {
    pub settings: Settings,
}

impl Config {
    pub fn load<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let settings = Settings::load(runtime).context("Failed to load settings")?;
        Ok(Self { settings })
    }

    /// GitHub client retrying with the GitHub policy.
    pub fn github(&self, api_url: Option<String>) -> Result<GitHub> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        if let Some(token) = &self.settings.github_token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GITHUB_TOKEN is not a valid header value")?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using GITHUB_TOKEN for authentication: {}", mask(token));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        let http = HttpClient::new(client, self.settings.retry.github.clone())
            .context("Invalid GitHub retry settings")?;
        Ok(GitHub::new(http, api_url))
    }

    /// Asgard client. `endpoint` overrides `ASGARD_API_ENDPOINTS`.
    pub fn asgard(&self, endpoint: Option<String>) -> Result<Asgard> {
        let mut settings = self.settings.asgard.clone();
        if endpoint.is_some() {
            settings.endpoint = endpoint;
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()?;
        // Asgard operations retry on their own error kinds, not on HTTP statuses
        Asgard::new(client, &settings, self.settings.retry.asgard.clone())
    }
}

fn mask(token: &str) -> String {
    match (token.get(..4), token.len().checked_sub(4).and_then(|i| token.get(i..))) {
        (Some(head), Some(tail)) if token.len() > 12 => format!("{}*********{}", head, tail),
        _ => "*********".to_string(),
    }
}
