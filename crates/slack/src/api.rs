//! Minimal Slack Web API client: just the methods the bot needs to open a socket mode
//! connection and to check its credentials.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use slashbot_core::config::SlackConfig;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build Slack HTTP client: {0}")]
    Client(String),
    #[error("Slack `{method}` request failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Slack `{method}` returned HTTP {status}")]
    Status { method: &'static str, status: StatusCode },
    #[error("Slack `{method}` returned an unreadable body: {message}")]
    Decode { method: &'static str, message: String },
    #[error("Slack `{method}` failed: {code}")]
    Slack { method: &'static str, code: String },
    #[error("Slack `{method}` response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
}

/// Identity returned by `auth.test`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub user_id: String,
    pub bot_id: Option<String>,
}

#[derive(Deserialize)]
struct ConnectionsOpen {
    url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SlackApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl SlackApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ApiError::Client(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();

        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls `apps.connections.open` and returns the socket mode WebSocket URL.
    pub async fn open_connection(&self, app_token: &SecretString) -> Result<String, ApiError> {
        const METHOD: &str = "apps.connections.open";

        let response: ConnectionsOpen = self.call(METHOD, app_token).await?;
        response
            .url
            .filter(|url| !url.is_empty())
            .ok_or(ApiError::MissingField { method: METHOD, field: "url" })
    }

    pub async fn auth_test(&self, bot_token: &SecretString) -> Result<AuthIdentity, ApiError> {
        self.call("auth.test", bot_token).await
    }

    async fn call<T>(&self, method: &'static str, token: &SecretString) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.base_url);
        debug!(method, "calling Slack Web API");

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|source| ApiError::Http { method, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { method, status });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| ApiError::Decode { method, message: error.to_string() })?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            return Err(ApiError::Slack { method, code: code.to_owned() });
        }

        serde_json::from_value(body)
            .map_err(|error| ApiError::Decode { method, message: error.to_string() })
    }
}
