use botcheck_core::{JobMetadata, ScoringResult, StartJobResponse};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::ClientConfig;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Server answered 404; the message is user-facing.
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// HTTP client for the job server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts an analysis for `username` and returns the new job's id.
    pub async fn start_bot_check(&self, username: &str) -> Result<StartJobResponse, ApiError> {
        let url = self.endpoint(&["api", "botcheck", username])?;
        self.get_json(url, "Failed to start bot check", None).await
    }

    pub async fn job_metadata(&self, job_id: &str) -> Result<JobMetadata, ApiError> {
        let url = self.endpoint(&["api", "job", job_id])?;
        self.get_json(url, "Failed to get job metadata", Some("Job not found"))
            .await
    }

    pub async fn job_result(&self, job_id: &str) -> Result<ScoringResult, ApiError> {
        let url = self.endpoint(&["api", "job", job_id, "result"])?;
        let result: ScoringResult = self
            .get_json(url, "Failed to get job result", Some("Result not ready yet"))
            .await?;
        result
            .validate()
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
        Ok(result)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|err| ApiError::Network(format!("invalid api base: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Network("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
        not_found: Option<&str>,
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(url);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, context))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, context))?;

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                if let Some(message) = not_found {
                    return Err(ApiError::NotFound(message.to_string()));
                }
            }
            let message = server_message(&body).unwrap_or_else(|| {
                format!("{context}: Request failed with status code {}", status.as_u16())
            });
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }
}

/// `message` field of a JSON error body, when the server sent one.
fn server_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")?
        .as_str()
        .filter(|message| !message.is_empty())
        .map(ToOwned::to_owned)
}

fn map_reqwest_error(err: reqwest::Error, context: &str) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout;
    }
    ApiError::Network(format!("{context}: {err}"))
}
