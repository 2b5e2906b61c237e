// Handles communication with the remote image generation and history services

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::history::RemoteHistoryEntry;
use crate::identity::UserIdentity;
use crate::session::{GenerationRequest, GenerationResult};

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, ApiError>;
}

#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn history(&self, user_id: &UserIdentity) -> Result<Vec<RemoteHistoryEntry>, ApiError>;
}

#[async_trait]
pub trait HealthService: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub gpu_available: bool,
    #[serde(default)]
    pub model_loaded: bool,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    image: String,
    prompt: String,
    timestamp: String,
    #[serde(default)]
    enhanced_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: Vec<RemoteHistoryEntry>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

/// HTTP client for the generation backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: Config,
}

impl HttpBackend {
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl HealthService for HttpBackend {
    async fn health(&self) -> Result<HealthStatus, ApiError> {
        let response = self.client.get(self.config.endpoint("health")).send().await?;
        let body = read_success_body(response).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GenerationService for HttpBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, ApiError> {
        let response = self
            .client
            .post(self.config.endpoint("generate"))
            .json(&GenerateBody {
                prompt: &request.prompt,
                user_id: request.user_id.as_str(),
            })
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let payload: GenerateResponse = decode_envelope(&body)?;
        Ok(GenerationResult {
            image: payload.image,
            prompt: payload.prompt,
            timestamp: payload.timestamp,
            enhanced_prompt: payload.enhanced_prompt,
        })
    }
}

#[async_trait]
impl HistoryService for HttpBackend {
    async fn history(&self, user_id: &UserIdentity) -> Result<Vec<RemoteHistoryEntry>, ApiError> {
        let response = self
            .client
            .get(self.config.endpoint("history"))
            .query(&[("user_id", user_id.as_str())])
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let payload: HistoryResponse = decode_envelope(&body)?;
        Ok(payload.history)
    }
}

/// Returns the body of a 2xx response, or the service's `detail` otherwise.
async fn read_success_body(response: Response) -> Result<Vec<u8>, ApiError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        return Ok(body.to_vec());
    }

    // Only a string detail is shown; structured validation details are not.
    let detail = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail)
        .and_then(|d| d.as_str().map(str::to_string));
    warn!(%status, has_detail = detail.is_some(), "service returned an error status");
    Err(ApiError::Status { status, detail })
}

/// Decodes `{"success": true, ...}` into `T`. `success: false` is a
/// rejection; a missing flag or missing fields are malformed.
fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    match value.get("success").and_then(Value::as_bool) {
        Some(true) => {
            serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
        }
        Some(false) => {
            debug!("service reported success: false");
            Err(ApiError::Rejected)
        }
        None => Err(ApiError::Malformed("missing `success` flag".to_string())),
    }
}
