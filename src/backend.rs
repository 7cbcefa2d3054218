//! Client for the companion app that owns FAQ content and pending triage.
//!
//! The local store only mirrors question text and embeddings; the canonical
//! answers, usage counters, and the pending-question inbox live behind this
//! API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::BackendConfig;
use crate::error::BackendError;

/// Canonical content of a FAQ entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqContent {
    pub question: String,
    pub answers: Vec<String>,
}

/// Operations against the companion app.
#[async_trait]
pub trait FaqBackend: Send + Sync {
    /// Fetch the canonical question and answers for an entry.
    /// `None` when the entry no longer exists upstream.
    async fn fetch_content(&self, entry_id: i64) -> Result<Option<FaqContent>, BackendError>;

    /// Bump the entry's served counter.
    async fn increment_usage(&self, entry_id: i64) -> Result<(), BackendError>;

    /// Register an unmatched question for human triage. Returns the new
    /// entry id assigned upstream.
    async fn create_pending(
        &self,
        contact: &str,
        lead_id: i64,
        text: &str,
    ) -> Result<i64, BackendError>;

    /// Resolve a playable URL for a stored media asset.
    async fn signed_media_url(&self, asset: &str) -> Result<Option<String>, BackendError>;
}

/// HTTP implementation against the companion app's internal API.
pub struct CompanionBackend {
    base_url: String,
    client: reqwest::Client,
}

impl CompanionBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.base_url.clone(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check_status(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

#[derive(Deserialize)]
struct FaqContentPayload {
    pergunta: String,
    #[serde(default)]
    respostas: Vec<String>,
}

#[derive(Deserialize)]
struct CreatedPayload {
    id: i64,
}

#[derive(Deserialize)]
struct SignedUrlPayload {
    url: Option<String>,
}

#[async_trait]
impl FaqBackend for CompanionBackend {
    async fn fetch_content(&self, entry_id: i64) -> Result<Option<FaqContent>, BackendError> {
        let endpoint = format!("/api/faq/perguntas/{entry_id}");
        let response = self
            .client
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(&endpoint, response).await?;
        let payload: FaqContentPayload =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;

        Ok(Some(FaqContent {
            question: payload.pergunta,
            answers: payload.respostas,
        }))
    }

    async fn increment_usage(&self, entry_id: i64) -> Result<(), BackendError> {
        let endpoint = format!("/api/faq/perguntas/{entry_id}/incrementar-frequencia");
        let response = self
            .client
            .post(self.url(&endpoint))
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Self::check_status(&endpoint, response).await?;
        Ok(())
    }

    async fn create_pending(
        &self,
        contact: &str,
        lead_id: i64,
        text: &str,
    ) -> Result<i64, BackendError> {
        let endpoint = "/api/faq/duvidas-pendentes";
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&json!({
                "contacto_whatsapp": contact,
                "lead_id": lead_id,
                "texto": text,
                "origem": "evo",
            }))
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let response = Self::check_status(endpoint, response).await?;
        let payload: CreatedPayload =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    endpoint: endpoint.to_string(),
                    reason: format!("missing created id: {e}"),
                })?;
        Ok(payload.id)
    }

    async fn signed_media_url(&self, asset: &str) -> Result<Option<String>, BackendError> {
        let endpoint = format!("/api/assets/{asset}/signed-url");
        let response = self
            .client
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(&endpoint, response).await?;
        let payload: SignedUrlPayload =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;
        Ok(payload.url)
    }
}
