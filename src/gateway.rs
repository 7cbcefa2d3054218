//! Evolution API client for outbound WhatsApp traffic.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::warn;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Outbound message channel.
///
/// Implementations must be safe to call concurrently; the engine shares one
/// instance across all webhook tasks.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(
        &self,
        instance: &str,
        number: &str,
        text: &str,
    ) -> Result<(), GatewayError>;

    async fn send_audio(
        &self,
        instance: &str,
        number: &str,
        audio_url: &str,
    ) -> Result<(), GatewayError>;

    /// Best-effort "composing" presence, shown while the matcher works.
    async fn send_presence(&self, instance: &str, number: &str) -> Result<(), GatewayError>;
}

/// HTTP client for an Evolution API deployment.
///
/// When no base URL or key is configured the gateway runs dry: every send
/// logs a warning and reports success, so local development works without
/// a WhatsApp instance.
pub struct EvolutionGateway {
    base_url: Option<String>,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl EvolutionGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            client,
        }
    }

    fn api_url(&self, path: &str, instance: &str) -> Option<String> {
        let base = self.base_url.as_ref()?;
        Some(format!("{base}/{path}/{instance}"))
    }

    async fn post(
        &self,
        path: &str,
        instance: &str,
        number: &str,
        body: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let Some(url) = self.api_url(path, instance) else {
            warn!(number, path, "Gateway not configured, dropping outbound message");
            return Ok(());
        };
        let Some(api_key) = self.api_key.as_ref() else {
            warn!(number, path, "Gateway key not configured, dropping outbound message");
            return Ok(());
        };

        let response = self
            .client
            .post(&url)
            .header("apikey", api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::SendFailed {
                number: number.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                endpoint: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for EvolutionGateway {
    async fn send_text(
        &self,
        instance: &str,
        number: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            "message/sendText",
            instance,
            number,
            json!({ "number": number, "text": text }),
        )
        .await
    }

    async fn send_audio(
        &self,
        instance: &str,
        number: &str,
        audio_url: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            "message/sendWhatsAppAudio",
            instance,
            number,
            json!({ "number": number, "audio": audio_url }),
        )
        .await
    }

    async fn send_presence(&self, instance: &str, number: &str) -> Result<(), GatewayError> {
        self.post(
            "chat/sendPresence",
            instance,
            number,
            json!({ "number": number, "presence": "composing", "delay": 3000 }),
        )
        .await
    }
}
