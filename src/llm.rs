//! OpenAI adapter behind the [`LanguageModel`] trait.
//!
//! The funnel treats the model as optional: every call site must cope with
//! `None`, and the service keeps running (escalating questions instead of
//! answering) when no API key is configured.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::warn;

use crate::config::LlmConfig;

/// Inputs longer than this are truncated before embedding.
pub const MAX_EMBED_CHARS: usize = 8000;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const REWRITE_SYSTEM_PROMPT: &str = "Recebes uma mensagem de WhatsApp com uma pergunta sobre \
crédito habitação em Portugal. Remove saudações, despedidas e ruído, e devolve apenas a \
pergunta, reformulada de forma clara e autónoma. Preserva o sentido original. Responde só \
com a pergunta, sem comentários.";

/// Embedding and rewrite operations used by the FAQ matcher.
///
/// Failures are soft: both operations return `None` and the caller decides
/// how to degrade. Only [`LanguageModel::is_enabled`] distinguishes "not
/// configured" from "configured but failing".
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Embed `text` into a similarity vector.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;

    /// Rewrite a raw question into a standalone, noise-free form.
    async fn rewrite(&self, text: &str) -> Option<String>;
}

/// Production model backed by the OpenAI API.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiModel {
    /// Returns `None` when no API key is configured.
    pub fn new(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key.as_ref()?;
        let client =
            Client::with_config(OpenAIConfig::new().with_api_key(api_key.expose_secret()));
        Some(Self {
            client,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let input = truncate_chars(text, MAX_EMBED_CHARS);

        let request = match CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(vec![input.to_string()])
            .build()
        {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to build embedding request: {e}");
                return None;
            }
        };

        let response =
            match tokio::time::timeout(REQUEST_TIMEOUT, self.client.embeddings().create(request))
                .await
            {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    warn!("Embedding request failed: {e}");
                    return None;
                }
                Err(_) => {
                    warn!("Embedding request timed out");
                    return None;
                }
            };

        response.data.into_iter().next().map(|d| d.embedding)
    }

    async fn rewrite(&self, text: &str) -> Option<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(REWRITE_SYSTEM_PROMPT)
                .build()
                .ok()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()
                .ok()?
                .into(),
        ];

        let request = match CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .max_tokens(120u32)
            .temperature(0.0)
            .build()
        {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to build rewrite request: {e}");
                return None;
            }
        };

        let response =
            match tokio::time::timeout(REQUEST_TIMEOUT, self.client.chat().create(request)).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    warn!("Rewrite request failed: {e}");
                    return None;
                }
                Err(_) => {
                    warn!("Rewrite request timed out");
                    return None;
                }
            };

        let content = response.choices.into_iter().next()?.message.content?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// No-op model for deployments without an API key.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }

    async fn rewrite(&self, _text: &str) -> Option<String> {
        None
    }
}

/// Truncate on a char boundary so multibyte input never splits.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 4), "héll");
        assert_eq!(truncate_chars(text, 100), text);
    }

    #[test]
    fn truncate_caps_long_input() {
        let text = "a".repeat(MAX_EMBED_CHARS + 500);
        assert_eq!(truncate_chars(&text, MAX_EMBED_CHARS).len(), MAX_EMBED_CHARS);
    }

    #[tokio::test]
    async fn disabled_model_declines_everything() {
        let model = DisabledModel;
        assert!(!model.is_enabled());
        assert!(model.embed("qualquer coisa").await.is_none());
        assert!(model.rewrite("qualquer coisa").await.is_none());
    }

    #[test]
    fn model_requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            chat_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
        };
        assert!(OpenAiModel::new(&config).is_none());
    }
}
