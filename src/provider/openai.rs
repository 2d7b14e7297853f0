//! OpenAI-Compatible Provider
//!
//! Streams markup generation through the Chat Completions API with SSE.
//! Usage counts arrive on the final chunk when the endpoint supports
//! `stream_options.include_usage`; otherwise the normalizer estimates.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::wire::{decode_json, sse_data_stream};
use super::{ModelProvider, RawChunk, RawStream, SYSTEM_PROMPT};
use crate::config::{GenerationConfig, ProviderConfig};
use crate::constants::providers::OPENAI_API_BASE;
use crate::types::{ForgeError, GenerationRequest, Result, UsageDelta};

/// OpenAI-compatible streaming provider with secure API key handling
pub struct OpenAiProvider {
    name: String,
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    temperature: f32,
    max_tokens: u64,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(name: &str, config: &ProviderConfig, generation: &GenerationConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ForgeError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| OPENAI_API_BASE.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(generation.timeout_secs))
            .build()
            .map_err(|e| ForgeError::provider(name, format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            api_key: SecretString::from(api_key_str),
            api_base,
            temperature: generation.temperature,
            max_tokens: generation.max_output_tokens,
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        // Image attachments promote the user message to content parts,
        // each image carried as a base64 data URL
        let user_content = if request.images.is_empty() {
            MessageContent::Text(request.composed_prompt())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: request.composed_prompt(),
            }];
            parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", image.media_type, image.data),
                },
            }));
            MessageContent::Parts(parts)
        };

        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn open(&self, request: &GenerationRequest) -> Result<RawStream> {
        info!(
            request_id = %request.request_id,
            model = %request.model,
            "Opening OpenAI stream"
        );

        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::provider(&self.name, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::provider(
                &self.name,
                format!("API error ({status}): {body}"),
            ));
        }

        debug!("OpenAI stream open");
        let provider = self.name.clone();
        let chunks = sse_data_stream(response.bytes_stream()).filter_map(move |item| {
            let provider = provider.clone();
            async move {
                match item {
                    Ok(data) => {
                        decode_json::<ChatCompletionChunk>(&data, &provider).map(|c| Ok(c.into()))
                    }
                    Err(e) => Some(Err(e)),
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!("OpenAI API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("OpenAI API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

/// Plain text for text-only turns, content parts when images ride along
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<ChatCompletionChunk> for RawChunk {
    fn from(chunk: ChatCompletionChunk) -> Self {
        // The usage-bearing chunk is the last meaningful event; the
        // trailing [DONE] marker is filtered at the wire layer.
        let usage = chunk
            .usage
            .map(|u| UsageDelta::exact(u.prompt_tokens, u.completion_tokens));
        let delta = chunk
            .choices
            .first()
            .and_then(|c| c.delta.content.clone())
            .filter(|s| !s.is_empty());
        RawChunk {
            delta,
            done: usage.is_some(),
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_chunk_maps_to_delta() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"<div"}}]}"#).unwrap();
        let raw: RawChunk = chunk.into();
        assert_eq!(raw.delta.as_deref(), Some("<div"));
        assert!(!raw.done);
        assert!(raw.usage.is_none());
    }

    #[test]
    fn test_usage_chunk_is_terminal() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#,
        )
        .unwrap();
        let raw: RawChunk = chunk.into();
        assert!(raw.done);
        assert_eq!(raw.usage.unwrap(), UsageDelta::exact(12, 34));
    }

    #[test]
    fn test_images_fold_into_user_content_parts() {
        let config = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..ProviderConfig::openai()
        };
        let provider =
            OpenAiProvider::new("openai", &config, &GenerationConfig::default()).unwrap();
        let request = GenerationRequest::new("u1", "gpt-4o", "match this sketch")
            .with_image("image/png", "aWJvZA==");

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        let content = &body["messages"][1]["content"];
        assert_eq!(content[0]["text"], "match this sketch");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,aWJvZA=="
        );
    }

    #[test]
    fn test_text_only_request_keeps_string_content() {
        let config = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..ProviderConfig::openai()
        };
        let provider =
            OpenAiProvider::new("openai", &config, &GenerationConfig::default()).unwrap();
        let request = GenerationRequest::new("u1", "gpt-4o", "a pricing card");

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert!(body["messages"][1]["content"].is_string());
    }

    #[test]
    fn test_finish_reason_chunk_without_usage_is_not_terminal() {
        // The stream ends via [DONE] / hang-up; the normalizer synthesizes
        // the terminal event if no usage chunk ever arrives.
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        let raw: RawChunk = chunk.into();
        assert!(!raw.done);
        assert!(raw.delta.is_none());
    }
}
