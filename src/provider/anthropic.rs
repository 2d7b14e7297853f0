//! Anthropic Messages Provider
//!
//! Streams markup generation through the Messages API with SSE. Anthropic
//! splits usage accounting across events: input tokens arrive on
//! `message_start`, output tokens on the final `message_delta`; the
//! normalizer merges them.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::wire::{decode_json, sse_data_stream};
use super::{ModelProvider, RawChunk, RawStream, SYSTEM_PROMPT};
use crate::config::{GenerationConfig, ProviderConfig};
use crate::constants::providers::{ANTHROPIC_API_BASE, ANTHROPIC_VERSION};
use crate::types::{ForgeError, GenerationRequest, Result, UsageDelta};

/// Anthropic streaming provider with secure API key handling
pub struct AnthropicProvider {
    name: String,
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    temperature: f32,
    max_tokens: u64,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(name: &str, config: &ProviderConfig, generation: &GenerationConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                ForgeError::Config(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_BASE.to_string());

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

    fn build_request(&self, request: &GenerationRequest) -> MessagesRequest {
        // Image attachments promote the user message to content blocks,
        // images leading so the prompt text refers back to them
        let content = if request.images.is_empty() {
            MessageContent::Text(request.composed_prompt())
        } else {
            let mut blocks: Vec<ContentBlock> = request
                .images
                .iter()
                .map(|image| ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: image.media_type.clone(),
                        data: image.data.clone(),
                    },
                })
                .collect();
            blocks.push(ContentBlock::Text {
                text: request.composed_prompt(),
            });
            MessageContent::Blocks(blocks)
        };

        MessagesRequest {
            model: request.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn open(&self, request: &GenerationRequest) -> Result<RawStream> {
        info!(
            request_id = %request.request_id,
            model = %request.model,
            "Opening Anthropic stream"
        );

        let body = self.build_request(request);
        let url = format!("{}/v1/messages", self.api_base);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        debug!("Anthropic stream open");
        let provider = self.name.clone();
        let chunks = sse_data_stream(response.bytes_stream()).filter_map(move |item| {
            let provider = provider.clone();
            async move {
                match item {
                    Ok(data) => decode_json::<StreamEvent>(&data, &provider)
                        .and_then(|ev| ev.into_raw_chunk())
                        .map(Ok),
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
        // No unauthenticated ping endpoint; a HEAD against the base URL
        // verifies reachability.
        match self.client.head(&self.api_base).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Anthropic API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    system: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: MessageContent,
}

/// Plain text for text-only turns, content blocks when images ride along
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ContentDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<OutputUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    // ping, content_block_start, content_block_stop, error
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<InputUsage>,
}

#[derive(Debug, Deserialize)]
struct InputUsage {
    #[serde(default)]
    input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

impl StreamEvent {
    /// Map to a raw chunk; `None` for events with nothing to relay.
    fn into_raw_chunk(self) -> Option<RawChunk> {
        match self {
            Self::MessageStart { message } => {
                let input = message.usage.map(|u| u.input_tokens).unwrap_or(0);
                (input > 0).then(|| RawChunk {
                    usage: Some(UsageDelta::exact(input, 0)),
                    ..Default::default()
                })
            }
            Self::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
            } => Some(RawChunk::delta(text)),
            Self::MessageDelta { usage } => usage.map(|u| RawChunk {
                usage: Some(UsageDelta::exact(0, u.output_tokens)),
                ..Default::default()
            }),
            Self::MessageStop => Some(RawChunk::done()),
            _ => None,
        }
    }
}
