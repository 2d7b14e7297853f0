//! Ollama Local Provider
//!
//! Streams markup generation from locally-running Ollama models. Ollama
//! speaks chunked JSON lines rather than SSE; the final line carries
//! `done: true` plus exact token counts.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::wire::{decode_json, json_line_stream};
use super::{ModelProvider, RawChunk, RawStream, SYSTEM_PROMPT};
use crate::config::{GenerationConfig, ProviderConfig};
use crate::constants::providers::OLLAMA_API_BASE;
use crate::types::{ForgeError, GenerationRequest, Result, UsageDelta};

/// Ollama local streaming provider
pub struct OllamaProvider {
    name: String,
    api_base: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(name: &str, config: &ProviderConfig, generation: &GenerationConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| OLLAMA_API_BASE.to_string());

        // Validate endpoint URL for security (SSRF prevention)
        let api_base = Self::validate_endpoint(&api_base)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(generation.timeout_secs))
            .build()
            .map_err(|e| ForgeError::provider(name, format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            api_base,
            temperature: generation.temperature,
            client,
        })
    }

    /// Validate endpoint URL for security (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ForgeError::Config(format!("Invalid Ollama endpoint URL '{endpoint}': {e}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForgeError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "::1")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, request: &GenerationRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: request.composed_prompt(),
            // Ollama takes bare base64 payloads; the media type is
            // sniffed server-side
            images: request
                .images
                .iter()
                .map(|image| image.data.clone())
                .collect(),
            stream: true,
            options: Some(OllamaOptions {
                temperature: self.temperature,
            }),
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn open(&self, request: &GenerationRequest) -> Result<RawStream> {
        info!(
            request_id = %request.request_id,
            model = %request.model,
            "Opening Ollama stream"
        );

        let body = self.build_request(request);
        let url = format!("{}/api/generate", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ForgeError::provider(
                        &self.name,
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                            self.api_base
                        ),
                    )
                } else {
                    ForgeError::provider(&self.name, format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::provider(
                &self.name,
                format!("API error ({status}): {body}"),
            ));
        }

        debug!("Ollama stream open");
        let provider = self.name.clone();
        let chunks = json_line_stream(response.bytes_stream()).filter_map(move |item| {
            let provider = provider.clone();
            async move {
                match item {
                    Ok(line) => {
                        decode_json::<OllamaChunk>(&line, &provider).map(|c| Ok(c.into()))
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
        let url = format!("{}/api/tags", self.api_base);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!("Ollama API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    system: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl From<OllamaChunk> for RawChunk {
    fn from(chunk: OllamaChunk) -> Self {
        let usage = match (chunk.prompt_eval_count, chunk.eval_count) {
            (None, None) => None,
            (input, output) => Some(UsageDelta::exact(
                input.unwrap_or(0),
                output.unwrap_or(0),
            )),
        };
        RawChunk {
            delta: (!chunk.response.is_empty()).then_some(chunk.response),
            usage,
            done: chunk.done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_line_maps_to_delta() {
        let chunk: OllamaChunk =
            serde_json::from_str(r#"{"response":"<div>","done":false}"#).unwrap();
        let raw: RawChunk = chunk.into();
        assert_eq!(raw.delta.as_deref(), Some("<div>"));
        assert!(!raw.done);
        assert!(raw.usage.is_none());
    }

    #[test]
    fn test_final_line_carries_usage() {
        let chunk: OllamaChunk = serde_json::from_str(
            r#"{"response":"","done":true,"prompt_eval_count":21,"eval_count":55}"#,
        )
        .unwrap();
        let raw: RawChunk = chunk.into();
        assert!(raw.done);
        assert_eq!(raw.usage.unwrap(), UsageDelta::exact(21, 55));
    }

    #[test]
    fn test_images_forwarded_as_base64_array() {
        let provider = OllamaProvider::new(
            "ollama",
            &ProviderConfig::ollama(),
            &GenerationConfig::default(),
        )
        .unwrap();
        let request =
            GenerationRequest::new("u1", "llama3", "match this sketch").with_image("image/png", "aWJvZA==");

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["images"][0], "aWJvZA==");

        let plain = GenerationRequest::new("u1", "llama3", "a pricing card");
        let body = serde_json::to_value(provider.build_request(&plain)).unwrap();
        assert!(body.get("images").is_none());
    }

    #[test]
    fn test_endpoint_scheme_validation() {
        assert!(OllamaProvider::validate_endpoint("ftp://localhost:11434").is_err());
        assert!(OllamaProvider::validate_endpoint("not a url").is_err());
        assert_eq!(
            OllamaProvider::validate_endpoint("http://localhost:11434/").unwrap(),
            "http://localhost:11434"
        );
    }
}
