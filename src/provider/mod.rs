//! LLM Provider Abstraction
//!
//! Defines the ModelProvider trait for streaming markup generation.
//! Each provider speaks its own wire-level streaming protocol (SSE,
//! chunked JSON lines); all of them surface the same lazy [`RawChunk`]
//! sequence, which the normalizer turns into canonical token events.
//!
//! ## Modules
//!
//! - `router`: model identifier -> provider dispatch
//! - `normalize`: canonical token event normalization
//! - `wire`: shared byte-stream line/SSE parsing

mod anthropic;
mod normalize;
mod ollama;
mod openai;
mod router;
mod wire;

pub use anthropic::AnthropicProvider;
pub use normalize::{NormalizeOptions, TokenStream, normalize};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use router::ProviderRouter;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{GenerationConfig, ProviderConfig, ProviderKind};
use crate::types::{GenerationRequest, Result, UsageDelta};

/// System prompt shared by every provider adapter
pub(crate) const SYSTEM_PROMPT: &str = "You are a UI generator. Respond only with HTML markup \
using Tailwind utility classes for styling. No explanations, no code fences.";

// =============================================================================
// Raw Provider Stream
// =============================================================================

/// One decoded unit from a provider's wire stream, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawChunk {
    /// Text delta, if this chunk carried any
    pub delta: Option<String>,
    /// Usage accounting, possibly partial (some providers report input
    /// and output counts in separate events)
    pub usage: Option<UsageDelta>,
    /// True when the provider signalled end of generation
    pub done: bool,
}

impl RawChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn done_with_usage(usage: UsageDelta) -> Self {
        Self {
            usage: Some(usage),
            done: true,
            ..Default::default()
        }
    }
}

/// Lazy, finite, non-restartable chunk sequence from one provider call.
/// Transport failures surface as `Err` items and end the stream.
pub type RawStream = Pin<Box<dyn Stream<Item = Result<RawChunk>> + Send>>;

// =============================================================================
// Model Provider Trait
// =============================================================================

/// Streaming LLM provider.
///
/// `open` performs the network call and returns the provider's chunk
/// stream; it does no retrying and no quota accounting - those belong to
/// the orchestrator and ledger.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Open a generation stream for the request
    async fn open(&self, request: &GenerationRequest) -> Result<RawStream>;

    /// Provider name for logging and usage records
    fn name(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Shared provider type for concurrent access across requests.
pub type SharedProvider = Arc<dyn ModelProvider>;

/// Create a shared provider from configuration
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
    generation: &GenerationConfig,
) -> Result<SharedProvider> {
    match config.kind {
        ProviderKind::Openai => Ok(Arc::new(OpenAiProvider::new(name, config, generation)?)),
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(name, config, generation)?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(name, config, generation)?)),
    }
}
