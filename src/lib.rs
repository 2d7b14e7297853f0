//! uiforge - Streaming UI Generation & Conversion Pipeline
//!
//! Generates UI markup through a unified streaming LLM interface and
//! converts the result into framework-native components.
//!
//! ## Core Features
//!
//! - **Provider Abstraction**: one streaming contract over OpenAI,
//!   Anthropic, and Ollama wire protocols
//! - **Canonical Token Stream**: ordered events with exactly one
//!   terminal, faults carried in-band instead of torn connections
//! - **Quota Ledger**: per-user reservations with bounded overshoot and
//!   append-only usage records
//! - **Markup Recovery**: permissive parsing of imperfect model output
//!   into a canonical tree
//! - **Conversion Compiler**: deterministic React, Svelte, and custom
//!   element emitters with shared pattern detection
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use uiforge::{ConfigLoader, Orchestrator, ProviderRouter, QuotaLedger};
//! use uiforge::quota::MemoryUsageStore;
//! use uiforge::types::GenerationRequest;
//!
//! let config = ConfigLoader::load()?;
//! let router = Arc::new(ProviderRouter::from_config(&config)?);
//! let ledger = QuotaLedger::new(
//!     Arc::new(MemoryUsageStore::new()),
//!     config.quota.limit_tokens,
//!     config.quota.window_secs,
//! );
//! let orchestrator = Orchestrator::from_config(router, ledger, &config);
//!
//! let request = GenerationRequest::new("user-1", "gpt-4o", "a pricing card");
//! let mut handle = orchestrator.generate(request).await?;
//! while let Some(event) = handle.next_event().await {
//!     print!("{}", event.delta);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`provider`]: streaming LLM adapters, routing, normalization
//! - [`quota`]: per-user admission control and usage accounting
//! - [`orchestrator`]: the per-request generation state machine
//! - [`markup`]: permissive parsing into the canonical tree
//! - [`convert`]: framework-native component emission

pub mod cli;
pub mod config;
pub mod constants;
pub mod convert;
pub mod estimate;
pub mod markup;
pub mod orchestrator;
pub mod provider;
pub mod quota;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ForgeError, Result, StreamFault};

// Pipeline
pub use orchestrator::{GenerationHandle, GenerationOutcome, Orchestrator, PartialReason};
pub use provider::{ModelProvider, ProviderRouter, RawChunk, RawStream, SharedProvider};
pub use quota::{QuotaLedger, QuotaSnapshot, UsageStore};

// =============================================================================
// Conversion Re-exports
// =============================================================================

pub use convert::{ConversionTarget, convert, convert_named};
pub use markup::{MarkupNode, parse};
