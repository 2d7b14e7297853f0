//! Unified Error Type System
//!
//! Centralized error types for the whole pipeline.
//!
//! ## Error Taxonomy
//!
//! - **QuotaExceeded**: admission denied by the ledger, no side effects
//! - **UnknownModel**: routing failure, signalled before any network call
//! - **ProviderStream**: transport/provider fault mid-stream; partial
//!   output may still be usable
//! - **MalformedMarkup**: unrecoverable parse failure, no conversion run
//! - **UnsupportedConstruct**: a target cannot represent a structural
//!   pattern; names the offending node path
//!
//! ## Design Principles
//!
//! - Single unified error type (ForgeError) for the entire crate
//! - Structured variants with enough context (request id, sequence number
//!   at failure, partial text) for the caller to decide between showing a
//!   partial result and prompting a retry
//! - No panic/unwrap on error paths - everything is surfaced

use thiserror::Error;
use uuid::Uuid;

use crate::convert::ConversionTarget;

// =============================================================================
// Stream Fault
// =============================================================================

/// Mid-stream provider failure, carried on the terminal [`TokenEvent`]
/// rather than aborting the event sequence.
///
/// [`TokenEvent`]: crate::types::TokenEvent
#[derive(Debug, Clone)]
pub struct StreamFault {
    /// Provider that produced the fault
    pub provider: String,
    /// Sequence number at which the stream failed
    pub seq: u64,
    /// Human-readable fault description
    pub message: String,
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} @ seq {}] {}", self.provider, self.seq, self.message)
    }
}

impl StreamFault {
    pub fn new(provider: impl Into<String>, seq: u64, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            seq,
            message: message.into(),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    /// Requested model identifier has no registered provider
    #[error("unknown model: '{model}' is not registered")]
    UnknownModel { model: String },

    /// Admission denied: the request would push the user past the quota
    #[error(
        "quota exceeded for user '{user_id}': {used}/{limit} tokens in window (requested {requested})"
    )]
    QuotaExceeded {
        user_id: String,
        used: u64,
        limit: u64,
        requested: u64,
    },

    /// Provider stream failed mid-flight. `partial_text` holds whatever
    /// output arrived before the fault; empty means no usable output.
    #[error("provider stream failed for request {request_id}: {fault}")]
    ProviderStream {
        request_id: Uuid,
        fault: StreamFault,
        partial_text: String,
    },

    /// Provider rejected or failed the request before any stream opened
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    // -------------------------------------------------------------------------
    // Markup / Conversion Errors
    // -------------------------------------------------------------------------
    /// Input could not be recovered into a markup tree at all
    #[error("malformed markup: {0}")]
    MalformedMarkup(String),

    /// A target has no representation for a structural pattern
    #[error("unsupported construct for {target} at {path}: {message}")]
    UnsupportedConstruct {
        target: ConversionTarget,
        path: String,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Ambient Errors
    // -------------------------------------------------------------------------
    #[error("config error: {0}")]
    Config(String),

    #[error("usage store error: {0}")]
    Storage(String),
}

impl ForgeError {
    /// Create a provider error with context
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True when the failure left partial output the caller may still use
    pub fn has_partial_output(&self) -> bool {
        matches!(self, Self::ProviderStream { partial_text, .. } if !partial_text.is_empty())
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_fault_display() {
        let fault = StreamFault::new("openai", 7, "connection reset");
        assert_eq!(fault.to_string(), "[openai @ seq 7] connection reset");
    }

    #[test]
    fn test_unknown_model_display() {
        let err = ForgeError::UnknownModel {
            model: "made-up-model-x".to_string(),
        };
        assert!(err.to_string().contains("made-up-model-x"));
    }

    #[test]
    fn test_partial_output_detection() {
        let with_partial = ForgeError::ProviderStream {
            request_id: Uuid::new_v4(),
            fault: StreamFault::new("ollama", 3, "socket closed"),
            partial_text: "<div>".to_string(),
        };
        assert!(with_partial.has_partial_output());

        let without = ForgeError::ProviderStream {
            request_id: Uuid::new_v4(),
            fault: StreamFault::new("ollama", 0, "socket closed"),
            partial_text: String::new(),
        };
        assert!(!without.has_partial_output());
        assert!(!ForgeError::Config("x".into()).has_partial_output());
    }
}
