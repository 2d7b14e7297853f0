//! Application-wide constants and defaults.
//!
//! Values here are fallbacks only; anything a deployment may want to tune
//! is surfaced through the configuration layer.

/// Quota defaults
pub mod quota {
    /// Default per-user token limit per window
    pub const DEFAULT_LIMIT_TOKENS: u64 = 500_000;

    /// Default rolling window length (1 day)
    pub const DEFAULT_WINDOW_SECS: u64 = 86_400;
}

/// Token estimation defaults
pub mod estimate {
    /// Characters per token when a provider reports no usage.
    /// Tunable via config; 4.0 is the common English-text approximation.
    pub const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;
}

/// Generation defaults
pub mod generation {
    /// Default maximum output tokens requested from a provider
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 4096;

    /// Default provider request timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;

    /// Capacity of the bounded token relay channel between the
    /// orchestrator task and the consumer. Small on purpose: a slow
    /// consumer must backpressure the provider connection.
    pub const RELAY_CHANNEL_CAPACITY: usize = 32;
}

/// Provider endpoint defaults
pub mod providers {
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
    pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
    pub const OLLAMA_API_BASE: &str = "http://localhost:11434";

    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
}
