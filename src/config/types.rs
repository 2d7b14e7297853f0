//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/uiforge/) and project (.uiforge/) level
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{estimate, generation, providers, quota};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Per-user quota settings
    pub quota: QuotaConfig,

    /// Token estimation settings
    pub estimator: EstimatorConfig,

    /// Generation defaults
    pub generation: GenerationConfig,

    /// Provider connection settings, keyed by provider name
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Model identifier -> provider name registry
    pub models: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert("openai".to_string(), ProviderConfig::openai());
        providers.insert("anthropic".to_string(), ProviderConfig::anthropic());
        providers.insert("ollama".to_string(), ProviderConfig::ollama());

        let mut models = BTreeMap::new();
        models.insert("gpt-4o".to_string(), "openai".to_string());
        models.insert("gpt-4o-mini".to_string(), "openai".to_string());
        models.insert(
            "claude-sonnet-4-20250514".to_string(),
            "anthropic".to_string(),
        );
        models.insert("llama3".to_string(), "ollama".to_string());

        Self {
            version: "1.0".to_string(),
            quota: QuotaConfig::default(),
            estimator: EstimatorConfig::default(),
            generation: GenerationConfig::default(),
            providers,
            models,
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if self.quota.limit_tokens == 0 {
            return Err(crate::types::ForgeError::Config(
                "quota limit_tokens must be greater than 0".to_string(),
            ));
        }
        if self.quota.window_secs == 0 {
            return Err(crate::types::ForgeError::Config(
                "quota window_secs must be greater than 0".to_string(),
            ));
        }
        if self.estimator.chars_per_token <= 0.0 {
            return Err(crate::types::ForgeError::Config(format!(
                "estimator chars_per_token must be positive, got {}",
                self.estimator.chars_per_token
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(crate::types::ForgeError::Config(format!(
                "generation temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }
        if self.generation.timeout_secs == 0 {
            return Err(crate::types::ForgeError::Config(
                "generation timeout_secs must be greater than 0".to_string(),
            ));
        }
        for (model, provider) in &self.models {
            if !self.providers.contains_key(provider) {
                return Err(crate::types::ForgeError::Config(format!(
                    "model '{}' maps to undefined provider '{}'",
                    model, provider
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Quota Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Rolling window length in seconds
    pub window_secs: u64,

    /// Token limit per user per window
    pub limit_tokens: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_secs: quota::DEFAULT_WINDOW_SECS,
            limit_tokens: quota::DEFAULT_LIMIT_TOKENS,
        }
    }
}

// =============================================================================
// Estimator Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Characters per token when a provider omits usage reporting
    pub chars_per_token: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            chars_per_token: estimate::DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

// =============================================================================
// Generation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum output tokens requested from providers
    pub max_output_tokens: u64,

    /// Provider request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: generation::DEFAULT_MAX_OUTPUT_TOKENS,
            timeout_secs: generation::DEFAULT_TIMEOUT_SECS,
            temperature: generation::DEFAULT_TEMPERATURE,
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Wire protocol family spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions over SSE
    Openai,
    /// Anthropic messages API over SSE
    Anthropic,
    /// Ollama generate API over chunked JSON lines
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Connection settings for one provider.
///
/// Note: API keys are handled securely - they are never serialized to
/// output and each provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Wire protocol family
    pub kind: ProviderKind,
    /// API key; never serialized to output for security
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ProviderConfig {
    pub fn openai() -> Self {
        Self {
            kind: ProviderKind::Openai,
            api_key: None,
            api_base: Some(providers::OPENAI_API_BASE.to_string()),
        }
    }

    pub fn anthropic() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            api_key: None,
            api_base: Some(providers::ANTHROPIC_API_BASE.to_string()),
        }
    }

    pub fn ollama() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            api_key: None,
            api_base: Some(providers::OLLAMA_API_BASE.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.models.get("gpt-4o").unwrap(), "openai");
    }

    #[test]
    fn test_zero_quota_rejected() {
        let config = Config {
            quota: QuotaConfig {
                limit_tokens: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dangling_model_mapping_rejected() {
        let mut config = Config::default();
        config
            .models
            .insert("mystery".to_string(), "nonexistent".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let provider = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..ProviderConfig::openai()
        };
        let json = serde_json::to_string(&provider).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }
}
