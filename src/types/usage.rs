//! Token Usage Accounting Types
//!
//! Usage deltas flow on the terminal token event; one append-only
//! [`UsageRecord`] is written per completed or partially-completed request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token counts attached to the terminal event of a stream.
///
/// `approximate` marks counts estimated from emitted text (some providers
/// report no usage at all); exact counts come from the provider's own
/// accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// True when counts are estimated rather than provider-reported
    pub approximate: bool,
}

impl UsageDelta {
    /// Exact counts reported by the provider
    pub fn exact(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            approximate: false,
        }
    }

    /// Estimated counts, tagged approximate
    pub fn estimated(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            approximate: true,
        }
    }

    /// Total tokens (input + output)
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Append-only usage record handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// True when token counts were estimated, not provider-reported
    pub approximate: bool,
    pub provider: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        user_id: impl Into<String>,
        usage: UsageDelta,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            approximate: usage.approximate,
            provider: provider.into(),
            model: model.into(),
            timestamp: Utc::now(),
        }
    }

    /// Total tokens this record charges against the quota window
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_delta_totals() {
        let exact = UsageDelta::exact(100, 50);
        assert_eq!(exact.total(), 150);
        assert!(!exact.approximate);

        let estimated = UsageDelta::estimated(0, 32);
        assert_eq!(estimated.total(), 32);
        assert!(estimated.approximate);
    }

    #[test]
    fn test_record_carries_approximate_flag() {
        let record = UsageRecord::new("u1", UsageDelta::estimated(10, 20), "ollama", "llama3");
        assert!(record.approximate);
        assert_eq!(record.total(), 30);
    }
}
