//! Token Estimation
//!
//! Character-ratio token estimation, used in two places:
//! - pre-flight: sizing a quota reservation before dispatch
//! - post-hoc: terminal-event usage when a provider reports no counts
//!
//! The chars-per-token ratio is deliberately a configuration value, not a
//! constant; acceptable error bounds differ per deployment.

use crate::constants::estimate::DEFAULT_CHARS_PER_TOKEN;

/// Character-based token estimator.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator {
    /// Create an estimator with the given ratio. Ratios at or below zero
    /// fall back to the default.
    pub fn new(chars_per_token: f32) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    /// Estimate the token count of a text
    pub fn count(&self, text: &str) -> u64 {
        self.count_chars(text.chars().count())
    }

    /// Estimate the token count for an already-measured character count
    pub fn count_chars(&self, chars: usize) -> u64 {
        if chars == 0 {
            return 0;
        }
        (chars as f32 / self.chars_per_token).ceil().max(1.0) as u64
    }

    /// Worst-case reservation size for a request: estimated input plus the
    /// configured output ceiling.
    pub fn reservation_size(&self, prompt: &str, max_output_tokens: u64) -> u64 {
        self.count(prompt) + max_output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero_tokens() {
        assert_eq!(TokenEstimator::default().count(""), 0);
    }

    #[test]
    fn test_default_ratio() {
        // 16 chars at 4 chars/token
        assert_eq!(TokenEstimator::default().count("abcdefghijklmnop"), 4);
    }

    #[test]
    fn test_partial_tokens_round_up() {
        assert_eq!(TokenEstimator::default().count("abcde"), 2);
        assert_eq!(TokenEstimator::default().count("a"), 1);
    }

    #[test]
    fn test_custom_ratio() {
        let est = TokenEstimator::new(2.0);
        assert_eq!(est.count("abcdef"), 3);
    }

    #[test]
    fn test_invalid_ratio_falls_back() {
        let est = TokenEstimator::new(0.0);
        assert_eq!(est.count("abcdefgh"), 2);
    }

    #[test]
    fn test_reservation_size_includes_output_ceiling() {
        let est = TokenEstimator::default();
        assert_eq!(est.reservation_size("abcdefgh", 100), 102);
    }
}
