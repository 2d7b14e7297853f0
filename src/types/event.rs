//! Canonical Token Event Sequence
//!
//! Every provider's wire format is normalized into this one event shape.
//!
//! ## Sequence Contract
//!
//! - Sequence numbers are monotonically increasing by 1, starting at 0
//! - Exactly one terminal event (`finish == true`) occurs per stream
//! - A mid-stream provider fault is itself a terminal event carrying a
//!   [`StreamFault`] payload; the orchestrator decides whether the
//!   accumulated partial text is usable
//! - Consumers must not reorder events

use serde::{Deserialize, Serialize};

use super::error::StreamFault;
use super::usage::UsageDelta;

/// One incremental token event in a generation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Monotonic sequence number within the request, starting at 0
    pub seq: u64,
    /// Text delta; empty on purely administrative events
    pub delta: String,
    /// True exactly once, on the terminal event
    pub finish: bool,
    /// Usage accounting, present on the terminal event (best effort)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageDelta>,
    /// Fault payload when the stream ended in error
    #[serde(skip)]
    pub fault: Option<StreamFault>,
}

impl TokenEvent {
    /// An ordinary text delta event
    pub fn delta(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            delta: text.into(),
            finish: false,
            usage: None,
            fault: None,
        }
    }

    /// Clean terminal event with final usage accounting
    pub fn finished(seq: u64, usage: UsageDelta) -> Self {
        Self {
            seq,
            delta: String::new(),
            finish: true,
            usage: Some(usage),
            fault: None,
        }
    }

    /// Terminal event produced by a mid-stream provider fault
    pub fn faulted(seq: u64, fault: StreamFault, usage: Option<UsageDelta>) -> Self {
        Self {
            seq,
            delta: String::new(),
            finish: true,
            usage,
            fault: Some(fault),
        }
    }

    /// True when this event ends the stream in error
    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_event_is_not_terminal() {
        let ev = TokenEvent::delta(0, "<div");
        assert!(!ev.finish);
        assert!(!ev.is_fault());
        assert!(ev.usage.is_none());
    }

    #[test]
    fn test_finished_event_carries_usage() {
        let ev = TokenEvent::finished(5, UsageDelta::exact(10, 20));
        assert!(ev.finish);
        assert_eq!(ev.usage.unwrap().total(), 30);
    }

    #[test]
    fn test_fault_event_is_terminal() {
        let ev = TokenEvent::faulted(3, StreamFault::new("openai", 3, "reset"), None);
        assert!(ev.finish);
        assert!(ev.is_fault());
    }
}
