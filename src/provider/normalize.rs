//! Token Stream Normalizer
//!
//! Turns a provider's [`RawStream`] into the canonical [`TokenEvent`]
//! sequence:
//!
//! - sequence numbers increase by exactly 1, starting at 0
//! - exactly one terminal event (`finish == true`) per stream, even when
//!   the provider hangs up without a done marker
//! - usage on the terminal event is provider-reported where available,
//!   otherwise estimated from emitted text and tagged approximate
//! - a transport error becomes a terminal event carrying a
//!   [`StreamFault`] plus estimated usage for the text already produced

use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

use super::RawStream;
use crate::estimate::TokenEstimator;
use crate::types::{StreamFault, TokenEvent, UsageDelta};

/// Canonical normalized event stream.
pub type TokenStream = Pin<Box<dyn Stream<Item = TokenEvent> + Send>>;

/// Inputs the normalizer needs beyond the raw stream itself.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Provider name, for fault payloads
    pub provider: String,
    /// Pre-computed input token estimate, used when the provider reports
    /// no usage of its own
    pub input_estimate: u64,
    /// Estimator for output tokens when the provider reports none
    pub estimator: TokenEstimator,
}

struct NormalizeState {
    raw: RawStream,
    opts: NormalizeOptions,
    /// Next sequence number to assign
    seq: u64,
    /// Characters of text emitted so far, for the estimate fallback
    chars_out: usize,
    /// Provider-reported usage merged across chunks (some providers split
    /// input and output counts over separate events)
    reported: Option<UsageDelta>,
    /// Events decoded but not yet yielded (a chunk can produce two)
    pending: VecDeque<TokenEvent>,
    /// Terminal event already emitted
    finished: bool,
}

impl NormalizeState {
    fn merge_usage(&mut self, usage: UsageDelta) {
        let merged = match self.reported {
            Some(prev) => UsageDelta::exact(
                prev.input_tokens.max(usage.input_tokens),
                prev.output_tokens.max(usage.output_tokens),
            ),
            None => usage,
        };
        self.reported = Some(merged);
    }

    /// Final usage for a clean terminal event
    fn final_usage(&self) -> UsageDelta {
        match self.reported {
            Some(usage) => usage,
            None => UsageDelta::estimated(
                self.opts.input_estimate,
                self.opts.estimator.count_chars(self.chars_out),
            ),
        }
    }

    /// Usage for a fault terminal event: what was actually produced
    fn fault_usage(&self) -> Option<UsageDelta> {
        if self.chars_out == 0 && self.reported.is_none() {
            return None;
        }
        Some(self.final_usage())
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

impl NormalizeOptions {
    pub fn new(provider: impl Into<String>, input_estimate: u64, estimator: TokenEstimator) -> Self {
        Self {
            provider: provider.into(),
            input_estimate,
            estimator,
        }
    }
}

/// Normalize a raw provider stream into the canonical token event stream.
pub fn normalize(raw: RawStream, opts: NormalizeOptions) -> TokenStream {
    let state = NormalizeState {
        raw,
        opts,
        seq: 0,
        chars_out: 0,
        reported: None,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        // Flush queued events first, preserving order
        if let Some(ev) = state.pending.pop_front() {
            return Some((ev, state));
        }
        if state.finished {
            return None;
        }

        loop {
            match state.raw.next().await {
                Some(Ok(chunk)) => {
                    if let Some(usage) = chunk.usage {
                        state.merge_usage(usage);
                    }

                    if let Some(text) = chunk.delta
                        && !text.is_empty()
                    {
                        state.chars_out += text.chars().count();
                        let ev = TokenEvent::delta(state.next_seq(), text);
                        if chunk.done {
                            let usage = state.final_usage();
                            let terminal = TokenEvent::finished(state.next_seq(), usage);
                            state.pending.push_back(terminal);
                            state.finished = true;
                        }
                        return Some((ev, state));
                    }

                    if chunk.done {
                        let usage = state.final_usage();
                        let ev = TokenEvent::finished(state.next_seq(), usage);
                        state.finished = true;
                        return Some((ev, state));
                    }
                    // Administrative chunk with nothing to emit; keep pulling
                }
                Some(Err(e)) => {
                    let seq = state.next_seq();
                    let fault = StreamFault::new(state.opts.provider.clone(), seq, e.to_string());
                    let ev = TokenEvent::faulted(seq, fault, state.fault_usage());
                    state.finished = true;
                    return Some((ev, state));
                }
                None => {
                    // Provider hung up without a done marker: synthesize
                    // the terminal event so the contract still holds.
                    let usage = state.final_usage();
                    let ev = TokenEvent::finished(state.next_seq(), usage);
                    state.finished = true;
                    return Some((ev, state));
                }
            }
        }
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RawChunk;
    use crate::types::{ForgeError, Result};

    fn raw_stream(items: Vec<Result<RawChunk>>) -> RawStream {
        Box::pin(futures::stream::iter(items))
    }

    fn opts() -> NormalizeOptions {
        NormalizeOptions::new("test", 10, TokenEstimator::default())
    }

    async fn collect(stream: TokenStream) -> Vec<TokenEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_sequence_numbers_and_single_terminal() {
        let events = collect(normalize(
            raw_stream(vec![
                Ok(RawChunk::delta("<div>")),
                Ok(RawChunk::delta("</div>")),
                Ok(RawChunk::done_with_usage(UsageDelta::exact(12, 7))),
            ]),
            opts(),
        ))
        .await;

        assert_eq!(events.len(), 3);
        for (i, ev) in events.iter().enumerate() {
            assert_eq!(ev.seq, i as u64);
        }
        assert_eq!(events.iter().filter(|e| e.finish).count(), 1);
        assert_eq!(events[2].usage.unwrap(), UsageDelta::exact(12, 7));
    }

    #[tokio::test]
    async fn test_missing_done_synthesizes_terminal_with_estimate() {
        let events = collect(normalize(
            raw_stream(vec![Ok(RawChunk::delta("abcdefgh"))]),
            opts(),
        ))
        .await;

        assert_eq!(events.len(), 2);
        let terminal = &events[1];
        assert!(terminal.finish);
        let usage = terminal.usage.unwrap();
        assert!(usage.approximate);
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 2); // 8 chars / 4
    }

    #[tokio::test]
    async fn test_transport_error_becomes_terminal_fault() {
        let events = collect(normalize(
            raw_stream(vec![
                Ok(RawChunk::delta("abcd")),
                Err(ForgeError::Config("connection reset".into())),
            ]),
            opts(),
        ))
        .await;

        assert_eq!(events.len(), 2);
        let terminal = &events[1];
        assert!(terminal.finish);
        assert!(terminal.is_fault());
        assert_eq!(terminal.fault.as_ref().unwrap().seq, 1);
        // Partial output still gets accounted
        let usage = terminal.usage.unwrap();
        assert!(usage.approximate);
        assert_eq!(usage.output_tokens, 1);
    }

    #[tokio::test]
    async fn test_fault_before_any_output_has_no_usage() {
        let events = collect(normalize(
            raw_stream(vec![Err(ForgeError::Config("refused".into()))]),
            opts(),
        ))
        .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_fault());
        assert!(events[0].usage.is_none());
    }

    #[tokio::test]
    async fn test_usage_merged_across_chunks() {
        // Anthropic style: input count up front, output count at the end
        let events = collect(normalize(
            raw_stream(vec![
                Ok(RawChunk {
                    usage: Some(UsageDelta::exact(42, 0)),
                    ..Default::default()
                }),
                Ok(RawChunk::delta("hello")),
                Ok(RawChunk::done_with_usage(UsageDelta::exact(0, 9))),
            ]),
            opts(),
        ))
        .await;

        let terminal = events.last().unwrap();
        assert_eq!(terminal.usage.unwrap(), UsageDelta::exact(42, 9));
    }

    #[tokio::test]
    async fn test_delta_and_done_in_one_chunk() {
        let events = collect(normalize(
            raw_stream(vec![Ok(RawChunk {
                delta: Some("tail".into()),
                usage: Some(UsageDelta::exact(5, 3)),
                done: true,
            })]),
            opts(),
        ))
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].delta, "tail");
        assert!(!events[0].finish);
        assert!(events[1].finish);
        assert_eq!(events[1].seq, 1);
    }
}
