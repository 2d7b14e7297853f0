//! Generation Orchestrator
//!
//! Drives one generation request through its state machine:
//!
//! ```text
//! Pending -> Reserved -> Streaming -> { Completed
//!                                     | PartiallyCompleted
//!                                     | Failed }
//! ```
//!
//! - `Pending -> Reserved`: quota reservation; denial fails the request
//!   before any provider call
//! - `Reserved -> Streaming`: router resolves a provider and the stream
//!   opens; resolution failure releases the reservation
//! - `Streaming -> Completed`: clean terminal event, actual usage
//!   committed
//! - `Streaming -> PartiallyCompleted`: stream fault after usable text,
//!   or cancellation; produced tokens are committed, headroom released
//! - `Streaming -> Failed`: fault before any usable text; reservation
//!   released, nothing recorded
//!
//! Events are relayed through a bounded channel without buffering the
//! full response: a slow consumer backpressures the normalizer and, in
//! turn, the provider connection. No retries happen here - a retry is a
//! fresh request issued by the caller.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::generation::RELAY_CHANNEL_CAPACITY;
use crate::estimate::TokenEstimator;
use crate::provider::{NormalizeOptions, ProviderRouter, TokenStream, normalize};
use crate::quota::{QuotaLedger, Reservation};
use crate::types::{
    ForgeError, GenerationRequest, Result, StreamFault, TokenEvent, UsageDelta,
};

use futures::StreamExt;

// =============================================================================
// Outcome
// =============================================================================

/// Why a request ended with partial rather than complete output.
#[derive(Debug, Clone)]
pub enum PartialReason {
    /// Provider stream faulted after usable text had arrived
    StreamFault(StreamFault),
    /// The caller cancelled mid-stream
    Cancelled,
}

/// Terminal result of one generation request.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// Clean completion; usage committed
    Completed { text: String, usage: UsageDelta },
    /// Usable partial output; usage for produced tokens committed and
    /// the cause surfaced alongside the text
    PartiallyCompleted {
        text: String,
        usage: UsageDelta,
        reason: PartialReason,
    },
    /// Stream failed before any usable output; reservation released
    Failed(ForgeError),
}

impl GenerationOutcome {
    /// The markup produced, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { text, .. } | Self::PartiallyCompleted { text, .. } => Some(text),
            Self::Failed(_) => None,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Caller-side handle to an in-flight generation.
///
/// Pull events with [`next_event`]; the stream ends with exactly one
/// terminal event. [`outcome`] drains any remaining events and resolves
/// the final state. Dropping the handle mid-stream counts as
/// cancellation.
///
/// [`next_event`]: GenerationHandle::next_event
/// [`outcome`]: GenerationHandle::outcome
pub struct GenerationHandle {
    pub request_id: Uuid,
    events: mpsc::Receiver<TokenEvent>,
    cancel: watch::Sender<bool>,
    outcome: oneshot::Receiver<GenerationOutcome>,
}

impl std::fmt::Debug for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHandle")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl GenerationHandle {
    /// Next token event, `None` after the terminal event
    pub async fn next_event(&mut self) -> Option<TokenEvent> {
        self.events.recv().await
    }

    /// Request cooperative cancellation. The provider connection closes
    /// promptly; consumed tokens are committed and headroom released.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Drain remaining events and resolve the terminal outcome.
    pub async fn outcome(mut self) -> GenerationOutcome {
        while self.events.recv().await.is_some() {}
        self.outcome.await.unwrap_or_else(|_| {
            GenerationOutcome::Failed(ForgeError::Storage(
                "generation task dropped without reporting an outcome".to_string(),
            ))
        })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Composes router, normalizer, and ledger into the per-request state
/// machine.
pub struct Orchestrator {
    router: Arc<ProviderRouter>,
    ledger: QuotaLedger,
    estimator: TokenEstimator,
    max_output_tokens: u64,
}

impl Orchestrator {
    pub fn new(
        router: Arc<ProviderRouter>,
        ledger: QuotaLedger,
        estimator: TokenEstimator,
        max_output_tokens: u64,
    ) -> Self {
        Self {
            router,
            ledger,
            estimator,
            max_output_tokens,
        }
    }

    /// Convenience constructor wiring estimator and limits from config
    pub fn from_config(router: Arc<ProviderRouter>, ledger: QuotaLedger, config: &Config) -> Self {
        Self::new(
            router,
            ledger,
            TokenEstimator::new(config.estimator.chars_per_token),
            config.generation.max_output_tokens,
        )
    }

    /// Run a request up to the streaming state.
    ///
    /// Pre-stream failures (`QuotaExceeded`, `UnknownModel`, provider
    /// rejection) return `Err` immediately with no usage recorded; an
    /// `Ok` handle means the stream is open and relaying.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationHandle> {
        let request_id = request.request_id;
        let prompt = request.composed_prompt();

        // Pending -> Reserved
        let estimate = self
            .estimator
            .reservation_size(&prompt, self.max_output_tokens);
        let reservation = self.ledger.reserve(&request.user_id, estimate)?;
        debug!(request_id = %request_id, tokens = estimate, "Reserved");

        // Reserved -> Streaming. Early returns release the reservation
        // through its drop guard.
        let provider = self.router.route(&request.model)?;
        let raw = provider.open(&request).await?;

        let input_estimate = self.estimator.count(&prompt);
        let stream = normalize(
            raw,
            NormalizeOptions::new(provider.name(), input_estimate, self.estimator),
        );
        info!(request_id = %request_id, provider = provider.name(), "Streaming");

        let (event_tx, event_rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let relay = RelayTask {
            request_id,
            provider: provider.name().to_string(),
            model: request.model.clone(),
            ledger: self.ledger.clone(),
            estimator: self.estimator,
            input_estimate,
            reservation,
        };
        tokio::spawn(relay.run(stream, event_tx, cancel_rx, outcome_tx));

        Ok(GenerationHandle {
            request_id,
            events: event_rx,
            cancel: cancel_tx,
            outcome: outcome_rx,
        })
    }
}

// =============================================================================
// Relay Task
// =============================================================================

struct RelayTask {
    request_id: Uuid,
    provider: String,
    model: String,
    ledger: QuotaLedger,
    estimator: TokenEstimator,
    input_estimate: u64,
    reservation: Reservation,
}

impl RelayTask {
    async fn run(
        self,
        mut stream: TokenStream,
        event_tx: mpsc::Sender<TokenEvent>,
        mut cancel_rx: watch::Receiver<bool>,
        outcome_tx: oneshot::Sender<GenerationOutcome>,
    ) {
        let mut text = String::new();

        let outcome = loop {
            tokio::select! {
                // The watch starts false and only ever flips to true (or
                // closes when the handle drops), so any wake is a cancel.
                _ = cancel_rx.changed() => {
                    // Drop the provider stream promptly to stop
                    // upstream compute and billing.
                    drop(stream);
                    break self.settle_cancelled(text);
                }
                event = stream.next() => match event {
                    Some(event) => {
                        let terminal = event.finish;
                        let fault = event.fault.clone();
                        let usage = event.usage;
                        if !event.delta.is_empty() {
                            text.push_str(&event.delta);
                        }

                        // Relay in order; a hung-up consumer means
                        // cancellation. A cancel must not wait behind a
                        // full channel, so race the send against it.
                        tokio::select! {
                            sent = event_tx.send(event) => {
                                if sent.is_err() {
                                    drop(stream);
                                    break self.settle_cancelled(text);
                                }
                            }
                            _ = cancel_rx.changed() => {
                                drop(stream);
                                break self.settle_cancelled(text);
                            }
                        }

                        if terminal {
                            break self.settle_terminal(text, usage, fault);
                        }
                    }
                    // The normalizer guarantees a terminal event; an
                    // exhausted stream without one means the task raced
                    // a drop. Settle as cancelled.
                    None => break self.settle_cancelled(text),
                },
            }
        };

        let _ = outcome_tx.send(outcome);
    }

    /// Streaming -> Completed | PartiallyCompleted | Failed
    fn settle_terminal(
        self,
        text: String,
        usage: Option<UsageDelta>,
        fault: Option<StreamFault>,
    ) -> GenerationOutcome {
        match fault {
            None => {
                let usage = usage.unwrap_or_else(|| self.estimated_usage(&text));
                info!(request_id = %self.request_id, tokens = usage.total(), "Completed");
                self.commit(usage);
                GenerationOutcome::Completed { text, usage }
            }
            Some(fault) if !text.is_empty() => {
                let usage = usage.unwrap_or_else(|| self.estimated_usage(&text));
                warn!(request_id = %self.request_id, %fault, "Partially completed");
                self.commit(usage);
                GenerationOutcome::PartiallyCompleted {
                    text,
                    usage,
                    reason: PartialReason::StreamFault(fault),
                }
            }
            Some(fault) => {
                warn!(request_id = %self.request_id, %fault, "Failed with no output");
                let request_id = self.request_id;
                self.release();
                GenerationOutcome::Failed(ForgeError::ProviderStream {
                    request_id,
                    fault,
                    partial_text: String::new(),
                })
            }
        }
    }

    /// Cancellation: commit what was consumed, release the rest.
    fn settle_cancelled(self, text: String) -> GenerationOutcome {
        if text.is_empty() {
            debug!(request_id = %self.request_id, "Cancelled before any output");
            let request_id = self.request_id;
            let fault = StreamFault::new(&self.provider, 0, "cancelled by caller");
            self.release();
            return GenerationOutcome::Failed(ForgeError::ProviderStream {
                request_id,
                fault,
                partial_text: String::new(),
            });
        }

        let usage = self.estimated_usage(&text);
        info!(request_id = %self.request_id, tokens = usage.total(), "Cancelled, partial committed");
        self.commit(usage);
        GenerationOutcome::PartiallyCompleted {
            text,
            usage,
            reason: PartialReason::Cancelled,
        }
    }

    fn estimated_usage(&self, text: &str) -> UsageDelta {
        UsageDelta::estimated(self.input_estimate, self.estimator.count(text))
    }

    fn commit(self, usage: UsageDelta) {
        let RelayTask {
            ledger,
            reservation,
            provider,
            model,
            request_id,
            ..
        } = self;
        if let Err(e) = ledger.commit(reservation, usage, &provider, &model) {
            warn!(request_id = %request_id, error = %e, "Usage commit failed");
        }
    }

    fn release(self) {
        let RelayTask {
            ledger,
            reservation,
            ..
        } = self;
        ledger.release(reservation);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ModelProvider, RawChunk, RawStream, SharedProvider};
    use crate::quota::MemoryUsageStore;
    use async_trait::async_trait;
    use futures::stream;

    /// Provider that plays back a fixed chunk script per call
    struct ScriptedProvider {
        script: fn() -> RawStream,
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn open(&self, _request: &GenerationRequest) -> Result<RawStream> {
            Ok((self.script)())
        }

        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn pipeline(
        script: fn() -> RawStream,
        limit: u64,
    ) -> (Orchestrator, Arc<MemoryUsageStore>, QuotaLedger) {
        let store = Arc::new(MemoryUsageStore::new());
        let ledger = QuotaLedger::new(store.clone(), limit, 86_400);
        let provider: SharedProvider = Arc::new(ScriptedProvider { script });
        let router = Arc::new(ProviderRouter::from_routes(vec![(
            "test-model".to_string(),
            provider,
        )]));
        let orchestrator =
            Orchestrator::new(router, ledger.clone(), TokenEstimator::default(), 64);
        (orchestrator, store, ledger)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("u1", "test-model", "make a card")
    }

    #[tokio::test]
    async fn test_completed_flow_commits_reported_usage() {
        let (orchestrator, store, ledger) = pipeline(
            || {
                Box::pin(stream::iter(vec![
                    Ok(RawChunk::delta("<div>")),
                    Ok(RawChunk::delta("hi</div>")),
                    Ok(RawChunk::done_with_usage(UsageDelta::exact(20, 8))),
                ]))
            },
            10_000,
        );

        let mut handle = orchestrator.generate(request()).await.unwrap();
        let mut seqs = Vec::new();
        while let Some(event) = handle.next_event().await {
            seqs.push(event.seq);
        }
        assert_eq!(seqs, vec![0, 1, 2]);

        match handle.outcome().await {
            GenerationOutcome::Completed { text, usage } => {
                assert_eq!(text, "<div>hi</div>");
                assert_eq!(usage, UsageDelta::exact(20, 8));
            }
            other => panic!("expected Completed, got {other:?}"),
        }

        let records = store.records_for("u1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total(), 28);
        assert!(!records[0].approximate);
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_unknown_model_fails_with_no_usage() {
        let (orchestrator, store, ledger) = pipeline(
            || Box::pin(stream::iter(vec![Ok(RawChunk::done())])),
            10_000,
        );

        let mut req = request();
        req.model = "made-up-model-x".to_string();
        match orchestrator.generate(req).await {
            Err(ForgeError::UnknownModel { model }) => assert_eq!(model, "made-up-model-x"),
            other => panic!("expected UnknownModel, got {other:?}"),
        }
        assert!(store.is_empty());
        // The reservation taken before routing was returned
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_quota_denial_is_immediate() {
        let (orchestrator, store, _) = pipeline(
            || Box::pin(stream::iter(vec![Ok(RawChunk::done())])),
            10,
        );

        match orchestrator.generate(request()).await {
            Err(ForgeError::QuotaExceeded { user_id, .. }) => assert_eq!(user_id, "u1"),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fault_after_output_partially_completes() {
        let (orchestrator, store, ledger) = pipeline(
            || {
                Box::pin(stream::iter(vec![
                    Ok(RawChunk::delta("<ul><li>a</li>")),
                    Ok(RawChunk::delta("<li>b</li>")),
                    Err(ForgeError::Config("connection reset".into())),
                ]))
            },
            10_000,
        );

        let handle = orchestrator.generate(request()).await.unwrap();
        match handle.outcome().await {
            GenerationOutcome::PartiallyCompleted {
                text,
                usage,
                reason: PartialReason::StreamFault(fault),
            } => {
                assert_eq!(text, "<ul><li>a</li><li>b</li>");
                assert!(usage.approximate);
                assert!(usage.output_tokens > 0);
                assert_eq!(fault.provider, "scripted");
            }
            other => panic!("expected PartiallyCompleted, got {other:?}"),
        }

        // Partial output is billed, headroom returned
        assert_eq!(store.records_for("u1").len(), 1);
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_fault_before_output_fails_and_releases() {
        let (orchestrator, store, ledger) = pipeline(
            || Box::pin(stream::iter(vec![Err(ForgeError::Config("refused".into()))])),
            10_000,
        );

        let handle = orchestrator.generate(request()).await.unwrap();
        match handle.outcome().await {
            GenerationOutcome::Failed(ForgeError::ProviderStream { partial_text, .. }) => {
                assert!(partial_text.is_empty());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(store.is_empty());
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_commits_consumed() {
        let (orchestrator, store, ledger) = pipeline(
            || {
                Box::pin(
                    stream::iter(vec![Ok(RawChunk::delta("<div>partial</div>"))])
                        .chain(stream::pending()),
                )
            },
            10_000,
        );

        let mut handle = orchestrator.generate(request()).await.unwrap();
        let first = handle.next_event().await.unwrap();
        assert_eq!(first.delta, "<div>partial</div>");

        handle.cancel();
        match handle.outcome().await {
            GenerationOutcome::PartiallyCompleted {
                text,
                usage,
                reason: PartialReason::Cancelled,
            } => {
                assert_eq!(text, "<div>partial</div>");
                assert!(usage.approximate);
            }
            other => panic!("expected cancelled partial, got {other:?}"),
        }

        // Exactly one record for the consumed tokens, headroom back
        assert_eq!(store.records_for("u1").len(), 1);
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_cancel_with_stalled_consumer_still_settles() {
        // More deltas than the relay channel holds, then a hang; the
        // consumer never drains, so the relay blocks on a full channel.
        let (orchestrator, store, ledger) = pipeline(
            || {
                let chunks: Vec<Result<RawChunk>> =
                    (0..2 * RELAY_CHANNEL_CAPACITY).map(|_| Ok(RawChunk::delta("x"))).collect();
                Box::pin(stream::iter(chunks).chain(stream::pending()))
            },
            10_000,
        );

        let handle = orchestrator.generate(request()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        handle.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Settled without the channel ever draining
        assert_eq!(store.records_for("u1").len(), 1);
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);

        match handle.outcome().await {
            GenerationOutcome::PartiallyCompleted {
                reason: PartialReason::Cancelled,
                ..
            } => {}
            other => panic!("expected cancelled partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_quota() {
        let (orchestrator, _, ledger) = pipeline(
            || Box::pin(stream::pending()),
            10_000,
        );

        let handle = orchestrator.generate(request()).await.unwrap();
        drop(handle);

        // Give the relay task a beat to observe the hang-up
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_stream_end_without_terminal_still_resolves() {
        // Normalizer synthesizes the terminal, so outcome is Completed
        let (orchestrator, store, _) = pipeline(
            || Box::pin(stream::iter(vec![Ok(RawChunk::delta("<p>x</p>"))])),
            10_000,
        );

        let handle = orchestrator.generate(request()).await.unwrap();
        match handle.outcome().await {
            GenerationOutcome::Completed { text, usage } => {
                assert_eq!(text, "<p>x</p>");
                assert!(usage.approximate);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(store.records_for("u1").len(), 1);
        assert!(store.records_for("u1")[0].approximate);
    }
}
