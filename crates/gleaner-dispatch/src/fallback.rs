//! Provider fallback dispatcher
//!
//! One dispatch walks the configured provider list in priority order. Each
//! provider gets up to `per_provider_retries` calls; what happens after a
//! failed call depends only on the error's [`ProviderErrorKind`]:
//!
//! | kind | action |
//! |------|--------|
//! | `RateLimited`, `BadRequest` | move to the next provider now |
//! | `Timeout`, `ServerError`, `Network` | back off, retry the same provider |
//! | `Fatal` | stop; the item is unprocessable |
//!
//! Every provider that was called gets exactly one [`AttemptRecord`].
//!
//! Once the run is cancelled a dispatch makes no further calls. A call
//! already in progress is allowed to finish, but no retry, backoff or
//! fallback follows it.

use crate::config::DispatchConfig;
use crate::rate_limit::RateLimiter;
use gleaner_domain::traits::{ExtractionProvider, ProviderRequest};
use gleaner_domain::{
    AttemptOutcome, AttemptRecord, Extraction, ItemId, ItemOutput, PromptConfig, ProviderError,
    ProviderErrorKind, ProviderId, SourceRef,
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What the scheduler should do with an item after one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A provider returned text
    Succeeded(ItemOutput),

    /// Every provider failed with a retryable error
    Retryable,

    /// A provider reported the item itself as unprocessable
    Fatal(String),
}

/// Result of one dispatch: the outcome plus one record per provider tried
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Outcome for the item
    pub outcome: DispatchOutcome,

    /// Attempt history produced by this dispatch
    pub attempts: Vec<AttemptRecord>,
}

impl Dispatch {
    /// Number of provider calls made across all attempts
    pub fn total_tries(&self) -> u32 {
        self.attempts.iter().map(|a| a.tries).sum()
    }
}

/// How a failed call is followed up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    NextProvider,
    RetrySame,
    Stop,
}

fn follow_up(kind: ProviderErrorKind) -> FollowUp {
    match kind {
        ProviderErrorKind::RateLimited | ProviderErrorKind::BadRequest => FollowUp::NextProvider,
        ProviderErrorKind::Timeout | ProviderErrorKind::ServerError | ProviderErrorKind::Network => {
            FollowUp::RetrySame
        }
        ProviderErrorKind::Fatal => FollowUp::Stop,
    }
}

/// Dispatches single items across a prioritized provider list
pub struct FallbackDispatcher<P> {
    provider: Arc<P>,
    providers: Vec<ProviderId>,
    prompt: PromptConfig,
    config: DispatchConfig,
    limiter: Option<Arc<RateLimiter>>,
}

impl<P: ExtractionProvider> FallbackDispatcher<P> {
    /// Create a dispatcher; the provider list and timings come from `config`
    pub fn new(provider: Arc<P>, prompt: PromptConfig, config: DispatchConfig) -> Self {
        let limiter = RateLimiter::from_config(&config).map(Arc::new);
        Self {
            provider,
            providers: config.providers(),
            prompt,
            config,
            limiter,
        }
    }

    /// Dispatch one item for `round`
    ///
    /// After `cancel` fires the dispatch returns `Retryable` with the
    /// attempts made so far.
    pub async fn dispatch(
        &self,
        id: &ItemId,
        source: &SourceRef,
        round: u32,
        cancel: &CancellationToken,
    ) -> Dispatch {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 {
                if cancel.is_cancelled() {
                    tracing::debug!(item = %id, round, "dispatch stopped before fallback");
                    break;
                }
                let pause = self.config.provider_switch_delay();
                if !pause.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = sleep(pause) => {}
                    }
                }
            }

            let started_at = SystemTime::now();
            let start = Instant::now();
            let (tries, result) = self.call_provider(provider, id, source, cancel).await;
            let elapsed = start.elapsed();

            match result {
                Ok(extraction) => {
                    tracing::info!(item = %id, provider = %provider, round, tries, "extraction succeeded");
                    attempts.push(AttemptRecord {
                        provider: provider.clone(),
                        round,
                        started_at,
                        elapsed,
                        tries,
                        outcome: AttemptOutcome::Success,
                        error_kind: None,
                        error_detail: None,
                    });
                    return Dispatch {
                        outcome: DispatchOutcome::Succeeded(ItemOutput {
                            extraction,
                            provider: provider.clone(),
                            round,
                        }),
                        attempts,
                    };
                }
                Err(err) if err.kind == ProviderErrorKind::Fatal => {
                    tracing::warn!(item = %id, provider = %provider, round, error = %err, "item is unprocessable");
                    attempts.push(failed_attempt(provider, round, started_at, elapsed, tries, &err));
                    return Dispatch {
                        outcome: DispatchOutcome::Fatal(err.message),
                        attempts,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        item = %id,
                        provider = %provider,
                        round,
                        tries,
                        error = %err,
                        "provider failed, falling back"
                    );
                    attempts.push(failed_attempt(provider, round, started_at, elapsed, tries, &err));
                }
            }
        }

        tracing::debug!(item = %id, round, "all providers failed");
        Dispatch {
            outcome: DispatchOutcome::Retryable,
            attempts,
        }
    }

    /// Stand-in result for a dispatch whose task panicked
    ///
    /// The record is attributed to the first provider because the panic
    /// hides which one was active.
    pub fn panicked(&self, round: u32, started_at: SystemTime, elapsed: Duration, detail: &str) -> Dispatch {
        let attempts = self
            .providers
            .first()
            .map(|provider| AttemptRecord {
                provider: provider.clone(),
                round,
                started_at,
                elapsed,
                tries: 0,
                outcome: AttemptOutcome::RetryableError,
                error_kind: None,
                error_detail: Some(format!("dispatch panicked: {}", detail)),
            })
            .into_iter()
            .collect();
        Dispatch {
            outcome: DispatchOutcome::Retryable,
            attempts,
        }
    }

    /// Call one provider until it succeeds, gives a fallback-worthy error or
    /// runs out of tries. Returns the number of calls made.
    async fn call_provider(
        &self,
        provider: &ProviderId,
        id: &ItemId,
        source: &SourceRef,
        cancel: &CancellationToken,
    ) -> (u32, Result<Extraction, ProviderError>) {
        let limit = self.config.request_timeout();
        let mut tries = 0;

        loop {
            tries += 1;
            if let Some(limiter) = &self.limiter {
                limiter.acquire(provider).await;
            }

            let request = ProviderRequest {
                provider,
                item: id,
                source,
                prompt: &self.prompt,
                timeout: limit,
            };
            let result = match timeout(limit, self.provider.call(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "no response within {}s",
                    limit.as_secs()
                ))),
            };

            let err = match result {
                Ok(extraction) => return (tries, Ok(extraction)),
                Err(err) => err,
            };

            if follow_up(err.kind) != FollowUp::RetrySame
                || tries >= self.config.per_provider_retries
                || cancel.is_cancelled()
            {
                return (tries, Err(err));
            }

            let delay = self.retry_delay(&err, tries);
            tracing::debug!(
                item = %id,
                provider = %provider,
                try_number = tries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying provider"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (tries, Err(err)),
                _ = sleep(delay) => {}
            }
        }
    }

    fn retry_delay(&self, err: &ProviderError, tries: u32) -> Duration {
        match err.retry_after {
            Some(hint) => hint.min(self.config.request_timeout()),
            None => self.config.backoff_delay(tries),
        }
    }
}

fn failed_attempt(
    provider: &ProviderId,
    round: u32,
    started_at: SystemTime,
    elapsed: Duration,
    tries: u32,
    err: &ProviderError,
) -> AttemptRecord {
    let outcome = if err.kind.is_retryable() {
        AttemptOutcome::RetryableError
    } else {
        AttemptOutcome::FatalError
    };
    AttemptRecord {
        provider: provider.clone(),
        round,
        started_at,
        elapsed,
        tries,
        outcome,
        error_kind: Some(err.kind),
        error_detail: Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_provider::MockProvider;

    fn config(providers: &[&str]) -> DispatchConfig {
        DispatchConfig {
            provider_priority: providers.iter().map(|p| p.to_string()).collect(),
            per_provider_retries: 3,
            backoff_base_ms: 1_000,
            provider_switch_delay_ms: 500,
            request_timeout_secs: 10,
            ..Default::default()
        }
    }

    fn dispatcher(mock: &MockProvider, providers: &[&str]) -> FallbackDispatcher<MockProvider> {
        FallbackDispatcher::new(Arc::new(mock.clone()), PromptConfig::default(), config(providers))
    }

    async fn run(dispatcher: &FallbackDispatcher<MockProvider>, item: &str) -> Dispatch {
        let id = ItemId::new(item);
        let source = SourceRef::new(format!("{}.jpeg", item));
        dispatcher.dispatch(&id, &source, 1, &CancellationToken::new()).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_short_circuits() {
        let mock = MockProvider::new("text");
        let dispatch = run(&dispatcher(&mock, &["a", "b"]), "q1").await;

        assert!(matches!(dispatch.outcome, DispatchOutcome::Succeeded(ref out) if out.provider.as_str() == "a"));
        assert_eq!(dispatch.attempts.len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_falls_back_immediately() {
        let mock = MockProvider::new("text");
        mock.fail_always_on("a", "q1", ProviderError::rate_limited("429"));

        let dispatch = run(&dispatcher(&mock, &["a", "b"]), "q1").await;

        assert!(matches!(dispatch.outcome, DispatchOutcome::Succeeded(ref out) if out.provider.as_str() == "b"));
        assert_eq!(dispatch.attempts.len(), 2);
        assert_eq!(dispatch.attempts[0].tries, 1);
        assert_eq!(dispatch.attempts[0].error_kind, Some(ProviderErrorKind::RateLimited));
        assert_eq!(dispatch.attempts[1].outcome, AttemptOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_same_provider_with_backoff() {
        let mock = MockProvider::new("text");
        mock.fail_times("a", "q1", ProviderError::server_error("502"), 2);

        let start = Instant::now();
        let dispatch = run(&dispatcher(&mock, &["a", "b"]), "q1").await;

        assert!(matches!(dispatch.outcome, DispatchOutcome::Succeeded(_)));
        assert_eq!(dispatch.attempts.len(), 1);
        assert_eq!(dispatch.attempts[0].tries, 3);
        // 1s + 2s of backoff between the three calls
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honoured() {
        let mock = MockProvider::new("text");
        mock.fail_times(
            "a",
            "q1",
            ProviderError::network("reset").with_retry_after(Duration::from_secs(7)),
            1,
        );

        let start = Instant::now();
        run(&dispatcher(&mock, &["a"]), "q1").await;
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_exhausted_is_retryable() {
        let mock = MockProvider::new("text");
        mock.fail_always("q1", ProviderError::network("down"));

        let dispatch = run(&dispatcher(&mock, &["a", "b"]), "q1").await;

        assert_eq!(dispatch.outcome, DispatchOutcome::Retryable);
        assert_eq!(dispatch.attempts.len(), 2);
        assert_eq!(dispatch.total_tries(), 6);
        assert_eq!(mock.call_count(), 6);
        assert!(dispatch
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::RetryableError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_without_fallback() {
        let mock = MockProvider::new("text");
        mock.fail_always("q7", ProviderError::fatal("corrupt image"));

        let dispatch = run(&dispatcher(&mock, &["a", "b"]), "q7").await;

        assert_eq!(dispatch.outcome, DispatchOutcome::Fatal("corrupt image".to_string()));
        assert_eq!(dispatch.attempts.len(), 1);
        assert_eq!(dispatch.attempts[0].outcome, AttemptOutcome::FatalError);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retries_and_fallback() {
        let mock = MockProvider::new("text").with_latency(Duration::from_secs(10));
        mock.fail_always_on("a", "q1", ProviderError::network("unreachable"));
        let mut cfg = config(&["a", "b", "c"]);
        cfg.request_timeout_secs = 120;
        let dispatcher = FallbackDispatcher::new(Arc::new(mock.clone()), PromptConfig::default(), cfg);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let dispatch = dispatcher
            .dispatch(&ItemId::new("q1"), &SourceRef::new("q1.jpeg"), 1, &cancel)
            .await;

        // the call in progress finishes, nothing new starts
        let providers: Vec<String> = mock.calls().into_iter().map(|c| c.provider.to_string()).collect();
        assert_eq!(providers, vec!["a"]);
        assert_eq!(dispatch.outcome, DispatchOutcome::Retryable);
        assert_eq!(dispatch.attempts.len(), 1);
        assert_eq!(dispatch.attempts[0].tries, 1);
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let mock = MockProvider::new("text");
        mock.fail_always_on("a", "q1", ProviderError::server_error("503"));
        let mut cfg = config(&["a", "b"]);
        cfg.backoff_base_ms = 30_000;
        cfg.request_timeout_secs = 120;
        let dispatcher = FallbackDispatcher::new(Arc::new(mock.clone()), PromptConfig::default(), cfg);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let dispatch = dispatcher
            .dispatch(&ItemId::new("q1"), &SourceRef::new("q1.jpeg"), 1, &cancel)
            .await;

        assert_eq!(mock.call_count(), 1);
        assert_eq!(dispatch.attempts[0].error_kind, Some(ProviderErrorKind::ServerError));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_panicked_dispatch_is_retryable_with_record() {
        let dispatcher = dispatcher(&MockProvider::new("text"), &["a", "b"]);
        let dispatch = dispatcher.panicked(2, SystemTime::now(), Duration::from_secs(1), "boom");

        assert_eq!(dispatch.outcome, DispatchOutcome::Retryable);
        assert_eq!(dispatch.attempts.len(), 1);
        assert_eq!(dispatch.attempts[0].provider.as_str(), "a");
        assert_eq!(dispatch.attempts[0].round, 2);
        assert_eq!(dispatch.total_tries(), 0);
        assert_eq!(
            dispatch.attempts[0].error_detail.as_deref(),
            Some("dispatch panicked: boom")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let mock = MockProvider::new("text").with_latency(Duration::from_secs(60));
        let mut cfg = config(&["a"]);
        cfg.per_provider_retries = 1;
        let dispatcher = FallbackDispatcher::new(Arc::new(mock), PromptConfig::default(), cfg);

        let start = Instant::now();
        let dispatch = run(&dispatcher, "q1").await;

        assert_eq!(dispatch.outcome, DispatchOutcome::Retryable);
        assert_eq!(dispatch.attempts[0].error_kind, Some(ProviderErrorKind::Timeout));
        assert!(start.elapsed() < Duration::from_secs(11));
    }
}
