//! Retry-round scheduler
//!
//! Round `r` dispatches exactly the pending snapshot taken when the round
//! starts, at most `concurrency_limit` at a time. Every dispatch of round
//! `r` resolves before round `r + 1` begins. Items that failed with a
//! retryable error go back to `Pending` for the next round; once the rounds
//! run out they are exhausted.

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::fallback::{Dispatch, DispatchOutcome, FallbackDispatcher};
use crate::registry::Registry;
use futures::FutureExt;
use gleaner_domain::traits::{ExtractionProvider, Sink};
use gleaner_domain::{ExhaustReason, ItemId, ItemState, PromptConfig, RunId};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Counters for one round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundStats {
    /// 1-based round number
    pub round: u32,
    /// Items dispatched
    pub dispatched: usize,
    /// Dispatches that succeeded
    pub succeeded: usize,
    /// Dispatches that ended retryable
    pub retryable: usize,
    /// Dispatches that ended fatal
    pub fatal: usize,
    /// Snapshot items left undispatched because of cancellation
    pub not_started: usize,
    /// Wall time of the round, excluding the delay after it
    pub elapsed_ms: u64,
    /// Time actually waited before the next round
    pub delay_after_ms: u64,
}

/// A sink write that failed after the item succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    /// Item whose output was not persisted
    pub id: ItemId,
    /// Error reported by the sink
    pub message: String,
}

/// Telemetry collected by one scheduler run
#[derive(Debug, Clone)]
pub struct RunTelemetry {
    /// Run identifier
    pub run_id: RunId,
    /// Wall-clock start of the run
    pub started_at: SystemTime,
    /// Total run time
    pub elapsed: Duration,
    /// Round budget the run was given
    pub max_rounds: u32,
    /// Per-round counters, in round order
    pub rounds: Vec<RoundStats>,
    /// Whether the run stopped because of cancellation
    pub cancelled: bool,
    /// Failed sink writes
    pub sink_errors: Vec<SinkFailure>,
}

impl RunTelemetry {
    /// Number of rounds that actually ran
    pub fn rounds_run(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Total dispatches across all rounds
    pub fn total_dispatches(&self) -> usize {
        self.rounds.iter().map(|r| r.dispatched).sum()
    }
}

/// Drives a registry through successive retry rounds
pub struct RoundScheduler<P> {
    dispatcher: Arc<FallbackDispatcher<P>>,
    config: DispatchConfig,
    sink: Option<Arc<dyn Sink>>,
    cancel: CancellationToken,
}

impl<P> RoundScheduler<P>
where
    P: ExtractionProvider + 'static,
{
    /// Create a scheduler
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Config` if `config` fails validation.
    pub fn new(provider: Arc<P>, prompt: PromptConfig, config: DispatchConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let dispatcher = FallbackDispatcher::new(provider, prompt, config.clone());
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            config,
            sink: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Persist each successful output through `sink`
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Observe an external cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops this scheduler when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scheduler configuration
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Configured sink, if any
    pub fn sink(&self) -> Option<&Arc<dyn Sink>> {
        self.sink.as_ref()
    }

    /// Run with the configured `max_rounds`
    pub async fn run(&self, registry: &Registry) -> Result<RunTelemetry, DispatchError> {
        self.run_rounds(registry, self.config.max_rounds).await
    }

    /// Run at most `max_rounds` rounds over `registry`
    ///
    /// On return every item is `Succeeded` or `Exhausted`. Item failures
    /// never surface as errors; only registry misuse does.
    pub async fn run_rounds(&self, registry: &Registry, max_rounds: u32) -> Result<RunTelemetry, DispatchError> {
        if max_rounds == 0 {
            return Err(DispatchError::Config("max_rounds must be at least 1".to_string()));
        }

        let run_id = RunId::new();
        let started_at = SystemTime::now();
        let run_start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));
        let mut rounds = Vec::new();
        let mut sink_errors = Vec::new();
        let mut cancelled = false;

        tracing::info!(
            run_id = %run_id,
            items = registry.len(),
            max_rounds,
            "dispatch run started"
        );

        for round in 1..=max_rounds {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let snapshot = registry.pending_ids();
            if snapshot.is_empty() {
                break;
            }

            let round_start = Instant::now();
            let mut stats = RoundStats {
                round,
                ..Default::default()
            };
            tracing::info!(round, pending = snapshot.len(), "round started");

            let mut tasks = JoinSet::new();
            let mut dispatched = Vec::with_capacity(snapshot.len());
            for id in &snapshot {
                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        permit.map_err(|e| DispatchError::Worker(e.to_string()))?
                    }
                };

                let source = registry.begin(id)?;
                let dispatcher = Arc::clone(&self.dispatcher);
                let cancel = self.cancel.clone();
                let task_id = id.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let started_at = SystemTime::now();
                    let start = Instant::now();
                    let work = dispatcher.dispatch(&task_id, &source, round, &cancel);
                    let dispatch = match AssertUnwindSafe(work).catch_unwind().await {
                        Ok(dispatch) => dispatch,
                        Err(panic) => {
                            let detail = panic_message(&*panic);
                            tracing::error!(item = %task_id, round, panic = %detail, "dispatch panicked");
                            dispatcher.panicked(round, started_at, start.elapsed(), &detail)
                        }
                    };
                    (task_id, dispatch)
                });
                dispatched.push(id.clone());
            }
            stats.dispatched = dispatched.len();
            stats.not_started = snapshot.len() - dispatched.len();

            // Barrier: the round ends only when every dispatch has resolved
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((id, dispatch)) => {
                        self.apply(registry, &id, dispatch, &mut stats, &mut sink_errors)?;
                    }
                    Err(e) => {
                        tracing::error!(round, error = %e, "dispatch task failed");
                    }
                }
            }

            // Items whose task was lost are still in flight
            for id in &dispatched {
                if registry.state(id) == Some(ItemState::InFlight) {
                    tracing::error!(item = %id, round, "dispatch ended without a result");
                    registry.fail(id, Vec::new())?;
                    stats.retryable += 1;
                }
            }

            stats.elapsed_ms = round_start.elapsed().as_millis() as u64;
            tracing::info!(
                round,
                succeeded = stats.succeeded,
                retryable = stats.retryable,
                fatal = stats.fatal,
                "round finished"
            );

            let rounds_remain = round < max_rounds;
            if !cancelled && rounds_remain && stats.retryable > 0 {
                let delay = self.config.inter_round_delay(round);
                tracing::debug!(round, delay_ms = delay.as_millis() as u64, "waiting before next round");
                let wait_start = Instant::now();
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => cancelled = true,
                    _ = sleep(delay) => {}
                }
                stats.delay_after_ms = wait_start.elapsed().as_millis() as u64;
            }
            rounds.push(stats);

            if cancelled {
                break;
            }
            if rounds_remain {
                registry.requeue_failed();
            }
        }

        let exhausted = registry.exhaust_remaining(|item| {
            if cancelled {
                ExhaustReason::Cancelled
            } else {
                ExhaustReason::RoundsSpent {
                    rounds: item.rounds_attempted(),
                }
            }
        });
        if !exhausted.is_empty() {
            tracing::warn!(
                count = exhausted.len(),
                cancelled,
                "items exhausted without output"
            );
        }

        let telemetry = RunTelemetry {
            run_id,
            started_at,
            elapsed: run_start.elapsed(),
            max_rounds,
            rounds,
            cancelled,
            sink_errors,
        };
        tracing::info!(
            run_id = %run_id,
            rounds = telemetry.rounds_run(),
            succeeded = registry.count(ItemState::Succeeded),
            exhausted = registry.count(ItemState::Exhausted),
            "dispatch run finished"
        );
        Ok(telemetry)
    }

    fn apply(
        &self,
        registry: &Registry,
        id: &ItemId,
        dispatch: Dispatch,
        stats: &mut RoundStats,
        sink_errors: &mut Vec<SinkFailure>,
    ) -> Result<(), DispatchError> {
        match dispatch.outcome {
            DispatchOutcome::Succeeded(output) => {
                registry.succeed(id, output.clone(), dispatch.attempts)?;
                stats.succeeded += 1;
                if let Some(sink) = &self.sink {
                    if let Err(e) = sink.write(id, &output) {
                        tracing::error!(item = %id, error = %e, "failed to persist output");
                        sink_errors.push(SinkFailure {
                            id: id.clone(),
                            message: e.message,
                        });
                    }
                }
            }
            DispatchOutcome::Retryable => {
                registry.fail(id, dispatch.attempts)?;
                stats.retryable += 1;
            }
            DispatchOutcome::Fatal(detail) => {
                registry.exhaust(id, ExhaustReason::Fatal { detail }, dispatch.attempts)?;
                stats.fatal += 1;
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
