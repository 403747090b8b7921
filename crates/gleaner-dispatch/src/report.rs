//! Run summaries
//!
//! [`ReportBuilder::build`] is a pure aggregation over a finished registry
//! and the scheduler's telemetry. It can be called any number of times.

use crate::registry::Registry;
use crate::scheduler::{RoundStats, RunTelemetry};
use gleaner_domain::{AttemptRecord, ExhaustReason, ItemState, WorkItem};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// One attempt, flattened for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptReport {
    pub provider: String,
    pub round: u32,
    pub tries: u32,
    pub outcome: String,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
    pub started_at_ms: u64,
    pub elapsed_ms: u64,
}

impl From<&AttemptRecord> for AttemptReport {
    fn from(record: &AttemptRecord) -> Self {
        Self {
            provider: record.provider.to_string(),
            round: record.round,
            tries: record.tries,
            outcome: record.outcome.to_string(),
            error_kind: record.error_kind.map(|kind| kind.to_string()),
            error_detail: record.error_detail.clone(),
            started_at_ms: unix_millis(record.started_at),
            elapsed_ms: record.elapsed.as_millis() as u64,
        }
    }
}

/// Final state of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub id: String,
    pub source: String,
    pub state: String,
    /// Provider that produced the output
    pub provider: Option<String>,
    /// Round in which the output was produced
    pub round: Option<u32>,
    pub tokens: Option<u64>,
    pub exhaust_reason: Option<String>,
    pub attempts: Vec<AttemptReport>,
}

impl From<&WorkItem> for ItemReport {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.to_string(),
            source: item.source.to_string(),
            state: item.state.to_string(),
            provider: item.result.as_ref().map(|out| out.provider.to_string()),
            round: item.result.as_ref().map(|out| out.round),
            tokens: item.result.as_ref().and_then(|out| out.extraction.total_tokens),
            exhaust_reason: item.exhaust_reason.as_ref().map(ToString::to_string),
            attempts: item.attempts.iter().map(AttemptReport::from).collect(),
        }
    }
}

/// Sink write failure, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkErrorReport {
    pub id: String,
    pub message: String,
}

/// Summary of one scheduler run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Run identifier (UUIDv7)
    pub run_id: String,
    pub total: usize,
    pub succeeded: usize,
    /// Items without output (every id in `failed_ids`)
    pub failed: usize,
    pub exhausted: usize,
    /// Exhausted by the item's own fatal error
    pub fatal: usize,
    /// Exhausted because the run was cancelled
    pub cancelled: usize,
    /// Succeeded after failing at least one earlier round
    pub recovered: usize,
    pub rounds: Vec<RoundStats>,
    pub elapsed_ms: u64,
    /// Naturally sorted ids without output
    pub failed_ids: Vec<String>,
    pub total_tokens: u64,
    pub was_cancelled: bool,
    pub sink_errors: Vec<SinkErrorReport>,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    /// Success rate in percent; 0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }

    /// Whether every item succeeded and every output was persisted
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total && self.sink_errors.is_empty()
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        let mut lines = vec![
            "Extraction Summary Report".to_string(),
            rule.clone(),
            format!("Run: {}", self.run_id),
            format!("Total items: {}", self.total),
            format!("Successful: {}", self.succeeded),
            format!("Failed: {}", self.failed),
            format!("Success rate: {:.1}%", self.success_rate()),
            format!("Elapsed: {:.1}s", self.elapsed_ms as f64 / 1000.0),
            format!("Total tokens used: {}", self.total_tokens),
        ];
        if self.was_cancelled {
            lines.push("Run was cancelled before completion".to_string());
        }
        lines.push(String::new());

        if !self.rounds.is_empty() {
            lines.push("Rounds:".to_string());
            for round in &self.rounds {
                lines.push(format!(
                    "  Round {}: {} dispatched, {} succeeded, {} retryable, {} fatal ({}ms)",
                    round.round,
                    round.dispatched,
                    round.succeeded,
                    round.retryable,
                    round.fatal,
                    round.elapsed_ms
                ));
            }
            lines.push(String::new());
        }

        if self.recovered > 0 {
            lines.push(format!("Recovered after retry: {}", self.recovered));
        }

        if !self.failed_ids.is_empty() {
            lines.push("Failed items:".to_string());
            for item in self.items.iter().filter(|i| i.state != ItemState::Succeeded.as_str()) {
                match &item.exhaust_reason {
                    Some(reason) => lines.push(format!("  - {} ({})", item.id, reason)),
                    None => lines.push(format!("  - {}", item.id)),
                }
            }
            lines.push(String::new());
        }

        if !self.sink_errors.is_empty() {
            lines.push("Outputs not persisted:".to_string());
            for err in &self.sink_errors {
                lines.push(format!("  - {}: {}", err.id, err.message));
            }
        }

        lines.join("\n").trim_end().to_string()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds [`RunSummary`] values
pub struct ReportBuilder;

impl ReportBuilder {
    /// Aggregate a registry and its run telemetry
    pub fn build(registry: &Registry, telemetry: &RunTelemetry) -> RunSummary {
        let items = registry.snapshot();

        let succeeded = count(&items, |i| i.state == ItemState::Succeeded);
        let exhausted = count(&items, |i| i.state == ItemState::Exhausted);
        let fatal = count(&items, |i| {
            matches!(i.exhaust_reason, Some(ExhaustReason::Fatal { .. }))
        });
        let cancelled = count(&items, |i| i.exhaust_reason == Some(ExhaustReason::Cancelled));
        let recovered = count(&items, |i| {
            i.state == ItemState::Succeeded && i.failed_rounds > 0
        });
        let failed_ids: Vec<String> = items
            .iter()
            .filter(|i| i.state != ItemState::Succeeded)
            .map(|i| i.id.to_string())
            .collect();
        let total_tokens = items
            .iter()
            .filter_map(|i| i.result.as_ref())
            .filter_map(|out| out.extraction.total_tokens)
            .sum();

        RunSummary {
            run_id: telemetry.run_id.to_string(),
            total: items.len(),
            succeeded,
            failed: failed_ids.len(),
            exhausted,
            fatal,
            cancelled,
            recovered,
            rounds: telemetry.rounds.clone(),
            elapsed_ms: telemetry.elapsed.as_millis() as u64,
            failed_ids,
            total_tokens,
            was_cancelled: telemetry.cancelled,
            sink_errors: telemetry
                .sink_errors
                .iter()
                .map(|e| SinkErrorReport {
                    id: e.id.to_string(),
                    message: e.message.clone(),
                })
                .collect(),
            items: items.iter().map(ItemReport::from).collect(),
        }
    }
}

fn count(items: &[WorkItem], predicate: impl Fn(&WorkItem) -> bool) -> usize {
    items.iter().filter(|i| predicate(i)).count()
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{
        AttemptOutcome, Extraction, ItemId, ItemOutput, ProviderErrorKind, ProviderId, RunId,
        SourceRef,
    };
    use std::time::Duration;

    fn telemetry() -> RunTelemetry {
        RunTelemetry {
            run_id: RunId::new(),
            started_at: SystemTime::now(),
            elapsed: Duration::from_millis(2500),
            max_rounds: 3,
            rounds: vec![RoundStats {
                round: 1,
                dispatched: 3,
                succeeded: 1,
                retryable: 1,
                fatal: 1,
                ..Default::default()
            }],
            cancelled: false,
            sink_errors: Vec::new(),
        }
    }

    fn attempt(outcome: AttemptOutcome, kind: Option<ProviderErrorKind>) -> AttemptRecord {
        AttemptRecord {
            provider: ProviderId::new("a"),
            round: 1,
            started_at: SystemTime::now(),
            elapsed: Duration::from_millis(40),
            tries: 1,
            outcome,
            error_kind: kind,
            error_detail: kind.map(|k| k.to_string()),
        }
    }

    fn finished_registry() -> Registry {
        let registry = Registry::from_sources(
            ["q10", "q2", "q1"]
                .into_iter()
                .map(|id| (ItemId::new(id), SourceRef::new(format!("{}.png", id)))),
        )
        .unwrap();
        let (q1, q2, q10) = (ItemId::new("q1"), ItemId::new("q2"), ItemId::new("q10"));

        registry.begin(&q1).unwrap();
        registry
            .succeed(
                &q1,
                ItemOutput {
                    extraction: Extraction {
                        text: "one".into(),
                        model: None,
                        total_tokens: Some(120),
                    },
                    provider: ProviderId::new("a"),
                    round: 1,
                },
                vec![attempt(AttemptOutcome::Success, None)],
            )
            .unwrap();

        registry.begin(&q2).unwrap();
        registry
            .exhaust(
                &q2,
                ExhaustReason::Fatal { detail: "corrupt".into() },
                vec![attempt(AttemptOutcome::FatalError, Some(ProviderErrorKind::Fatal))],
            )
            .unwrap();

        registry.begin(&q10).unwrap();
        registry
            .fail(&q10, vec![attempt(AttemptOutcome::RetryableError, Some(ProviderErrorKind::Network))])
            .unwrap();
        registry.exhaust_remaining(|i| ExhaustReason::RoundsSpent { rounds: i.rounds_attempted() });
        registry
    }

    #[test]
    fn test_build_counts() {
        let summary = ReportBuilder::build(&finished_registry(), &telemetry());

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.exhausted, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.fatal, 1);
        assert_eq!(summary.total_tokens, 120);
        assert_eq!(summary.failed_ids, vec!["q2", "q10"]);
        assert_eq!(summary.succeeded + summary.exhausted, summary.total);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_build_is_repeatable() {
        let registry = finished_registry();
        let telemetry = telemetry();
        assert_eq!(
            ReportBuilder::build(&registry, &telemetry),
            ReportBuilder::build(&registry, &telemetry)
        );
    }

    #[test]
    fn test_items_carry_attempt_history() {
        let summary = ReportBuilder::build(&finished_registry(), &telemetry());
        let q10 = summary.items.iter().find(|i| i.id == "q10").unwrap();

        assert_eq!(q10.state, "exhausted");
        assert_eq!(q10.attempts.len(), 1);
        assert_eq!(q10.attempts[0].error_kind.as_deref(), Some("network"));
        assert_eq!(
            q10.exhaust_reason.as_deref(),
            Some("retries exhausted after 1 round(s)")
        );
    }

    #[test]
    fn test_render_lists_failures() {
        let summary = ReportBuilder::build(&finished_registry(), &telemetry());
        let text = summary.render();

        assert!(text.contains("Total items: 3"));
        assert!(text.contains("Successful: 1"));
        assert!(text.contains("Success rate: 33.3%"));
        assert!(text.contains("  - q2 (fatal: corrupt)"));
        assert!(text.contains("Round 1: 3 dispatched"));
    }

    #[test]
    fn test_json_output() {
        let summary = ReportBuilder::build(&finished_registry(), &telemetry());
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["failed_ids"][1], "q10");
        assert_eq!(value["rounds"][0]["fatal"], 1);
    }

    #[test]
    fn test_empty_run() {
        let summary = ReportBuilder::build(&Registry::new(), &telemetry());
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.is_complete());
    }
}
