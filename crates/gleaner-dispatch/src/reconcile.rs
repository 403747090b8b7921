//! Completeness reconciliation
//!
//! Compares the ids that were expected against the ids a sink actually
//! produced, and re-runs the scheduler on exactly the missing subset.

use crate::error::DispatchError;
use crate::registry::Registry;
use crate::report::{ReportBuilder, RunSummary};
use crate::scheduler::{RoundScheduler, RunTelemetry};
use gleaner_domain::traits::ExtractionProvider;
use gleaner_domain::{ItemId, SourceRef};
use std::collections::{BTreeMap, BTreeSet};

/// Gap between expected and produced ids, both naturally sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Expected but not produced
    pub missing: Vec<ItemId>,

    /// Produced but never expected; reported, never removed
    pub extra: Vec<ItemId>,
}

impl Reconciliation {
    /// No missing ids
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// No missing and no extra ids
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Compute `expected - produced` and `produced - expected`
///
/// # Examples
///
/// ```
/// use gleaner_dispatch::reconcile;
/// use gleaner_domain::ItemId;
/// use std::collections::BTreeSet;
///
/// let expected: BTreeSet<ItemId> = (1..=10).map(|i| ItemId::new(format!("q{}", i))).collect();
/// let produced: BTreeSet<ItemId> = (1..=8).map(|i| ItemId::new(format!("q{}", i))).collect();
///
/// let gap = reconcile(&expected, &produced);
/// assert_eq!(gap.missing, vec![ItemId::new("q9"), ItemId::new("q10")]);
/// assert!(gap.extra.is_empty());
/// ```
pub fn reconcile(expected: &BTreeSet<ItemId>, produced: &BTreeSet<ItemId>) -> Reconciliation {
    Reconciliation {
        missing: expected.difference(produced).cloned().collect(),
        extra: produced.difference(expected).cloned().collect(),
    }
}

/// Outcome of one re-run over a missing set
#[derive(Debug)]
pub struct Rerun {
    /// Fresh registry holding only the re-run ids
    pub registry: Registry,
    /// Scheduler telemetry for the re-run
    pub telemetry: RunTelemetry,
    /// Summary of the re-run
    pub summary: RunSummary,
}

/// Outcome of [`Reconciler::converge`]
#[derive(Debug)]
pub struct Convergence {
    /// Re-runs performed
    pub passes: u32,
    /// Gap after the last pass
    pub reconciliation: Reconciliation,
    /// Summary of every re-run, in order
    pub reruns: Vec<RunSummary>,
    /// True when the gap is empty or stopped shrinking; false when the pass
    /// budget ran out while it was still shrinking
    pub stable: bool,
}

/// Reconciles outputs against the expected item set for one scheduler
pub struct Reconciler<'a, P> {
    scheduler: &'a RoundScheduler<P>,
    sources: BTreeMap<ItemId, SourceRef>,
}

impl<'a, P> Reconciler<'a, P>
where
    P: ExtractionProvider + 'static,
{
    /// Create a reconciler over the expected `(id, source)` pairs
    pub fn new<I>(scheduler: &'a RoundScheduler<P>, sources: I) -> Self
    where
        I: IntoIterator<Item = (ItemId, SourceRef)>,
    {
        Self {
            scheduler,
            sources: sources.into_iter().collect(),
        }
    }

    /// Expected ids
    pub fn expected(&self) -> BTreeSet<ItemId> {
        self.sources.keys().cloned().collect()
    }

    /// Reconcile against an explicit produced set
    pub fn reconcile_with<I>(&self, produced: I) -> Reconciliation
    where
        I: IntoIterator<Item = ItemId>,
    {
        let produced: BTreeSet<ItemId> = produced.into_iter().collect();
        reconcile(&self.expected(), &produced)
    }

    /// Reconcile against what the scheduler's sink reports as produced
    pub fn reconcile_sink(&self) -> Result<Reconciliation, DispatchError> {
        let sink = self
            .scheduler
            .sink()
            .ok_or_else(|| DispatchError::Config("reconciliation needs a sink".to_string()))?;
        let produced = sink.produced()?;
        Ok(self.reconcile_with(produced))
    }

    /// Run the scheduler again on exactly `reconciliation.missing`
    ///
    /// Uses a fresh registry and at most `max_extra_rounds` rounds. Extra
    /// ids are left alone.
    pub async fn rerun_missing(
        &self,
        reconciliation: &Reconciliation,
        max_extra_rounds: u32,
    ) -> Result<Rerun, DispatchError> {
        let sources = reconciliation.missing.iter().map(|id| {
            self.sources
                .get(id)
                .map(|source| (id.clone(), source.clone()))
                .ok_or_else(|| DispatchError::UnknownItem(id.clone()))
        });
        let sources = sources.collect::<Result<Vec<_>, _>>()?;
        let registry = Registry::from_sources(sources)?;

        tracing::info!(
            missing = registry.len(),
            max_extra_rounds,
            "re-running missing items"
        );
        let telemetry = self.scheduler.run_rounds(&registry, max_extra_rounds).await?;
        let summary = ReportBuilder::build(&registry, &telemetry);

        Ok(Rerun {
            registry,
            telemetry,
            summary,
        })
    }

    /// Repeat reconcile then re-run until nothing is missing, the missing
    /// set stops shrinking, or `max_passes` re-runs have been made
    pub async fn converge(&self, max_passes: u32) -> Result<Convergence, DispatchError> {
        let extra_rounds = self.scheduler.config().max_extra_rounds.max(1);
        let mut reconciliation = self.reconcile_sink()?;
        let mut reruns = Vec::new();
        let mut passes = 0;
        let mut stable = reconciliation.is_complete();

        while !reconciliation.is_complete() && passes < max_passes {
            if self.scheduler.cancellation_token().is_cancelled() {
                tracing::info!("reconciliation stopped by cancellation");
                break;
            }

            let rerun = self.rerun_missing(&reconciliation, extra_rounds).await?;
            reruns.push(rerun.summary);
            passes += 1;

            let next = self.reconcile_sink()?;
            let shrunk = next.missing.len() < reconciliation.missing.len();
            reconciliation = next;
            tracing::info!(
                pass = passes,
                missing = reconciliation.missing.len(),
                "reconciliation pass finished"
            );

            if reconciliation.is_complete() || !shrunk {
                stable = true;
                break;
            }
        }

        if !reconciliation.extra.is_empty() {
            tracing::warn!(
                extra = reconciliation.extra.len(),
                "outputs found for unexpected ids"
            );
        }

        Ok(Convergence {
            passes,
            reconciliation,
            reruns,
            stable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(names: &[&str]) -> BTreeSet<ItemId> {
        names.iter().map(|n| ItemId::new(*n)).collect()
    }

    #[test]
    fn test_reconcile_identity_is_empty() {
        let expected = ids(&["q1", "q2", "q10"]);
        assert!(reconcile(&expected, &expected).is_clean());
    }

    #[test]
    fn test_extra_ids_are_reported() {
        let gap = reconcile(&ids(&["q1", "q2"]), &ids(&["q1", "q2", "stray"]));
        assert!(gap.is_complete());
        assert_eq!(gap.extra, vec![ItemId::new("stray")]);
    }

    #[test]
    fn test_missing_is_naturally_sorted() {
        let gap = reconcile(&ids(&["q1", "q2", "q9", "q10", "q11"]), &ids(&["q1"]));
        let missing: Vec<&str> = gap.missing.iter().map(|id| id.as_str()).collect();
        assert_eq!(missing, vec!["q2", "q9", "q10", "q11"]);
    }

    fn id_set() -> impl Strategy<Value = BTreeSet<ItemId>> {
        prop::collection::btree_set("[a-c]{0,2}[0-9]{0,3}", 0..20)
            .prop_map(|set| set.into_iter().map(ItemId::new).collect())
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_idempotent(expected in id_set(), produced in id_set()) {
            prop_assert_eq!(reconcile(&expected, &produced), reconcile(&expected, &produced));
        }

        #[test]
        fn prop_missing_and_extra_partition_the_difference(expected in id_set(), produced in id_set()) {
            let gap = reconcile(&expected, &produced);
            for id in &gap.missing {
                prop_assert!(expected.contains(id) && !produced.contains(id));
            }
            for id in &gap.extra {
                prop_assert!(produced.contains(id) && !expected.contains(id));
            }
            let covered = expected.intersection(&produced).count() + gap.missing.len();
            prop_assert_eq!(covered, expected.len());
        }

        #[test]
        fn prop_reconcile_with_self_is_clean(expected in id_set()) {
            prop_assert!(reconcile(&expected, &expected).is_clean());
        }
    }
}
