//! Gleaner Dispatch
//!
//! Retry-round batch dispatcher with provider fallback and completeness
//! reconciliation.
//!
//! # Overview
//!
//! - **Registry**: the ordered set of work items and their states
//! - **Round scheduler**: successive rounds over a shrinking pending set,
//!   bounded concurrency, inter-round delays and cancellation
//! - **Fallback dispatcher**: one item across a prioritized provider list
//!   with per-provider retry and error-driven backoff
//! - **Reconciler**: expected vs produced ids, targeted re-runs
//! - **Report builder**: counts, rounds and per-item attempt history
//!
//! Every item ends `Succeeded` or `Exhausted`. Item failures never abort a
//! run; only cancellation or a configuration error stops one early.
//!
//! ## Item lifecycle
//!
//! | From | To | When |
//! |------|----|------|
//! | Pending | InFlight | dispatched in the current round |
//! | InFlight | Succeeded | a provider returned text |
//! | InFlight | Failed | every provider failed with a retryable error |
//! | Failed | Pending | another round remains |
//! | InFlight | Exhausted | the item is unprocessable |
//! | Pending / Failed | Exhausted | rounds spent or run cancelled |
//!
//! # Usage
//!
//! ```
//! use gleaner_dispatch::{DispatchConfig, Registry, ReportBuilder, RoundScheduler};
//! use gleaner_domain::{ItemId, PromptConfig, ProviderError, SourceRef};
//! use gleaner_provider::MockProvider;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = MockProvider::new("Question text");
//! provider.fail_always("q3", ProviderError::fatal("blank page"));
//!
//! let config = DispatchConfig {
//!     inter_round_delays_ms: vec![0],
//!     ..DispatchConfig::default()
//! };
//! let scheduler = RoundScheduler::new(Arc::new(provider), PromptConfig::default(), config)?;
//!
//! let registry = Registry::from_sources(
//!     (1..=3).map(|i| (ItemId::new(format!("q{}", i)), SourceRef::new(format!("q{}.jpeg", i)))),
//! )?;
//! let telemetry = scheduler.run(&registry).await?;
//!
//! let summary = ReportBuilder::build(&registry, &telemetry);
//! assert_eq!(summary.succeeded, 2);
//! assert_eq!(summary.failed_ids, vec!["q3"]);
//! println!("{}", summary.render());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod rate_limit;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod scheduler;


pub use config::{DispatchConfig, DEFAULT_PROVIDER};
pub use error::DispatchError;
pub use fallback::{Dispatch, DispatchOutcome, FallbackDispatcher};
pub use rate_limit::RateLimiter;
pub use reconcile::{reconcile, Convergence, Reconciler, Reconciliation, Rerun};
pub use registry::Registry;
pub use report::{AttemptReport, ItemReport, ReportBuilder, RunSummary, SinkErrorReport};
pub use scheduler::{RoundScheduler, RoundStats, RunTelemetry, SinkFailure};
