//! Reconcile command implementation.

use super::{dispatch_config, extensions, prompt_config, Backend};
use crate::cli::ReconcileArgs;
use crate::config::Config;
use crate::enumerate::FolderEnumerator;
use crate::error::Result;
use crate::output::Formatter;
use crate::sink::FolderSink;
use gleaner_dispatch::{reconcile, Convergence, DispatchConfig, Reconciler, RoundScheduler};
use gleaner_domain::traits::{ExtractionProvider, Sink, SourceEnumerator};
use gleaner_domain::{ItemId, PromptConfig, SourceRef};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execute the reconcile command.
pub async fn execute_reconcile(
    args: ReconcileArgs,
    config: &Config,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<()> {
    let sources = FolderEnumerator::new(&args.input, &extensions(&args.ext, config)).enumerate()?;
    let sink = FolderSink::new(&args.output)?.with_sources(&sources);

    if !args.rerun {
        let expected: BTreeSet<ItemId> = sources.iter().map(|(id, _)| id.clone()).collect();
        let produced: BTreeSet<ItemId> = sink.produced()?.into_iter().collect();
        let gap = reconcile(&expected, &produced);
        println!("{}", formatter.format_reconciliation(&gap, expected.len())?);
        return Ok(());
    }

    let mut dispatch = dispatch_config(config, &args.provider)?;
    if let Some(rounds) = args.max_extra_rounds {
        dispatch.max_extra_rounds = rounds;
    }
    let prompt = prompt_config(config, &args.provider)?;
    let expected = sources.len();

    let convergence = match Backend::select(&args.provider, config)? {
        Backend::Mock(provider) => {
            converge(Arc::new(provider), sink, sources, prompt, dispatch, args.max_passes, cancel).await?
        }
        Backend::OpenRouter(provider) => {
            converge(Arc::new(provider), sink, sources, prompt, dispatch, args.max_passes, cancel).await?
        }
    };

    println!("{}", formatter.format_convergence(&convergence, expected)?);
    Ok(())
}

/// Re-run missing items until nothing is missing or the gap is stable.
pub async fn converge<P>(
    provider: Arc<P>,
    sink: FolderSink,
    sources: Vec<(ItemId, SourceRef)>,
    prompt: PromptConfig,
    dispatch: DispatchConfig,
    max_passes: u32,
    cancel: CancellationToken,
) -> Result<Convergence>
where
    P: ExtractionProvider + 'static,
{
    let scheduler = RoundScheduler::new(provider, prompt, dispatch)?
        .with_sink(Arc::new(sink))
        .with_cancellation(cancel);
    let convergence = Reconciler::new(&scheduler, sources).converge(max_passes).await?;

    if !convergence.stable {
        tracing::warn!(
            passes = convergence.passes,
            missing = convergence.reconciliation.missing.len(),
            "pass budget spent while items were still being recovered"
        );
    }
    Ok(convergence)
}
