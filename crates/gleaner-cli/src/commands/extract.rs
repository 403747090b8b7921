//! Extract command implementation.

use super::{dispatch_config, extensions, prompt_config, Backend};
use crate::cli::ExtractArgs;
use crate::config::Config;
use crate::enumerate::FolderEnumerator;
use crate::error::Result;
use crate::output::Formatter;
use crate::sink::FolderSink;
use gleaner_dispatch::{DispatchConfig, Reconciler, Registry, ReportBuilder, RoundScheduler, RunSummary};
use gleaner_domain::traits::{ExtractionProvider, SourceEnumerator};
use gleaner_domain::PromptConfig;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execute the extract command.
pub async fn execute_extract(
    args: ExtractArgs,
    config: &Config,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> Result<()> {
    let dispatch = dispatch_config(config, &args.provider)?;
    let prompt = prompt_config(config, &args.provider)?;
    let enumerator = FolderEnumerator::new(&args.input, &extensions(&args.ext, config));
    let skip_existing = !args.no_skip_existing;

    let summary = match Backend::select(&args.provider, config)? {
        Backend::Mock(provider) => {
            extract(Arc::new(provider), &enumerator, &args.output, prompt, dispatch, skip_existing, cancel).await?
        }
        Backend::OpenRouter(provider) => {
            extract(Arc::new(provider), &enumerator, &args.output, prompt, dispatch, skip_existing, cancel).await?
        }
    };

    println!("{}", formatter.format_summary(&summary)?);
    Ok(())
}

/// Run one extraction pass over a folder.
///
/// Writes `<id>_extracted.txt` for each success, `<id>_error.txt` for each
/// exhausted item, and the summary report files.
pub async fn extract<P>(
    provider: Arc<P>,
    enumerator: &FolderEnumerator,
    output: &Path,
    prompt: PromptConfig,
    dispatch: DispatchConfig,
    skip_existing: bool,
    cancel: CancellationToken,
) -> Result<RunSummary>
where
    P: ExtractionProvider + 'static,
{
    let sources = enumerator.enumerate()?;
    let sink = FolderSink::new(output)?.with_sources(&sources);
    let scheduler = RoundScheduler::new(provider, prompt, dispatch)?
        .with_sink(Arc::new(sink.clone()))
        .with_cancellation(cancel);

    let to_run = if skip_existing {
        let gap = Reconciler::new(&scheduler, sources.clone()).reconcile_sink()?;
        let missing: BTreeSet<_> = gap.missing.into_iter().collect();
        let skipped = sources.len() - missing.len();
        if skipped > 0 {
            tracing::info!(skipped, "skipping images with existing output");
        }
        sources
            .into_iter()
            .filter(|(id, _)| missing.contains(id))
            .collect()
    } else {
        sources
    };

    tracing::info!(
        images = to_run.len(),
        input = %enumerator.root().display(),
        output = %output.display(),
        "starting extraction"
    );
    let registry = Registry::from_sources(to_run)?;
    let telemetry = scheduler.run(&registry).await?;

    for id in registry.exhausted_ids() {
        if let Some(item) = registry.get(id) {
            sink.write_error(&item)?;
        }
    }

    let summary = ReportBuilder::build(&registry, &telemetry);
    sink.write_summary(&summary)?;
    Ok(summary)
}
