//! Command implementations.

pub mod config;
pub mod extract;
pub mod join;
pub mod reconcile;

pub use self::config::execute_config;
pub use self::extract::{execute_extract, extract};
pub use self::join::execute_join;
pub use self::reconcile::execute_reconcile;

use crate::cli::ProviderArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use gleaner_dispatch::DispatchConfig;
use gleaner_domain::PromptConfig;
use gleaner_provider::{MockProvider, OpenRouterProvider};
use std::fs;

/// Text returned for every item in a dry run.
pub const DRY_RUN_TEXT: &str = "(dry run: no provider was called)";

/// Provider chosen for a run.
pub enum Backend {
    /// Mock provider for `--dry-run`
    Mock(MockProvider),
    /// OpenRouter HTTP provider
    OpenRouter(OpenRouterProvider),
}

impl Backend {
    /// Pick the provider from the command-line flags.
    pub fn select(args: &ProviderArgs, config: &Config) -> Result<Self> {
        if args.dry_run {
            return Ok(Backend::Mock(MockProvider::new(DRY_RUN_TEXT)));
        }
        let api_key = args
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(CliError::MissingApiKey)?;
        let mut provider = OpenRouterProvider::new(api_key)?;
        if let Some(endpoint) = &config.settings.endpoint {
            provider = provider.with_endpoint(endpoint.clone());
        }
        Ok(Backend::OpenRouter(provider))
    }
}

/// Dispatch settings after command-line overrides.
pub fn dispatch_config(config: &Config, args: &ProviderArgs) -> Result<DispatchConfig> {
    let mut dispatch = config.dispatch.clone();
    if !args.models.is_empty() {
        dispatch.provider_priority = args.models.clone();
    }
    if let Some(max_rounds) = args.max_rounds {
        dispatch.max_rounds = max_rounds;
    }
    if let Some(concurrency) = args.concurrency {
        dispatch.concurrency_limit = concurrency;
    }
    dispatch.validate()?;
    Ok(dispatch)
}

/// Prompt settings after command-line overrides.
pub fn prompt_config(config: &Config, args: &ProviderArgs) -> Result<PromptConfig> {
    let mut prompt = config.prompt_config();
    if let Some(path) = &args.prompt_file {
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(CliError::InvalidInput(format!(
                "Prompt file is empty: {}",
                path.display()
            )));
        }
        prompt.prompt = text.trim().to_string();
    }
    Ok(prompt)
}

/// Extensions from the flag, or the configured ones.
pub fn extensions(flag: &[String], config: &Config) -> Vec<String> {
    if flag.is_empty() {
        config.settings.extensions.clone()
    } else {
        flag.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProviderArgs {
        ProviderArgs {
            api_key: None,
            models: vec![],
            dry_run: false,
            max_rounds: None,
            concurrency: None,
            prompt_file: None,
        }
    }

    #[test]
    fn test_overrides_apply() {
        let mut args = args();
        args.models = vec!["x".into(), "y".into()];
        args.max_rounds = Some(1);
        let dispatch = dispatch_config(&Config::default(), &args).unwrap();
        assert_eq!(dispatch.provider_priority, vec!["x", "y"]);
        assert_eq!(dispatch.max_rounds, 1);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut args = args();
        args.concurrency = Some(0);
        assert!(dispatch_config(&Config::default(), &args).is_err());
    }

    #[test]
    fn test_real_run_needs_api_key() {
        assert!(matches!(
            Backend::select(&args(), &Config::default()),
            Err(CliError::MissingApiKey)
        ));
        let mut dry = args();
        dry.dry_run = true;
        assert!(matches!(Backend::select(&dry, &Config::default()), Ok(Backend::Mock(_))));
    }
}
