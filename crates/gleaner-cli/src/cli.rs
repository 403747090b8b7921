//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gleaner - Extract text from batches of question images.
#[derive(Debug, Parser)]
#[command(name = "gleaner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (ids only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract text from every image in a folder
    Extract(ExtractArgs),

    /// Compare produced outputs with the input images
    Reconcile(ReconcileArgs),

    /// Join extracted texts into one file
    Join(JoinArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),
}

/// Provider selection shared by commands that dispatch.
#[derive(Debug, Clone, Parser)]
pub struct ProviderArgs {
    /// OpenRouter API key
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model to try, in priority order (repeatable)
    #[arg(short, long = "model")]
    pub models: Vec<String>,

    /// Use a mock provider instead of calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum retry rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Maximum simultaneous requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// File whose contents replace the configured prompt
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,
}

/// Arguments for the extract command.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Folder containing images
    #[arg(short, long)]
    pub input: PathBuf,

    /// Folder for extracted texts
    #[arg(short, long, default_value = "extracted_texts")]
    pub output: PathBuf,

    /// Image extensions, comma separated (e.g. jpeg,png)
    #[arg(long, value_delimiter = ',')]
    pub ext: Vec<String>,

    /// Re-process images that already have an extracted text
    #[arg(long)]
    pub no_skip_existing: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

/// Arguments for the reconcile command.
#[derive(Debug, Parser)]
pub struct ReconcileArgs {
    /// Folder containing images
    #[arg(short, long)]
    pub input: PathBuf,

    /// Folder containing extracted texts
    #[arg(short, long, default_value = "extracted_texts")]
    pub output: PathBuf,

    /// Image extensions, comma separated
    #[arg(long, value_delimiter = ',')]
    pub ext: Vec<String>,

    /// Re-process the missing images
    #[arg(long)]
    pub rerun: bool,

    /// Rounds granted to each re-run
    #[arg(long)]
    pub max_extra_rounds: Option<u32>,

    /// Maximum re-run passes
    #[arg(long, default_value = "3")]
    pub max_passes: u32,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

/// Arguments for the join command.
#[derive(Debug, Parser)]
pub struct JoinArgs {
    /// Folder containing extracted texts
    #[arg(short, long, default_value = "extracted_texts")]
    pub output: PathBuf,

    /// Joined file name, written inside the output folder
    #[arg(long, default_value = "all_questions.txt")]
    pub file: String,

    /// Omit the per-question separator headers
    #[arg(long)]
    pub no_separator: bool,

    /// Keep each file's metadata header
    #[arg(long)]
    pub include_metadata: bool,
}

/// Arguments for configuration management.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Choose a dispatch preset
        #[arg(long, value_enum, default_value = "default")]
        preset: PresetArg,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Dispatch presets.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PresetArg {
    /// Balanced settings
    Default,
    /// Fewer rounds, shorter waits
    Aggressive,
    /// More rounds, rate limited
    Lenient,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<PresetArg> for gleaner_dispatch::DispatchConfig {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Default => gleaner_dispatch::DispatchConfig::default(),
            PresetArg::Aggressive => gleaner_dispatch::DispatchConfig::aggressive(),
            PresetArg::Lenient => gleaner_dispatch::DispatchConfig::lenient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command() {
        let cli = Cli::parse_from([
            "gleaner",
            "extract",
            "--input",
            "images",
            "--ext",
            "jpeg,png",
            "-m",
            "model-a",
            "-m",
            "model-b",
            "--dry-run",
        ]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.input, PathBuf::from("images"));
                assert_eq!(args.output, PathBuf::from("extracted_texts"));
                assert_eq!(args.ext, vec!["jpeg", "png"]);
                assert_eq!(args.provider.models, vec!["model-a", "model-b"]);
                assert!(args.provider.dry_run);
            }
            _ => panic!("Expected Extract command"),
        }
    }

    #[test]
    fn test_reconcile_command() {
        let cli = Cli::parse_from(["gleaner", "reconcile", "-i", "images", "--rerun", "--max-passes", "2"]);
        match cli.command {
            Command::Reconcile(args) => {
                assert!(args.rerun);
                assert_eq!(args.max_passes, 2);
            }
            _ => panic!("Expected Reconcile command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["gleaner", "join", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.format, Some(CliFormat::Json)));
    }

    #[test]
    fn test_preset_conversion() {
        let config: gleaner_dispatch::DispatchConfig = PresetArg::Lenient.into();
        assert_eq!(config.max_rounds, 5);
    }
}
