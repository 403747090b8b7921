//! Gleaner CLI library.
//!
//! Folder enumeration, the folder sink, configuration management, command
//! execution and output formatting for the `gleaner` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod join;
pub mod output;
pub mod sink;

pub use cli::{Cli, Command};
pub use config::Config;
pub use enumerate::FolderEnumerator;
pub use error::{CliError, Result};
pub use output::Formatter;
pub use sink::FolderSink;
