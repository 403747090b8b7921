//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use crate::join::JoinReport;
use colored::*;
use gleaner_dispatch::{Convergence, Reconciliation, RunSummary};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format a run summary.
    pub fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(summary.to_json()?),
            OutputFormat::Table => Ok(self.format_summary_table(summary)),
            OutputFormat::Quiet => Ok(summary.failed_ids.join("\n")),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        if summary.total == 0 {
            return self.colorize("No images to process.", "yellow");
        }

        let mut builder = Builder::default();
        builder.push_record(["Item", "State", "Model", "Round", "Attempts", "Detail"]);
        for item in &summary.items {
            let state = match item.state.as_str() {
                "succeeded" => self.colorize(&item.state, "green"),
                _ => self.colorize(&item.state, "red"),
            };
            builder.push_record([
                item.id.clone(),
                state,
                item.provider.clone().unwrap_or_else(|| "-".to_string()),
                item.round.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                item.attempts.len().to_string(),
                item.exhaust_reason.clone().unwrap_or_default(),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        let headline = format!(
            "{} of {} succeeded ({:.1}%) in {} round(s)",
            summary.succeeded,
            summary.total,
            summary.success_rate(),
            summary.rounds.len()
        );
        let headline = if summary.is_complete() {
            self.success(&headline)
        } else {
            self.warning(&headline)
        };

        format!("{}\n{}", table, headline)
    }

    /// Format a reconciliation result.
    pub fn format_reconciliation(&self, reconciliation: &Reconciliation, expected: usize) -> Result<String> {
        let missing: Vec<String> = reconciliation.missing.iter().map(ToString::to_string).collect();
        let extra: Vec<String> = reconciliation.extra.iter().map(ToString::to_string).collect();

        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "expected": expected,
                "missing": missing,
                "extra": extra,
            }))?),
            OutputFormat::Quiet => Ok(missing.join("\n")),
            OutputFormat::Table => {
                let mut lines = Vec::new();
                if reconciliation.is_complete() {
                    lines.push(self.success(&format!("All {} items have output", expected)));
                } else {
                    lines.push(self.warning(&format!(
                        "{} of {} items missing: {}",
                        missing.len(),
                        expected,
                        missing.join(", ")
                    )));
                }
                if !extra.is_empty() {
                    lines.push(self.info(&format!("Outputs without a source image: {}", extra.join(", "))));
                }
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format the outcome of repeated re-runs.
    pub fn format_convergence(&self, convergence: &Convergence, expected: usize) -> Result<String> {
        if self.format == OutputFormat::Json {
            let reruns: Vec<serde_json::Value> = convergence
                .reruns
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<_, _>>()?;
            return Ok(serde_json::to_string_pretty(&serde_json::json!({
                "passes": convergence.passes,
                "stable": convergence.stable,
                "missing": convergence.reconciliation.missing.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "extra": convergence.reconciliation.extra.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "reruns": reruns,
            }))?);
        }

        let gap = self.format_reconciliation(&convergence.reconciliation, expected)?;
        if self.format == OutputFormat::Quiet {
            return Ok(gap);
        }
        let recovered: usize = convergence.reruns.iter().map(|r| r.succeeded).sum();
        Ok(format!(
            "{}\n{}",
            self.info(&format!(
                "{} re-run pass(es), {} item(s) recovered",
                convergence.passes, recovered
            )),
            gap
        ))
    }

    /// Format a join result.
    pub fn format_join(&self, report: &JoinReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "path": report.path.display().to_string(),
                "joined": report.joined.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "skipped": report.skipped.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>(),
            }))?),
            OutputFormat::Quiet => Ok(report.path.display().to_string()),
            OutputFormat::Table => {
                let mut lines = vec![self.success(&format!(
                    "Joined {} file(s) into {}",
                    report.joined.len(),
                    report.path.display()
                ))];
                for (id, err) in &report.skipped {
                    lines.push(self.warning(&format!("Skipped {}: {}", id, err)));
                }
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}
