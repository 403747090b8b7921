//! Folder sink: one text file per extracted item.
//!
//! Layout of `<id>_extracted.txt`:
//!
//! ```text
//! Image: q1.jpeg
//! Model: google/gemini-2.0-flash-001
//! Retry Round: 1
//! Tokens used: 812
//! ================================================================================
//!
//! <extracted text>
//! ```

use crate::error::Result;
use gleaner_dispatch::RunSummary;
use gleaner_domain::traits::{Sink, SinkError};
use gleaner_domain::{ItemId, ItemOutput, SourceRef, WorkItem};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of extracted text files.
pub const EXTRACTED_SUFFIX: &str = "_extracted.txt";

/// Suffix of error files for exhausted items.
pub const ERROR_SUFFIX: &str = "_error.txt";

/// Separator between the metadata header and the text.
pub const SEPARATOR: &str =
    "================================================================================";

/// Writes extracted texts into a folder.
#[derive(Debug, Clone)]
pub struct FolderSink {
    root: PathBuf,
    sources: BTreeMap<ItemId, SourceRef>,
}

impl FolderSink {
    /// Create the sink, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            sources: BTreeMap::new(),
        })
    }

    /// Remember item sources so headers can name the original image.
    pub fn with_sources(mut self, sources: &[(ItemId, SourceRef)]) -> Self {
        self.sources = sources.iter().cloned().collect();
        self
    }

    /// Output folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the extracted text for `id`.
    pub fn extracted_path(&self, id: &ItemId) -> PathBuf {
        self.root.join(format!("{}{}", id, EXTRACTED_SUFFIX))
    }

    /// Path of the error file for `id`.
    pub fn error_path(&self, id: &ItemId) -> PathBuf {
        self.root.join(format!("{}{}", id, ERROR_SUFFIX))
    }

    /// Write `<id>_error.txt` for an exhausted item.
    pub fn write_error(&self, item: &WorkItem) -> Result<()> {
        let mut lines = vec![
            format!("Image: {}", item.source.file_name()),
            format!(
                "Error: {}",
                item.exhaust_reason
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown".to_string())
            ),
        ];
        if let Some(last) = item.attempts.last() {
            if let Some(kind) = last.error_kind {
                lines.push(format!("Error Type: {}", kind));
            }
            if let Some(detail) = &last.error_detail {
                lines.push(format!("Last Error: {}", detail));
            }
        }
        lines.push(format!("Retry Rounds: {}", item.rounds_attempted()));
        lines.push(format!("Attempts: {}", item.attempts.len()));
        for attempt in &item.attempts {
            lines.push(format!(
                "  - round {} via {}: {} ({} tries)",
                attempt.round, attempt.provider, attempt.outcome, attempt.tries
            ));
        }

        fs::write(self.error_path(&item.id), lines.join("\n") + "\n")?;
        Ok(())
    }

    /// Remove a stale error file once the item has succeeded.
    pub fn clear_error(&self, id: &ItemId) -> Result<()> {
        let path = self.error_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Write `summary_report.txt` and `summary_report.json`.
    pub fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        fs::write(self.root.join("summary_report.txt"), summary.render() + "\n")?;
        fs::write(self.root.join("summary_report.json"), summary.to_json()?)?;
        Ok(())
    }

    fn render(&self, id: &ItemId, output: &ItemOutput) -> String {
        let image = self
            .sources
            .get(id)
            .map(SourceRef::file_name)
            .unwrap_or_else(|| id.to_string());
        let model = output
            .extraction
            .model
            .clone()
            .unwrap_or_else(|| output.provider.to_string());
        let tokens = output
            .extraction
            .total_tokens
            .map(|t| t.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "Image: {}\nModel: {}\nRetry Round: {}\nTokens used: {}\n{}\n\n{}\n",
            image, model, output.round, tokens, SEPARATOR, output.extraction.text
        )
    }
}

impl Sink for FolderSink {
    fn write(&self, id: &ItemId, output: &ItemOutput) -> std::result::Result<(), SinkError> {
        let path = self.extracted_path(id);
        fs::write(&path, self.render(id, output))
            .map_err(|e| SinkError::new(format!("{}: {}", path.display(), e)))?;
        if let Err(e) = self.clear_error(id) {
            tracing::warn!(item = %id, error = %e, "could not remove stale error file");
        }
        tracing::debug!(item = %id, path = %path.display(), "output written");
        Ok(())
    }

    fn produced(&self) -> std::result::Result<Vec<ItemId>, SinkError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| SinkError::new(format!("{}: {}", self.root.display(), e)))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SinkError::new(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(EXTRACTED_SUFFIX) {
                if !stem.is_empty() && entry.path().is_file() {
                    ids.push(ItemId::new(stem));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{Extraction, ExhaustReason, ProviderId};
    use tempfile::TempDir;

    fn output(text: &str) -> ItemOutput {
        ItemOutput {
            extraction: Extraction {
                text: text.to_string(),
                model: Some("model-a".into()),
                total_tokens: Some(42),
            },
            provider: ProviderId::new("model-a"),
            round: 2,
        }
    }

    #[test]
    fn test_write_uses_header_format() {
        let dir = TempDir::new().unwrap();
        let id = ItemId::new("q1");
        let sink = FolderSink::new(dir.path())
            .unwrap()
            .with_sources(&[(id.clone(), SourceRef::new("images/q1.jpeg"))]);

        sink.write(&id, &output("Question 1\nA. yes")).unwrap();

        let content = fs::read_to_string(dir.path().join("q1_extracted.txt")).unwrap();
        assert!(content.starts_with("Image: q1.jpeg\nModel: model-a\nRetry Round: 2\nTokens used: 42\n"));
        assert!(content.contains(&format!("{}\n\nQuestion 1\nA. yes", SEPARATOR)));
    }

    #[test]
    fn test_produced_lists_extracted_files() {
        let dir = TempDir::new().unwrap();
        let sink = FolderSink::new(dir.path()).unwrap();
        sink.write(&ItemId::new("q10"), &output("x")).unwrap();
        sink.write(&ItemId::new("q2"), &output("y")).unwrap();
        fs::write(dir.path().join("q3_error.txt"), "Error").unwrap();
        fs::write(dir.path().join("summary_report.txt"), "").unwrap();

        let produced = sink.produced().unwrap();
        assert_eq!(produced, vec![ItemId::new("q2"), ItemId::new("q10")]);
    }

    #[test]
    fn test_success_clears_error_file() {
        let dir = TempDir::new().unwrap();
        let sink = FolderSink::new(dir.path()).unwrap();
        let mut item = WorkItem::new(ItemId::new("q4"), SourceRef::new("q4.png"));
        item.exhaust(ExhaustReason::Cancelled).unwrap();

        sink.write_error(&item).unwrap();
        let error = fs::read_to_string(sink.error_path(&item.id)).unwrap();
        assert!(error.contains("Image: q4.png"));
        assert!(error.contains("Error: cancelled"));

        sink.write(&item.id, &output("ok")).unwrap();
        assert!(!sink.error_path(&item.id).exists());
    }
}
