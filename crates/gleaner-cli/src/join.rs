//! Joining extracted texts into one document.

use crate::error::{CliError, Result};
use crate::sink::{EXTRACTED_SUFFIX, SEPARATOR};
use gleaner_domain::ItemId;
use std::fs;
use std::path::{Path, PathBuf};

/// Options for [`join_folder`].
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Write a `QUESTION n` header before each text
    pub separator: bool,
    /// Keep each file's metadata header
    pub include_metadata: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            separator: true,
            include_metadata: false,
        }
    }
}

/// Result of a join.
#[derive(Debug, Clone)]
pub struct JoinReport {
    /// File written
    pub path: PathBuf,
    /// Ids joined, naturally sorted
    pub joined: Vec<ItemId>,
    /// Files that could not be read
    pub skipped: Vec<(ItemId, String)>,
}

/// Strip the metadata header from an extracted file.
///
/// The header is a block of `Key: value` lines closed by a separator line.
/// Content without such a header is returned trimmed.
pub fn strip_metadata(content: &str) -> &str {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with(&SEPARATOR[..40]) {
            return content[offset + line.len()..].trim();
        }
        if !trimmed.is_empty() && !trimmed.contains(": ") {
            break;
        }
        offset += line.len();
    }
    content.trim()
}

/// Question number for the separator header: digits of the id, or the
/// position when the id has none.
fn question_number(id: &ItemId, position: usize) -> String {
    let digits: String = id
        .as_str()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let trimmed = digits.trim_start_matches('0');
    match (digits.is_empty(), trimmed.is_empty()) {
        (true, _) => position.to_string(),
        (false, true) => "0".to_string(),
        (false, false) => trimmed.to_string(),
    }
}

/// Join every `*_extracted.txt` in `folder`, in natural order, into
/// `folder/file_name`.
pub fn join_folder(folder: &Path, file_name: &str, options: &JoinOptions) -> Result<JoinReport> {
    if !folder.is_dir() {
        return Err(CliError::InvalidInput(format!(
            "Output folder not found: {}",
            folder.display()
        )));
    }

    let mut files: Vec<(ItemId, PathBuf)> = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(stem) = name.strip_suffix(EXTRACTED_SUFFIX) {
            if !stem.is_empty() && path.is_file() {
                files.push((ItemId::new(stem), path));
            }
        }
    }
    if files.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "No extracted files found in {}",
            folder.display()
        )));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str(&format!(
        "{sep}\nJOINED EXTRACTED TEXTS - ALL QUESTIONS\n{sep}\nTotal files: {}\nSource folder: {}\n{sep}\n\n",
        files.len(),
        folder.display(),
        sep = SEPARATOR
    ));

    let mut joined = Vec::new();
    let mut skipped = Vec::new();
    for (position, (id, path)) in files.into_iter().enumerate() {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(item = %id, error = %e, "skipping unreadable file");
                skipped.push((id, e.to_string()));
                continue;
            }
        };

        if options.separator {
            out.push_str(&format!(
                "\n{sep}\nQUESTION {}\n{sep}\n\n",
                question_number(&id, position + 1),
                sep = SEPARATOR
            ));
        }
        let text = if options.include_metadata {
            content.trim()
        } else {
            strip_metadata(&content)
        };
        out.push_str(text);
        out.push_str("\n\n");
        joined.push(id);
    }

    out.push_str(&format!("\n{sep}\nEND OF JOINED FILE\n{sep}\n", sep = SEPARATOR));

    let path = folder.join(file_name);
    fs::write(&path, out)?;
    tracing::info!(path = %path.display(), files = joined.len(), "joined extracted texts");

    Ok(JoinReport {
        path,
        joined,
        skipped,
    })
}
