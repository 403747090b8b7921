//! Folder enumeration.

use crate::error::{CliError, Result};
use gleaner_domain::traits::SourceEnumerator;
use gleaner_domain::{ItemId, SourceRef};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists the images of one folder as work items.
///
/// The item id is the file stem, so `q12.jpeg` becomes `q12`.
#[derive(Debug, Clone)]
pub struct FolderEnumerator {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FolderEnumerator {
    /// Create an enumerator over `root` for the given extensions.
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Folder being enumerated.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl SourceEnumerator for FolderEnumerator {
    type Error = CliError;

    fn enumerate(&self) -> Result<Vec<(ItemId, SourceRef)>> {
        if !self.root.is_dir() {
            return Err(CliError::InvalidInput(format!(
                "Input folder not found: {}",
                self.root.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && self.matches(&path) {
                paths.push(path);
            }
        }
        // read_dir order is arbitrary; the first path in sorted order wins a stem
        paths.sort();

        let mut found: BTreeMap<ItemId, SourceRef> = BTreeMap::new();
        for path in paths {
            let Some(id) = ItemId::from_path(&path) else {
                continue;
            };
            if let Some(existing) = found.get(&id) {
                tracing::warn!(
                    item = %id,
                    kept = %existing,
                    skipped = %path.display(),
                    "two images share a name"
                );
                continue;
            }
            found.insert(id, SourceRef::new(path));
        }

        tracing::debug!(root = %self.root.display(), items = found.len(), "folder enumerated");
        Ok(found.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_enumerates_in_natural_order() {
        let dir = TempDir::new().unwrap();
        for name in ["q10.jpeg", "q2.jpeg", "q1.PNG", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("q3.jpeg")).unwrap();

        let items = FolderEnumerator::new(dir.path(), &exts(&["jpeg", ".png"]))
            .enumerate()
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q10"]);
        assert_eq!(items[0].1.file_name(), "q1.PNG");
    }

    #[test]
    fn test_duplicate_stems_keep_first_in_path_order() {
        let dir = TempDir::new().unwrap();
        for i in 1..=20 {
            fs::write(dir.path().join(format!("q{}.png", i)), b"x").unwrap();
            fs::write(dir.path().join(format!("q{}.jpeg", i)), b"x").unwrap();
        }

        let items = FolderEnumerator::new(dir.path(), &exts(&["jpeg", "png"]))
            .enumerate()
            .unwrap();
        assert_eq!(items.len(), 20);
        for (id, source) in &items {
            assert_eq!(source.file_name(), format!("{}.jpeg", id));
        }
    }

    #[test]
    fn test_missing_folder() {
        let result = FolderEnumerator::new("/definitely/not/here", &exts(&["png"])).enumerate();
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
    }
}
