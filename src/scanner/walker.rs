use super::DatasetFile;
use crate::archive::DATASET_SUFFIX;
use anyhow::{bail, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns true for file names ending in `.csv.zip` (case-sensitive)
pub fn is_dataset_file_name(name: &str) -> bool {
    name.ends_with(DATASET_SUFFIX)
}

/// Scanner for finding zipped CSV datasets under a root directory
pub struct Scanner {
    /// Root path to scan
    root: PathBuf,

    /// Maximum depth to scan (None = unlimited)
    max_depth: Option<usize>,

    /// Directories to always exclude from scanning (by basename)
    exclude_dirs: HashSet<String>,
}

impl Scanner {
    /// Create a new scanner for the given root path
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_depth: None,
            exclude_dirs: HashSet::new(),
        }
    }

    /// Set directories to exclude from scanning (by basename)
    pub fn exclude_dirs(mut self, dirs: &[String]) -> Self {
        self.exclude_dirs = dirs.iter().cloned().collect();
        self
    }

    /// Set maximum scan depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Walk the tree and return every dataset file, in traversal order.
    ///
    /// Entries within a directory are visited sorted by file name. Symlinked
    /// files are returned, symlinked directories are not descended. Unreadable
    /// subdirectories are skipped; a missing root is an error.
    pub fn scan(&self) -> Result<Vec<DatasetFile>> {
        if !self.root.is_dir() {
            bail!("Dataset directory not found: {}", self.root.display());
        }

        let mut walker = WalkBuilder::new(&self.root);
        let exclude_dirs = self.exclude_dirs.clone();
        walker
            .standard_filters(false) // Datasets may live in hidden or gitignored dirs
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && exclude_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
            });

        if let Some(depth) = self.max_depth {
            walker.max_depth(Some(depth));
        }

        let mut datasets = Vec::new();
        for entry in walker.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };

            if entry.file_type().map_or(true, |ft| ft.is_dir()) {
                continue;
            }

            if !is_dataset_file_name(&entry.file_name().to_string_lossy()) {
                continue;
            }

            // Symlinks count when they point at a regular file
            let metadata = match fs::metadata(entry.path()) {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            datasets.push(DatasetFile {
                path: entry.into_path(),
                size: metadata.len(),
            });
        }

        Ok(datasets)
    }
}
