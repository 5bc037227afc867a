use crate::archive::{read_zipped_table, save_zipped_table, WriteOptions, ZippedTable};
use crate::scanner::DatasetFile;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Options for scrubbing operations
#[derive(Debug, Clone)]
pub struct ScrubOptions {
    /// Dry run mode - report, don't rewrite
    pub dry_run: bool,

    /// Show verbose output
    pub verbose: bool,

    /// Replace files through a temporary file and rename
    pub atomic_write: bool,

    /// Write the blank-headed row index column
    pub write_index: bool,

    /// Stop the batch at the first failing file
    pub fail_fast: bool,

    /// Draw the `<i>/<n>: <path>` progress line
    pub show_progress: bool,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            atomic_write: true,
            write_index: false,
            fail_fast: false,
            show_progress: true,
        }
    }
}

/// What happened to one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Rewritten without its unnamed columns
    Scrubbed,
    /// Nothing to remove, left untouched
    Unchanged,
    /// Would have been rewritten
    DryRun,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrubbed => "scrubbed",
            Self::Unchanged => "unchanged",
            Self::DryRun => "dry_run",
            Self::Failed => "failed",
        }
    }
}

/// Result of processing a single dataset
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,

    /// Names of the columns removed (or that would be removed)
    pub removed_columns: Vec<String>,

    /// Columns left in the table
    pub kept_columns: usize,

    pub rows: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    fn failed(path: &Path, error: &anyhow::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            status: FileStatus::Failed,
            removed_columns: Vec::new(),
            kept_columns: 0,
            rows: 0,
            error: Some(format!("{:#}", error)),
        }
    }
}

/// Result of a scrub run
#[derive(Debug, Default, Serialize)]
pub struct ScrubResult {
    /// Datasets rewritten (or that would be, in dry-run mode)
    pub scrubbed_count: usize,

    /// Datasets with nothing to remove
    pub unchanged_count: usize,

    /// Datasets that could not be processed
    pub failed_count: usize,

    /// Total number of columns removed across all datasets
    pub columns_removed: usize,

    /// Datasets never reached because of `fail_fast`
    pub not_processed: usize,

    /// Per-file outcomes in processing order
    pub outcomes: Vec<FileOutcome>,

    /// Error messages
    pub errors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl ScrubResult {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome.status {
            FileStatus::Scrubbed | FileStatus::DryRun => self.scrubbed_count += 1,
            FileStatus::Unchanged => self.unchanged_count += 1,
            FileStatus::Failed => self.failed_count += 1,
        }
        self.columns_removed += outcome.removed_columns.len();
        if let Some(error) = &outcome.error {
            self.errors
                .push(format!("Failed to scrub {}: {}", outcome.path.display(), error));
        }
        self.outcomes.push(outcome);
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes.len()
    }
}

/// Strips unnamed index columns from zipped CSV datasets
pub struct Scrubber {
    options: ScrubOptions,
}

impl Default for Scrubber {
    fn default() -> Self {
        Self::new()
    }
}

impl Scrubber {
    /// Create a new scrubber with default options
    pub fn new() -> Self {
        Self {
            options: ScrubOptions::default(),
        }
    }

    /// Create a scrubber with custom options
    pub fn with_options(options: ScrubOptions) -> Self {
        Self { options }
    }

    /// Set dry run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    /// Set fail-fast mode
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.options.fail_fast = fail_fast;
        self
    }

    /// Set whether the index column is written
    pub fn write_index(mut self, write_index: bool) -> Self {
        self.options.write_index = write_index;
        self
    }

    /// Set progress line drawing
    pub fn show_progress(mut self, show: bool) -> Self {
        self.options.show_progress = show;
        self
    }

    /// Scrub datasets in order
    pub fn scrub_multiple(&self, datasets: &[DatasetFile]) -> Result<ScrubResult> {
        self.scrub_multiple_with(datasets, |_| {})
    }

    /// Scrub datasets in order, calling `on_outcome` after each file.
    ///
    /// A failing file is recorded and the batch moves on, unless `fail_fast`
    /// is set, in which case the remaining files are left untouched.
    pub fn scrub_multiple_with<F>(
        &self,
        datasets: &[DatasetFile],
        mut on_outcome: F,
    ) -> Result<ScrubResult>
    where
        F: FnMut(&FileOutcome),
    {
        let mut result = ScrubResult::default();
        if datasets.is_empty() {
            return Ok(result);
        }

        let total = datasets.len();
        let pb = if self.options.show_progress {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stdout())
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(ProgressStyle::with_template("{pos}/{len}: {msg}")?);
        // indicatif draws nothing when stdout is not a terminal
        let plain_progress = self.options.show_progress && pb.is_hidden();

        for (idx, dataset) in datasets.iter().enumerate() {
            let outcome = match self.scrub_single(&dataset.path) {
                Ok(outcome) => outcome,
                Err(e) => FileOutcome::failed(&dataset.path, &e),
            };

            if self.options.verbose {
                let line = describe_outcome(&outcome, self.options.dry_run);
                if !pb.is_hidden() {
                    pb.println(line);
                } else if plain_progress && idx > 0 {
                    println!("\n{}", line);
                } else {
                    println!("{}", line);
                }
            }

            pb.set_message(dataset.path.display().to_string());
            pb.inc(1);
            if plain_progress {
                print!("\r{}", progress_line(idx + 1, total, &dataset.path));
                let _ = io::stdout().flush();
            }

            on_outcome(&outcome);
            let failed = outcome.status == FileStatus::Failed;
            result.record(outcome);

            if failed && self.options.fail_fast {
                result.not_processed = total - idx - 1;
                pb.abandon();
                break;
            }
        }

        if plain_progress {
            println!();
        }
        if result.not_processed == 0 {
            pb.finish();
        }
        Ok(result)
    }

    /// Load one dataset, drop its unnamed columns and write it back when needed
    pub fn scrub_single(&self, path: &Path) -> Result<FileOutcome> {
        let ZippedTable {
            entry_name,
            mut table,
        } = read_zipped_table(path)?;

        let removed_columns = table.drop_unnamed_columns();

        let status = if removed_columns.is_empty() && !self.options.write_index {
            FileStatus::Unchanged
        } else if self.options.dry_run {
            FileStatus::DryRun
        } else {
            let write_options = WriteOptions {
                atomic: self.options.atomic_write,
                with_index: self.options.write_index,
            };
            save_zipped_table(path, &entry_name, &table, write_options)?;
            FileStatus::Scrubbed
        };

        Ok(FileOutcome {
            path: path.to_path_buf(),
            status,
            removed_columns,
            kept_columns: table.column_count(),
            rows: table.row_count(),
            error: None,
        })
    }
}

/// Progress text for the `current`-th of `total` datasets
pub fn progress_line(current: usize, total: usize, path: &Path) -> String {
    format!("{}/{}: {}", current, total, path.display())
}

/// One-line human description of an outcome
pub fn describe_outcome(outcome: &FileOutcome, dry_run: bool) -> String {
    let path = outcome.path.display();
    match outcome.status {
        FileStatus::Scrubbed => format!(
            "✓ Scrubbed {} (removed {} column(s), {} rows kept)",
            path,
            outcome.removed_columns.len(),
            outcome.rows
        ),
        FileStatus::DryRun => format!(
            "[DRY RUN] Would remove {} from {}",
            crate::utils::format_columns(&outcome.removed_columns),
            path
        ),
        FileStatus::Unchanged if dry_run => format!("[DRY RUN] Nothing to remove in {}", path),
        FileStatus::Unchanged => format!("- Unchanged {}", path),
        FileStatus::Failed => format!(
            "✗ Failed {}: {}",
            path,
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
