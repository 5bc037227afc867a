use crate::config::Config;
use crate::scrubber::{FileOutcome, ScrubResult};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const DEFAULT_AUDIT_FILENAME: &str = "operations.jsonl";

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    RunStarted {
        run_id: String,
        command: String,
        root: String,
        ts: String,
    },
    FileAction {
        run_id: String,
        command: String,
        path: String,
        result: String,
        removed_columns: Vec<String>,
        rows: usize,
        reason: Option<String>,
        ts: String,
    },
    RunFinished {
        run_id: String,
        command: String,
        ts: String,
        scrubbed: usize,
        unchanged: usize,
        failed: usize,
        columns_removed: usize,
    },
}

impl AuditRecord {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::FileAction { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// Start and totals of one run, folded from its records
#[derive(Debug, Clone, Serialize)]
pub struct AuditRunSummary {
    pub run_id: String,
    pub command: String,
    pub root: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub scrubbed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub columns_removed: usize,
}

impl AuditRunSummary {
    fn new(run_id: &str, command: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            command: command.to_string(),
            root: None,
            started_at: None,
            finished_at: None,
            scrubbed: 0,
            unchanged: 0,
            failed: 0,
            columns_removed: 0,
        }
    }

    fn absorb(&mut self, record: AuditRecord) {
        match record {
            AuditRecord::RunStarted { root, ts, .. } => {
                self.root = Some(root);
                self.started_at = Some(ts);
            }
            AuditRecord::RunFinished {
                ts,
                scrubbed,
                unchanged,
                failed,
                columns_removed,
                ..
            } => {
                self.finished_at = Some(ts);
                self.scrubbed = scrubbed;
                self.unchanged = unchanged;
                self.failed = failed;
                self.columns_removed = columns_removed;
            }
            AuditRecord::FileAction { .. } => {}
        }
    }
}

/// Append-only JSONL log of scrub runs
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
    enabled: bool,
}

impl AuditLogger {
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.audit.path.clone().unwrap_or_else(default_audit_path),
            enabled: config.audit.enabled,
        }
    }

    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the start of a run and return its id
    pub fn start_run(&self, command: &str, root: &Path) -> Result<String> {
        let run_id = generate_run_id();
        self.append(&AuditRecord::RunStarted {
            run_id: run_id.clone(),
            command: command.to_string(),
            root: root.display().to_string(),
            ts: Utc::now().to_rfc3339(),
        })?;
        Ok(run_id)
    }

    pub fn log_file(&self, run_id: &str, command: &str, outcome: &FileOutcome) -> Result<()> {
        self.append(&AuditRecord::FileAction {
            run_id: run_id.to_string(),
            command: command.to_string(),
            path: outcome.path.display().to_string(),
            result: outcome.status.as_str().to_string(),
            removed_columns: outcome.removed_columns.clone(),
            rows: outcome.rows,
            reason: outcome.error.clone(),
            ts: Utc::now().to_rfc3339(),
        })
    }

    pub fn finish_run(&self, run_id: &str, command: &str, result: &ScrubResult) -> Result<()> {
        self.append(&AuditRecord::RunFinished {
            run_id: run_id.to_string(),
            command: command.to_string(),
            ts: Utc::now().to_rfc3339(),
            scrubbed: result.scrubbed_count,
            unchanged: result.unchanged_count,
            failed: result.failed_count,
            columns_removed: result.columns_removed,
        })
    }

    fn append(&self, record: &AuditRecord) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create audit directory: {}", parent.display())
            })?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("Failed to append to audit log: {}", self.path.display()))
    }

    /// Every parseable record in file order; a missing log reads as empty
    pub fn read_records(&self) -> Result<Vec<AuditRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read audit log: {}", self.path.display())
                })
            }
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .with_context(|| format!("Failed to read audit log: {}", self.path.display()))?;
            // Torn or foreign lines are skipped
            if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn records_for_run(&self, run_id: &str) -> Result<Vec<AuditRecord>> {
        let mut records = self.read_records()?;
        records.retain(|r| r.run_id() == run_id);
        Ok(records)
    }

    /// Summaries of all logged runs, newest first
    pub fn list_runs(&self) -> Result<Vec<AuditRunSummary>> {
        let mut runs: HashMap<String, AuditRunSummary> = HashMap::new();
        for record in self.read_records()? {
            let command = match &record {
                AuditRecord::RunStarted { command, .. }
                | AuditRecord::FileAction { command, .. }
                | AuditRecord::RunFinished { command, .. } => command.as_str(),
            };
            runs.entry(record.run_id().to_string())
                .or_insert_with(|| AuditRunSummary::new(record.run_id(), command))
                .absorb(record);
        }

        let mut runs: Vec<_> = runs.into_values().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

pub fn default_audit_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dataset-scrubber")
        .join(DEFAULT_AUDIT_FILENAME)
}

fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!(
        "{}-{:09}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        nanos,
        std::process::id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrubber::FileStatus;
    use tempfile::TempDir;

    fn outcome(status: FileStatus, error: Option<&str>) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from("/data/a.csv.zip"),
            status,
            removed_columns: vec![String::from("Unnamed: 0")],
            kept_columns: 2,
            rows: 10,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn audit_roundtrip_records() {
        let temp = TempDir::new().unwrap();
        let logger = AuditLogger::new(temp.path().join("operations.jsonl"), true);
        let run = logger.start_run("scrub", Path::new("/data")).unwrap();
        logger
            .log_file(&run, "scrub", &outcome(FileStatus::Scrubbed, None))
            .unwrap();
        logger
            .log_file(&run, "scrub", &outcome(FileStatus::Failed, Some("bad zip")))
            .unwrap();

        let result = ScrubResult {
            scrubbed_count: 1,
            failed_count: 1,
            columns_removed: 1,
            ..Default::default()
        };
        logger.finish_run(&run, "scrub", &result).unwrap();

        let runs = logger.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run);
        assert_eq!(runs[0].root.as_deref(), Some("/data"));
        assert_eq!(runs[0].scrubbed, 1);
        assert_eq!(runs[0].failed, 1);
        assert!(runs[0].finished_at.is_some());

        let records = logger.records_for_run(&run).unwrap();
        assert_eq!(records.len(), 4);
        match &records[2] {
            AuditRecord::FileAction { result, reason, .. } => {
                assert_eq!(result, "failed");
                assert_eq!(reason.as_deref(), Some("bad zip"));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("operations.jsonl");
        let logger = AuditLogger::new(path.clone(), false);
        logger.start_run("scrub", Path::new("/data")).unwrap();
        assert!(!path.exists());
        assert!(logger.list_runs().unwrap().is_empty());
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("operations.jsonl");
        fs::write(&path, "{\"type\":\"run_sta\n\n").unwrap();

        let logger = AuditLogger::new(path, true);
        let run = logger.start_run("scrub", Path::new("/data")).unwrap();

        let runs = logger.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run);
        assert!(runs[0].finished_at.is_none());
    }
}
