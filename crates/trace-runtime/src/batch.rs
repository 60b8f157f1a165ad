//! Multi-file parse batches.
//!
//! Each file is parsed on tokio's blocking pool; a [`Semaphore`] caps how
//! many run at once. Files share no state, so a failure in one never affects
//! the others.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use trace_core::error::Result;
use trace_data::parser::{LogParser, ParsedLog};
use tracing::{debug, info, warn};

/// Default number of files parsed at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

// ── Public types ──────────────────────────────────────────────────────────────

/// Result for one input file, in the order the files were given.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    fn parsed(path: PathBuf, parsed: ParsedLog) -> Self {
        Self {
            path,
            parsed: Some(parsed),
            error: None,
        }
    }

    fn failed(path: PathBuf, error: String) -> Self {
        Self {
            path,
            parsed: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.parsed.is_some()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// RFC 3339 timestamp of when the batch finished.
    pub generated_at: String,
    pub files_parsed: usize,
    pub files_failed: usize,
    /// Records across all successfully parsed files.
    pub records: usize,
    pub points: usize,
    pub lines_skipped: usize,
    /// Wall-clock seconds for the whole batch.
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub metadata: BatchMetadata,
    pub files: Vec<FileOutcome>,
}

// ── BatchOrchestrator ─────────────────────────────────────────────────────────

/// Runs one [`LogParser`] over many files concurrently.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use trace_core::schema::{SchemaDescriptor, SchemaPreset};
/// use trace_data::parser::{LogParser, ParseOptions};
/// use trace_runtime::batch::BatchOrchestrator;
///
/// # async fn run() {
/// let schema = SchemaDescriptor::preset(SchemaPreset::Google).unwrap();
/// let parser = LogParser::new(schema, ParseOptions::default());
/// let report = BatchOrchestrator::new(parser, 4)
///     .run(&[PathBuf::from("imu.log")])
///     .await;
/// println!("{} files parsed", report.metadata.files_parsed);
/// # }
/// ```
pub struct BatchOrchestrator {
    parser: LogParser,
    max_concurrency: usize,
}

impl BatchOrchestrator {
    /// Create an orchestrator. A `max_concurrency` of zero is treated as one.
    pub fn new(parser: LogParser, max_concurrency: usize) -> Self {
        Self {
            parser,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Parse every path and collect the outcomes in input order.
    pub async fn run(&self, paths: &[PathBuf]) -> BatchReport {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut tasks: Vec<(PathBuf, Option<JoinHandle<Result<ParsedLog>>>)> =
            Vec::with_capacity(paths.len());
        for path in paths {
            let task = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => {
                    let parser = self.parser.clone();
                    let file = path.clone();
                    Some(tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        parser.parse_file(&file)
                    }))
                }
                Err(e) => {
                    warn!("Could not schedule {}: {}", path.display(), e);
                    None
                }
            };
            tasks.push((path.clone(), task));
        }

        let mut files = Vec::with_capacity(tasks.len());
        for (path, task) in tasks {
            let outcome = match task {
                Some(handle) => match handle.await {
                    Ok(Ok(parsed)) => FileOutcome::parsed(path, parsed),
                    Ok(Err(e)) => {
                        warn!("Failed to parse {}: {}", path.display(), e);
                        FileOutcome::failed(path, e.to_string())
                    }
                    Err(e) => {
                        warn!("Parse task for {} did not complete: {}", path.display(), e);
                        FileOutcome::failed(path, format!("parse task failed: {e}"))
                    }
                },
                None => FileOutcome::failed(path, "parse task was not scheduled".to_string()),
            };
            files.push(outcome);
        }

        let metadata = summarize(&files, start.elapsed().as_secs_f64());
        info!(
            "Batch done: {} parsed, {} failed, {} points in {:.3}s",
            metadata.files_parsed, metadata.files_failed, metadata.points, metadata.elapsed_seconds
        );
        BatchReport { metadata, files }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn summarize(files: &[FileOutcome], elapsed_seconds: f64) -> BatchMetadata {
    let mut metadata = BatchMetadata {
        generated_at: Utc::now().to_rfc3339(),
        files_parsed: 0,
        files_failed: 0,
        records: 0,
        points: 0,
        lines_skipped: 0,
        elapsed_seconds,
    };

    for file in files {
        match &file.parsed {
            Some(parsed) => {
                metadata.files_parsed += 1;
                metadata.records += parsed.records.len();
                metadata.points += parsed.point_count();
                metadata.lines_skipped += parsed.stats.lines_skipped;
            }
            None => metadata.files_failed += 1,
        }
    }

    debug!(
        "{} records, {} lines skipped across {} files",
        metadata.records,
        metadata.lines_skipped,
        files.len()
    );
    metadata
}

// ── Tests ─────────────────────────────────────────────────────────────────────
