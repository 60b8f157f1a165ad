//! Per-file parse pipeline: header phase, then routed body ingestion.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use trace_core::error::{DimensionError, Result, TraceError};
use trace_core::models::{DimensionPolicy, TimeSeriesRecord};
use trace_core::schema::SchemaDescriptor;
use tracing::{debug, warn};

use crate::ingest::{PointIngestor, Rejection, SkipReason};
use crate::reader::{open_lines, LineReader};
use crate::registry::{Demultiplexer, HeaderScanner, Route, SensorRegistry};

// ── Options & results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub dimension_policy: DimensionPolicy,
}

/// A record dropped under [`DimensionPolicy::AbortRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbortedRecord {
    pub sensor_id: String,
    pub sensor_name: String,
    /// 1-based line number of the offending line.
    pub line: usize,
    pub error: String,
}

/// Diagnostics for a single parsed stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStats {
    pub lines_read: usize,
    pub header_lines: usize,
    /// Empty or whitespace-only body lines; not counted as skips.
    pub blank_lines: usize,
    pub implicit_sensor: bool,
    pub points_ingested: usize,
    pub lines_skipped: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub aborted: Vec<AbortedRecord>,
}

impl ParseStats {
    fn skip(&mut self, reason: SkipReason) {
        self.lines_skipped += 1;
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }
}

/// Output of one parse: finished records in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedLog {
    pub dialect: String,
    pub records: Vec<TimeSeriesRecord>,
    pub stats: ParseStats,
}

impl ParsedLog {
    pub fn point_count(&self) -> usize {
        self.records.iter().map(TimeSeriesRecord::point_count).sum()
    }
}

// ── LogParser ─────────────────────────────────────────────────────────────────

/// Schema-driven demultiplexing parser.
///
/// Cheap to clone; the compiled schema is shared.
#[derive(Debug, Clone)]
pub struct LogParser {
    schema: Arc<SchemaDescriptor>,
    options: ParseOptions,
}

impl LogParser {
    pub fn new(schema: SchemaDescriptor, options: ParseOptions) -> Self {
        Self::with_shared(Arc::new(schema), options)
    }

    pub fn with_shared(schema: Arc<SchemaDescriptor>, options: ParseOptions) -> Self {
        Self { schema, options }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    /// Parse a file line by line.
    ///
    /// # Errors
    /// [`TraceError::FileRead`] if the file cannot be opened or a read fails
    /// part way; [`TraceError::AmbiguousRouting`] as in [`Self::parse_reader`].
    pub fn parse_file(&self, path: &Path) -> Result<ParsedLog> {
        let lines = open_lines(path)?;
        let parsed = self.parse_file_lines(path, lines)?;
        debug!(
            "Parsed {}: {} records, {} points, {} lines skipped",
            path.display(),
            parsed.records.len(),
            parsed.stats.points_ingested,
            parsed.stats.lines_skipped
        );
        Ok(parsed)
    }

    /// Parse lines read from `path`, attributing mid-stream read errors to it.
    fn parse_file_lines<I>(&self, path: &Path, lines: I) -> Result<ParsedLog>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        self.parse_lines(lines).map_err(|e| match e {
            TraceError::Io(source) => TraceError::FileRead {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ParsedLog> {
        self.parse_lines(LineReader::new(reader))
    }

    pub fn parse_str(&self, text: &str) -> Result<ParsedLog> {
        self.parse_reader(text.as_bytes())
    }

    fn parse_lines<I>(&self, lines: I) -> Result<ParsedLog>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let schema = self.schema.as_ref();
        let mut lines = lines.peekable();

        let scan = HeaderScanner::new(schema).scan(&mut lines)?;
        let mut registry = scan.registry;
        let mut stats = ParseStats {
            lines_read: scan.header_lines,
            header_lines: scan.header_lines,
            implicit_sensor: scan.implicit,
            ..ParseStats::default()
        };

        let demux = Demultiplexer::new(schema, &registry)?;
        let ingestor = PointIngestor::new(schema);

        for line in lines {
            let line = line?;
            stats.lines_read += 1;

            if line.trim().is_empty() {
                stats.blank_lines += 1;
                continue;
            }

            let slot = match demux.route(&line, &registry) {
                Route::Record(slot) => slot,
                Route::Unroutable => {
                    stats.skip(SkipReason::Unroutable);
                    continue;
                }
                Route::UnknownSensor => {
                    stats.skip(SkipReason::UnknownSensor);
                    continue;
                }
            };

            if registry.is_aborted(slot) {
                stats.skip(SkipReason::RecordAborted);
                continue;
            }

            let Some(record) = registry.get_mut(slot) else {
                stats.skip(SkipReason::UnknownSensor);
                continue;
            };

            match ingestor.ingest(record, &line) {
                Ok(()) => stats.points_ingested += 1,
                Err(Rejection::Skip(reason)) => stats.skip(reason),
                Err(Rejection::Dimension(error)) => {
                    let line_no = stats.lines_read;
                    self.reject_dimension(&mut registry, slot, line_no, error, &mut stats);
                }
            }
        }

        let records = registry.into_records();
        Ok(ParsedLog {
            dialect: schema.dialect().to_string(),
            records,
            stats,
        })
    }

    fn reject_dimension(
        &self,
        registry: &mut SensorRegistry,
        slot: usize,
        line: usize,
        error: DimensionError,
        stats: &mut ParseStats,
    ) {
        let (sensor_id, sensor_name) = registry
            .get(slot)
            .map(|r| (r.sensor_id().to_string(), r.sensor_name().to_string()))
            .unwrap_or_default();

        match self.options.dimension_policy {
            DimensionPolicy::SkipLine => {
                warn!("Line {} for sensor {}: {}", line, sensor_id, error);
                stats.skip(SkipReason::DimensionMismatch);
            }
            DimensionPolicy::AbortRecord => {
                warn!(
                    "Aborting sensor {} (\"{}\") at line {}: {}",
                    sensor_id, sensor_name, line, error
                );
                registry.abort(slot);
                stats.lines_skipped += 1;
                stats.aborted.push(AbortedRecord {
                    sensor_id,
                    sensor_name,
                    line,
                    error: error.to_string(),
                });
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
