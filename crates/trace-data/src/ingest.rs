//! Line-to-point extraction and record appends.

use serde::Serialize;
use trace_core::error::DimensionError;
use trace_core::models::{TimeSeriesRecord, Timestamp};
use trace_core::schema::SchemaDescriptor;

/// Why a body line was dropped without touching any record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The schema has an inline id pattern and the line does not match it.
    Unroutable,
    /// The inline id names no registered sensor.
    UnknownSensor,
    MissingTimestamp,
    InvalidTimestamp,
    MissingData,
    /// A data token is not a finite number.
    InvalidNumber,
    /// Token count disagrees with the record (skip-line policy).
    DimensionMismatch,
    /// The owning record was aborted earlier in the file.
    RecordAborted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unroutable => "unroutable",
            SkipReason::UnknownSensor => "unknown_sensor",
            SkipReason::MissingTimestamp => "missing_timestamp",
            SkipReason::InvalidTimestamp => "invalid_timestamp",
            SkipReason::MissingData => "missing_data",
            SkipReason::InvalidNumber => "invalid_number",
            SkipReason::DimensionMismatch => "dimension_mismatch",
            SkipReason::RecordAborted => "record_aborted",
        }
    }
}

/// Values extracted from one body line, not yet committed to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub timestamp: Timestamp,
    pub values: Vec<f64>,
    pub latency: Option<f64>,
}

/// Outcome of a failed [`PointIngestor::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Skip(SkipReason),
    Dimension(DimensionError),
}

impl From<SkipReason> for Rejection {
    fn from(reason: SkipReason) -> Self {
        Rejection::Skip(reason)
    }
}

/// Applies the timestamp, data and latency patterns of a schema.
pub struct PointIngestor<'s> {
    schema: &'s SchemaDescriptor,
}

impl<'s> PointIngestor<'s> {
    pub fn new(schema: &'s SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Extract a [`Point`] from `line` without mutating anything.
    ///
    /// An unparsable latency is dropped rather than rejecting the line.
    pub fn extract(&self, line: &str) -> Result<Point, SkipReason> {
        let timestamp = self
            .schema
            .timestamp()
            .extract(line)
            .ok_or(SkipReason::MissingTimestamp)?;
        let timestamp = Timestamp::parse(timestamp).ok_or(SkipReason::InvalidTimestamp)?;

        let data = self
            .schema
            .data()
            .extract(line)
            .ok_or(SkipReason::MissingData)?;
        let values = data
            .split_whitespace()
            .map(|token| match token.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(SkipReason::InvalidNumber),
            })
            .collect::<Result<Vec<f64>, SkipReason>>()?;

        let latency = self
            .schema
            .latency()
            .and_then(|pattern| pattern.extract(line))
            .and_then(|text| text.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());

        Ok(Point {
            timestamp,
            values,
            latency,
        })
    }

    /// Extract a point from `line` and append it to `record`.
    ///
    /// The record is unchanged unless `Ok` is returned.
    pub fn ingest(&self, record: &mut TimeSeriesRecord, line: &str) -> Result<(), Rejection> {
        let point = self.extract(line)?;
        record
            .add_point(point.timestamp, &point.values, point.latency)
            .map_err(Rejection::Dimension)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
