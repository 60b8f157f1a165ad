use serde::Serialize;

use crate::error::DimensionError;

/// Display name given to the implicit record created when a file has no header.
pub const UNKNOWN_SENSOR_NAME: &str = "unknown_sensor";

/// Sentinel id of the implicit record created when a file has no header.
pub const UNKNOWN_SENSOR_ID: &str = "0";

// ── DimensionPolicy ───────────────────────────────────────────────────────────

/// What happens to a record when a line disagrees with its fixed dimensionality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionPolicy {
    /// Reject only the offending line and keep ingesting into the record.
    #[default]
    SkipLine,
    /// Drop the whole record from the output; later lines for it are skipped.
    AbortRecord,
}

impl DimensionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionPolicy::SkipLine => "skip",
            DimensionPolicy::AbortRecord => "abort",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "skip" => Some(DimensionPolicy::SkipLine),
            "abort" => Some(DimensionPolicy::AbortRecord),
            _ => None,
        }
    }
}

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// A timestamp as it appeared in the log.
///
/// Integral text is kept as `Int` so large counters (epoch nanoseconds) stay
/// exact; anything else is `Float`. Serializes as a plain JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    Int(i64),
    Float(f64),
}

impl Timestamp {
    /// Parse integer text exactly, falling back to a float.
    /// Returns `None` for unparsable or non-finite text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(value) = text.parse::<i64>() {
            return Some(Timestamp::Int(value));
        }
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Timestamp::Float)
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Timestamp::Int(v) => v as f64,
            Timestamp::Float(v) => v,
        }
    }

    /// The zero of this timestamp's domain.
    pub fn zero_like(&self) -> Self {
        match self {
            Timestamp::Int(_) => Timestamp::Int(0),
            Timestamp::Float(_) => Timestamp::Float(0.0),
        }
    }

    /// `self - previous`, exact when both are integers and the difference
    /// fits in an `i64`.
    pub fn delta_since(&self, previous: &Timestamp) -> Timestamp {
        match (*self, *previous) {
            (Timestamp::Int(a), Timestamp::Int(b)) => a
                .checked_sub(b)
                .map(Timestamp::Int)
                .unwrap_or_else(|| Timestamp::Float(a as f64 - b as f64)),
            (a, b) => Timestamp::Float(a.as_f64() - b.as_f64()),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp::Int(value)
    }
}

impl From<f64> for Timestamp {
    fn from(value: f64) -> Self {
        Timestamp::Float(value)
    }
}

impl PartialEq<f64> for Timestamp {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == *other
    }
}

// ── TimeSeriesRecord ──────────────────────────────────────────────────────────

/// One sensor's demultiplexed, dimension-fixed sequence of timestamped points.
///
/// Channels are stored column-wise: `channels()[d][i]` is the value of
/// dimension `d` at point `i`. Channel 0 is conventionally the primary axis.
///
/// The channel table is allocated once, when the dimensionality is first
/// fixed, and is never resized afterwards. Every append goes through
/// [`TimeSeriesRecord::add_point`], which keeps all columns and the timestamp
/// sequence the same length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesRecord {
    /// Human-readable sensor name taken from the header.
    sensor_name: String,
    /// Stable key of the sensor, kept in its exact textual form.
    sensor_id: String,
    /// Timestamps in the order they were received. Not required to be monotonic.
    timestamps: Vec<Timestamp>,
    /// `timestamp_deltas[i] = timestamps[i] - timestamps[i - 1]`, with `0` at index 0.
    timestamp_deltas: Vec<Timestamp>,
    /// One column per data dimension; empty until the dimensionality is fixed.
    channels: Box<[Vec<f64>]>,
    /// Latencies for the points that supplied one. Never padded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    latencies: Vec<f64>,
    /// Number of data channels, `None` until the first point is ingested.
    dimensions: Option<usize>,
    /// Number of points appended so far.
    point_count: usize,
}

impl TimeSeriesRecord {
    /// Create an empty record with unset dimensionality.
    pub fn new(sensor_name: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            sensor_id: sensor_id.into(),
            timestamps: Vec::new(),
            timestamp_deltas: Vec::new(),
            channels: Box::default(),
            latencies: Vec::new(),
            dimensions: None,
            point_count: 0,
        }
    }

    /// The implicit record used when a stream declares no sensors.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_SENSOR_NAME, UNKNOWN_SENSOR_ID)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn timestamp_deltas(&self) -> &[Timestamp] {
        &self.timestamp_deltas
    }

    /// All channel columns, indexed by dimension.
    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    /// A single channel column, or `None` when `dimension` is out of range.
    pub fn channel(&self, dimension: usize) -> Option<&[f64]> {
        self.channels.get(dimension).map(Vec::as_slice)
    }

    /// Latencies, present only when at least one point supplied one.
    pub fn latencies(&self) -> Option<&[f64]> {
        if self.latencies.is_empty() {
            None
        } else {
            Some(&self.latencies)
        }
    }

    /// Number of data channels, or `None` before the first ingest.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Fix the dimensionality and allocate one empty column per channel.
    ///
    /// Setting the same value again is a no-op; any other value after the
    /// first call is rejected with [`DimensionError::Resize`].
    ///
    /// # Errors
    /// [`DimensionError::Invalid`] when `dimensions < 1`.
    pub fn set_dimensions(&mut self, dimensions: i64) -> Result<(), DimensionError> {
        if dimensions < 1 {
            return Err(DimensionError::Invalid(dimensions));
        }
        let requested =
            usize::try_from(dimensions).map_err(|_| DimensionError::Invalid(dimensions))?;

        match self.dimensions {
            Some(current) if current == requested => Ok(()),
            Some(current) => Err(DimensionError::Resize {
                current,
                requested: dimensions,
            }),
            None => {
                self.channels = vec![Vec::new(); requested].into_boxed_slice();
                self.dimensions = Some(requested);
                Ok(())
            }
        }
    }

    /// Append a single point.
    ///
    /// On the first call the dimensionality is inferred from `values.len()`.
    /// Later calls must supply exactly that many values. On error the record
    /// is left untouched.
    pub fn add_point(
        &mut self,
        timestamp: impl Into<Timestamp>,
        values: &[f64],
        latency: Option<f64>,
    ) -> Result<(), DimensionError> {
        let timestamp = timestamp.into();
        match self.dimensions {
            None => self.set_dimensions(values.len() as i64)?,
            Some(expected) if expected != values.len() => {
                return Err(DimensionError::Mismatch {
                    expected,
                    found: values.len(),
                });
            }
            Some(_) => {}
        }

        let delta = self
            .timestamps
            .last()
            .map(|previous| timestamp.delta_since(previous))
            .unwrap_or_else(|| timestamp.zero_like());
        self.timestamps.push(timestamp);
        self.timestamp_deltas.push(delta);

        for (column, value) in self.channels.iter_mut().zip(values) {
            column.push(*value);
        }

        if let Some(latency) = latency {
            self.latencies.push(latency);
        }

        self.point_count += 1;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_policy_names() {
        assert_eq!(DimensionPolicy::default(), DimensionPolicy::SkipLine);
        for policy in [DimensionPolicy::SkipLine, DimensionPolicy::AbortRecord] {
            assert_eq!(DimensionPolicy::from_name(policy.as_str()), Some(policy));
        }
        assert_eq!(DimensionPolicy::from_name("truncate"), None);
    }

    #[test]
    fn test_record_init() {
        let record = TimeSeriesRecord::new("Test", "1");
        assert_eq!(record.sensor_name(), "Test");
        assert_eq!(record.sensor_id(), "1");
        assert_eq!(record.dimensions(), None);
        assert!(record.is_empty());
        assert!(record.channels().is_empty());
        assert!(record.latencies().is_none());
    }

    #[test]
    fn test_record_unknown_sentinel() {
        let record = TimeSeriesRecord::unknown();
        assert_eq!(record.sensor_name(), UNKNOWN_SENSOR_NAME);
        assert_eq!(record.sensor_id(), UNKNOWN_SENSOR_ID);
    }

    #[test]
    fn test_add_point_single() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.add_point(100.0, &[1.0], None).unwrap();

        assert_eq!(record.dimensions(), Some(1));
        assert_eq!(record.channel(0).unwrap(), &[1.0]);
        assert_eq!(record.timestamps(), &[100.0]);
        assert_eq!(record.timestamp_deltas(), &[0.0]);
        assert_eq!(record.point_count(), 1);
    }

    #[test]
    fn test_add_point_many_keeps_columns_aligned() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        for i in 0..10 {
            let v = i as f64;
            record.add_point(v * 10.0, &[v, -v], None).unwrap();
        }

        assert_eq!(record.point_count(), 10);
        assert_eq!(record.timestamps().len(), 10);
        assert_eq!(record.timestamp_deltas().len(), 10);
        for column in record.channels() {
            assert_eq!(column.len(), 10);
        }
        for i in 0..10 {
            let v = i as f64;
            assert_eq!(record.channel(0).unwrap()[i], v);
            assert_eq!(record.channel(1).unwrap()[i], -v);
        }
    }

    #[test]
    fn test_timestamp_deltas() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        for ts in [5.0, 15.0, 12.0, 40.5] {
            record.add_point(ts, &[0.0], None).unwrap();
        }

        // Non-monotonic timestamps are stored as received.
        assert_eq!(record.timestamps(), &[5.0, 15.0, 12.0, 40.5]);
        assert_eq!(record.timestamp_deltas(), &[0.0, 10.0, -3.0, 28.5]);
    }

    #[test]
    fn test_integer_timestamps_stay_exact() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        for ts in [
            1_700_000_000_000_000_001_i64,
            1_700_000_000_000_000_002,
            1_700_000_000_000_000_300,
        ] {
            record.add_point(ts, &[0.0], None).unwrap();
        }

        assert_eq!(
            record.timestamps()[2],
            Timestamp::Int(1_700_000_000_000_000_300)
        );
        assert_eq!(
            record.timestamp_deltas(),
            &[Timestamp::Int(0), Timestamp::Int(1), Timestamp::Int(298)]
        );
    }

    #[test]
    fn test_timestamp_parse() {
        assert_eq!(
            Timestamp::parse("1700000000000000001"),
            Some(Timestamp::Int(1_700_000_000_000_000_001))
        );
        assert_eq!(Timestamp::parse(" -42 "), Some(Timestamp::Int(-42)));
        assert_eq!(Timestamp::parse("12.5"), Some(Timestamp::Float(12.5)));
        // Beyond i64 falls back to a float.
        assert_eq!(
            Timestamp::parse("99999999999999999999"),
            Some(Timestamp::Float(1e20))
        );
        assert_eq!(Timestamp::parse("abc"), None);
        assert_eq!(Timestamp::parse("inf"), None);
    }

    #[test]
    fn test_timestamp_delta_domains() {
        let a = Timestamp::Int(10);
        assert_eq!(a.delta_since(&Timestamp::Int(4)), Timestamp::Int(6));
        assert_eq!(a.delta_since(&Timestamp::Float(2.5)), Timestamp::Float(7.5));
        assert_eq!(
            Timestamp::Int(i64::MAX).delta_since(&Timestamp::Int(-1)),
            Timestamp::Float(i64::MAX as f64 + 1.0)
        );
        assert_eq!(a.zero_like(), Timestamp::Int(0));
        assert_eq!(Timestamp::Float(1.0).zero_like(), Timestamp::Float(0.0));
    }

    #[test]
    fn test_timestamps_serialize_as_numbers() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.add_point(1_700_000_000_000_000_001_i64, &[1.0], None).unwrap();
        record.add_point(1_700_000_000_000_000_002_i64, &[2.0], None).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"timestamps\":[1700000000000000001,1700000000000000002]"));
        assert!(json.contains("\"timestamp_deltas\":[0,1]"));
    }

    #[test]
    fn test_add_point_with_latency() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        for i in 0..50 {
            let v = i as f64;
            record
                .add_point(v, &[v, -v, 10.0 * v], Some(9.0 * v))
                .unwrap();
        }

        let latencies = record.latencies().unwrap();
        assert_eq!(latencies.len(), 50);
        for (i, latency) in latencies.iter().enumerate() {
            assert_eq!(*latency, 9.0 * i as f64);
        }
    }

    #[test]
    fn test_latencies_not_padded() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.add_point(1.0, &[1.0], None).unwrap();
        record.add_point(2.0, &[2.0], Some(7.0)).unwrap();
        record.add_point(3.0, &[3.0], None).unwrap();

        assert_eq!(record.latencies().unwrap(), &[7.0]);
        assert_eq!(record.point_count(), 3);
    }

    #[test]
    fn test_set_dimensions_rejects_zero_and_negative() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        assert_eq!(record.set_dimensions(0), Err(DimensionError::Invalid(0)));
        assert_eq!(record.set_dimensions(-3), Err(DimensionError::Invalid(-3)));
        assert_eq!(record.dimensions(), None);
    }

    #[test]
    fn test_set_dimensions_one_is_valid() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.set_dimensions(1).unwrap();
        assert_eq!(record.dimensions(), Some(1));
        assert_eq!(record.channels().len(), 1);
    }

    #[test]
    fn test_set_dimensions_cannot_resize() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.set_dimensions(3).unwrap();
        record.set_dimensions(3).unwrap();
        assert_eq!(
            record.set_dimensions(2),
            Err(DimensionError::Resize {
                current: 3,
                requested: 2
            })
        );
        assert_eq!(record.channels().len(), 3);
    }

    #[test]
    fn test_add_point_empty_values_is_dimension_error() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        assert_eq!(
            record.add_point(1.0, &[], None),
            Err(DimensionError::Invalid(0))
        );
        assert!(record.is_empty());
        assert!(record.timestamps().is_empty());
    }

    #[test]
    fn test_add_point_mismatch_leaves_record_untouched() {
        let mut record = TimeSeriesRecord::new("Test", "1");
        record.add_point(1.0, &[1.0, 2.0, 3.0], Some(4.0)).unwrap();

        let err = record.add_point(2.0, &[1.0, 2.0], Some(5.0)).unwrap_err();
        assert_eq!(
            err,
            DimensionError::Mismatch {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(record.point_count(), 1);
        assert_eq!(record.timestamps(), &[1.0]);
        assert_eq!(record.latencies().unwrap(), &[4.0]);
        for column in record.channels() {
            assert_eq!(column.len(), 1);
        }
    }

    #[test]
    fn test_record_serializes_channels_as_nested_arrays() {
        let mut record = TimeSeriesRecord::new("Accel", "1");
        record.add_point(10.0, &[0.5, 1.5], None).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["sensor_name"], "Accel");
        assert_eq!(json["sensor_id"], "1");
        assert_eq!(json["dimensions"], 2);
        assert_eq!(json["channels"], serde_json::json!([[0.5], [1.5]]));
        assert!(json.get("latencies").is_none());
    }
}
