//! Sensor discovery and line routing.
//!
//! [`HeaderScanner`] consumes the leading header lines of a stream and builds
//! a [`SensorRegistry`]; [`Demultiplexer`] then decides which registered
//! record each body line belongs to.

use std::collections::HashMap;
use std::io;
use std::iter::Peekable;

use trace_core::error::TraceError;
use trace_core::models::TimeSeriesRecord;
use trace_core::schema::{FieldPattern, SchemaDescriptor};
use tracing::{debug, warn};

// ── SensorRegistry ────────────────────────────────────────────────────────────

/// Insertion-ordered set of records keyed by sensor id.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    records: Vec<TimeSeriesRecord>,
    aborted: Vec<bool>,
    index: HashMap<String, usize>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor and return its slot.
    ///
    /// A repeated id replaces the earlier record with a fresh one but keeps
    /// its original position.
    pub fn register(&mut self, sensor_name: &str, sensor_id: &str) -> usize {
        let record = TimeSeriesRecord::new(sensor_name, sensor_id);
        if let Some(&slot) = self.index.get(sensor_id) {
            warn!(
                "Sensor id {} declared again as \"{}\"; replacing \"{}\"",
                sensor_id,
                sensor_name,
                self.records[slot].sensor_name()
            );
            self.records[slot] = record;
            self.aborted[slot] = false;
            return slot;
        }

        let slot = self.records.len();
        self.records.push(record);
        self.aborted.push(false);
        self.index.insert(sensor_id.to_string(), slot);
        slot
    }

    /// Register the implicit `unknown_sensor` record when nothing else was
    /// declared. Returns `true` if it was created.
    pub fn ensure_implicit(&mut self) -> bool {
        if !self.records.is_empty() {
            return false;
        }
        let record = TimeSeriesRecord::unknown();
        self.index.insert(record.sensor_id().to_string(), 0);
        self.records.push(record);
        self.aborted.push(false);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Slot of the record registered under `sensor_id`.
    pub fn position(&self, sensor_id: &str) -> Option<usize> {
        self.index.get(sensor_id).copied()
    }

    pub fn get(&self, slot: usize) -> Option<&TimeSeriesRecord> {
        self.records.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut TimeSeriesRecord> {
        self.records.get_mut(slot)
    }

    pub fn records(&self) -> &[TimeSeriesRecord] {
        &self.records
    }

    /// Mark a record as aborted; it will be left out of [`Self::into_records`].
    pub fn abort(&mut self, slot: usize) {
        if let Some(flag) = self.aborted.get_mut(slot) {
            *flag = true;
        }
    }

    pub fn is_aborted(&self, slot: usize) -> bool {
        self.aborted.get(slot).copied().unwrap_or(false)
    }

    /// Finished, non-aborted records in declaration order.
    pub fn into_records(self) -> Vec<TimeSeriesRecord> {
        self.records
            .into_iter()
            .zip(self.aborted)
            .filter_map(|(record, aborted)| (!aborted).then_some(record))
            .collect()
    }
}

// ── HeaderScanner ─────────────────────────────────────────────────────────────

/// Result of the header phase.
#[derive(Debug)]
pub struct HeaderScan {
    pub registry: SensorRegistry,
    /// Number of lines consumed as headers.
    pub header_lines: usize,
    /// `true` when no header matched and the implicit record was created.
    pub implicit: bool,
}

/// Discovers declared sensors from the leading lines of a stream.
pub struct HeaderScanner<'s> {
    schema: &'s SchemaDescriptor,
}

impl<'s> HeaderScanner<'s> {
    pub fn new(schema: &'s SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// `(name, id)` when `line` is a header line, i.e. both patterns match.
    pub fn match_header<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let name = self.schema.name().extract(line)?;
        let id = self.schema.id().extract(line)?;
        Some((name, id))
    }

    /// Consume header lines from `lines`.
    ///
    /// Scanning stops at the first line that is not a header; that line is
    /// left in `lines` for the body phase. If no header matched, a single
    /// implicit record is registered and nothing is consumed.
    pub fn scan<I>(&self, lines: &mut Peekable<I>) -> io::Result<HeaderScan>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let mut registry = SensorRegistry::new();
        let mut header_lines = 0usize;

        loop {
            let header = match lines.peek() {
                None => break,
                Some(Err(_)) => {
                    if let Some(Err(e)) = lines.next() {
                        return Err(e);
                    }
                    break;
                }
                Some(Ok(line)) => self
                    .match_header(line)
                    .map(|(name, id)| (name.to_string(), id.to_string())),
            };

            let Some((name, id)) = header else {
                break;
            };
            registry.register(&name, &id);
            header_lines += 1;
            lines.next();
        }

        let implicit = registry.ensure_implicit();
        debug!(
            "Header phase: {} lines, {} sensors{}",
            header_lines,
            registry.len(),
            if implicit { " (implicit)" } else { "" }
        );

        Ok(HeaderScan {
            registry,
            header_lines,
            implicit,
        })
    }
}

// ── Demultiplexer ─────────────────────────────────────────────────────────────

/// Where a body line should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Registry slot of the owning record.
    Record(usize),
    /// The schema has an inline id pattern but the line does not match it.
    Unroutable,
    /// The inline id matched but names no registered sensor.
    UnknownSensor,
}

/// Resolves the owning record of each body line.
#[derive(Debug)]
pub struct Demultiplexer<'s> {
    inline_id: Option<&'s FieldPattern>,
}

impl<'s> Demultiplexer<'s> {
    /// Build a demultiplexer for `registry`.
    ///
    /// # Errors
    /// [`TraceError::AmbiguousRouting`] when the schema has no inline id
    /// pattern and more than one sensor is registered.
    pub fn new(schema: &'s SchemaDescriptor, registry: &SensorRegistry) -> Result<Self, TraceError> {
        let inline_id = schema.inline_id();
        if inline_id.is_none() && registry.len() > 1 {
            return Err(TraceError::AmbiguousRouting {
                sensors: registry.len(),
            });
        }
        Ok(Self { inline_id })
    }

    pub fn route(&self, line: &str, registry: &SensorRegistry) -> Route {
        match self.inline_id {
            Some(pattern) => match pattern.extract(line) {
                None => Route::Unroutable,
                Some(id) => registry
                    .position(id)
                    .map(Route::Record)
                    .unwrap_or(Route::UnknownSensor),
            },
            None => Route::Record(0),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use trace_core::schema::SchemaPreset;

    fn lines(text: &str) -> Peekable<impl Iterator<Item = io::Result<String>>> {
        text.lines()
            .map(|l| Ok(l.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
            .peekable()
    }

    fn google() -> SchemaDescriptor {
        SchemaDescriptor::preset(SchemaPreset::Google).unwrap()
    }

    // ── SensorRegistry ───────────────────────────────────────────────────────

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = SensorRegistry::new();
        assert_eq!(registry.register("Accel", "1"), 0);
        assert_eq!(registry.register("Gyro", "2"), 1);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.position("2"), Some(1));
        assert_eq!(registry.position("3"), None);
        assert_eq!(registry.get(0).unwrap().sensor_name(), "Accel");
    }

    #[test]
    fn test_registry_ids_are_textual() {
        let mut registry = SensorRegistry::new();
        registry.register("A", "1");
        registry.register("B", "01");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.position("01"), Some(1));
    }

    #[test]
    fn test_registry_duplicate_id_replaces_in_place() {
        let mut registry = SensorRegistry::new();
        registry.register("Accel", "1");
        registry.register("Gyro", "2");
        assert_eq!(registry.register("Accel v2", "1"), 0);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0).unwrap().sensor_name(), "Accel v2");
    }

    #[test]
    fn test_registry_ensure_implicit_only_when_empty() {
        let mut registry = SensorRegistry::new();
        assert!(registry.ensure_implicit());
        assert!(!registry.ensure_implicit());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.position("0"), Some(0));
    }

    #[test]
    fn test_registry_abort_excludes_record() {
        let mut registry = SensorRegistry::new();
        registry.register("A", "1");
        registry.register("B", "2");
        registry.abort(0);

        assert!(registry.is_aborted(0));
        assert!(!registry.is_aborted(1));
        let records = registry.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sensor_id(), "2");
    }

    // ── HeaderScanner ────────────────────────────────────────────────────────

    #[test]
    fn test_scan_multiple_headers_leaves_first_body_line() {
        let schema = google();
        let mut input = lines(
            "Registered sensor type 1: Accelerometer.\n\
             Registered sensor type 2: Gyroscope.\n\
             Sensor: 1 TS: 10 Data: 1 2 3\n",
        );

        let scan = HeaderScanner::new(&schema).scan(&mut input).unwrap();
        assert_eq!(scan.header_lines, 2);
        assert!(!scan.implicit);
        assert_eq!(scan.registry.len(), 2);
        assert_eq!(scan.registry.get(1).unwrap().sensor_name(), "Gyroscope");

        // The first non-header line is still available.
        let next = input.next().unwrap().unwrap();
        assert_eq!(next, "Sensor: 1 TS: 10 Data: 1 2 3");
    }

    #[test]
    fn test_scan_no_header_creates_implicit_without_consuming() {
        let schema = google();
        let mut input = lines("Sensor: 0 TS: 10 Data: 1\nSensor: 0 TS: 20 Data: 2\n");

        let scan = HeaderScanner::new(&schema).scan(&mut input).unwrap();
        assert_eq!(scan.header_lines, 0);
        assert!(scan.implicit);
        assert_eq!(scan.registry.get(0).unwrap().sensor_name(), "unknown_sensor");
        assert_eq!(input.count(), 2);
    }

    #[test]
    fn test_scan_empty_input() {
        let schema = google();
        let mut input = lines("");
        let scan = HeaderScanner::new(&schema).scan(&mut input).unwrap();
        assert!(scan.implicit);
        assert_eq!(scan.registry.len(), 1);
    }

    #[test]
    fn test_scan_propagates_read_error() {
        let schema = google();
        let items: Vec<io::Result<String>> = vec![
            Ok("Registered sensor type 1: Accelerometer.".to_string()),
            Err(io::Error::new(io::ErrorKind::Other, "disk gone")),
        ];
        let mut input = items.into_iter().peekable();
        let err = HeaderScanner::new(&schema).scan(&mut input).unwrap_err();
        assert_eq!(err.to_string(), "disk gone");
    }

    #[test]
    fn test_match_header_requires_both_fields() {
        let schema = google();
        let scanner = HeaderScanner::new(&schema);
        assert_eq!(
            scanner.match_header("Registered sensor type 7: Barometer."),
            Some(("Barometer", "7"))
        );
        assert_eq!(scanner.match_header("Registered sensor type 7"), None);
        assert_eq!(scanner.match_header("Sensor: 1 TS: 1 Data: 1 2 3"), None);
    }

    // ── Demultiplexer ────────────────────────────────────────────────────────

    #[test]
    fn test_route_by_inline_id() {
        let schema = google();
        let mut registry = SensorRegistry::new();
        registry.register("Accel", "1");
        registry.register("Gyro", "2");
        let demux = Demultiplexer::new(&schema, &registry).unwrap();

        assert_eq!(demux.route("Sensor: 2 TS: 5 Data: 1", &registry), Route::Record(1));
        assert_eq!(demux.route("Sensor: 9 TS: 5 Data: 1", &registry), Route::UnknownSensor);
        assert_eq!(demux.route("TS: 5 Data: 1", &registry), Route::Unroutable);
    }

    #[test]
    fn test_route_single_sensor_without_inline_id() {
        let schema = SchemaDescriptor::preset(SchemaPreset::Single).unwrap();
        let mut registry = SensorRegistry::new();
        registry.ensure_implicit();
        let demux = Demultiplexer::new(&schema, &registry).unwrap();
        assert_eq!(demux.route("10 1.5", &registry), Route::Record(0));
    }

    #[test]
    fn test_demultiplexer_ambiguous_without_inline_id() {
        let schema = SchemaDescriptor::preset(SchemaPreset::Single).unwrap();
        let mut registry = SensorRegistry::new();
        registry.register("A", "1");
        registry.register("B", "2");
        let err = Demultiplexer::new(&schema, &registry).unwrap_err();
        assert!(matches!(err, TraceError::AmbiguousRouting { sensors: 2 }));
    }
}
