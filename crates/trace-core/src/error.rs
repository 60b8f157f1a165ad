use std::path::PathBuf;
use thiserror::Error;

/// Failures while validating or compiling a field schema.
///
/// Always fatal: a parse job never starts with an invalid schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// One of the required fields (`name`, `id`, `timestamp`, `data`) is absent.
    #[error("Missing required schema field: {0}")]
    MissingField(String),

    /// A supplied pattern failed to compile.
    #[error("Invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}

/// Failures while fixing or checking the dimensionality of a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    /// A dimensionality below one was requested or inferred.
    #[error("Invalid dimension count {0}: at least one channel is required")]
    Invalid(i64),

    /// A line carried a different number of values than the record's fixed dimensionality.
    #[error("Dimension mismatch: record has {expected} channels, line has {found} values")]
    Mismatch { expected: usize, found: usize },

    /// An attempt was made to change an already fixed dimensionality.
    #[error("Dimension already fixed at {current}, cannot resize to {requested}")]
    Resize { current: usize, requested: i64 },
}

/// Invalid arguments handed to the windowed statistics functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// The window period must be a positive integer.
    #[error("Invalid window period {0}: must be >= 1")]
    InvalidPeriod(i64),

    /// The trace contains NaN or an infinity at `index`.
    #[error("Non-finite value at index {index}")]
    NonFinite { index: usize },
}

/// All errors produced by the sensor-trace crates.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Several sensors were declared but the schema has no inline id to route lines.
    #[error("Cannot route body lines: {sensors} sensors declared but schema has no inline_id pattern")]
    AmbiguousRouting { sensors: usize },

    /// A schema preset name matched neither a built-in nor a saved schema file.
    #[error("Unknown schema preset: {0}")]
    UnknownPreset(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the sensor-trace crates.
pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_missing_field() {
        let err = SchemaError::MissingField("timestamp".to_string());
        assert_eq!(err.to_string(), "Missing required schema field: timestamp");
    }

    #[test]
    fn test_error_display_invalid_pattern() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = SchemaError::InvalidPattern {
            field: "data".to_string(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid pattern for field 'data'"));
    }

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = DimensionError::Mismatch {
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: record has 3 channels, line has 2 values"
        );
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TraceError::FileRead {
            path: PathBuf::from("/logs/imu.log"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/logs/imu.log"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_from_schema_is_transparent() {
        let err: TraceError = SchemaError::MissingField("id".to_string()).into();
        assert_eq!(err.to_string(), "Missing required schema field: id");
    }

    #[test]
    fn test_error_from_stats() {
        let err: TraceError = StatsError::InvalidPeriod(0).into();
        assert!(matches!(err, TraceError::Stats(StatsError::InvalidPeriod(0))));
    }

    #[test]
    fn test_error_display_ambiguous_routing() {
        let err = TraceError::AmbiguousRouting { sensors: 2 };
        assert!(err.to_string().contains("2 sensors declared"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: TraceError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
