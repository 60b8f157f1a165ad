//! Declarative field-extraction schemas.
//!
//! A [`SchemaDescriptor`] is the compiled form of a `field name → pattern`
//! mapping describing one log dialect. Built-in dialects are plain preset
//! values ([`SchemaPreset`]); user dialects are loaded from JSON
//! ([`SchemaConfig`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SchemaError, TraceError};

// ── Field names ───────────────────────────────────────────────────────────────

pub const FIELD_NAME: &str = "name";
pub const FIELD_ID: &str = "id";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_DATA: &str = "data";
pub const FIELD_LATENCY: &str = "latency";
pub const FIELD_INLINE_ID: &str = "inline_id";

/// Fields every schema must declare.
pub const REQUIRED_FIELDS: [&str; 4] = [FIELD_NAME, FIELD_ID, FIELD_TIMESTAMP, FIELD_DATA];

/// Name of the capture group that narrows a match to the extracted value.
pub const VALUE_GROUP: &str = "value";

/// Map legacy key spellings onto canonical field names.
fn canonical_field(key: &str) -> &str {
    match key {
        "sensor_name" => FIELD_NAME,
        "sensor_id" => FIELD_ID,
        other => other,
    }
}

// ── FieldPattern ──────────────────────────────────────────────────────────────

/// A single compiled extraction pattern.
///
/// The extracted span is the `value` capture group when the pattern defines
/// one, otherwise the whole leftmost match.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    regex: Regex,
    has_value_group: bool,
}

impl FieldPattern {
    fn compile(field: &str, pattern: &str) -> std::result::Result<Self, SchemaError> {
        let regex = Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
            field: field.to_string(),
            source,
        })?;
        let has_value_group = regex.capture_names().flatten().any(|n| n == VALUE_GROUP);
        Ok(Self {
            regex,
            has_value_group,
        })
    }

    /// Search `line` and return the extracted span, if any.
    pub fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        if self.has_value_group {
            self.regex
                .captures(line)
                .and_then(|caps| caps.name(VALUE_GROUP))
                .map(|m| m.as_str())
        } else {
            self.regex.find(line).map(|m| m.as_str())
        }
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

// ── SchemaDescriptor ──────────────────────────────────────────────────────────

/// The compiled set of named extraction patterns describing one log dialect.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    dialect: String,
    name: FieldPattern,
    id: FieldPattern,
    timestamp: FieldPattern,
    data: FieldPattern,
    latency: Option<FieldPattern>,
    inline_id: Option<FieldPattern>,
}

impl SchemaDescriptor {
    /// Validate and compile a `field → pattern` mapping.
    ///
    /// `sensor_name` and `sensor_id` are accepted as spellings of `name` and
    /// `id`. Unrecognised fields are ignored with a warning.
    ///
    /// # Errors
    /// * [`SchemaError::MissingField`] if any of `name`, `id`, `timestamp`,
    ///   `data` is absent (checked before anything is compiled).
    /// * [`SchemaError::InvalidPattern`] if a supplied pattern does not compile.
    pub fn build<I, K, V>(fields: I) -> std::result::Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| {
                (
                    canonical_field(k.as_ref()).to_string(),
                    v.as_ref().to_string(),
                )
            })
            .collect();

        for required in REQUIRED_FIELDS {
            if !fields.contains_key(required) {
                return Err(SchemaError::MissingField(required.to_string()));
            }
        }

        let mut compiled: BTreeMap<String, FieldPattern> = BTreeMap::new();
        for (field, pattern) in &fields {
            match field.as_str() {
                FIELD_NAME | FIELD_ID | FIELD_TIMESTAMP | FIELD_DATA | FIELD_LATENCY
                | FIELD_INLINE_ID => {
                    compiled.insert(field.clone(), FieldPattern::compile(field, pattern)?);
                }
                unknown => warn!("Ignoring unknown schema field: {}", unknown),
            }
        }

        let mut required = |field: &str| {
            compiled
                .remove(field)
                .ok_or_else(|| SchemaError::MissingField(field.to_string()))
        };
        let name = required(FIELD_NAME)?;
        let id = required(FIELD_ID)?;
        let timestamp = required(FIELD_TIMESTAMP)?;
        let data = required(FIELD_DATA)?;

        Ok(Self {
            dialect: "custom".to_string(),
            name,
            id,
            timestamp,
            data,
            latency: compiled.remove(FIELD_LATENCY),
            inline_id: compiled.remove(FIELD_INLINE_ID),
        })
    }

    /// Attach a dialect name, used only for logging and reports.
    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// Compile one of the built-in presets.
    pub fn preset(preset: SchemaPreset) -> std::result::Result<Self, SchemaError> {
        Ok(Self::build(preset.fields())?.with_dialect(preset.as_str()))
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn name(&self) -> &FieldPattern {
        &self.name
    }

    pub fn id(&self) -> &FieldPattern {
        &self.id
    }

    pub fn timestamp(&self) -> &FieldPattern {
        &self.timestamp
    }

    pub fn data(&self) -> &FieldPattern {
        &self.data
    }

    pub fn latency(&self) -> Option<&FieldPattern> {
        self.latency.as_ref()
    }

    pub fn inline_id(&self) -> Option<&FieldPattern> {
        self.inline_id.as_ref()
    }
}

// ── SchemaPreset ──────────────────────────────────────────────────────────────

/// Built-in log dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPreset {
    /// Multi-sensor logs with `sensor type N: Name.` headers and
    /// `Sensor: N TS: T Data: x y z Latency: L` body lines.
    Google,
    /// One sensor per file, `<timestamp> <values...>` per line, with an
    /// optional `# sensor: NAME id: ID` header.
    Single,
}

impl SchemaPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaPreset::Google => "google",
            SchemaPreset::Single => "single",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "google" => Some(SchemaPreset::Google),
            "single" => Some(SchemaPreset::Single),
            _ => None,
        }
    }

    /// The uncompiled `field → pattern` pairs of this preset.
    pub fn fields(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            SchemaPreset::Google => vec![
                (FIELD_NAME, r": (?P<value>[\w\s]+).$"),
                (
                    FIELD_ID,
                    r"sensor type (?P<value>[+-]?(?:[0-9]*[.])?[0-9]+)",
                ),
                (FIELD_TIMESTAMP, r"TS: (?P<value>[+-]?(?:[0-9]*[.])?[0-9]+)"),
                (
                    FIELD_DATA,
                    r"Data: (?P<value>(?:[+-]?(?:[0-9]*[.])?[0-9]+(?:\s+|$))+)(?:$|[A-Za-z]+:)",
                ),
                (
                    FIELD_INLINE_ID,
                    r"Sensor: (?P<value>[+-]?(?:[0-9]*[.])?[0-9]+)",
                ),
                (
                    FIELD_LATENCY,
                    r"Latency: (?P<value>[+-]?(?:[0-9]*[.])?[0-9]+)",
                ),
            ],
            SchemaPreset::Single => vec![
                (FIELD_NAME, r"^#\s*sensor:\s*(?P<value>.+?)\s+id:"),
                (FIELD_ID, r"^#.*\bid:\s*(?P<value>\S+)"),
                (FIELD_TIMESTAMP, r"^\s*(?P<value>[+-]?(?:[0-9]*[.])?[0-9]+)\s"),
                (FIELD_DATA, r"^\s*\S+\s+(?P<value>.+?)\s*$"),
            ],
        }
    }
}

// ── SchemaConfig ──────────────────────────────────────────────────────────────

/// A schema as stored on disk:
///
/// ```json
/// { "name": "imu", "fields": { "name": "...", "id": "...", "timestamp": "...", "data": "..." } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Dialect name; defaults to the file stem when loaded from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field name → pattern.
    pub fields: BTreeMap<String, String>,
}

impl SchemaConfig {
    /// Directory holding saved schemas: `~/.sensor-trace/schemas`.
    pub fn schemas_dir() -> PathBuf {
        Self::schemas_dir_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// The schemas directory rooted at `base_dir` (used for testing).
    pub fn schemas_dir_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".sensor-trace").join("schemas")
    }

    /// Read a schema document from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TraceError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: SchemaConfig = serde_json::from_str(&content)?;
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string());
        }
        Ok(config)
    }

    /// Compile this configuration into a [`SchemaDescriptor`].
    pub fn compile(&self) -> Result<SchemaDescriptor> {
        let descriptor = SchemaDescriptor::build(&self.fields)?;
        Ok(match &self.name {
            Some(name) => descriptor.with_dialect(name.clone()),
            None => descriptor,
        })
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Resolve the schema to use for a parse job.
///
/// Order: explicit `schema_file` → `preset` (built-in, then
/// `<schemas_dir>/<preset>.json`) → the built-in Google preset.
pub fn resolve_schema(
    schema_file: Option<&Path>,
    preset: Option<&str>,
    schemas_dir: &Path,
) -> Result<SchemaDescriptor> {
    if let Some(path) = schema_file {
        debug!("Loading schema from {}", path.display());
        return SchemaConfig::load_from(path)?.compile();
    }

    let Some(name) = preset else {
        return Ok(SchemaDescriptor::preset(SchemaPreset::Google)?);
    };

    if let Some(builtin) = SchemaPreset::from_name(name) {
        return Ok(SchemaDescriptor::preset(builtin)?);
    }

    let saved = schemas_dir.join(format!("{}.json", name));
    if saved.is_file() {
        debug!("Loading saved schema {} from {}", name, saved.display());
        return SchemaConfig::load_from(&saved)?.compile();
    }

    Err(TraceError::UnknownPreset(name.to_string()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
