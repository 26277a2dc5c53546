//! GPU query schema and positional CSV decoding
//!
//! The schema is an ordered list of `nvidia-smi --query-gpu` fields, each
//! mapped to an output key and a value type. The same order is used to
//! build the query and to decode the response: column *i* of every output
//! line belongs to schema entry *i*.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ConfigError, ConfigResult, TelemetryError, TelemetryResult};

/// Column separator used by `nvidia-smi --format=csv`
const COLUMN_SEPARATOR: &str = ", ";

/// Placeholders `nvidia-smi` prints for fields a device cannot report
const UNAVAILABLE_MARKERS: &[&str] = &["[N/A]", "[Not Supported]", "N/A", "[Unknown Error]"];

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuValueType {
    /// Integer; decimal input is truncated
    Int,
    /// Floating point
    Float,
    /// Raw column text
    #[default]
    String,
}

impl GpuValueType {
    /// Coerces one raw column to this type
    ///
    /// # Errors
    ///
    /// Returns a description of the offending text if a numeric column
    /// cannot be parsed.
    pub fn coerce(self, raw: &str) -> Result<GpuValue, String> {
        match self {
            Self::String => Ok(GpuValue::Text(raw.to_string())),
            Self::Int | Self::Float => {
                let text = raw.trim();
                if UNAVAILABLE_MARKERS.contains(&text) {
                    return Ok(GpuValue::Unavailable);
                }
                if self == Self::Float {
                    return text
                        .parse::<f64>()
                        .map(GpuValue::Float)
                        .map_err(|_| format!("'{raw}' is not a float"));
                }
                if let Ok(v) = text.parse::<i64>() {
                    return Ok(GpuValue::Int(v));
                }
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| GpuValue::Int(v.trunc() as i64))
                    .ok_or_else(|| format!("'{raw}' is not an integer"))
            }
        }
    }
}

/// A decoded GPU column value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GpuValue {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Device reported `[N/A]` or `[Not Supported]`
    Unavailable,
}

impl GpuValue {
    /// Returns the integer value, if any
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float value, if any
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One schema entry: query field, output key and value type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuField {
    /// Field name understood by `nvidia-smi --query-gpu`
    pub query: String,
    /// Key under which the value appears in a [`GpuRecord`]
    pub key: String,
    /// How the column is decoded
    #[serde(rename = "type", default)]
    pub value_type: GpuValueType,
}

impl GpuField {
    /// Creates a schema entry
    pub fn new(query: impl Into<String>, key: impl Into<String>, value_type: GpuValueType) -> Self {
        Self {
            query: query.into(),
            key: key.into(),
            value_type,
        }
    }
}

/// Ordered, immutable GPU query schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GpuField>", into = "Vec<GpuField>")]
pub struct GpuQuerySchema {
    fields: Vec<GpuField>,
}

impl Default for GpuQuerySchema {
    fn default() -> Self {
        use GpuValueType as T;
        Self {
            fields: vec![
                GpuField::new("name", "name", T::String),
                GpuField::new("uuid", "uuid", T::String),
                GpuField::new("index", "index", T::Int),
                GpuField::new("temperature.gpu", "temperature", T::Int),
                GpuField::new("utilization.gpu", "utilization", T::Int),
                GpuField::new("memory.used", "usedMemory", T::Int),
                GpuField::new("memory.total", "totalMemory", T::Int),
            ],
        }
    }
}

impl TryFrom<Vec<GpuField>> for GpuQuerySchema {
    type Error = ConfigError;

    fn try_from(fields: Vec<GpuField>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<GpuQuerySchema> for Vec<GpuField> {
    fn from(schema: GpuQuerySchema) -> Self {
        schema.fields
    }
}

impl GpuQuerySchema {
    /// Builds a schema from an ordered field list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the list is empty, a query
    /// field is blank or contains a comma or whitespace, or two entries
    /// share an output key.
    pub fn new(fields: Vec<GpuField>) -> ConfigResult<Self> {
        if fields.is_empty() {
            return Err(ConfigError::Invalid("GPU query schema is empty".into()));
        }
        for (i, field) in fields.iter().enumerate() {
            if field.query.is_empty()
                || field.query.contains(',')
                || field.query.chars().any(char::is_whitespace)
            {
                return Err(ConfigError::Invalid(format!(
                    "invalid GPU query field '{}'",
                    field.query
                )));
            }
            if field.key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "GPU query field '{}' has an empty output key",
                    field.query
                )));
            }
            if fields[..i].iter().any(|f| f.key == field.key) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate GPU output key '{}'",
                    field.key
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Schema entries in query order
    #[must_use]
    pub fn fields(&self) -> &[GpuField] {
        &self.fields
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields. Construction rejects an
    /// empty field list, so a built schema is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Comma-joined query fields, in schema order
    #[must_use]
    pub fn query_fields(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.query.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Full `nvidia-smi` invocation for this schema
    #[must_use]
    pub fn command(&self) -> String {
        format!(
            "nvidia-smi --query-gpu={} --format=csv,noheader,nounits",
            self.query_fields()
        )
    }

    /// Decodes one CSV line into a record.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if the column count does not
    /// match the schema or a column fails type coercion.
    pub fn decode_row(&self, line: &str) -> TelemetryResult<GpuRecord> {
        let columns: Vec<&str> = line.split(COLUMN_SEPARATOR).collect();
        if columns.len() != self.fields.len() {
            return Err(TelemetryError::parse(format!(
                "GPU row has {} columns, schema expects {}: '{line}'",
                columns.len(),
                self.fields.len()
            )));
        }

        let values = self
            .fields
            .iter()
            .zip(columns)
            .map(|(field, raw)| {
                field
                    .value_type
                    .coerce(raw)
                    .map(|value| (field.key.clone(), value))
                    .map_err(|e| TelemetryError::parse(format!("GPU field '{}': {e}", field.query)))
            })
            .collect::<TelemetryResult<Vec<_>>>()?;

        Ok(GpuRecord { values })
    }

    /// Decodes the full query output, one record per non-blank line.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ParseFailed`] if any line fails to decode.
    pub fn decode(&self, output: &str) -> TelemetryResult<Vec<GpuRecord>> {
        output
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(|l| self.decode_row(l))
            .collect()
    }
}

/// One device's values keyed by the schema's output keys, in schema order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpuRecord {
    values: Vec<(String, GpuValue)>,
}

impl GpuRecord {
    /// Looks up a value by output key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&GpuValue> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Output keys in schema order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    /// Key/value pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GpuValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the record has no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for GpuRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
