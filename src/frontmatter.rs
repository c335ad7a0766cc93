//! Front-matter and structured metadata parsing.
//!
//! Documents may start with a metadata block. The format is chosen by
//! sniffing the opening delimiter:
//!
//! ```text
//! ---                    +++
//! title: Hello           title = "Hello"
//! tags: [a, b]           tags = ["a", "b"]
//! ---                    +++
//! Body text…             Body text…
//! ```
//!
//! Data files (`.yaml`, `.yml`, `.toml`, `.json`) and `.meta` sidecars are
//! parsed whole with the same machinery. Every format is converted to the
//! JSON-like [`Metadata`] mapping.
//!
//! Parsing is soft: a malformed block yields an error alongside the best
//! available body, so the collector can record a warning and still create
//! the node.

use crate::metadata::Metadata;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("unterminated {0} front-matter block")]
    Unterminated(&'static str),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metadata must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    Yaml,
    Toml,
    Json,
}

impl MetadataFormat {
    /// Format of a data file by extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" | "meta" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn delimiter(&self) -> Option<&'static str> {
        match self {
            Self::Yaml => Some("---"),
            Self::Toml => Some("+++"),
            Self::Json => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// Result of splitting a document.
#[derive(Debug)]
pub struct Extracted {
    pub metadata: Metadata,
    pub body: Vec<u8>,
    /// Set when a front-matter block was present but could not be used.
    pub error: Option<FrontMatterError>,
}

/// Split a front-matter block off the start of `content`.
///
/// Returns the format, the raw block, and the body. The delimiters must sit
/// on their own lines; the first line may carry a UTF-8 BOM.
pub fn split(content: &str) -> Option<(MetadataFormat, &str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    let format = match first.trim_end() {
        "---" => MetadataFormat::Yaml,
        "+++" => MetadataFormat::Toml,
        _ => return None,
    };
    let delimiter = format.delimiter()?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((format, block, body));
        }
        offset += line.len();
    }
    None
}

/// Extract front-matter from raw document bytes.
///
/// Content without a block (or that isn't UTF-8) is returned unchanged with
/// empty metadata.
pub fn extract(content: &[u8]) -> Extracted {
    let Ok(text) = std::str::from_utf8(content) else {
        return Extracted {
            metadata: Metadata::new(),
            body: content.to_vec(),
            error: None,
        };
    };

    let Some((format, block, body)) = split(text) else {
        if let Some(format) = unterminated_block(text) {
            return Extracted {
                metadata: Metadata::new(),
                body: content.to_vec(),
                error: Some(FrontMatterError::Unterminated(format.name())),
            };
        }
        return Extracted {
            metadata: Metadata::new(),
            body: content.to_vec(),
            error: None,
        };
    };

    let (metadata, error) = match parse(format, block) {
        Ok(metadata) => (metadata, None),
        Err(e) => (Metadata::new(), Some(e)),
    };
    Extracted {
        metadata,
        body: body.as_bytes().to_vec(),
        error,
    }
}

fn unterminated_block(text: &str) -> Option<MetadataFormat> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    match text.lines().next()?.trim_end() {
        "---" => Some(MetadataFormat::Yaml),
        "+++" => Some(MetadataFormat::Toml),
        _ => None,
    }
}

/// Parse a whole metadata document into a mapping.
///
/// An empty document is an empty mapping.
pub fn parse(format: MetadataFormat, text: &str) -> Result<Metadata, FrontMatterError> {
    if text.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value = match format {
        MetadataFormat::Yaml => serde_yaml::from_str::<Value>(text)?,
        MetadataFormat::Toml => toml_to_json(toml::from_str::<toml::Value>(text)?),
        MetadataFormat::Json => serde_json::from_str::<Value>(text)?,
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        Value::Array(_) => Err(FrontMatterError::NotAMapping("a list")),
        _ => Err(FrontMatterError::NotAMapping("a scalar")),
    }
}

/// Convert a TOML value, rendering datetimes as their RFC 3339 strings.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
