//! Override loading
//!
//! Reads TOML or JSON documents and writes them into a [`Registry`] with
//! unconditional-set semantics. Tables become namespaces, everything else
//! becomes an attribute value.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use smartconfig_registry::Registry;

/// Document format of an override source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverrideFormat {
    Toml,
    Json,
}

impl OverrideFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// An applied override source with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideSource {
    pub format: OverrideFormat,

    /// File path (None for in-memory documents).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for in-memory documents).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Number of attribute values written.
    pub applied: usize,
}

/// Errors raised while loading overrides.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported override file: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Apply(#[from] smartconfig_registry::Error),
}

/// Parse TOML text and apply it.
pub fn load_toml_str(registry: &Registry, contents: &str) -> Result<OverrideSource, LoadError> {
    let document = parse_toml(contents)?;
    apply(registry, OverrideFormat::Toml, &document, None, None)
}

/// Parse JSON text and apply it.
pub fn load_json_str(registry: &Registry, contents: &str) -> Result<OverrideSource, LoadError> {
    let document = parse_json(contents)?;
    apply(registry, OverrideFormat::Json, &document, None, None)
}

/// Read a `.toml` or `.json` file and apply it.
pub fn load_file(registry: &Registry, path: &Path) -> Result<OverrideSource, LoadError> {
    let format = OverrideFormat::from_path(path)
        .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))?;

    let bytes = fs::read(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| LoadError::Parse(format!("Invalid UTF-8: {}", e)))?;

    let document = match format {
        OverrideFormat::Toml => parse_toml(&contents)?,
        OverrideFormat::Json => parse_json(&contents)?,
    };

    apply(
        registry,
        format,
        &document,
        Some(path.to_string_lossy().to_string()),
        Some(digest),
    )
}

/// Apply several files in order; later files win.
pub fn load_files<P: AsRef<Path>>(
    registry: &Registry,
    paths: &[P],
) -> Result<Vec<OverrideSource>, LoadError> {
    paths
        .iter()
        .map(|path| load_file(registry, path.as_ref()))
        .collect()
}

fn apply(
    registry: &Registry,
    format: OverrideFormat,
    document: &Value,
    path: Option<String>,
    digest: Option<String>,
) -> Result<OverrideSource, LoadError> {
    let applied = registry.apply_overrides(document)?;
    debug!(?format, path = path.as_deref(), applied, "loaded overrides");
    Ok(OverrideSource {
        format,
        path,
        digest,
        applied,
    })
}

fn parse_toml(contents: &str) -> Result<Value, LoadError> {
    let toml_value: toml::Value = toml::from_str(contents)
        .map_err(|e| LoadError::Parse(format!("TOML parse error: {}", e)))?;
    Ok(toml_to_json(toml_value))
}

fn parse_json(contents: &str) -> Result<Value, LoadError> {
    serde_json::from_str(contents).map_err(|e| LoadError::Parse(format!("JSON parse error: {}", e)))
}

/// Convert TOML Value to JSON Value.
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_toml_str() {
        let registry = Registry::new();
        let source = load_toml_str(
            &registry,
            r#"
[svc.timeout]
retries = 5
ratio = 0.5
hosts = ["a", "b"]
"#,
        )
        .unwrap();

        assert_eq!(source.format, OverrideFormat::Toml);
        assert_eq!(source.applied, 3);
        assert!(source.digest.is_none());
        assert_eq!(
            registry.get_attribute("svc.timeout", "retries").unwrap(),
            json!(5)
        );
        assert_eq!(
            registry.get_attribute("svc.timeout", "hosts").unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn test_load_json_str() {
        let registry = Registry::new();
        load_json_str(&registry, r#"{"db": {"host": "localhost"}}"#).unwrap();

        assert_eq!(
            registry.get_attribute("db", "host").unwrap(),
            json!("localhost")
        );
    }

    #[test]
    fn test_parse_error() {
        let registry = Registry::new();
        let err = load_toml_str(&registry, "[svc\nretries = ").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_top_level_scalar_rejected() {
        let registry = Registry::new();
        let err = load_toml_str(&registry, "retries = 5").unwrap_err();
        assert!(matches!(
            err,
            LoadError::Apply(smartconfig_registry::Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_toml_datetime_becomes_string() {
        let value = parse_toml("[svc]\nsince = 1979-05-27T07:32:00Z").unwrap();
        assert_eq!(value["svc"]["since"], json!("1979-05-27T07:32:00Z"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            OverrideFormat::from_path(Path::new("app.toml")),
            Some(OverrideFormat::Toml)
        );
        assert_eq!(
            OverrideFormat::from_path(Path::new("app.json")),
            Some(OverrideFormat::Json)
        );
        assert_eq!(OverrideFormat::from_path(Path::new("app.yaml")), None);
    }
}
