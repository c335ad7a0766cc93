//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. The file lives at
//! the project root; every key is optional and overrides the stock default.
//!
//! ```text
//! my-site/
//! ├── config.toml          # Overrides stock defaults
//! ├── content/             # Documents, data files, assets
//! ├── static/              # Copied verbatim
//! ├── resources/           # Stylesheet sources, compiled to CSS
//! ├── templates/           # MiniJinja templates
//! └── public/              # Build output
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_dir = "content"
//! static_dir = "static"
//! resource_dir = "resources"
//! output_dir = "public"
//!
//! [templates]
//! path = "templates"
//! default = "default.html"
//!
//! [templates.kinds]       # node kind → template
//! [templates.routes]      # path glob → template, longest pattern wins
//!
//! [metadata]
//! merge_keys = ["tags", "categories", "aliases"]
//! order_key = "order"
//!
//! [metadata.defaults]     # lowest inherited metadata layer
//!
//! [cache]
//! enabled = true
//! path = ".quire-cache.json"
//!
//! [images]
//! sizes = []              # Widths of resized copies, empty disables
//! quality = 85            # JPEG quality (1-100)
//!
//! [processing]
//! max_processes = 4       # Max parallel workers (omit for auto = CPU cores)
//!
//! [checks]
//! links = true            # Warn about site-absolute links to nothing
//! titles = true           # Warn about documents without a title
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::DEFAULT_MANIFEST_FILENAME;
use crate::metadata::{DEFAULT_MERGE_KEYS, Metadata};
use crate::node::{DEFAULT_ORDER_KEY, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the project root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Directory paths are relative to the
/// project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Documents, data files and assets.
    pub content_dir: String,
    /// Files copied verbatim, merged into the same tree. Optional on disk.
    pub static_dir: String,
    /// SCSS/Sass sources, compiled to CSS. Optional on disk.
    pub resource_dir: String,
    /// Where artifacts are written.
    pub output_dir: String,
    pub templates: TemplatesConfig,
    pub metadata: MetadataConfig,
    pub cache: CacheConfig,
    pub images: ImagesConfig,
    pub processing: ProcessingConfig,
    pub checks: ChecksConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            content_dir: "content".to_string(),
            static_dir: "static".to_string(),
            resource_dir: "resources".to_string(),
            output_dir: "public".to_string(),
            templates: TemplatesConfig::default(),
            metadata: MetadataConfig::default(),
            cache: CacheConfig::default(),
            images: ImagesConfig::default(),
            processing: ProcessingConfig::default(),
            checks: ChecksConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_dir.trim().is_empty() || self.output_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "content_dir and output_dir must not be empty".into(),
            ));
        }
        if Path::new(&self.content_dir) == Path::new(&self.output_dir) {
            return Err(ConfigError::Validation(
                "output_dir must differ from content_dir".into(),
            ));
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.sizes.contains(&0) {
            return Err(ConfigError::Validation(
                "images.sizes values must be non-zero".into(),
            ));
        }
        if let Some(kind) = self
            .templates
            .kinds
            .keys()
            .find(|k| NodeKind::parse(k).is_none())
        {
            return Err(ConfigError::Validation(format!(
                "templates.kinds: unknown node kind {kind:?}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.metadata.order_key.is_empty() {
            return Err(ConfigError::Validation(
                "metadata.order_key must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn content_path(&self, root: &Path) -> PathBuf {
        root.join(&self.content_dir)
    }

    pub fn static_path(&self, root: &Path) -> PathBuf {
        root.join(&self.static_dir)
    }

    pub fn resource_path(&self, root: &Path) -> PathBuf {
        root.join(&self.resource_dir)
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }

    pub fn templates_path(&self, root: &Path) -> PathBuf {
        root.join(&self.templates.path)
    }
}

/// Template lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Directory holding the templates, relative to the project root.
    pub path: String,
    /// Fallback when nothing more specific matches.
    pub default: Option<String>,
    /// Node kind (`document`, `index`, ...) → template.
    pub kinds: BTreeMap<String, String>,
    /// Path glob (`/blog/*`) → template.
    pub routes: BTreeMap<String, String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: "templates".to_string(),
            default: Some("default.html".to_string()),
            kinds: BTreeMap::new(),
            routes: BTreeMap::new(),
        }
    }
}

/// Metadata layering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    /// Keys whose values are unioned across layers instead of replaced.
    pub merge_keys: Vec<String>,
    /// Numeric key used to order siblings.
    pub order_key: String,
    /// Site-wide defaults, below every ancestor's `defaults`.
    pub defaults: Metadata,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            merge_keys: DEFAULT_MERGE_KEYS.iter().map(|k| k.to_string()).collect(),
            order_key: DEFAULT_ORDER_KEY.to_string(),
            defaults: Metadata::new(),
        }
    }
}

/// Incremental build cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// When false, nothing is remembered between builds.
    pub enabled: bool,
    /// Manifest file, relative to the project root.
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_MANIFEST_FILENAME.to_string(),
        }
    }
}

/// Image derivative settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Pixel widths of the resized copies. Empty disables derivatives.
    pub sizes: Vec<u32>,
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            sizes: Vec::new(),
            quality: 85,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Post-render diagnostics. Both only ever produce warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksConfig {
    /// Report `href`/`src` targets starting with `/` that no artifact serves.
    pub links: bool,
    /// Report documents whose effective metadata has no `title`.
    pub titles: bool,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            links: true,
            titles: true,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `config.toml` from the project root.
///
/// A missing file yields the stock defaults.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILENAME))
}

/// Load a config file at an explicit path (`--config`).
pub fn load_config_file(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Quire Configuration
# ===================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Directories, relative to the project root.
content_dir = "content"
static_dir = "static"
resource_dir = "resources"
output_dir = "public"

# ---------------------------------------------------------------------------
# Templates
# ---------------------------------------------------------------------------
[templates]
# Directory of MiniJinja templates. Names are paths relative to it.
path = "templates"

# Used when no more specific rule matches. A page can always pick its own
# template with a `template` key in its front-matter.
default = "default.html"

# Template per node kind: document, index, static, generated.
[templates.kinds]
# index = "list.html"

# Template per path glob; `*` matches across segments. Longest pattern wins.
[templates.routes]
# "/blog/*" = "post.html"

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# Keys whose values are unioned across inherited layers instead of replaced.
merge_keys = ["tags", "categories", "aliases"]

# Numeric key that orders siblings; unkeyed nodes follow, sorted by name.
order_key = "order"

# Site-wide defaults, overridden by each directory's `defaults` mapping.
[metadata.defaults]
# author = "Jane Doe"

# ---------------------------------------------------------------------------
# Incremental cache
# ---------------------------------------------------------------------------
[cache]
enabled = true
path = ".quire-cache.json"

# ---------------------------------------------------------------------------
# Image derivatives
# ---------------------------------------------------------------------------
[images]
# Widths of resized copies written next to each image as <stem>-<width>.<ext>.
# Only widths smaller than the original are generated. Empty disables.
sizes = []

# JPEG encoding quality (1 = worst, 100 = best).
quality = 85

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Checks
# ---------------------------------------------------------------------------
[checks]
# Warn when an href/src starting with "/" matches no output file.
links = true

# Warn when a document has no `title`.
titles = true
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_directories() {
        let config = SiteConfig::default();
        assert_eq!(config.content_dir, "content");
        assert_eq!(config.static_dir, "static");
        assert_eq!(config.output_dir, "public");
        assert_eq!(config.templates.default.as_deref(), Some("default.html"));
        assert_eq!(config.resource_dir, "resources");
        assert!(config.checks.links && config.checks.titles);
    }

    #[test]
    fn default_config_has_metadata_settings() {
        let config = SiteConfig::default();
        assert_eq!(config.metadata.merge_keys, vec!["tags", "categories", "aliases"]);
        assert_eq!(config.metadata.order_key, "order");
        assert!(config.metadata.defaults.is_empty());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.path, ".quire-cache.json");
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
output_dir = "dist"

[images]
sizes = [400, 800]
"##;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output_dir, "dist");
        assert_eq!(config.images.sizes, vec![400, 800]);
        // Unspecified defaults preserved
        assert_eq!(config.images.quality, 85);
        assert_eq!(config.content_dir, "content");
    }

    #[test]
    fn parse_template_tables() {
        let toml = r##"
[templates.kinds]
index = "list.html"

[templates.routes]
"/blog/*" = "post.html"
"##;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.templates.kinds["index"], "list.html");
        assert_eq!(config.templates.routes["/blog/*"], "post.html");
        assert_eq!(config.templates.path, "templates");
    }

    #[test]
    fn parse_metadata_defaults() {
        let toml = r##"
[metadata.defaults]
author = "Ada"
tags = ["site"]
"##;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.metadata.defaults["author"], json!("Ada"));
        assert_eq!(config.metadata.defaults["tags"], json!(["site"]));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output_dir, "public");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r##"
content_dir = "pages"

[cache]
enabled = false
"##,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.content_dir, "pages");
        assert!(!config.cache.enabled);
        // Unspecified values should be defaults
        assert_eq!(config.cache.path, ".quire-cache.json");
    }

    #[test]
    fn load_config_file_at_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        fs::write(&path, "output_dir = \"out\"\n").unwrap();
        assert_eq!(load_config_file(&path).unwrap().output_dir, "out");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 100),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1").unwrap();
        let overlay: toml::Value = toml::from_str("a = 2").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(2));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[images]
sizes = [800]
quality = 85
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[images]
quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["images"]["quality"].as_integer(), Some(70));
        assert_eq!(merged["images"]["sizes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str("keys = [\"a\", \"b\"]").unwrap();
        let overlay: toml::Value = toml::from_str("keys = [\"c\"]").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["keys"].as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // Unknown keys and validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("content_root = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[cache]\nenable = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = SiteConfig::default();
        config.images.quality = 100;
        assert!(config.validate().is_ok());
        config.images.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.images.quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_size_rejected() {
        let mut config = SiteConfig::default();
        config.images.sizes = vec![400, 0];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_unknown_template_kind_rejected() {
        let mut config = SiteConfig::default();
        config.templates.kinds.insert("page".into(), "page.html".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page"));
    }

    #[test]
    fn validate_output_equals_content_rejected() {
        let mut config = SiteConfig::default();
        config.output_dir = "content".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_processes_rejected() {
        let mut config = SiteConfig::default();
        config.processing.max_processes = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[images]\nquality = 200\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        assert!(value.is_table());
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.content_dir, defaults.content_dir);
        assert_eq!(config.output_dir, defaults.output_dir);
        assert_eq!(config.templates.default, defaults.templates.default);
        assert_eq!(config.metadata.merge_keys, defaults.metadata.merge_keys);
        assert_eq!(config.images.sizes, defaults.images.sizes);
        assert_eq!(config.images.quality, defaults.images.quality);
        assert_eq!(config.cache.path, defaults.cache.path);
        assert_eq!(config.resource_dir, defaults.resource_dir);
        assert_eq!(config.checks.links, defaults.checks.links);
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value().unwrap();
        for section in ["templates", "metadata", "cache", "images", "processing", "checks"] {
            assert!(value.get(section).is_some(), "missing [{section}]");
        }
    }
}
