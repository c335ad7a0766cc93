//! Content transformers.
//!
//! A [`Transformer`] turns a node's raw payload into the content handed to
//! the template (or, for static files, into the bytes written out). They are
//! looked up in a [`TransformerRegistry`] by the node's source format first
//! and by node kind second; among entries with equal keys the first
//! registered wins.

use crate::cache::{hash_bytes, hash_parts};
use crate::error::StageError;
use crate::metadata::Metadata;
use crate::node::{Node, NodeKind};
use pulldown_cmark::{Options, Parser, html};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Output of a transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Html(String),
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Textual form for the template context.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Content::Html(s) | Content::Text(s) => std::borrow::Cow::Borrowed(s),
            Content::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Html(s) | Content::Text(s) => s.into_bytes(),
            Content::Bytes(b) => b,
        }
    }
}

pub trait Transformer: Send + Sync {
    fn id(&self) -> &str;

    /// Hash of the configuration that influences the output.
    fn config_hash(&self) -> String {
        String::new()
    }

    /// Extension of the output when the transformer changes the file type
    /// of a static asset (`scss` → `css`). `None` keeps the source path.
    fn output_extension(&self) -> Option<&str> {
        None
    }

    fn transform(&self, body: &[u8], metadata: &Metadata) -> Result<Content, StageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKey {
    /// Source format, compared case-insensitively.
    Format(String),
    Kind(NodeKind),
}

impl TransformKey {
    pub fn format(format: impl Into<String>) -> Self {
        Self::Format(format.into())
    }
}

#[derive(Default, Clone)]
pub struct TransformerRegistry {
    entries: Vec<(TransformKey, Arc<dyn Transformer>)>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markdown for `md`/`markdown`, pass-through for `html`/`htm`, CSS
    /// compilation for `scss`/`sass`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let markdown = Arc::new(MarkdownTransformer::default());
        let passthrough = Arc::new(HtmlTransformer);
        registry
            .register_shared(TransformKey::format("md"), markdown.clone())
            .register_shared(TransformKey::format("markdown"), markdown)
            .register_shared(TransformKey::format("html"), passthrough.clone())
            .register_shared(TransformKey::format("htm"), passthrough)
            .register(TransformKey::format("scss"), SassTransformer::scss())
            .register(TransformKey::format("sass"), SassTransformer::sass());
        registry
    }

    /// Replace every entry under `key`, or append when there is none.
    pub fn set(&mut self, key: TransformKey, transformer: impl Transformer + 'static) -> &mut Self {
        let transformer: Arc<dyn Transformer> = Arc::new(transformer);
        let mut replaced = false;
        for (existing, slot) in &mut self.entries {
            if *existing == key {
                *slot = Arc::clone(&transformer);
                replaced = true;
            }
        }
        if !replaced {
            self.entries.push((key, transformer));
        }
        self
    }

    pub fn register(&mut self, key: TransformKey, transformer: impl Transformer + 'static) -> &mut Self {
        self.register_shared(key, Arc::new(transformer))
    }

    pub fn register_shared(&mut self, key: TransformKey, transformer: Arc<dyn Transformer>) -> &mut Self {
        self.entries.push((key, transformer));
        self
    }

    /// Transformer for a node: by format, then by kind.
    pub fn lookup(&self, node: &Node) -> Option<Arc<dyn Transformer>> {
        self.lookup_for(node.format(), node.kind())
    }

    /// Transformer for a static asset. Only transformers that change the
    /// file type apply; everything else is copied byte for byte.
    pub fn lookup_asset(&self, node: &Node) -> Option<Arc<dyn Transformer>> {
        self.lookup(node).filter(|t| t.output_extension().is_some())
    }

    pub fn lookup_for(&self, format: Option<&str>, kind: NodeKind) -> Option<Arc<dyn Transformer>> {
        let by_format = format.and_then(|format| {
            self.entries.iter().find(|(key, _)| {
                matches!(key, TransformKey::Format(f) if f.eq_ignore_ascii_case(format))
            })
        });
        by_format
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(key, _)| *key == TransformKey::Kind(kind))
            })
            .map(|(_, transformer)| Arc::clone(transformer))
    }
}

/// CommonMark with tables, footnotes, strikethrough and task lists.
#[derive(Debug, Clone)]
pub struct MarkdownTransformer {
    options: Options,
}

impl Default for MarkdownTransformer {
    fn default() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }
}

impl MarkdownTransformer {
    pub fn with_options(options: Options) -> Self {
        Self { options }
    }
}

impl Transformer for MarkdownTransformer {
    fn id(&self) -> &str {
        "markdown"
    }

    fn config_hash(&self) -> String {
        hash_parts([self.options.bits().to_le_bytes()])
    }

    fn transform(&self, body: &[u8], _metadata: &Metadata) -> Result<Content, StageError> {
        let text = String::from_utf8_lossy(body);
        let parser = Parser::new_ext(&text, self.options);
        let mut out = String::new();
        html::push_html(&mut out, parser);
        Ok(Content::Html(out))
    }
}

/// HTML fragments used as-is.
#[derive(Debug, Clone, Copy)]
pub struct HtmlTransformer;

impl Transformer for HtmlTransformer {
    fn id(&self) -> &str {
        "html"
    }

    fn transform(&self, body: &[u8], _metadata: &Metadata) -> Result<Content, StageError> {
        Ok(Content::Html(String::from_utf8_lossy(body).into_owned()))
    }
}

/// Sass partials (`_name.scss`) are only ever imported, never emitted.
pub fn is_sass_partial(path: &Path) -> bool {
    let is_sass = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("scss") || e.eq_ignore_ascii_case("sass"));
    is_sass
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('_'))
}

/// Compiles SCSS or indented Sass to CSS with `grass`.
///
/// `@import`/`@use` resolve against the configured load path. The config
/// hash covers every stylesheet below it, so editing a partial recompiles
/// the stylesheets that may import it.
#[derive(Debug, Clone)]
pub struct SassTransformer {
    indented: bool,
    load_path: Option<PathBuf>,
    sources: String,
}

impl SassTransformer {
    pub fn scss() -> Self {
        Self {
            indented: false,
            load_path: None,
            sources: String::new(),
        }
    }

    pub fn sass() -> Self {
        Self {
            indented: true,
            ..Self::scss()
        }
    }

    pub fn with_load_path(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.sources = stylesheet_sources_hash(&dir);
        self.load_path = Some(dir);
        self
    }
}

/// Hash over the relative path and content of every Sass file below `dir`.
/// A missing directory hashes like an empty one.
fn stylesheet_sources_hash(dir: &Path) -> String {
    let mut parts = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "stylesheet scan stopped");
                break;
            }
        };
        let path = entry.path();
        let is_sass = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "scss" | "sass"));
        if !entry.file_type().is_file() || !is_sass {
            continue;
        }
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        let rel = path.strip_prefix(dir).unwrap_or(path);
        parts.push(rel.to_string_lossy().into_owned());
        parts.push(hash_bytes(&bytes));
    }
    hash_parts(parts)
}

impl Transformer for SassTransformer {
    fn id(&self) -> &str {
        if self.indented { "sass" } else { "scss" }
    }

    fn config_hash(&self) -> String {
        let load_path = self
            .load_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        hash_parts([load_path.as_str(), self.sources.as_str()])
    }

    fn output_extension(&self) -> Option<&str> {
        Some("css")
    }

    fn transform(&self, body: &[u8], _metadata: &Metadata) -> Result<Content, StageError> {
        let syntax = if self.indented {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };
        let mut options = grass::Options::default().input_syntax(syntax);
        if let Some(dir) = &self.load_path {
            options = options.load_path(dir);
        }
        let source = String::from_utf8_lossy(body).into_owned();
        let css = grass::from_string(source, &options).map_err(|e| StageError::Transform {
            transformer: self.id().to_string(),
            message: e.to_string(),
        })?;
        Ok(Content::Text(css))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeSpec, Payload, SiteTree};
    use crate::path::SitePath;

    struct Upper;

    impl Transformer for Upper {
        fn id(&self) -> &str {
            "upper"
        }
        fn output_extension(&self) -> Option<&str> {
            Some("txt")
        }
        fn transform(&self, body: &[u8], _: &Metadata) -> Result<Content, StageError> {
            Ok(Content::Text(String::from_utf8_lossy(body).to_uppercase()))
        }
    }

    #[test]
    fn markdown_renders_html() {
        let out = MarkdownTransformer::default()
            .transform(b"# Title\n\nSome *text*", &Metadata::new())
            .unwrap();
        assert_eq!(
            out,
            Content::Html("<h1>Title</h1>\n<p>Some <em>text</em></p>\n".into())
        );
    }

    #[test]
    fn markdown_tables_enabled() {
        let out = MarkdownTransformer::default()
            .transform(b"| a |\n|---|\n| b |\n", &Metadata::new())
            .unwrap();
        assert!(out.as_text().contains("<table>"));
    }

    #[test]
    fn lookup_prefers_format_over_kind() {
        let mut registry = TransformerRegistry::with_defaults();
        registry.register(TransformKey::Kind(NodeKind::Document), Upper);

        let md = registry.lookup_for(Some("MD"), NodeKind::Document).unwrap();
        assert_eq!(md.id(), "markdown");

        let rst = registry.lookup_for(Some("rst"), NodeKind::Document).unwrap();
        assert_eq!(rst.id(), "upper");

        assert!(registry.lookup_for(Some("rst"), NodeKind::Static).is_none());
    }

    #[test]
    fn asset_lookup_requires_output_extension() {
        let mut registry = TransformerRegistry::with_defaults();
        registry.register(TransformKey::format("up"), Upper);
        let mut tree = SiteTree::new();
        tree.add_node(
            SitePath::root(),
            NodeSpec::new(NodeKind::Index, Payload::Empty, Metadata::new()),
        )
        .unwrap();
        for (path, format) in [("/notes.md", "md"), ("/shout.up", "up")] {
            tree.add_node(
                SitePath::parse(path).unwrap(),
                NodeSpec::new(NodeKind::Static, Payload::Empty, Metadata::new())
                    .format(format),
            )
            .unwrap();
        }
        let get = |s: &str| tree.get(&SitePath::parse(s).unwrap()).unwrap();
        assert!(registry.lookup_asset(get("/notes.md")).is_none());
        assert_eq!(registry.lookup_asset(get("/shout.up")).unwrap().id(), "upper");
    }

    #[test]
    fn first_registration_wins_on_equal_keys() {
        let mut registry = TransformerRegistry::new();
        registry
            .register(TransformKey::format("txt"), Upper)
            .register(TransformKey::format("txt"), HtmlTransformer);
        assert_eq!(
            registry.lookup_for(Some("txt"), NodeKind::Static).unwrap().id(),
            "upper"
        );
    }

    // =========================================================================
    // Sass
    // =========================================================================

    #[test]
    fn scss_compiles_to_css() {
        let out = SassTransformer::scss()
            .transform(b"$c: red;\na { b { color: $c; } }", &Metadata::new())
            .unwrap();
        let css = out.as_text();
        assert!(css.contains("a b"), "{css}");
        assert!(css.contains("color: red"), "{css}");
    }

    #[test]
    fn indented_sass_compiles_to_css() {
        let out = SassTransformer::sass()
            .transform(b"a\n  color: blue\n", &Metadata::new())
            .unwrap();
        assert!(out.as_text().contains("color: blue"));
    }

    #[test]
    fn scss_imports_partial_from_load_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("_vars.scss"), "$w: 3px;").unwrap();
        let out = SassTransformer::scss()
            .with_load_path(tmp.path())
            .transform(b"@import 'vars';\np { margin: $w; }", &Metadata::new())
            .unwrap();
        assert!(out.as_text().contains("margin: 3px"));
    }

    #[test]
    fn editing_a_partial_changes_config_hash() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("_vars.scss"), "$w: 3px;").unwrap();
        let before = SassTransformer::scss().with_load_path(tmp.path()).config_hash();
        std::fs::write(tmp.path().join("_vars.scss"), "$w: 4px;").unwrap();
        let after = SassTransformer::scss().with_load_path(tmp.path()).config_hash();
        assert_ne!(before, after);
    }

    #[test]
    fn invalid_scss_is_transform_failure() {
        let err = SassTransformer::scss()
            .transform(b"a { color: ", &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, StageError::Transform { ref transformer, .. } if transformer == "scss"));
    }

    #[test]
    fn scss_is_a_default_asset_transformer() {
        let registry = TransformerRegistry::with_defaults();
        let t = registry.lookup_for(Some("scss"), NodeKind::Static).unwrap();
        assert_eq!(t.output_extension(), Some("css"));
    }

    #[test]
    fn set_replaces_existing_entry() {
        let mut registry = TransformerRegistry::with_defaults();
        registry.set(TransformKey::format("scss"), Upper);
        assert_eq!(
            registry.lookup_for(Some("scss"), NodeKind::Static).unwrap().id(),
            "upper"
        );
        registry.set(TransformKey::format("up"), Upper);
        assert!(registry.lookup_for(Some("up"), NodeKind::Static).is_some());
    }

    #[test]
    fn partials_are_recognised_by_leading_underscore() {
        assert!(is_sass_partial(Path::new("css/_vars.scss")));
        assert!(is_sass_partial(Path::new("_mixins.SASS")));
        assert!(!is_sass_partial(Path::new("css/site.scss")));
        assert!(!is_sass_partial(Path::new("_notes.md")));
    }

    #[test]
    fn content_bytes_round_trip() {
        assert_eq!(Content::Text("hi".into()).into_bytes(), b"hi");
        assert_eq!(Content::Bytes(vec![0xff]).as_text(), "\u{fffd}");
    }
}
