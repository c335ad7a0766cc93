//! Source collection: from files to a [`SiteTree`].
//!
//! Collection is the only phase that touches the source side. It reads
//! every item a [`ContentSource`] yields, classifies it, extracts metadata,
//! and inserts the resulting nodes top-down.
//!
//! ```text
//! content/                     tree
//! ├── index.md          →      /               Document (branch)
//! ├── about.md          →      /about          Document
//! ├── blog/                    /blog           Index (branch, synthesized)
//! │   ├── first.md      →      /blog/first     Document
//! │   └── authors.yaml  →      /blog/authors   Data
//! resources/
//! ├── css/site.scss     →      /css/site.scss  Static, written as site.css
//! └── css/_vars.scss           (partial, only imported)
//! static/
//! └── img/
//!     ├── logo.png      →      /img/logo.png   Static (+ image_size)
//!     └── logo.meta            (sidecar, merged into /img/logo.png)
//! ```
//!
//! ## Rules
//!
//! - **Documents** lose their extension. `index.*` and `_index.*` become
//!   the node of their directory. Front-matter is split off the body.
//! - **Data** files lose their extension; the whole file is parsed into
//!   metadata.
//! - **Static** files keep their path. A YAML `<stem>.meta` sidecar next to
//!   the file adds metadata. Images get a built-in `image_size`.
//! - Directories without an index document become **Index** nodes. The
//!   root always exists.
//!
//! Problems with a single item (bad front-matter, duplicate paths) are
//! warnings: the item is skipped or created with empty metadata, and the
//! rest of the site is still collected.

use crate::cache::hash_bytes;
use crate::frontmatter::{self, MetadataFormat};
use crate::imaging::{image_dimensions, is_supported_image};
use crate::metadata::{IMAGE_SIZE_KEY, Metadata};
use crate::node::{DEFAULT_ORDER_KEY, NodeKind, NodeSpec, Payload, SiteTree};
use crate::path::{PathError, SitePath};
use crate::report::Diagnostic;
use crate::signal::{EventKind, Signal, SignalBus};
use crate::transform::is_sass_partial;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const SIDECAR_EXTENSION: &str = "meta";
const INDEX_STEMS: &[&str] = &["index", "_index"];

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("content directory not found: {0}")]
    MissingRoot(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid source path: {0}")]
    Path(#[from] PathError),
}

/// One raw item from a content source.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Path relative to the source root, extension included.
    pub path: SitePath,
    /// Forces the node kind, bypassing the classifier.
    pub kind_hint: Option<NodeKind>,
    pub bytes: Vec<u8>,
    pub modified: Option<SystemTime>,
    /// File the bytes were read from, if any.
    pub origin: Option<PathBuf>,
}

impl SourceItem {
    pub fn new(path: SitePath, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            kind_hint: None,
            bytes: bytes.into(),
            modified: None,
            origin: None,
        }
    }

    pub fn kind_hint(mut self, kind: NodeKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }

    fn extension(&self) -> Option<String> {
        self.path.extension().map(str::to_ascii_lowercase)
    }
}

pub trait ContentSource {
    fn enumerate(&self) -> Result<Vec<SourceItem>, CollectError>;
}

struct SourceRoot {
    dir: PathBuf,
    kind_hint: Option<NodeKind>,
    required: bool,
    skip_partials: bool,
}

/// Files below one or more directories, merged into one namespace.
pub struct FsSource {
    roots: Vec<SourceRoot>,
}

impl FsSource {
    /// Source over a single, required content directory.
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![SourceRoot {
                dir: content_dir.into(),
                kind_hint: None,
                required: true,
                skip_partials: false,
            }],
        }
    }

    /// Add an optional directory whose files are all Static.
    pub fn with_static_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.roots.push(SourceRoot {
            dir: dir.into(),
            kind_hint: Some(NodeKind::Static),
            required: false,
            skip_partials: false,
        });
        self
    }

    /// Add an optional directory of stylesheet sources. Its files are
    /// Static; Sass partials are left out of the tree.
    pub fn with_resource_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.roots.push(SourceRoot {
            dir: dir.into(),
            kind_hint: Some(NodeKind::Static),
            required: false,
            skip_partials: true,
        });
        self
    }

    fn enumerate_root(root: &SourceRoot, items: &mut Vec<SourceItem>) -> Result<(), CollectError> {
        let walker = WalkDir::new(&root.dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file = entry.path();
            if root.skip_partials && is_sass_partial(file) {
                continue;
            }
            let rel = file.strip_prefix(&root.dir).unwrap_or(file);
            let io_err = |source| CollectError::Io {
                path: file.to_path_buf(),
                source,
            };
            let bytes = std::fs::read(file).map_err(io_err)?;
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            items.push(SourceItem {
                path: SitePath::from_relative(rel)?,
                kind_hint: root.kind_hint,
                bytes,
                modified,
                origin: Some(file.to_path_buf()),
            });
        }
        Ok(())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

impl ContentSource for FsSource {
    fn enumerate(&self) -> Result<Vec<SourceItem>, CollectError> {
        let mut items = Vec::new();
        for root in &self.roots {
            if !root.dir.is_dir() {
                if root.required {
                    return Err(CollectError::MissingRoot(root.dir.clone()));
                }
                debug!(dir = %root.dir.display(), "optional source directory missing");
                continue;
            }
            Self::enumerate_root(root, &mut items)?;
        }
        Ok(items)
    }
}

/// In-memory source for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    items: Vec<SourceItem>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file at `path`, extension included.
    pub fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Result<Self, PathError> {
        self.items.push(SourceItem::new(SitePath::parse(path)?, content));
        Ok(self)
    }

    pub fn item(mut self, item: SourceItem) -> Self {
        self.items.push(item);
        self
    }
}

impl ContentSource for MemorySource {
    fn enumerate(&self) -> Result<Vec<SourceItem>, CollectError> {
        Ok(self.items.clone())
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone)]
pub enum ClassifierRule {
    /// Matches a case-insensitive extension.
    Extensions(Vec<String>, NodeKind),
    /// Matches the item path against a glob (see [`crate::path::glob_match`]).
    Pattern(String, NodeKind),
}

impl ClassifierRule {
    fn matches(&self, item: &SourceItem) -> Option<NodeKind> {
        match self {
            ClassifierRule::Extensions(exts, kind) => {
                let ext = item.extension()?;
                exts.iter().any(|e| *e == ext).then_some(*kind)
            }
            ClassifierRule::Pattern(pattern, kind) => item.path.matches(pattern).then_some(*kind),
        }
    }
}

/// Ordered rule chain deciding the kind of a source item. First match
/// wins; unmatched items are Static.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassifierRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        let exts = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            rules: vec![
                ClassifierRule::Extensions(exts(&["md", "markdown", "html", "htm"]), NodeKind::Document),
                ClassifierRule::Extensions(exts(&["yaml", "yml", "toml", "json"]), NodeKind::Data),
            ],
        }
    }
}

impl Classifier {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule after the existing ones.
    pub fn push(&mut self, rule: ClassifierRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of the existing ones.
    pub fn push_front(&mut self, rule: ClassifierRule) -> &mut Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn classify(&self, item: &SourceItem) -> NodeKind {
        if let Some(kind) = item.kind_hint {
            return kind;
        }
        self.rules
            .iter()
            .find_map(|rule| rule.matches(item))
            .unwrap_or(NodeKind::Static)
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Outcome of a collection run.
#[derive(Debug)]
pub struct Collected {
    pub tree: SiteTree,
    pub diagnostics: Vec<Diagnostic>,
}

struct Candidate {
    path: SitePath,
    /// Item the candidate came from; `None` for synthesized directories.
    source: Option<SitePath>,
    spec: NodeSpec,
}

pub struct Collector<'a> {
    classifier: &'a Classifier,
    bus: Option<&'a SignalBus>,
    order_key: String,
}

impl<'a> Collector<'a> {
    pub fn new(classifier: &'a Classifier) -> Self {
        Self {
            classifier,
            bus: None,
            order_key: DEFAULT_ORDER_KEY.to_string(),
        }
    }

    /// Emit `NodeDiscovered` on this bus for every inserted node.
    pub fn with_bus(mut self, bus: &'a SignalBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_order_key(mut self, key: impl Into<String>) -> Self {
        self.order_key = key.into();
        self
    }

    pub fn collect(&self, source: &dyn ContentSource) -> Result<Collected, CollectError> {
        let items = source.enumerate()?;
        let mut diagnostics = Vec::new();

        let (sidecars, items): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| item.extension().as_deref() == Some(SIDECAR_EXTENSION));
        let mut sidecars: HashMap<SitePath, SourceItem> = sidecars
            .into_iter()
            .map(|item| (item.path.clone(), item))
            .collect();

        let mut candidates: Vec<Candidate> = items
            .into_iter()
            .map(|item| {
                let kind = self.classifier.classify(&item);
                self.candidate(item, kind, &mut sidecars, &mut diagnostics)
            })
            .collect();

        for unused in sidecars.keys() {
            debug!(path = %unused, "sidecar without a matching static file");
        }

        synthesize_directories(&mut candidates);
        candidates.sort_by(|a, b| {
            (a.path.depth(), &a.path, &a.source).cmp(&(b.path.depth(), &b.path, &b.source))
        });

        let mut tree = SiteTree::new().with_order_key(self.order_key.clone());
        for candidate in candidates {
            let path = candidate.path.clone();
            let overrides = match tree.add_node(candidate.path, candidate.spec) {
                Ok(node) => {
                    let mut overrides = Metadata::new();
                    if let Some(bus) = self
                        .bus
                        .filter(|bus| bus.has_subscribers(EventKind::NodeDiscovered))
                    {
                        bus.emit(&mut Signal::NodeDiscovered {
                            node,
                            overrides: &mut overrides,
                        });
                    }
                    overrides
                }
                Err(e) => {
                    let from = candidate
                        .source
                        .map(|s| format!(" (from {s})"))
                        .unwrap_or_default();
                    diagnostics.push(Diagnostic::warning(Some(path), format!("{e}{from}")));
                    continue;
                }
            };
            // The path was just inserted, so this cannot miss.
            let _ = tree.set_overrides(&path, overrides);
        }
        tree.refresh_fingerprints();

        Ok(Collected { tree, diagnostics })
    }

    fn candidate(
        &self,
        item: SourceItem,
        kind: NodeKind,
        sidecars: &mut HashMap<SitePath, SourceItem>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Candidate {
        let format = item.extension();
        let source_path = item.path.clone();
        let mut warn = |message: String| {
            diagnostics.push(Diagnostic::warning(Some(source_path.clone()), message));
        };

        let mut branch = false;
        let (path, payload, metadata) = match kind {
            NodeKind::Document => {
                let extracted = frontmatter::extract(&item.bytes);
                if let Some(e) = extracted.error {
                    warn(format!("ignoring front-matter: {e}"));
                }
                let is_index = item
                    .path
                    .file_stem()
                    .is_some_and(|stem| INDEX_STEMS.contains(&stem));
                let path = if is_index {
                    branch = true;
                    item.path.parent().unwrap_or_default()
                } else {
                    item.path.with_extension("")
                };
                (path, Payload::Inline(extracted.body), extracted.metadata)
            }
            NodeKind::Data => {
                let metadata = match format.as_deref().and_then(MetadataFormat::from_extension) {
                    Some(fmt) => {
                        let text = String::from_utf8_lossy(&item.bytes);
                        frontmatter::parse(fmt, &text).unwrap_or_else(|e| {
                            warn(format!("ignoring malformed data: {e}"));
                            Metadata::new()
                        })
                    }
                    None => Metadata::new(),
                };
                let path = item.path.with_extension("");
                (path, Payload::Inline(item.bytes), metadata)
            }
            NodeKind::Static => {
                let mut metadata = Metadata::new();
                if is_supported_image(&item.path)
                    && let Some((w, h)) = image_dimensions(&item.bytes)
                {
                    metadata.insert(IMAGE_SIZE_KEY.into(), Value::from(vec![w, h]));
                }
                if let Some(sidecar) = sidecars.remove(&item.path.with_extension(SIDECAR_EXTENSION)) {
                    let text = String::from_utf8_lossy(&sidecar.bytes);
                    match frontmatter::parse(MetadataFormat::Yaml, &text) {
                        Ok(declared) => metadata.extend(declared),
                        Err(e) => warn(format!("ignoring malformed sidecar {}: {e}", sidecar.path)),
                    }
                }
                let payload = match &item.origin {
                    Some(origin) => Payload::External {
                        path: origin.clone(),
                        fingerprint: hash_bytes(&item.bytes),
                    },
                    None => Payload::Inline(item.bytes),
                };
                (item.path.clone(), payload, metadata)
            }
            NodeKind::Index => {
                branch = true;
                (item.path.clone(), Payload::Inline(item.bytes), Metadata::new())
            }
            NodeKind::Generated => (item.path.clone(), Payload::Inline(item.bytes), Metadata::new()),
        };

        let mut spec = NodeSpec::new(kind, payload, metadata)
            .branch(branch)
            .modified(item.modified);
        if let Some(format) = format {
            spec = spec.format(format);
        }
        if let Some(origin) = item.origin {
            spec = spec.source(origin);
        }
        Candidate {
            path,
            source: Some(item.path),
            spec,
        }
    }
}

/// Add Index candidates for every directory (and the root) that has no
/// candidate of its own.
fn synthesize_directories(candidates: &mut Vec<Candidate>) {
    let existing: BTreeSet<SitePath> = candidates.iter().map(|c| c.path.clone()).collect();
    let mut missing: BTreeSet<SitePath> = BTreeSet::new();
    missing.insert(SitePath::root());
    for candidate in candidates.iter() {
        missing.extend(candidate.path.ancestors());
    }
    for dir in missing.into_iter().filter(|d| !existing.contains(d)) {
        candidates.push(Candidate {
            path: dir,
            source: None,
            spec: NodeSpec::new(NodeKind::Index, Payload::Empty, Metadata::new()).branch(true),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::memory_source;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn p(s: &str) -> SitePath {
        SitePath::parse(s).unwrap()
    }

    fn collect(source: &MemorySource) -> Collected {
        Collector::new(&Classifier::default()).collect(source).unwrap()
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn default_classification() {
        let c = Classifier::default();
        let kind = |path: &str| c.classify(&SourceItem::new(p(path), ""));
        assert_eq!(kind("/a.md"), NodeKind::Document);
        assert_eq!(kind("/a.HTML"), NodeKind::Document);
        assert_eq!(kind("/a.yml"), NodeKind::Data);
        assert_eq!(kind("/a.json"), NodeKind::Data);
        assert_eq!(kind("/a.png"), NodeKind::Static);
        assert_eq!(kind("/README"), NodeKind::Static);
    }

    #[test]
    fn hint_and_front_rules_win() {
        let mut c = Classifier::default();
        c.push_front(ClassifierRule::Pattern("/raw/*".into(), NodeKind::Static));
        assert_eq!(c.classify(&SourceItem::new(p("/raw/a.md"), "")), NodeKind::Static);
        assert_eq!(
            c.classify(&SourceItem::new(p("/a.png"), "").kind_hint(NodeKind::Generated)),
            NodeKind::Generated
        );
    }

    // =========================================================================
    // Tree shape
    // =========================================================================

    #[test]
    fn index_document_becomes_directory_node() {
        let out = collect(
            &memory_source(&[
                ("/index.md", "Hello"),
                ("/about.md", "About"),
                ("/blog/_index.md", "Blog"),
                ("/blog/first.md", "First"),
            ]),
        );
        assert!(out.diagnostics.is_empty());
        let tree = &out.tree;
        assert_eq!(tree.len(), 4);

        let root = tree.root().unwrap();
        assert_eq!(root.kind(), NodeKind::Document);
        assert!(root.is_branch());
        assert_eq!(tree.get(&p("/about")).unwrap().kind(), NodeKind::Document);
        let blog = tree.get(&p("/blog")).unwrap();
        assert_eq!(blog.kind(), NodeKind::Document);
        assert!(blog.is_branch());
        assert_eq!(blog.format(), Some("md"));
        assert!(tree.contains(&p("/blog/first")));
    }

    #[test]
    fn missing_directories_become_index_nodes() {
        let out = collect(&memory_source(&[("/docs/guide/intro.md", "x")]));
        let tree = &out.tree;
        for dir in ["/", "/docs", "/docs/guide"] {
            let node = tree.get(&p(dir)).unwrap();
            assert_eq!(node.kind(), NodeKind::Index, "{dir}");
            assert!(node.is_branch());
        }
    }

    #[test]
    fn empty_source_still_has_root() {
        let out = collect(&MemorySource::new());
        assert_eq!(out.tree.len(), 1);
        assert_eq!(out.tree.root().unwrap().kind(), NodeKind::Index);
    }

    #[test]
    fn duplicate_node_path_is_warning() {
        let out = collect(
            &memory_source(&[("/about.md", "md"), ("/about.html", "html")]),
        );
        assert_eq!(out.tree.len(), 2);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].path, Some(p("/about")));
        // sorted by source path: about.html wins
        assert_eq!(out.tree.get(&p("/about")).unwrap().format(), Some("html"));
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    #[test]
    fn front_matter_split_from_body() {
        let out = collect(
            &memory_source(&[("/post.md", "---\ntitle: Post\norder: 2\n---\nBody")]),
        );
        let node = out.tree.get(&p("/post")).unwrap();
        assert_eq!(node.metadata()["title"], json!("Post"));
        assert_eq!(node.payload().bytes().unwrap().as_ref(), b"Body");
    }

    #[test]
    fn malformed_front_matter_is_warning_with_empty_metadata() {
        let out = collect(&memory_source(&[("/post.md", "---\ntitle: [x\n---\nBody")]));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].path, Some(p("/post.md")));
        assert!(out.tree.get(&p("/post")).unwrap().metadata().is_empty());
    }

    #[test]
    fn data_files_parse_into_metadata() {
        let out = collect(
            &memory_source(&[
                ("/authors.yaml", "ada: {name: Ada}"),
                ("/site.toml", "title = \"Site\""),
                ("/bad.json", "{nope"),
            ]),
        );
        assert_eq!(
            out.tree.get(&p("/authors")).unwrap().metadata()["ada"]["name"],
            json!("Ada")
        );
        assert_eq!(out.tree.get(&p("/site")).unwrap().kind(), NodeKind::Data);
        assert!(out.tree.get(&p("/bad")).unwrap().metadata().is_empty());
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn sidecar_metadata_attached_to_static_file() {
        let out = collect(
            &memory_source(&[
                ("/files/report.pdf", "%PDF"),
                ("/files/report.meta", "title: Annual report\n"),
            ]),
        );
        let tree = &out.tree;
        let node = tree.get(&p("/files/report.pdf")).unwrap();
        assert_eq!(node.kind(), NodeKind::Static);
        assert_eq!(node.metadata()["title"], json!("Annual report"));
        assert!(!tree.contains(&p("/files/report.meta")));
        assert!(!tree.contains(&p("/files/report")));
    }

    // =========================================================================
    // Signals
    // =========================================================================

    #[test]
    fn discovered_handlers_add_overrides() {
        let bus = SignalBus::new();
        bus.subscribe(EventKind::NodeDiscovered, |signal| {
            if let Signal::NodeDiscovered { node, overrides } = signal
                && node.kind() == NodeKind::Document
            {
                overrides.insert("seen".into(), json!(true));
            }
            Ok(())
        });
        let classifier = Classifier::default();
        let out = Collector::new(&classifier)
            .with_bus(&bus)
            .collect(&memory_source(&[("/a.md", "x")]))
            .unwrap();
        assert_eq!(out.tree.get(&p("/a")).unwrap().overrides()["seen"], json!(true));
        assert!(out.tree.root().unwrap().overrides().is_empty());
    }

    // =========================================================================
    // Filesystem source
    // =========================================================================

    #[test]
    fn fs_source_merges_roots_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        let statics = tmp.path().join("static");
        fs::create_dir_all(content.join("blog")).unwrap();
        fs::create_dir_all(statics.join("css")).unwrap();
        fs::write(content.join("index.md"), "Home").unwrap();
        fs::write(content.join("blog/post.md"), "Post").unwrap();
        fs::write(content.join(".draft.md"), "Hidden").unwrap();
        fs::write(statics.join("css/site.css"), "body{}").unwrap();
        fs::write(statics.join("notes.md"), "raw").unwrap();

        let source = FsSource::new(&content).with_static_root(&statics);
        let classifier = Classifier::default();
        let out = Collector::new(&classifier).collect(&source).unwrap();
        let tree = &out.tree;

        assert!(tree.contains(&p("/blog/post")));
        assert!(!tree.contains(&p("/.draft")));
        let css = tree.get(&p("/css/site.css")).unwrap();
        assert_eq!(css.kind(), NodeKind::Static);
        assert!(matches!(css.payload(), Payload::External { .. }));
        assert_eq!(css.fingerprint(), hash_bytes(b"body{}"));
        // files in the static root are never documents
        assert_eq!(tree.get(&p("/notes.md")).unwrap().kind(), NodeKind::Static);
    }

    #[test]
    fn resource_root_keeps_stylesheets_and_drops_partials() {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        let resources = tmp.path().join("resources");
        fs::create_dir_all(&content).unwrap();
        fs::create_dir_all(resources.join("css")).unwrap();
        fs::write(resources.join("css/site.scss"), "@import 'vars';").unwrap();
        fs::write(resources.join("css/_vars.scss"), "$c: red;").unwrap();

        let source = FsSource::new(&content).with_resource_root(&resources);
        let classifier = Classifier::default();
        let tree = Collector::new(&classifier).collect(&source).unwrap().tree;

        let sheet = tree.get(&p("/css/site.scss")).unwrap();
        assert_eq!(sheet.kind(), NodeKind::Static);
        assert_eq!(sheet.format(), Some("scss"));
        assert!(!tree.contains(&p("/css/_vars.scss")));
    }

    #[test]
    fn memory_source_rejects_escaping_path() {
        let err = MemorySource::new().file("/../secret.md", "x").unwrap_err();
        assert!(matches!(err, PathError::InvalidSegment { .. }));
        assert!(MemorySource::new().file("/ok.md", "x").is_ok());
    }

    #[test]
    fn fs_source_missing_content_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = FsSource::new(tmp.path().join("nope")).enumerate().unwrap_err();
        assert!(matches!(err, CollectError::MissingRoot(_)));
    }

    #[test]
    fn fs_source_missing_static_dir_is_fine() {
        let tmp = TempDir::new().unwrap();
        let items = FsSource::new(tmp.path())
            .with_static_root(tmp.path().join("nope"))
            .enumerate()
            .unwrap();
        assert!(items.is_empty());
    }
}
