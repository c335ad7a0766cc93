//! Shared test utilities.
//!
//! Provides a mutable copy of the fixture project, lookup helpers over
//! build reports and site trees, in-memory sources, and a sink that fails
//! on demand.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let report = build_fixture(tmp.path());
//!
//! assert_rendered(&report, "/blog/first");
//! let html = read_output(tmp.path(), "blog/first.html");
//! assert!(html.contains("First Post"));
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::builder::build_project;
use crate::collect::MemorySource;
use crate::writer::{MemorySink, OutputSink};
use crate::config::load_config;
use crate::node::{Node, SiteTree};
use crate::path::SitePath;
use crate::report::{BuildReport, NodeStatus};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Load the project's config and build it with the cache enabled.
pub fn build_fixture(root: &Path) -> BuildReport {
    let config = load_config(root).unwrap();
    build_project(root, config, true).unwrap()
}

/// Read a file from the project's output directory. Panics if missing.
pub fn read_output(root: &Path, relative: &str) -> String {
    let path = root.join("public").join(relative);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("output {} not readable: {e}", path.display()))
}

// =========================================================================
// Lookups: panic with a clear message on miss
// =========================================================================

pub fn site_path(s: &str) -> SitePath {
    SitePath::parse(s).unwrap_or_else(|e| panic!("bad site path '{s}': {e}"))
}

/// Find a node by path. Panics if not found.
pub fn find_node<'a>(tree: &'a SiteTree, path: &str) -> &'a Node {
    tree.get(&site_path(path)).unwrap_or_else(|_| {
        let paths: Vec<String> = tree.walk().map(|n| n.path().to_string()).collect();
        panic!("node '{path}' not found. Available: {paths:?}")
    })
}

/// Status of a node in a report. Panics if the node was not processed.
pub fn status_of<'a>(report: &'a BuildReport, path: &str) -> &'a NodeStatus {
    report.status_of(&site_path(path)).unwrap_or_else(|| {
        let paths: Vec<String> = report.nodes.iter().map(|n| n.path.to_string()).collect();
        panic!("node '{path}' not in report. Processed: {paths:?}")
    })
}

// =========================================================================
// Assertions
// =========================================================================

pub fn assert_rendered(report: &BuildReport, path: &str) {
    match status_of(report, path) {
        NodeStatus::Rendered { .. } => {}
        other => panic!("expected '{path}' rendered, got {other:?}"),
    }
}

pub fn assert_skipped(report: &BuildReport, path: &str) {
    match status_of(report, path) {
        NodeStatus::Skipped { .. } => {}
        other => panic!("expected '{path}' skipped, got {other:?}"),
    }
}

/// Assert the children of `parent`, in sibling order.
pub fn assert_children(tree: &SiteTree, parent: &str, expected: &[&str]) {
    let children: Vec<String> = tree
        .children(&site_path(parent))
        .unwrap()
        .iter()
        .map(|n| n.path().to_string())
        .collect();
    assert_eq!(children, expected, "children of {parent}");
}

// =========================================================================
// Sources
// =========================================================================

/// In-memory source from `(path, content)` pairs. Panics on a bad path.
pub fn memory_source(files: &[(&str, &str)]) -> MemorySource {
    files
        .iter()
        .fold(MemorySource::new(), |source, (path, content)| {
            source
                .file(path, *content)
                .unwrap_or_else(|e| panic!("bad source path '{path}': {e}"))
        })
}

// =========================================================================
// Sinks
// =========================================================================

/// Memory sink that refuses to stage one path.
pub struct RefusingSink {
    pub inner: MemorySink,
    refuse: SitePath,
}

impl RefusingSink {
    pub fn new(refuse: SitePath) -> Self {
        Self {
            inner: MemorySink::new(),
            refuse,
        }
    }
}

impl OutputSink for RefusingSink {
    fn read_fingerprint(&self, path: &SitePath) -> std::io::Result<Option<String>> {
        self.inner.read_fingerprint(path)
    }

    fn exists(&self, path: &SitePath) -> bool {
        self.inner.exists(path)
    }

    fn stage(&self, path: &SitePath, bytes: &[u8]) -> std::io::Result<()> {
        if *path == self.refuse {
            return Err(std::io::Error::other("disk full"));
        }
        self.inner.stage(path, bytes)
    }

    fn publish(&self, path: &SitePath) -> std::io::Result<()> {
        self.inner.publish(path)
    }

    fn discard(&self, path: &SitePath) {
        self.inner.discard(path)
    }
}
