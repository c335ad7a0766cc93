//! The in-memory site model.
//!
//! A [`SiteTree`] is an arena of [`Node`]s keyed by [`SitePath`]. Parent and
//! child links are stored as paths and resolved by lookup, so the tree owns
//! every node exactly once and there are no reference cycles.
//!
//! Nodes are only ever added top-down: [`SiteTree::add_node`] refuses a path
//! whose parent is not already present. The collector guarantees this by
//! inserting candidates in depth order.
//!
//! ```text
//! /                  Index     (branch)
//! ├── about          Document
//! ├── blog           Document  (branch, from blog/index.md)
//! │   ├── first      Document
//! │   └── authors    Data
//! └── logo.png       Static
//! ```

use crate::cache::hash_bytes;
use crate::metadata::Metadata;
use crate::path::SitePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

/// Metadata key used for explicit sibling ordering.
pub const DEFAULT_ORDER_KEY: &str = "order";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("duplicate path: {0}")]
    DuplicatePath(SitePath),
    #[error("no parent node to attach {0} under")]
    OrphanedPath(SitePath),
    #[error("no node at {0}")]
    NotFound(SitePath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Markup content rendered through a template.
    Document,
    /// Structured data consumed by other nodes, never published itself.
    Data,
    /// Copied through, optionally transformed (stylesheets) or post-processed.
    Static,
    /// Produced in-process rather than read from a source.
    Generated,
    /// A directory without its own index document.
    Index,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Data => "data",
            NodeKind::Static => "static",
            NodeKind::Generated => "generated",
            NodeKind::Index => "index",
        }
    }

    pub fn parse(s: &str) -> Option<NodeKind> {
        match s {
            "document" => Some(NodeKind::Document),
            "data" => Some(NodeKind::Data),
            "static" => Some(NodeKind::Static),
            "generated" => Some(NodeKind::Generated),
            "index" => Some(NodeKind::Index),
            _ => None,
        }
    }
}

/// The raw content of a node.
///
/// Large assets are not kept in memory: the collector hashes them once and
/// keeps only the file reference.
#[derive(Debug, Clone)]
pub enum Payload {
    Inline(Vec<u8>),
    External { path: PathBuf, fingerprint: String },
    Empty,
}

impl Payload {
    fn fingerprint(&self) -> String {
        match self {
            Payload::Inline(bytes) => hash_bytes(bytes),
            Payload::External { fingerprint, .. } => fingerprint.clone(),
            Payload::Empty => hash_bytes(&[]),
        }
    }

    /// Read the payload bytes, loading external files on demand.
    pub fn bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Payload::Inline(bytes) => Ok(Cow::Borrowed(bytes)),
            Payload::External { path, .. } => Ok(Cow::Owned(std::fs::read(path)?)),
            Payload::Empty => Ok(Cow::Borrowed(&[])),
        }
    }
}

/// Everything needed to insert a node besides its path.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub payload: Payload,
    pub metadata: Metadata,
    pub format: Option<String>,
    pub branch: bool,
    pub modified: Option<SystemTime>,
    pub source: Option<PathBuf>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind, payload: Payload, metadata: Metadata) -> Self {
        Self {
            kind,
            payload,
            metadata,
            format: None,
            branch: false,
            modified: None,
            source: None,
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn branch(mut self, branch: bool) -> Self {
        self.branch = branch;
        self
    }

    pub fn modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    path: SitePath,
    kind: NodeKind,
    payload: Payload,
    metadata: Metadata,
    overrides: Metadata,
    fingerprint: String,
    fingerprint_stale: bool,
    format: Option<String>,
    branch: bool,
    modified: Option<SystemTime>,
    source: Option<PathBuf>,
    parent: Option<SitePath>,
    children: Vec<SitePath>,
}

impl Node {
    pub fn path(&self) -> &SitePath {
        &self.path
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Metadata declared by the node itself (front-matter, sidecar, data file).
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata injected by signal handlers after discovery.
    pub fn overrides(&self) -> &Metadata {
        &self.overrides
    }

    /// Content hash of the payload as of the last (re)computation.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// True after a mutation until [`SiteTree::recompute_fingerprint`] runs.
    pub fn is_fingerprint_stale(&self) -> bool {
        self.fingerprint_stale
    }

    /// Source format, usually the original file extension (`md`, `scss`).
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Whether this node stands for a directory.
    pub fn is_branch(&self) -> bool {
        self.branch || self.path.is_root()
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn source(&self) -> Option<&std::path::Path> {
        self.source.as_deref()
    }

    pub fn parent(&self) -> Option<&SitePath> {
        self.parent.as_ref()
    }

    /// Child paths in insertion order; use [`SiteTree::children`] for the
    /// sorted view.
    pub fn child_paths(&self) -> &[SitePath] {
        &self.children
    }

    /// Look up a key in overrides first, then explicit metadata.
    pub fn declared(&self, key: &str) -> Option<&Value> {
        self.overrides.get(key).or_else(|| self.metadata.get(key))
    }
}

/// Arena of nodes addressed by path.
#[derive(Debug, Clone)]
pub struct SiteTree {
    nodes: HashMap<SitePath, Node>,
    order_key: String,
}

impl Default for SiteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order_key: DEFAULT_ORDER_KEY.to_string(),
        }
    }

    /// Use a different metadata key for explicit sibling ordering.
    pub fn with_order_key(mut self, key: impl Into<String>) -> Self {
        self.order_key = key.into();
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, path: &SitePath) -> bool {
        self.nodes.contains_key(path)
    }

    /// Insert a node under its (already present) parent.
    ///
    /// The root may only be inserted into an empty tree. On error the tree
    /// is left untouched.
    pub fn add_node(&mut self, path: SitePath, spec: NodeSpec) -> Result<&Node, TreeError> {
        if self.nodes.contains_key(&path) {
            return Err(TreeError::DuplicatePath(path));
        }
        let parent = match path.parent() {
            Some(parent) => {
                let Some(parent_node) = self.nodes.get_mut(&parent) else {
                    return Err(TreeError::OrphanedPath(path));
                };
                parent_node.children.push(path.clone());
                Some(parent)
            }
            None if self.nodes.is_empty() => None,
            None => return Err(TreeError::DuplicatePath(path)),
        };

        let node = Node {
            fingerprint: spec.payload.fingerprint(),
            fingerprint_stale: false,
            path: path.clone(),
            kind: spec.kind,
            payload: spec.payload,
            metadata: spec.metadata,
            overrides: Metadata::new(),
            format: spec.format,
            branch: spec.branch,
            modified: spec.modified,
            source: spec.source,
            parent,
            children: Vec::new(),
        };
        Ok(&*self.nodes.entry(path).or_insert(node))
    }

    pub fn get(&self, path: &SitePath) -> Result<&Node, TreeError> {
        self.nodes
            .get(path)
            .ok_or_else(|| TreeError::NotFound(path.clone()))
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&SitePath::root())
    }

    /// Children of `path` in display order.
    ///
    /// Nodes carrying a numeric order key come first, ascending; everything
    /// else follows. Ties fall back to the final path segment.
    pub fn children(&self, path: &SitePath) -> Result<Vec<&Node>, TreeError> {
        let node = self.get(path)?;
        let mut children: Vec<&Node> = node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect();
        children.sort_by(|a, b| self.sibling_order(a, b));
        Ok(children)
    }

    fn sibling_order(&self, a: &Node, b: &Node) -> Ordering {
        let key_a = a.declared(&self.order_key).and_then(Value::as_f64);
        let key_b = b.declared(&self.order_key).and_then(Value::as_f64);
        let by_key = match (key_a, key_b) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_key.then_with(|| a.path.file_name().cmp(&b.path.file_name()))
    }

    /// Depth-first, pre-order traversal from the root.
    ///
    /// Every call starts a fresh traversal.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.root().into_iter().collect(),
        }
    }

    /// Replace one explicit metadata value. Marks the fingerprint stale.
    pub fn set_metadata(
        &mut self,
        path: &SitePath,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), TreeError> {
        let node = self.node_mut(path)?;
        node.metadata.insert(key.into(), value);
        node.fingerprint_stale = true;
        Ok(())
    }

    /// Merge plugin-injected overrides into a node. Marks the fingerprint stale.
    pub fn set_overrides(&mut self, path: &SitePath, overrides: Metadata) -> Result<(), TreeError> {
        let node = self.node_mut(path)?;
        if overrides.is_empty() {
            return Ok(());
        }
        node.overrides.extend(overrides);
        node.fingerprint_stale = true;
        Ok(())
    }

    /// Swap a node's payload. The stored fingerprint is kept until
    /// [`recompute_fingerprint`](Self::recompute_fingerprint) is called.
    pub fn set_payload(&mut self, path: &SitePath, payload: Payload) -> Result<(), TreeError> {
        let node = self.node_mut(path)?;
        node.payload = payload;
        node.fingerprint_stale = true;
        Ok(())
    }

    pub fn recompute_fingerprint(&mut self, path: &SitePath) -> Result<&str, TreeError> {
        let node = self.node_mut(path)?;
        node.fingerprint = node.payload.fingerprint();
        node.fingerprint_stale = false;
        Ok(&node.fingerprint)
    }

    /// Recompute every stale fingerprint. Returns how many were refreshed.
    pub fn refresh_fingerprints(&mut self) -> usize {
        let mut refreshed = 0;
        for node in self.nodes.values_mut().filter(|n| n.fingerprint_stale) {
            node.fingerprint = node.payload.fingerprint();
            node.fingerprint_stale = false;
            refreshed += 1;
        }
        refreshed
    }

    fn node_mut(&mut self, path: &SitePath) -> Result<&mut Node, TreeError> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| TreeError::NotFound(path.clone()))
    }
}

/// Lazy pre-order iterator returned by [`SiteTree::walk`].
pub struct Walk<'a> {
    tree: &'a SiteTree,
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Ok(children) = self.tree.children(&node.path) {
            self.stack.extend(children.into_iter().rev());
        }
        Some(node)
    }
}
