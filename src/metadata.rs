//! Effective metadata resolution.
//!
//! Every node carries the metadata it declares itself (front-matter, data
//! file contents, `.meta` sidecars) plus overrides injected by signal
//! handlers. Templates never see those raw mappings directly; they see the
//! *effective* metadata, built from four layers:
//!
//! ```text
//! builtins            path, kind, url, slug, format, modified, image_size
//!   < defaults        [metadata.defaults] from config.toml,
//!                     then each ancestor's `defaults` mapping, root first
//!   < explicit        the node's own declaration
//!   < overrides       plugin-injected values
//! ```
//!
//! Later layers replace earlier values key by key. The exception are
//! **merge keys** (by default `tags`, `categories`, `aliases`): their values
//! are unioned across layers, so a section can give every page a `blog` tag
//! and a page can add its own tags without repeating the inherited ones.
//! Scalars are treated as one-element lists; duplicates are dropped keeping
//! the first occurrence.
//!
//! Resolution is a pure function of the tree snapshot and the route table,
//! so it runs once, sequentially, before the parallel render phase.

use crate::cache::hash_bytes;
use crate::node::{Node, SiteTree, TreeError};
use crate::path::SitePath;
use crate::route::{Routes, url_for};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::UNIX_EPOCH;

/// A JSON-like metadata mapping.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key under which a branch node declares defaults for its subtree.
pub const DEFAULTS_KEY: &str = "defaults";

/// Built-in key for pixel dimensions of image payloads (`[width, height]`).
pub const IMAGE_SIZE_KEY: &str = "image_size";

pub const DEFAULT_MERGE_KEYS: &[&str] = &["tags", "categories", "aliases"];

/// Keys whose values are unioned across layers instead of replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeKeys {
    keys: BTreeSet<String>,
}

impl Default for MergeKeys {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_KEYS.iter().copied())
    }
}

impl MergeKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn none() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Computes effective metadata for nodes of one tree snapshot.
pub struct MetadataResolver<'a> {
    tree: &'a SiteTree,
    merge_keys: MergeKeys,
    defaults: Metadata,
    routes: Option<&'a Routes>,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(tree: &'a SiteTree, merge_keys: MergeKeys) -> Self {
        Self {
            tree,
            merge_keys,
            defaults: Metadata::new(),
            routes: None,
        }
    }

    /// Site-wide defaults, the lowest inherited layer.
    pub fn with_defaults(mut self, defaults: Metadata) -> Self {
        self.defaults = defaults;
        self
    }

    /// Route table used to fill the built-in `url` field.
    pub fn with_routes(mut self, routes: &'a Routes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Effective metadata of the node at `path`.
    pub fn resolve(&self, path: &SitePath) -> Result<Metadata, TreeError> {
        let node = self.tree.get(path)?;
        let mut effective = builtins(node, self.routes);

        apply_layer(&mut effective, &self.defaults, &self.merge_keys);
        for ancestor in path.ancestors() {
            let ancestor = self.tree.get(&ancestor)?;
            for declared in [ancestor.metadata(), ancestor.overrides()] {
                if let Some(Value::Object(defaults)) = declared.get(DEFAULTS_KEY) {
                    apply_layer(&mut effective, defaults, &self.merge_keys);
                }
            }
        }
        apply_layer(&mut effective, node.metadata(), &self.merge_keys);
        apply_layer(&mut effective, node.overrides(), &self.merge_keys);

        Ok(effective)
    }

    /// Resolve every node in the tree.
    pub fn resolve_all(&self) -> Result<BTreeMap<SitePath, Metadata>, TreeError> {
        self.tree
            .walk()
            .map(|node| Ok((node.path().clone(), self.resolve(node.path())?)))
            .collect()
    }
}

/// Built-in computed fields for a node.
///
/// `image_size` is computed by the collector and travels in the node's
/// explicit metadata, so it is not repeated here.
fn builtins(node: &Node, routes: Option<&Routes>) -> Metadata {
    let path = node.path();
    let mut fields = Metadata::new();
    fields.insert("path".into(), Value::String(path.to_string()));
    fields.insert("kind".into(), Value::String(node.kind().as_str().into()));
    fields.insert(
        "slug".into(),
        Value::String(path.file_stem().unwrap_or_default().to_string()),
    );
    if let Some(format) = node.format() {
        fields.insert("format".into(), Value::String(format.to_string()));
    }
    if let Some(modified) = node
        .modified()
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
    {
        fields.insert("modified".into(), Value::from(modified.as_secs()));
    }
    if let Some(artifact) = routes.and_then(|r| r.get(path)) {
        fields.insert("url".into(), Value::String(url_for(artifact)));
    }
    fields
}

/// Merge one layer into `target`.
pub fn apply_layer(target: &mut Metadata, layer: &Metadata, merge_keys: &MergeKeys) {
    for (key, value) in layer {
        if merge_keys.contains(key) {
            let merged = union(target.remove(key), value);
            target.insert(key.clone(), merged);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn union(existing: Option<Value>, incoming: &Value) -> Value {
    let mut items = existing.map(as_list).unwrap_or_default();
    for item in as_list(incoming.clone()) {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        scalar => vec![scalar],
    }
}

/// Stable content hash of a metadata mapping.
pub fn fingerprint(metadata: &Metadata) -> String {
    // serde_json::Map is a BTreeMap without the preserve_order feature, so
    // serialization is key-ordered and stable.
    let bytes = serde_json::to_vec(metadata).unwrap_or_default();
    hash_bytes(&bytes)
}
