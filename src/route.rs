//! Mapping nodes to output paths.
//!
//! Each node routes to at most one *primary* artifact; post-processors may
//! add derivatives next to it later.
//!
//! | Node                          | Primary artifact              |
//! |-------------------------------|-------------------------------|
//! | Document, root or branch      | `<path>/index.html`           |
//! | Document, leaf                | `<path>.html`                 |
//! | Index with a Document child   | `<path>/index.html`           |
//! | Index otherwise               | none                          |
//! | Static                        | `<path>`, or with the output extension of its transformer |
//! | Generated                     | `<path>`                      |
//! | Data                          | none                          |
//!
//! When two nodes route to the same artifact, the first in walk order keeps
//! it and the other is reported as a conflict.

use crate::node::{Node, NodeKind, SiteTree};
use crate::path::SitePath;
use crate::transform::TransformerRegistry;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

pub const INDEX_FILE: &str = "index.html";

/// Node path → primary artifact path.
pub type Routes = BTreeMap<SitePath, SitePath>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConflict {
    pub node: SitePath,
    pub artifact: SitePath,
    pub owner: SitePath,
}

#[derive(Debug, Default)]
pub struct RoutePlan {
    pub routes: Routes,
    pub conflicts: Vec<RouteConflict>,
}

/// Primary artifact of one node, if it has any.
pub fn primary_route(
    tree: &SiteTree,
    node: &Node,
    transformers: &TransformerRegistry,
) -> Option<SitePath> {
    let path = node.path();
    match node.kind() {
        NodeKind::Document if node.is_branch() => index_file(path),
        NodeKind::Document => {
            let name = path.file_name()?;
            Some(path.with_file_name(&format!("{name}.html")))
        }
        NodeKind::Index => {
            let has_document = tree
                .children(path)
                .ok()?
                .iter()
                .any(|child| child.kind() == NodeKind::Document);
            if has_document { index_file(path) } else { None }
        }
        NodeKind::Static => {
            let renamed = transformers
                .lookup_asset(node)
                .and_then(|t| t.output_extension().map(|ext| path.with_extension(ext)));
            Some(renamed.unwrap_or_else(|| path.clone()))
        }
        NodeKind::Generated => (!path.is_root()).then(|| path.clone()),
        NodeKind::Data => None,
    }
}

fn index_file(path: &SitePath) -> Option<SitePath> {
    path.child(INDEX_FILE).ok()
}

/// Route every node of the tree, recording conflicts.
pub fn plan_routes(tree: &SiteTree, transformers: &TransformerRegistry) -> RoutePlan {
    let mut plan = RoutePlan::default();
    let mut owners: BTreeMap<SitePath, SitePath> = BTreeMap::new();

    for node in tree.walk() {
        let Some(artifact) = primary_route(tree, node, transformers) else {
            continue;
        };
        match owners.entry(artifact.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(node.path().clone());
                plan.routes.insert(node.path().clone(), artifact);
            }
            Entry::Occupied(owner) => plan.conflicts.push(RouteConflict {
                node: node.path().clone(),
                artifact,
                owner: owner.get().clone(),
            }),
        }
    }
    plan
}

/// Public URL of an artifact. `index.html` collapses to its directory.
pub fn url_for(artifact: &SitePath) -> String {
    if artifact.file_name() == Some(INDEX_FILE) {
        match artifact.parent() {
            Some(dir) if !dir.is_root() => format!("{dir}/"),
            _ => "/".to_string(),
        }
    } else {
        artifact.to_string()
    }
}
