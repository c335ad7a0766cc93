//! Per-node processing.
//!
//! The pipeline turns one routable node into its artifacts in two steps.
//! [`Pipeline::plan`] is cheap: it resolves everything the output depends on
//! and produces the [`DependencyRecord`] the cache compares against.
//! [`Pipeline::render`] does the actual work and only runs when the cache
//! says the node is stale.
//!
//! ```text
//! plan     transformer, template, data refs, children, processors → record
//!   │
//!   ├── fresh? ──────────────────────────────────────────────► skip
//!   ▼
//! render   payload ─► transform ─► template ─► post-process ─► artifacts
//!                                     ▲
//!                         { page, content, node, data, children, site }
//! ```
//!
//! Static nodes and Generated nodes without a `template` key skip the
//! template: their (transformed) payload is the primary artifact.

use crate::cache::{DependencyRecord, hash_parts};
use crate::error::StageError;
use crate::metadata::{self, Metadata};
use crate::node::{Node, NodeKind, SiteTree};
use crate::path::SitePath;
use crate::postprocess::{Artifact, PostProcessor, PostProcessorRegistry};
use crate::route::Routes;
use crate::signal::{Signal, SignalBus};
use crate::template::{TEMPLATE_KEY, TemplateEngine, TemplateSelector};
use crate::transform::{Content, Transformer, TransformerRegistry};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata key listing the data nodes a node reads.
///
/// Either a path, a list of paths (exposed under their file name) or a
/// mapping alias → path.
pub const DATA_KEY: &str = "data";

/// Read-only view of the site shared by every node during rendering.
pub struct Snapshot<'a> {
    pub tree: &'a SiteTree,
    /// Effective metadata of every node.
    pub metadata: &'a BTreeMap<SitePath, Metadata>,
    pub routes: &'a Routes,
    /// Exposed to templates as `site`.
    pub site: Value,
    empty: Metadata,
}

impl<'a> Snapshot<'a> {
    pub fn new(
        tree: &'a SiteTree,
        metadata: &'a BTreeMap<SitePath, Metadata>,
        routes: &'a Routes,
        site: Value,
    ) -> Self {
        Self {
            tree,
            metadata,
            routes,
            site,
            empty: Metadata::new(),
        }
    }

    pub fn metadata_of(&self, path: &SitePath) -> &Metadata {
        self.metadata.get(path).unwrap_or(&self.empty)
    }
}

/// Everything decided for a node before rendering.
pub struct RenderPlan {
    pub primary: SitePath,
    pub transformer: Option<Arc<dyn Transformer>>,
    pub template: Option<String>,
    /// Alias → data node.
    pub data: BTreeMap<String, SitePath>,
    pub processors: Vec<Arc<dyn PostProcessor>>,
    pub record: DependencyRecord,
}

pub struct Pipeline {
    transformers: TransformerRegistry,
    post: PostProcessorRegistry,
    engine: Arc<dyn TemplateEngine>,
    selector: TemplateSelector,
}

impl Pipeline {
    pub fn new(engine: Arc<dyn TemplateEngine>, selector: TemplateSelector) -> Self {
        Self {
            transformers: TransformerRegistry::with_defaults(),
            post: PostProcessorRegistry::new(),
            engine,
            selector,
        }
    }

    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    pub fn transformers_mut(&mut self) -> &mut TransformerRegistry {
        &mut self.transformers
    }

    pub fn post_processors_mut(&mut self) -> &mut PostProcessorRegistry {
        &mut self.post
    }

    /// Resolve dependencies and build the record for a node routed to
    /// `primary`.
    pub fn plan(
        &self,
        node: &Node,
        primary: &SitePath,
        snapshot: &Snapshot<'_>,
    ) -> Result<RenderPlan, StageError> {
        let path = node.path();
        let meta = snapshot.metadata_of(path);
        let mut record = DependencyRecord::new(node.fingerprint(), metadata::fingerprint(meta));

        let transformer = match node.kind() {
            NodeKind::Document => Some(self.transformers.lookup(node).ok_or_else(|| {
                StageError::UnsupportedContentType {
                    format: node.format().unwrap_or_default().to_string(),
                }
            })?),
            NodeKind::Static => self.transformers.lookup_asset(node),
            NodeKind::Generated => self.transformers.lookup(node),
            NodeKind::Index | NodeKind::Data => None,
        };

        let template = if self.needs_template(node, meta) {
            let id = self
                .selector
                .select(node, meta)
                .ok_or_else(|| StageError::TemplateNotFound(format!("(none selected for {path})")))?;
            let fingerprint = self
                .engine
                .fingerprint(&id)
                .ok_or_else(|| StageError::TemplateNotFound(id.clone()))?;
            record.record_template(&id, fingerprint);
            Some(id)
        } else {
            None
        };

        let data = data_references(meta)?;
        for target in data.values() {
            let data_node = snapshot
                .tree
                .get(target)
                .ok()
                .filter(|n| n.kind() == NodeKind::Data)
                .ok_or_else(|| StageError::DataNotFound(target.to_string()))?;
            record.record_data(
                target.clone(),
                metadata::fingerprint(snapshot.metadata_of(data_node.path())),
            );
        }

        if template.is_some() && node.is_branch() {
            record.record_children(children_fingerprint(node, snapshot));
        }

        if let Some(t) = &transformer {
            record.record_processor(format!("transform:{}", t.id()), t.config_hash());
        }
        let processors = self.post.applicable(node, primary);
        for p in &processors {
            record.record_processor(p.id(), p.config_hash());
        }

        Ok(RenderPlan {
            primary: primary.clone(),
            transformer,
            template,
            data,
            processors,
            record,
        })
    }

    fn needs_template(&self, node: &Node, meta: &Metadata) -> bool {
        match node.kind() {
            NodeKind::Document | NodeKind::Index => true,
            NodeKind::Generated => meta.contains_key(TEMPLATE_KEY),
            NodeKind::Static | NodeKind::Data => false,
        }
    }

    /// Produce the artifacts of a planned node.
    pub fn render(
        &self,
        plan: &RenderPlan,
        node: &Node,
        snapshot: &Snapshot<'_>,
        bus: &SignalBus,
    ) -> Result<Vec<Artifact>, StageError> {
        let meta = snapshot.metadata_of(node.path());
        let payload = node.payload().bytes()?;
        let content = match &plan.transformer {
            Some(t) => t.transform(&payload, meta)?,
            None => Content::Bytes(payload.into_owned()),
        };

        let bytes = match &plan.template {
            Some(id) => {
                let mut context = self.context(plan, node, &content, snapshot);
                bus.emit(&mut Signal::PreRender {
                    node,
                    template: id,
                    context: &mut context,
                });
                self.engine.render(id, &context)?
            }
            None => content.into_bytes(),
        };

        let primary = Artifact::new(plan.primary.clone(), bytes);
        let mut artifacts = PostProcessorRegistry::run(&plan.processors, node, primary, meta)?;
        bus.emit(&mut Signal::PostRender {
            node,
            artifacts: &mut artifacts,
        });
        Ok(artifacts)
    }

    fn context(
        &self,
        plan: &RenderPlan,
        node: &Node,
        content: &Content,
        snapshot: &Snapshot<'_>,
    ) -> Value {
        let data: Map<String, Value> = plan
            .data
            .iter()
            .map(|(alias, target)| {
                (
                    alias.clone(),
                    Value::Object(snapshot.metadata_of(target).clone()),
                )
            })
            .collect();
        let children: Vec<Value> = if node.is_branch() {
            listed_children(node, snapshot)
                .map(|child| Value::Object(snapshot.metadata_of(child.path()).clone()))
                .collect()
        } else {
            Vec::new()
        };
        json!({
            "page": snapshot.metadata_of(node.path()),
            "content": content.as_text(),
            "node": {
                "path": node.path().to_string(),
                "kind": node.kind().as_str(),
                "parent": node.parent().map(|p| p.to_string()),
                "artifact": plan.primary.to_string(),
            },
            "data": data,
            "children": children,
            "site": snapshot.site,
        })
    }
}

/// Children exposed to a branch's template: every child except data nodes,
/// in display order.
fn listed_children<'s>(node: &Node, snapshot: &Snapshot<'s>) -> impl Iterator<Item = &'s Node> {
    snapshot
        .tree
        .children(node.path())
        .unwrap_or_default()
        .into_iter()
        .filter(|child| child.kind() != NodeKind::Data)
}

fn children_fingerprint(node: &Node, snapshot: &Snapshot<'_>) -> String {
    hash_parts(listed_children(node, snapshot).flat_map(|child| {
        [
            child.path().to_string(),
            metadata::fingerprint(snapshot.metadata_of(child.path())),
        ]
    }))
}

/// Parse the `data` key into alias → path.
fn data_references(meta: &Metadata) -> Result<BTreeMap<String, SitePath>, StageError> {
    let mut refs = BTreeMap::new();
    let mut add = |alias: Option<&str>, raw: &str| -> Result<(), StageError> {
        let path = SitePath::parse(raw).map_err(|_| StageError::DataNotFound(raw.to_string()))?;
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => path.file_name().unwrap_or_default().to_string(),
        };
        refs.insert(alias, path);
        Ok(())
    };
    match meta.get(DATA_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::String(raw)) => add(None, raw)?,
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(raw) => add(None, raw)?,
                    other => return Err(StageError::DataNotFound(other.to_string())),
                }
            }
        }
        Some(Value::Object(aliases)) => {
            for (alias, target) in aliases {
                match target {
                    Value::String(raw) => add(Some(alias), raw)?,
                    other => return Err(StageError::DataNotFound(other.to_string())),
                }
            }
        }
        Some(other) => return Err(StageError::DataNotFound(other.to_string())),
    }
    Ok(refs)
}
