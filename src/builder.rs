//! Build orchestration.
//!
//! A [`Site`] owns everything that stays the same between builds: the
//! configuration, the processing pipeline with its registries, the
//! classifier and the [`SignalBus`]. [`Site::build`] runs one build:
//!
//! ```text
//! collect ─► routes ─► metadata ─► ┌ node ┐ ─► prune ─► BuildComplete
//! (sequential)                     │ node │    cache
//!                                  │ ...  │
//!                                  └ rayon┘
//! ```
//!
//! Each node in the parallel phase goes through plan → freshness check →
//! render → claim → write → commit. A failure only marks that node; every
//! other node is still attempted. Cache problems never fail a build; they
//! only cost a rebuild and are reported as warnings.
//!
//! ## Artifact ownership
//!
//! Primary artifacts are assigned up front by the route table. Derivatives
//! added by post-processors are claimed during the parallel phase: a
//! derivative that is another node's primary, or that another node already
//! claimed this build, fails the node with `RouteConflict` before anything
//! of it is written. Fresh nodes claim the artifacts they kept.
//!
//! ## Checks
//!
//! Documents without a `title` are reported as warnings. After the
//! parallel phase the links of every HTML artifact rendered in this build
//! are checked against all artifacts of the build (see [`crate::links`]).

use crate::cache::{
    CacheError, CacheStats, IncrementalCache, JsonFileBackend, hash_bytes, manifest_path,
};
use crate::collect::{Classifier, CollectError, Collected, Collector, ContentSource, FsSource};
use crate::config::{SiteConfig, effective_threads};
use crate::error::StageError;
use crate::imaging::ImageDerivatives;
use crate::links::{self, LinkIndex};
use crate::metadata::{MergeKeys, Metadata, MetadataResolver};
use crate::node::{Node, NodeKind, SiteTree, TreeError};
use crate::path::SitePath;
use crate::pipeline::{Pipeline, Snapshot};
use crate::postprocess::PostProcessorRegistry;
use crate::report::{BuildReport, Diagnostic, NodeError, NodeReport, NodeStatus};
use crate::route::{RouteConflict, Routes, plan_routes};
use crate::signal::{Signal, SignalBus};
use crate::template::{MiniJinjaEngine, TemplateEngine, TemplateSelector};
use crate::transform::{SassTransformer, TransformKey, TransformerRegistry};
use crate::writer::{FsSink, OutputSink, OutputWriter, WriteOutcome};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Collection error: {0}")]
    Collect(#[from] CollectError),
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result of [`Site::check`]: what a build would do, without rendering.
#[derive(Debug)]
pub struct CheckReport {
    pub tree: SiteTree,
    pub routes: Routes,
    /// Nodes that would fail, in walk order.
    pub problems: Vec<(SitePath, NodeError)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckReport {
    pub fn is_success(&self) -> bool {
        self.problems.is_empty()
    }
}

/// One entry of the parallel work list.
struct Job<'t> {
    node: &'t Node,
    target: Result<SitePath, RouteConflict>,
}

/// Owner of every artifact path in one build.
struct ArtifactClaims {
    /// Primary artifact → node, from the route table.
    primary: HashMap<SitePath, SitePath>,
    /// Derivative artifact → first node that claimed it.
    derived: Mutex<HashMap<SitePath, SitePath>>,
}

impl ArtifactClaims {
    fn new(routes: &Routes) -> Self {
        Self {
            primary: routes
                .iter()
                .map(|(node, artifact)| (artifact.clone(), node.clone()))
                .collect(),
            derived: Mutex::new(HashMap::new()),
        }
    }

    /// Claim `artifacts` for `node`. Either every path is claimed or, on the
    /// first path owned by another node, none is.
    fn claim<'p>(
        &self,
        node: &SitePath,
        artifacts: impl IntoIterator<Item = &'p SitePath> + Clone,
    ) -> Result<(), StageError> {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        for artifact in artifacts.clone() {
            let owner = self.primary.get(artifact).or_else(|| derived.get(artifact));
            if let Some(owner) = owner
                && owner != node
            {
                return Err(StageError::RouteConflict {
                    artifact: artifact.clone(),
                    owner: owner.clone(),
                });
            }
        }
        for artifact in artifacts {
            if !self.primary.contains_key(artifact) {
                derived.insert(artifact.clone(), node.clone());
            }
        }
        Ok(())
    }

    fn all(&self) -> Vec<SitePath> {
        let derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        self.primary.keys().chain(derived.keys()).cloned().collect()
    }
}

/// Shared state of the parallel phase.
struct RenderPhase<'b> {
    snapshot: &'b Snapshot<'b>,
    sink: &'b dyn OutputSink,
    cache: &'b IncrementalCache,
    claims: &'b ArtifactClaims,
}

/// What one node contributed besides its status.
#[derive(Default)]
struct NodeNotes {
    diagnostics: Vec<Diagnostic>,
    /// Rendered HTML artifact → site-absolute links found in it.
    links: Vec<(SitePath, Vec<String>)>,
}

/// Collected, routed and resolved site, ready for the parallel phase.
struct Prepared {
    collected: Collected,
    routes: Routes,
    conflicts: Vec<RouteConflict>,
    metadata: BTreeMap<SitePath, Metadata>,
}

pub struct Site {
    config: SiteConfig,
    pipeline: Pipeline,
    classifier: Classifier,
    bus: SignalBus,
    cancel: Arc<AtomicBool>,
}

impl Site {
    /// Site with the default transformers and, when `[images] sizes` is set,
    /// the image derivative post-processor.
    pub fn new(config: SiteConfig, engine: Arc<dyn TemplateEngine>) -> Self {
        let selector = TemplateSelector::from_config(&config.templates);
        let mut pipeline = Pipeline::new(engine, selector);
        if !config.images.sizes.is_empty() {
            pipeline.post_processors_mut().register(ImageDerivatives::new(
                config.images.sizes.clone(),
                config.images.quality,
            ));
        }
        Self {
            config,
            pipeline,
            classifier: Classifier::default(),
            bus: SignalBus::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Site for a project directory, with templates loaded from
    /// `[templates] path` and stylesheet imports resolved against
    /// `resource_dir`.
    pub fn open(root: &Path, config: SiteConfig) -> Result<Self, BuildError> {
        let engine = MiniJinjaEngine::from_dir(&config.templates_path(root))?;
        debug!(templates = engine.len(), "templates loaded");
        let resources = config.resource_path(root);
        let mut site = Self::new(config, Arc::new(engine));
        site.transformers_mut()
            .set(
                TransformKey::format("scss"),
                SassTransformer::scss().with_load_path(&resources),
            )
            .set(
                TransformKey::format("sass"),
                SassTransformer::sass().with_load_path(&resources),
            );
        Ok(site)
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    pub fn transformers_mut(&mut self) -> &mut TransformerRegistry {
        self.pipeline.transformers_mut()
    }

    pub fn post_processors_mut(&mut self) -> &mut PostProcessorRegistry {
        self.pipeline.post_processors_mut()
    }

    /// Flag checked before each node. Once set, remaining nodes are reported
    /// as cancelled and nothing more is written or committed.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn prepare(&self, source: &dyn ContentSource) -> Result<Prepared, BuildError> {
        let mut collected = Collector::new(&self.classifier)
            .with_bus(&self.bus)
            .with_order_key(self.config.metadata.order_key.clone())
            .collect(source)?;
        collected.tree.refresh_fingerprints();
        let tree = &collected.tree;

        let plan = plan_routes(tree, self.pipeline.transformers());
        let metadata = MetadataResolver::new(
            tree,
            MergeKeys::new(self.config.metadata.merge_keys.iter().cloned()),
        )
        .with_defaults(self.config.metadata.defaults.clone())
        .with_routes(&plan.routes)
        .resolve_all()?;

        debug!(
            nodes = tree.len(),
            routes = plan.routes.len(),
            conflicts = plan.conflicts.len(),
            "site prepared"
        );
        Ok(Prepared {
            collected,
            routes: plan.routes,
            conflicts: plan.conflicts,
            metadata,
        })
    }

    fn site_context(&self) -> Value {
        Value::Object(self.config.metadata.defaults.clone())
    }

    /// One warning per document whose effective metadata has no `title`.
    fn title_warnings(&self, prepared: &Prepared) -> Vec<Diagnostic> {
        if !self.config.checks.titles {
            return Vec::new();
        }
        prepared
            .collected
            .tree
            .walk()
            .filter(|node| node.kind() == NodeKind::Document)
            .filter(|node| {
                prepared
                    .metadata
                    .get(node.path())
                    .is_none_or(|meta| !meta.contains_key("title"))
            })
            .map(|node| Diagnostic::warning(Some(node.path().clone()), "document has no title"))
            .collect()
    }

    /// Routable nodes and route conflicts, in walk order.
    fn jobs<'t>(tree: &'t SiteTree, routes: &Routes, conflicts: &[RouteConflict]) -> Vec<Job<'t>> {
        tree.walk()
            .filter_map(|node| {
                let target = match routes.get(node.path()) {
                    Some(artifact) => Ok(artifact.clone()),
                    None => Err(conflicts.iter().find(|c| c.node == *node.path())?.clone()),
                };
                Some(Job { node, target })
            })
            .collect()
    }

    /// Plan every node without rendering or writing anything.
    pub fn check(&self, source: &dyn ContentSource) -> Result<CheckReport, BuildError> {
        let prepared = self.prepare(source)?;
        let problems = {
            let tree = &prepared.collected.tree;
            let snapshot =
                Snapshot::new(tree, &prepared.metadata, &prepared.routes, self.site_context());
            Self::jobs(tree, &prepared.routes, &prepared.conflicts)
                .into_iter()
                .filter_map(|job| {
                    let outcome = match &job.target {
                        Ok(primary) => self.pipeline.plan(job.node, primary, &snapshot).map(|_| ()),
                        Err(conflict) => Err(conflict_error(conflict)),
                    };
                    let err = outcome.err()?;
                    Some((job.node.path().clone(), NodeError::from(&err)))
                })
                .collect()
        };

        let titles = self.title_warnings(&prepared);
        let mut diagnostics = prepared.collected.diagnostics;
        diagnostics.extend(titles);
        diagnostics.extend(self.bus.take_diagnostics());
        Ok(CheckReport {
            tree: prepared.collected.tree,
            routes: prepared.routes,
            problems,
            diagnostics,
        })
    }

    /// Run one build from `source` into `sink`.
    ///
    /// Returns `Err` only when the build could not run at all (unreadable
    /// source, thread pool). Node failures are in the report.
    pub fn build(
        &self,
        source: &dyn ContentSource,
        sink: &dyn OutputSink,
        cache: &IncrementalCache,
    ) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let prepared = self.prepare(source)?;
        let tree = &prepared.collected.tree;
        let snapshot = Snapshot::new(tree, &prepared.metadata, &prepared.routes, self.site_context());
        let jobs = Self::jobs(tree, &prepared.routes, &prepared.conflicts);
        let claims = ArtifactClaims::new(&prepared.routes);
        let phase = RenderPhase {
            snapshot: &snapshot,
            sink,
            cache,
            claims: &claims,
        };

        let threads = effective_threads(&self.config.processing);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| BuildError::ThreadPool(e.to_string()))?;
        info!(nodes = jobs.len(), threads, "rendering");

        let processed: Vec<(NodeReport, NodeNotes)> = pool.install(|| {
            jobs.par_iter()
                .map(|job| self.process(job, &phase))
                .collect()
        });

        let mut diagnostics = self.title_warnings(&prepared);
        let mut pages = Vec::new();
        let mut nodes = Vec::with_capacity(processed.len());
        for (report, notes) in processed {
            diagnostics.extend(notes.diagnostics);
            pages.extend(notes.links.into_iter().map(|(artifact, links)| {
                (report.path.clone(), artifact, links)
            }));
            nodes.push(report);
        }
        if self.config.checks.links {
            let index = LinkIndex::new(&claims.all());
            for (node, artifact, links) in &pages {
                for link in index.broken(links) {
                    debug!(path = %node, link, "broken internal link");
                    diagnostics.push(Diagnostic::warning(
                        Some(node.clone()),
                        format!("\"{link}\" referenced in {artifact} does not exist"),
                    ));
                }
            }
        }

        let mut stats = CacheStats::default();
        for report in &nodes {
            match report.status {
                NodeStatus::Skipped { .. } => stats.hit(),
                NodeStatus::Rendered { .. } | NodeStatus::Failed(_) => stats.miss(),
                NodeStatus::Cancelled => {}
            }
        }

        let live: HashSet<SitePath> = prepared.routes.keys().cloned().collect();
        match cache.prune(&live) {
            Ok(pruned) => stats.pruned = pruned as u32,
            Err(e) => diagnostics.push(cache_warning("prune", None, &e)),
        }
        if let Err(e) = cache.flush() {
            diagnostics.push(cache_warning("flush", None, &e));
        }
        let mut all = prepared.collected.diagnostics;
        all.extend(diagnostics);
        let diagnostics = all;

        let mut report = BuildReport {
            nodes,
            diagnostics,
            tree_size: tree.len(),
            cache: stats,
            duration: start.elapsed(),
        };
        report.diagnostics.extend(self.bus.take_diagnostics());
        self.bus.emit(&mut Signal::BuildComplete { report: &report });
        report.diagnostics.extend(self.bus.take_diagnostics());

        info!(
            rendered = report.rendered(),
            skipped = report.skipped(),
            failed = report.failures().count(),
            written = report.written(),
            elapsed_ms = report.duration.as_millis() as u64,
            "build finished"
        );
        Ok(report)
    }

    fn process(&self, job: &Job<'_>, phase: &RenderPhase<'_>) -> (NodeReport, NodeNotes) {
        let node = job.node;
        let mut notes = NodeNotes::default();
        let status = if self.cancel.load(Ordering::Relaxed) {
            NodeStatus::Cancelled
        } else {
            match self.process_node(node, &job.target, phase, &mut notes) {
                Ok(status) => status,
                Err(e) => {
                    warn!(path = %node.path(), kind = %e.kind(), "{e}");
                    NodeStatus::Failed(NodeError::from(&e))
                }
            }
        };
        let report = NodeReport {
            path: node.path().clone(),
            kind: node.kind(),
            status,
        };
        (report, notes)
    }

    fn process_node(
        &self,
        node: &Node,
        target: &Result<SitePath, RouteConflict>,
        phase: &RenderPhase<'_>,
        notes: &mut NodeNotes,
    ) -> Result<NodeStatus, StageError> {
        let primary = target.as_ref().map_err(conflict_error)?;
        let plan = self.pipeline.plan(node, primary, phase.snapshot)?;

        if phase.cache.is_fresh(node.path(), &plan.record, phase.sink) {
            let artifacts = phase.cache.previous_artifacts(node.path());
            phase.claims.claim(node.path(), &artifacts)?;
            debug!(path = %node.path(), "fresh, skipping");
            self.bus.emit(&mut Signal::NodeSkipped {
                node,
                artifacts: &artifacts,
            });
            return Ok(NodeStatus::Skipped { artifacts });
        }

        let artifacts = self
            .pipeline
            .render(&plan, node, phase.snapshot, &self.bus)?;
        phase
            .claims
            .claim(node.path(), artifacts.iter().map(|a| &a.path))?;

        let outcomes = OutputWriter::new(phase.sink).write_all(&artifacts)?;
        let mut written = 0;
        let mut outputs = Vec::with_capacity(artifacts.len());
        for (artifact, outcome) in artifacts.iter().zip(outcomes) {
            if outcome == WriteOutcome::Written {
                written += 1;
            }
            self.bus.emit(&mut Signal::ArtifactWritten {
                node,
                artifact: &artifact.path,
                outcome,
            });
            if self.config.checks.links && links::is_html(&artifact.path) {
                let html = String::from_utf8_lossy(&artifact.bytes);
                notes
                    .links
                    .push((artifact.path.clone(), links::internal_links(&html)));
            }
            outputs.push((artifact.path.clone(), hash_bytes(&artifact.bytes)));
        }

        if let Err(e) = phase.cache.commit(node.path(), &plan.record, &outputs) {
            notes
                .diagnostics
                .push(cache_warning("commit", Some(node.path().clone()), &e));
        }
        debug!(path = %node.path(), artifacts = outputs.len(), written, "rendered");
        Ok(NodeStatus::Rendered {
            artifacts: outputs.into_iter().map(|(path, _)| path).collect(),
            written,
        })
    }
}

fn conflict_error(conflict: &RouteConflict) -> StageError {
    StageError::RouteConflict {
        artifact: conflict.artifact.clone(),
        owner: conflict.owner.clone(),
    }
}

fn cache_warning(action: &str, path: Option<SitePath>, err: &CacheError) -> Diagnostic {
    warn!(path = ?path, error = %err, "cache {action} failed");
    Diagnostic::warning(path, format!("cache {action} failed: {err}"))
}

/// Content source for a project: the content directory plus the optional
/// static and resource directories.
pub fn project_source(root: &Path, config: &SiteConfig) -> FsSource {
    FsSource::new(config.content_path(root))
        .with_static_root(config.static_path(root))
        .with_resource_root(config.resource_path(root))
}

/// Build the project at `root` into its output directory.
///
/// With `use_cache` false the previous manifest is ignored, so every node is
/// rendered; the new manifest is still written.
pub fn build_project(
    root: &Path,
    config: SiteConfig,
    use_cache: bool,
) -> Result<BuildReport, BuildError> {
    let source = project_source(root, &config);
    let sink = FsSink::new(config.output_path(root));
    let cache = if config.cache.enabled {
        let manifest = manifest_path(root, &config.cache.path);
        debug!(manifest = %manifest.display(), "opening cache");
        IncrementalCache::open(Box::new(JsonFileBackend::open(manifest)))
    } else {
        IncrementalCache::in_memory()
    };
    let cache = if use_cache { cache } else { cache.ignore_previous() };

    let site = Site::open(root, config)?;
    site.build(&source, &sink, &cache)
}

/// Plan the project at `root` without writing anything.
pub fn check_project(root: &Path, config: SiteConfig) -> Result<CheckReport, BuildError> {
    let source = project_source(root, &config);
    let site = Site::open(root, config)?;
    site.check(&source)
}
