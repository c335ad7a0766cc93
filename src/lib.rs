//! # Quire
//!
//! A static site generator built around a dependency-aware, incremental
//! build pipeline. Your content directory is the data source: markdown and
//! HTML files become pages, YAML/TOML/JSON files become data, everything
//! else is copied through.
//!
//! # Architecture
//!
//! A build turns a content source into a tree of typed nodes, then renders
//! every node that changed since the last build:
//!
//! ```text
//! 1. Collect   content/ + static/ + resources/  →  SiteTree   (sequential)
//! 2. Route     SiteTree            →  node → artifact
//! 3. Resolve   SiteTree            →  effective metadata per node
//! 4. Render    per node, parallel: plan → fresh? → transform → template
//!                                  → post-process → claim → write → commit
//! 5. Links     rendered HTML       →  broken-link warnings
//! 6. Prune     cache entries of nodes that no longer exist
//! ```
//!
//! Incrementality comes from the [`cache`]: for every node the pipeline
//! records what its output depends on (source bytes, effective metadata,
//! template and everything it extends, referenced data, children,
//! processor configuration). A node whose record is unchanged and whose
//! artifacts still exist is skipped without reading its template.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`path`] | Normalized site-relative paths and glob matching |
//! | [`node`] | The node arena (`SiteTree`): insertion, ordering, traversal, fingerprints |
//! | [`collect`] | Content sources, classification, tree construction |
//! | [`frontmatter`] | YAML/TOML front-matter and data file parsing |
//! | [`metadata`] | Effective metadata layering and merge keys |
//! | [`route`] | Node → output path mapping and conflict detection |
//! | [`transform`] | Content transformers (Markdown, HTML, Sass) and their registry |
//! | [`template`] | Template engine interface, MiniJinja engine and filters, template selection |
//! | [`postprocess`] | Post-processor interface and registry |
//! | [`imaging`] | Image dimensions and the resized-derivatives post-processor |
//! | [`pipeline`] | Per-node planning and rendering |
//! | [`cache`] | Dependency records, cache backends, freshness decisions |
//! | [`writer`] | Output sinks, staged writes, fingerprint compare |
//! | [`links`] | Internal link extraction and resolution |
//! | [`signal`] | Instance-owned publish/subscribe hooks |
//! | [`builder`] | `Site`: orchestrates a whole build |
//! | [`report`] | Build report, node statuses, diagnostics |
//! | [`error`] | Per-node stage errors and their kinds |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Paths as Identity
//!
//! Nodes live in an arena keyed by [`path::SitePath`]; parents and children
//! refer to each other by path. The tree is only ever built top-down, which
//! rules out cycles by construction and keeps the whole model `Send + Sync`
//! for the parallel render phase.
//!
//! ## Runtime Templates
//!
//! Templates are loaded from disk at startup with MiniJinja. Each template
//! has an id (its relative path) and a fingerprint covering everything it
//! extends or includes, which is what lets the cache invalidate exactly the
//! pages using an edited layout.
//!
//! ## Errors Stay With Their Node
//!
//! A failing node never aborts the build. Every other node is still
//! attempted and written; the report lists failures with their
//! [`error::ErrorKind`], and the CLI exits non-zero if there were any.

pub mod builder;
pub mod cache;
pub mod collect;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod imaging;
pub mod links;
pub mod metadata;
pub mod node;
pub mod output;
pub mod path;
pub mod pipeline;
pub mod postprocess;
pub mod report;
pub mod route;
pub mod signal;
pub mod template;
pub mod transform;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
