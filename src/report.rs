//! Build results.
//!
//! A build never stops at the first broken page. Every node ends up in one
//! [`NodeStatus`], collection problems are recorded as [`Diagnostic`]s, and
//! the CLI decides the exit code from [`BuildReport::is_success`].

use crate::cache::CacheStats;
use crate::error::{ErrorKind, StageError};
use crate::node::NodeKind;
use crate::path::SitePath;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem worth reporting that is not tied to a node's own failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: Option<SitePath>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(path: Option<SitePath>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path,
            message: message.into(),
        }
    }

    pub fn error(path: Option<SitePath>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path,
            message: message.into(),
        }
    }
}

/// Why a node failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StageError> for NodeError {
    fn from(err: &StageError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeStatus {
    /// Rendered this build. `written` counts artifacts whose bytes changed.
    Rendered {
        artifacts: Vec<SitePath>,
        written: usize,
    },
    /// Dependency record unchanged; previous artifacts kept.
    Skipped { artifacts: Vec<SitePath> },
    Failed(NodeError),
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub path: SitePath,
    pub kind: NodeKind,
    pub status: NodeStatus,
}

#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    /// Routable nodes in walk order.
    pub nodes: Vec<NodeReport>,
    pub diagnostics: Vec<Diagnostic>,
    /// Nodes in the tree, routable or not.
    pub tree_size: usize,
    #[serde(skip)]
    pub cache: CacheStats,
    #[serde(skip)]
    pub duration: Duration,
}

impl BuildReport {
    /// True iff no node ended in an error.
    pub fn is_success(&self) -> bool {
        !self
            .nodes
            .iter()
            .any(|n| matches!(n.status, NodeStatus::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SitePath, &NodeError)> {
        self.nodes.iter().filter_map(|n| match &n.status {
            NodeStatus::Failed(err) => Some((&n.path, err)),
            _ => None,
        })
    }

    pub fn rendered(&self) -> usize {
        self.count(|s| matches!(s, NodeStatus::Rendered { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, NodeStatus::Skipped { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, NodeStatus::Cancelled))
    }

    /// Artifacts physically written this build.
    pub fn written(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match &n.status {
                NodeStatus::Rendered { written, .. } => *written,
                _ => 0,
            })
            .sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn status_of(&self, path: &SitePath) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| &n.path == path).map(|n| &n.status)
    }

    fn count(&self, pred: impl Fn(&NodeStatus) -> bool) -> usize {
        self.nodes.iter().filter(|n| pred(&n.status)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> SitePath {
        SitePath::parse(s).unwrap()
    }

    fn node(path: &str, status: NodeStatus) -> NodeReport {
        NodeReport {
            path: p(path),
            kind: NodeKind::Document,
            status,
        }
    }

    #[test]
    fn success_iff_no_failed_node() {
        let mut report = BuildReport {
            nodes: vec![
                node("/a", NodeStatus::Skipped { artifacts: vec![] }),
                node("/b", NodeStatus::Cancelled),
            ],
            ..BuildReport::default()
        };
        report.diagnostics.push(Diagnostic::warning(None, "meh"));
        assert!(report.is_success());

        report.nodes.push(node(
            "/c",
            NodeStatus::Failed(NodeError::from(&StageError::TemplateNotFound("x".into()))),
        ));
        assert!(!report.is_success());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &p("/c"));
        assert_eq!(failures[0].1.kind, ErrorKind::TemplateNotFound);
    }

    #[test]
    fn counts_by_status() {
        let report = BuildReport {
            nodes: vec![
                node(
                    "/a",
                    NodeStatus::Rendered {
                        artifacts: vec![p("/a.html")],
                        written: 1,
                    },
                ),
                node(
                    "/b",
                    NodeStatus::Rendered {
                        artifacts: vec![p("/b.jpg"), p("/b-100.jpg")],
                        written: 2,
                    },
                ),
                node("/c", NodeStatus::Skipped { artifacts: vec![] }),
            ],
            ..BuildReport::default()
        };
        assert_eq!(report.rendered(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.written(), 3);
        assert_eq!(report.cancelled(), 0);
    }
}
