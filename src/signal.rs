//! Publish/subscribe hooks into the build.
//!
//! A [`SignalBus`] is created by its owner (normally one per [`Site`]) and
//! passed explicitly; there is no global registry. Handlers subscribe to one
//! [`EventKind`] and receive a mutable [`Signal`], so they can inject
//! metadata, adjust the render context or rewrite artifacts:
//!
//! ```text
//! NodeDiscovered   collector, after insertion      overrides (mut)
//! PreRender        before the template runs        context (mut)
//! PostRender       after post-processing           artifacts (mut)
//! NodeSkipped      cache fresh, nothing rendered
//! ArtifactWritten  after each artifact write
//! BuildComplete    once, with the final report
//! ```
//!
//! Handlers run synchronously on the emitting thread in subscription order.
//! A handler that returns an error or panics is logged and recorded as a
//! warning; the remaining handlers still run and the build continues.
//!
//! [`Site`]: crate::builder::Site

use crate::metadata::Metadata;
use crate::node::Node;
use crate::path::SitePath;
use crate::postprocess::Artifact;
use crate::report::{BuildReport, Diagnostic};
use crate::writer::WriteOutcome;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeDiscovered,
    PreRender,
    PostRender,
    NodeSkipped,
    ArtifactWritten,
    BuildComplete,
}

pub enum Signal<'a> {
    NodeDiscovered {
        node: &'a Node,
        overrides: &'a mut Metadata,
    },
    PreRender {
        node: &'a Node,
        template: &'a str,
        context: &'a mut Value,
    },
    PostRender {
        node: &'a Node,
        artifacts: &'a mut Vec<Artifact>,
    },
    NodeSkipped {
        node: &'a Node,
        artifacts: &'a [SitePath],
    },
    ArtifactWritten {
        node: &'a Node,
        artifact: &'a SitePath,
        outcome: WriteOutcome,
    },
    BuildComplete {
        report: &'a BuildReport,
    },
}

impl Signal<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Signal::NodeDiscovered { .. } => EventKind::NodeDiscovered,
            Signal::PreRender { .. } => EventKind::PreRender,
            Signal::PostRender { .. } => EventKind::PostRender,
            Signal::NodeSkipped { .. } => EventKind::NodeSkipped,
            Signal::ArtifactWritten { .. } => EventKind::ArtifactWritten,
            Signal::BuildComplete { .. } => EventKind::BuildComplete,
        }
    }

    /// Path of the node the event is about, if any.
    pub fn node_path(&self) -> Option<&SitePath> {
        match self {
            Signal::NodeDiscovered { node, .. }
            | Signal::PreRender { node, .. }
            | Signal::PostRender { node, .. }
            | Signal::NodeSkipped { node, .. }
            | Signal::ArtifactWritten { node, .. } => Some(node.path()),
            Signal::BuildComplete { .. } => None,
        }
    }
}

/// Error returned by a handler.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct PluginError(pub String);

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = dyn Fn(&mut Signal<'_>) -> Result<(), PluginError> + Send + Sync;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Arc<Handler>,
}

#[derive(Default)]
pub struct SignalBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
    faults: Mutex<Vec<Diagnostic>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&mut Signal<'_>) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.push(Subscription {
                id,
                kind,
                handler: Arc::new(handler),
            });
        }
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subs) = self.subscriptions.write() else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscriptions
            .read()
            .map(|subs| subs.iter().any(|s| s.kind == kind))
            .unwrap_or(false)
    }

    /// Deliver `signal` to every handler subscribed to its kind.
    ///
    /// Returns the number of handlers that failed.
    pub fn emit(&self, signal: &mut Signal<'_>) -> usize {
        let kind = signal.kind();
        // Snapshot so handlers can (un)subscribe without deadlocking.
        let handlers: Vec<Arc<Handler>> = match self.subscriptions.read() {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| Arc::clone(&s.handler))
                .collect(),
            Err(_) => return 0,
        };

        let mut failed = 0;
        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(signal)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            failed += 1;
            let path = signal.node_path().cloned();
            warn!(event = ?kind, path = ?path, "signal handler failed: {message}");
            if let Ok(mut faults) = self.faults.lock() {
                faults.push(Diagnostic::warning(
                    path,
                    format!("{kind:?} handler failed: {message}"),
                ));
            }
        }
        failed
    }

    /// Drain the warnings recorded for failed handlers.
    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.faults
            .lock()
            .map(|mut faults| std::mem::take(&mut *faults))
            .unwrap_or_default()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
