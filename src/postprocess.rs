//! Post-processing of rendered artifacts.
//!
//! After a node is rendered (or, for static files, read), its primary
//! artifact runs through every applicable [`PostProcessor`] in registration
//! order. A processor may rewrite the bytes and may add derivative
//! artifacts, such as resized copies of an image. Derivatives produced by
//! one processor are visible to the processors registered after it.

use crate::error::StageError;
use crate::metadata::Metadata;
use crate::node::Node;
use crate::path::SitePath;
use std::sync::Arc;

/// One output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: SitePath,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(path: SitePath, bytes: Vec<u8>) -> Self {
        Self { path, bytes }
    }
}

pub trait PostProcessor: Send + Sync {
    fn id(&self) -> &str;

    /// Hash of the configuration that influences the output. Part of the
    /// dependency record, so changing it invalidates cached artifacts.
    fn config_hash(&self) -> String {
        String::new()
    }

    fn applies_to(&self, node: &Node, artifact: &SitePath) -> bool;

    /// Transform one artifact. The returned list replaces the input; return
    /// `vec![artifact]` to keep it unchanged.
    fn process(&self, artifact: Artifact, metadata: &Metadata) -> Result<Vec<Artifact>, StageError>;
}

#[derive(Default, Clone)]
pub struct PostProcessorRegistry {
    processors: Vec<Arc<dyn PostProcessor>>,
}

impl PostProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: impl PostProcessor + 'static) -> &mut Self {
        self.processors.push(Arc::new(processor));
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Processors that apply to the node's primary artifact, in order.
    pub fn applicable(&self, node: &Node, primary: &SitePath) -> Vec<Arc<dyn PostProcessor>> {
        self.processors
            .iter()
            .filter(|p| p.applies_to(node, primary))
            .cloned()
            .collect()
    }

    /// Run `processors` over the primary artifact and every artifact
    /// derived from it.
    pub fn run(
        processors: &[Arc<dyn PostProcessor>],
        node: &Node,
        primary: Artifact,
        metadata: &Metadata,
    ) -> Result<Vec<Artifact>, StageError> {
        let mut artifacts = vec![primary];
        for processor in processors {
            let mut next = Vec::with_capacity(artifacts.len());
            for artifact in artifacts {
                if processor.applies_to(node, &artifact.path) {
                    next.extend(processor.process(artifact, metadata)?);
                } else {
                    next.push(artifact);
                }
            }
            artifacts = next;
        }
        Ok(artifacts)
    }
}
