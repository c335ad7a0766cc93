//! Output writing.
//!
//! Artifacts go through an [`OutputSink`]. Before writing, the writer asks
//! the sink for the fingerprint of what is already there and skips the write
//! when it matches, so an unchanged page keeps its file (and mtime) even
//! when the node had to be re-rendered.
//!
//! A node's artifacts are written as a unit: every changed artifact is
//! staged first and only published once all of them staged cleanly. If any
//! stage fails the staged files are discarded and nothing of that node
//! becomes visible. [`FsSink`] stages into a hidden sibling file and
//! publishes with a rename.

use crate::cache::hash_bytes;
use crate::path::SitePath;
use crate::postprocess::Artifact;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: SitePath,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Destination for artifacts.
pub trait OutputSink: Send + Sync {
    /// Fingerprint of the current content at `path`, `None` if absent.
    fn read_fingerprint(&self, path: &SitePath) -> io::Result<Option<String>>;
    fn exists(&self, path: &SitePath) -> bool;
    /// Store `bytes` for `path` without making them visible.
    fn stage(&self, path: &SitePath, bytes: &[u8]) -> io::Result<()>;
    /// Make the staged content of `path` visible, replacing what was there.
    fn publish(&self, path: &SitePath) -> io::Result<()>;
    /// Drop staged content for `path`. Missing staged content is not an
    /// error.
    fn discard(&self, path: &SitePath);
}

/// Writes artifacts below an output directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `dir/.name.tmp` next to the final file, so the rename stays on one
    /// filesystem.
    fn staging_path(&self, path: &SitePath) -> PathBuf {
        let target = path.to_fs_path(&self.root);
        let name = path.file_name().unwrap_or("index");
        target.with_file_name(format!(".{name}.tmp"))
    }
}

impl OutputSink for FsSink {
    fn read_fingerprint(&self, path: &SitePath) -> io::Result<Option<String>> {
        match std::fs::read(path.to_fs_path(&self.root)) {
            Ok(bytes) => Ok(Some(hash_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &SitePath) -> bool {
        path.to_fs_path(&self.root).is_file()
    }

    fn stage(&self, path: &SitePath, bytes: &[u8]) -> io::Result<()> {
        let staged = self.staging_path(path);
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(staged, bytes)
    }

    fn publish(&self, path: &SitePath) -> io::Result<()> {
        std::fs::rename(self.staging_path(path), path.to_fs_path(&self.root))
    }

    fn discard(&self, path: &SitePath) {
        let staged = self.staging_path(path);
        match std::fs::remove_file(&staged) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %staged.display(), error = %e, "could not remove staged file"),
        }
    }
}

/// In-memory sink that counts physical writes.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<SitePath, Vec<u8>>>,
    staged: Mutex<BTreeMap<SitePath, Vec<u8>>>,
    writes: AtomicUsize,
}

fn poisoned() -> io::Error {
    io::Error::other("memory sink lock poisoned")
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed content without counting it as a write.
    pub fn insert(&self, path: SitePath, bytes: Vec<u8>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path, bytes);
        }
    }

    pub fn get(&self, path: &SitePath) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<SitePath> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Paths staged but neither published nor discarded.
    pub fn pending(&self) -> Vec<SitePath> {
        self.staged
            .lock()
            .map(|staged| staged.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of published writes since creation or the last
    /// [`reset_writes`](Self::reset_writes).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }
}

impl OutputSink for MemorySink {
    fn read_fingerprint(&self, path: &SitePath) -> io::Result<Option<String>> {
        Ok(self.get(path).map(|bytes| hash_bytes(&bytes)))
    }

    fn exists(&self, path: &SitePath) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn stage(&self, path: &SitePath, bytes: &[u8]) -> io::Result<()> {
        self.staged
            .lock()
            .map_err(|_| poisoned())?
            .insert(path.clone(), bytes.to_vec());
        Ok(())
    }

    fn publish(&self, path: &SitePath) -> io::Result<()> {
        let bytes = self
            .staged
            .lock()
            .map_err(|_| poisoned())?
            .remove(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not staged")))?;
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .insert(path.clone(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn discard(&self, path: &SitePath) {
        if let Ok(mut staged) = self.staged.lock() {
            staged.remove(path);
        }
    }
}

/// Fingerprint-compare writer over a sink.
pub struct OutputWriter<'a> {
    sink: &'a dyn OutputSink,
}

impl<'a> OutputWriter<'a> {
    pub fn new(sink: &'a dyn OutputSink) -> Self {
        Self { sink }
    }

    /// Write every artifact whose bytes differ from what the sink holds.
    ///
    /// Changed artifacts are staged first and published only when all of
    /// them staged. On a staging failure nothing is published. A publish
    /// failure discards the artifacts not yet published; the ones before it
    /// stay in place.
    pub fn write_all(&self, artifacts: &[Artifact]) -> Result<Vec<WriteOutcome>, WriteError> {
        let mut outcomes = Vec::with_capacity(artifacts.len());
        let mut staged: Vec<&SitePath> = Vec::new();

        for artifact in artifacts {
            let path = &artifact.path;
            let step = self.sink.read_fingerprint(path).and_then(|current| {
                if current.as_deref() == Some(hash_bytes(&artifact.bytes).as_str()) {
                    return Ok(WriteOutcome::Unchanged);
                }
                self.sink.stage(path, &artifact.bytes)?;
                Ok(WriteOutcome::Written)
            });
            match step {
                Ok(outcome) => {
                    if outcome == WriteOutcome::Written {
                        staged.push(path);
                    }
                    outcomes.push(outcome);
                }
                Err(source) => {
                    self.sink.discard(path);
                    self.discard_all(&staged);
                    return Err(WriteError::WriteFailed {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        for (i, path) in staged.iter().enumerate() {
            if let Err(source) = self.sink.publish(path) {
                self.discard_all(&staged[i..]);
                return Err(WriteError::WriteFailed {
                    path: (*path).clone(),
                    source,
                });
            }
        }
        Ok(outcomes)
    }

    fn discard_all(&self, paths: &[&SitePath]) {
        for path in paths {
            self.sink.discard(path);
        }
    }
}
