//! Dependency tracking and the incremental build cache.
//!
//! Rendering a page is cheap; rendering every page on every build is not.
//! This module lets the pipeline skip nodes whose inputs have not changed
//! since the last successful build.
//!
//! # Design
//!
//! Before rendering, the pipeline *plans* each node and records everything
//! the output depends on in a [`DependencyRecord`]:
//!
//! - **`source`**: SHA-256 of the node's raw payload. Content-based rather
//!   than mtime-based so it survives `git checkout` (which resets
//!   modification times).
//! - **`metadata`**: hash of the node's effective metadata (inherited
//!   defaults included, so editing a section's `defaults` invalidates its
//!   pages).
//! - **`template`**: template id plus a fingerprint covering every template
//!   it extends, includes or imports.
//! - **`data`**: fingerprints of referenced data nodes.
//! - **`children`**: hash over the children's paths, urls and metadata, for
//!   nodes that list their children.
//! - **`processors`**: ordered transformer and post-processor ids with their
//!   configuration hashes.
//!
//! The cache stores one [`CacheEntry`] per *artifact* (output file), keyed by
//! artifact path. A node is fresh when every artifact it produced last time
//! has an entry whose record equals the current record, and the artifact
//! still exists in the output sink.
//!
//! ## Storage
//!
//! Entries go through a [`CacheBackend`], a small key-value interface.
//! [`JsonFileBackend`] keeps a versioned JSON manifest (default
//! `.quire-cache.json` in the project root) and replaces it atomically on
//! flush. A missing, corrupt or outdated manifest loads as empty: the worst
//! case is a full rebuild, never a failure.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `build` to ignore the stored entries. Everything is
//! regenerated and the manifest is rewritten from the new results.

use crate::path::SitePath;
use crate::writer::OutputSink;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Default manifest file name, relative to the project root.
pub const DEFAULT_MANIFEST_FILENAME: &str = ".quire-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or record computation changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Hashing
// ============================================================================

/// SHA-256 of a byte slice, as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 over several parts, each terminated by a NUL so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn hash_parts<I, B>(parts: I) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Records and entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDependency {
    pub id: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDependency {
    pub id: String,
    pub config: String,
}

/// Everything one node's output depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub source: String,
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateDependency>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<SitePath, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ProcessorDependency>,
}

impl DependencyRecord {
    pub fn new(source: impl Into<String>, metadata: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            metadata: metadata.into(),
            ..Self::default()
        }
    }

    pub fn record_template(&mut self, id: impl Into<String>, fingerprint: impl Into<String>) {
        self.template = Some(TemplateDependency {
            id: id.into(),
            fingerprint: fingerprint.into(),
        });
    }

    pub fn record_data(&mut self, path: SitePath, fingerprint: impl Into<String>) {
        self.data.insert(path, fingerprint.into());
    }

    pub fn record_children(&mut self, fingerprint: impl Into<String>) {
        self.children = Some(fingerprint.into());
    }

    pub fn record_processor(&mut self, id: impl Into<String>, config: impl Into<String>) {
        self.processors.push(ProcessorDependency {
            id: id.into(),
            config: config.into(),
        });
    }
}

/// One cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub node: SitePath,
    pub record: DependencyRecord,
    /// SHA-256 of the bytes written for this artifact.
    pub output: String,
}

// ============================================================================
// Backends
// ============================================================================

/// String key-value storage for cache entries.
///
/// Keys are artifact paths, values serialized [`CacheEntry`]s. Backends must
/// be safe to call from several worker threads at once.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    fn keys(&self) -> Result<Vec<String>, CacheError>;

    fn set_batch(&self, entries: Vec<(String, String)>) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Persist pending changes. No-op for volatile backends.
    fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, CacheError> {
    mutex
        .lock()
        .map_err(|_| CacheError::Backend("cache lock poisoned".into()))
}

/// Volatile backend, used when caching is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        lock(&self.entries)?.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(lock(&self.entries)?.keys().cloned().collect())
    }

    fn set_batch(&self, entries: Vec<(String, String)>) -> Result<(), CacheError> {
        lock(&self.entries)?.extend(entries);
        Ok(())
    }
}

/// On-disk manifest layout.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: BTreeMap<String, serde_json::Value>,
}

/// Versioned JSON manifest, held in memory and written back on [`flush`].
///
/// Values that are valid JSON are stored as nested objects so the manifest
/// stays human-readable.
///
/// [`flush`]: CacheBackend::flush
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileBackend {
    /// Open the manifest at `path`. Returns an empty backend if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path).unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> Option<BTreeMap<String, serde_json::Value>> {
        let content = std::fs::read_to_string(path).ok()?;
        let manifest: Manifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache manifest");
                return None;
            }
        };
        if manifest.version != MANIFEST_VERSION {
            debug!(
                found = manifest.version,
                expected = MANIFEST_VERSION,
                "cache manifest version changed, starting empty"
            );
            return None;
        }
        Some(manifest.entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(lock(&self.entries)?.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
        lock(&self.entries)?.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(lock(&self.entries)?.keys().cloned().collect())
    }

    fn flush(&self) -> Result<(), CacheError> {
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries: lock(&self.entries)?.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ============================================================================
// Incremental cache
// ============================================================================

/// Freshness decisions and commits on top of a [`CacheBackend`].
///
/// Entries are read once when the cache is opened and indexed by node, so
/// freshness checks during the parallel phase never touch the backend.
pub struct IncrementalCache {
    backend: Box<dyn CacheBackend>,
    /// Runtime index: node path → entries it produced last build. Built at
    /// open time, never updated during the build.
    previous: HashMap<SitePath, BTreeMap<SitePath, CacheEntry>>,
    commit_lock: Mutex<()>,
}

impl IncrementalCache {
    /// Read all entries from `backend`. A failing backend yields an empty
    /// snapshot, which means every node is rebuilt.
    pub fn open(backend: Box<dyn CacheBackend>) -> Self {
        let previous = match Self::index(backend.as_ref()) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "cache backend unreadable, rebuilding everything");
                HashMap::new()
            }
        };
        Self {
            backend,
            previous,
            commit_lock: Mutex::new(()),
        }
    }

    /// A cache that remembers nothing between builds.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryBackend::new()))
    }

    /// Forget the entries read at open time (`--no-cache`). Commits still
    /// go to the backend, so the next build benefits again.
    pub fn ignore_previous(mut self) -> Self {
        self.previous.clear();
        self
    }

    fn index(
        backend: &dyn CacheBackend,
    ) -> Result<HashMap<SitePath, BTreeMap<SitePath, CacheEntry>>, CacheError> {
        let mut index: HashMap<SitePath, BTreeMap<SitePath, CacheEntry>> = HashMap::new();
        for key in backend.keys()? {
            let Some(raw) = backend.get(&key)? else {
                continue;
            };
            let (Ok(artifact), Ok(entry)) = (
                SitePath::parse(&key),
                serde_json::from_str::<CacheEntry>(&raw),
            ) else {
                debug!(key, "skipping malformed cache entry");
                continue;
            };
            index
                .entry(entry.node.clone())
                .or_default()
                .insert(artifact, entry);
        }
        Ok(index)
    }

    /// Artifacts the node produced in the last recorded build.
    pub fn previous_artifacts(&self, node: &SitePath) -> Vec<SitePath> {
        self.previous
            .get(node)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// True iff every artifact the node produced last time has an entry
    /// with an identical record and still exists in the sink.
    pub fn is_fresh(
        &self,
        node: &SitePath,
        current: &DependencyRecord,
        sink: &dyn OutputSink,
    ) -> bool {
        let Some(entries) = self.previous.get(node) else {
            return false;
        };
        !entries.is_empty()
            && entries
                .iter()
                .all(|(artifact, entry)| entry.record == *current && sink.exists(artifact))
    }

    /// Persist the entries for all artifacts of one node in a single batch,
    /// replacing whatever the node produced before.
    ///
    /// Artifacts the node no longer produces are dropped, unless another
    /// node has claimed them in this build.
    pub fn commit(
        &self,
        node: &SitePath,
        record: &DependencyRecord,
        artifacts: &[(SitePath, String)],
    ) -> Result<(), CacheError> {
        let _guard = lock(&self.commit_lock)?;

        let produced: HashSet<&SitePath> = artifacts.iter().map(|(path, _)| path).collect();
        for old in self.previous_artifacts(node) {
            if produced.contains(&old) {
                continue;
            }
            if let Some(raw) = self.backend.get(&old.to_string())?
                && let Ok(entry) = serde_json::from_str::<CacheEntry>(&raw)
                && entry.node != *node
            {
                continue;
            }
            self.backend.delete(&old.to_string())?;
        }

        let batch = artifacts
            .iter()
            .map(|(artifact, output)| {
                let entry = CacheEntry {
                    node: node.clone(),
                    record: record.clone(),
                    output: output.clone(),
                };
                Ok((artifact.to_string(), serde_json::to_string(&entry)?))
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        self.backend.set_batch(batch)
    }

    /// Remove entries whose node is not in `live`. Returns how many were
    /// removed.
    pub fn prune(&self, live: &HashSet<SitePath>) -> Result<usize, CacheError> {
        let _guard = lock(&self.commit_lock)?;
        let mut removed = 0;
        for key in self.backend.keys()? {
            let keep = self
                .backend
                .get(&key)?
                .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                .is_some_and(|entry| live.contains(&entry.node));
            if !keep {
                self.backend.delete(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.backend.flush()
    }
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub pruned: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )?;
        } else {
            write!(f, "{} rendered", self.misses)?;
        }
        if self.pruned > 0 {
            write!(f, ", {} pruned", self.pruned)?;
        }
        Ok(())
    }
}

/// Resolve the manifest path for a project root and configured file name.
pub fn manifest_path(root: &Path, configured: &str) -> PathBuf {
    root.join(configured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemorySink;
    use std::fs;
    use tempfile::TempDir;

    fn p(s: &str) -> SitePath {
        SitePath::parse(s).unwrap()
    }

    fn record(source: &str) -> DependencyRecord {
        let mut r = DependencyRecord::new(source, "meta");
        r.record_template("page.html", "tpl");
        r
    }

    fn sink_with(paths: &[&str]) -> MemorySink {
        let sink = MemorySink::new();
        for path in paths {
            sink.insert(p(path), b"x".to_vec());
        }
        sink
    }

    fn committed(node: &str, rec: &DependencyRecord, artifacts: &[&str]) -> IncrementalCache {
        let backend = MemoryBackend::new();
        let cache = IncrementalCache::open(Box::new(backend));
        let artifacts: Vec<_> = artifacts.iter().map(|a| (p(a), "out".to_string())).collect();
        cache.commit(&p(node), rec, &artifacts).unwrap();
        // reopen over the same entries so they become "previous"
        reopen(cache)
    }

    fn reopen(cache: IncrementalCache) -> IncrementalCache {
        IncrementalCache::open(cache.backend)
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    #[test]
    fn hash_bytes_is_sha256_hex() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_parts_is_boundary_sensitive() {
        assert_ne!(hash_parts(["ab", "c"]), hash_parts(["a", "bc"]));
        assert_eq!(hash_parts(["a", "b"]), hash_parts(["a", "b"]));
    }

    // =========================================================================
    // Freshness
    // =========================================================================

    #[test]
    fn fresh_when_record_equal_and_artifacts_exist() {
        let cache = committed("/about", &record("src"), &["/about.html"]);
        let sink = sink_with(&["/about.html"]);
        assert!(cache.is_fresh(&p("/about"), &record("src"), &sink));
    }

    #[test]
    fn stale_when_any_record_field_differs() {
        let cache = committed("/about", &record("src"), &["/about.html"]);
        let sink = sink_with(&["/about.html"]);

        assert!(!cache.is_fresh(&p("/about"), &record("changed"), &sink));

        let mut other_template = record("src");
        other_template.record_template("page.html", "tpl2");
        assert!(!cache.is_fresh(&p("/about"), &other_template, &sink));

        let mut with_data = record("src");
        with_data.record_data(p("/authors"), "abc");
        assert!(!cache.is_fresh(&p("/about"), &with_data, &sink));
    }

    #[test]
    fn stale_when_artifact_missing_from_sink() {
        let cache = committed("/img", &record("src"), &["/a.jpg", "/a-100.jpg"]);
        let sink = sink_with(&["/a.jpg"]);
        assert!(!cache.is_fresh(&p("/img"), &record("src"), &sink));
    }

    #[test]
    fn unknown_node_is_not_fresh() {
        let cache = IncrementalCache::in_memory();
        assert!(!cache.is_fresh(&p("/x"), &record("src"), &MemorySink::new()));
    }

    #[test]
    fn ignore_previous_forces_rebuild() {
        let cache = committed("/about", &record("src"), &["/about.html"]).ignore_previous();
        let sink = sink_with(&["/about.html"]);
        assert!(!cache.is_fresh(&p("/about"), &record("src"), &sink));
    }

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        fn set(&self, _: &str, _: String) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        fn keys(&self) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    #[test]
    fn failing_backend_means_not_fresh() {
        let cache = IncrementalCache::open(Box::new(FailingBackend));
        let sink = sink_with(&["/about.html"]);
        assert!(!cache.is_fresh(&p("/about"), &record("src"), &sink));
        assert!(cache.prune(&HashSet::new()).is_err());
    }

    // =========================================================================
    // Commit and prune
    // =========================================================================

    #[test]
    fn commit_replaces_previous_artifacts_of_node() {
        let cache = committed("/img", &record("v1"), &["/a.jpg", "/a-100.jpg"]);
        cache
            .commit(&p("/img"), &record("v2"), &[(p("/a.jpg"), "o".into())])
            .unwrap();
        let cache = reopen(cache);
        assert_eq!(cache.previous_artifacts(&p("/img")), vec![p("/a.jpg")]);
    }

    #[test]
    fn commit_keeps_artifact_claimed_by_other_node() {
        let cache = committed("/old", &record("v1"), &["/shared.html"]);
        cache
            .commit(&p("/new"), &record("v1"), &[(p("/shared.html"), "o".into())])
            .unwrap();
        cache.commit(&p("/old"), &record("v2"), &[]).unwrap();
        let cache = reopen(cache);
        assert_eq!(cache.previous_artifacts(&p("/new")), vec![p("/shared.html")]);
    }

    #[test]
    fn prune_removes_entries_of_dead_nodes() {
        let cache = committed("/gone", &record("v1"), &["/gone.html"]);
        cache
            .commit(&p("/kept"), &record("v1"), &[(p("/kept.html"), "o".into())])
            .unwrap();
        let live: HashSet<SitePath> = [p("/kept")].into_iter().collect();
        assert_eq!(cache.prune(&live).unwrap(), 1);
        let cache = reopen(cache);
        assert!(cache.previous_artifacts(&p("/gone")).is_empty());
        assert_eq!(cache.previous_artifacts(&p("/kept")), vec![p("/kept.html")]);
    }

    // =========================================================================
    // JSON file backend
    // =========================================================================

    #[test]
    fn json_backend_round_trips_through_flush() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_MANIFEST_FILENAME);

        let cache = IncrementalCache::open(Box::new(JsonFileBackend::open(&path)));
        cache
            .commit(&p("/about"), &record("src"), &[(p("/about.html"), "o".into())])
            .unwrap();
        cache.flush().unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let cache = IncrementalCache::open(Box::new(JsonFileBackend::open(&path)));
        let sink = sink_with(&["/about.html"]);
        assert!(cache.is_fresh(&p("/about"), &record("src"), &sink));
    }

    #[test]
    fn json_backend_manifest_is_readable_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let backend = JsonFileBackend::open(&path);
        backend.set("/a.html", r#"{"node":"/a"}"#.into()).unwrap();
        backend.flush().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], MANIFEST_VERSION);
        assert_eq!(raw["entries"]["/a.html"]["node"], "/a");
    }

    #[test]
    fn json_backend_corrupt_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, "not json {{{").unwrap();
        assert!(JsonFileBackend::open(&path).keys().unwrap().is_empty());
    }

    #[test]
    fn json_backend_version_mismatch_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, r#"{"version":999,"entries":{"/a":"x"}}"#).unwrap();
        assert!(JsonFileBackend::open(&path).keys().unwrap().is_empty());
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let stats = CacheStats {
            hits: 5,
            misses: 2,
            pruned: 0,
        };
        assert_eq!(format!("{}", stats), "5 cached, 2 rendered (7 total)");
    }

    #[test]
    fn cache_stats_display_no_hits_with_pruned() {
        let stats = CacheStats {
            hits: 0,
            misses: 3,
            pruned: 1,
        };
        assert_eq!(format!("{}", stats), "3 rendered, 1 pruned");
    }
}
