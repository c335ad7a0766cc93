//! Templates: selection, fingerprinting and rendering.
//!
//! The pipeline only talks to a [`TemplateEngine`]: it asks for a template's
//! fingerprint while planning a node and renders with a JSON context. The
//! default engine is [`MiniJinjaEngine`], which loads every file under the
//! templates directory up front.
//!
//! ## Fingerprints
//!
//! A template's fingerprint covers its own source and, transitively, every
//! template it pulls in through `extends`, `include`, `import` or `from`.
//! Editing `base.html` therefore invalidates every page whose template
//! extends it.
//!
//! Every name of a literal list (`{% include ["a.html", "b.html"] %}`) is a
//! reference, missing ones included. A name computed at render time
//! (`{% include page.partial %}`) cannot be resolved up front, so the
//! fingerprint of a template reaching one covers every loaded template.
//!
//! ## Child queries
//!
//! Three filters narrow and order a branch's `children`:
//!
//! ```jinja
//! {% for post in children | with_tag("tags", "rust") | sorted_by_title %}
//! {% for post in children | with_tag("draft", false) | sorted_by_tag("date", reverse=true) %}
//! ```
//!
//! `with_tag(key)` keeps items that have `key`; with a value it keeps items
//! whose `key` equals it or, for a list, contains it. Items missing the sort
//! key go last.
//!
//! ## Selection
//!
//! [`TemplateSelector`] picks the template id for a node:
//!
//! 1. the node's `template` metadata key
//! 2. the longest matching pattern in `[templates.routes]`
//! 3. the kind default in `[templates.kinds]`
//! 4. `templates.default`

use crate::cache::hash_parts;
use crate::config::TemplatesConfig;
use crate::metadata::Metadata;
use crate::node::{Node, NodeKind};
use minijinja::value::{Kwargs, ValueKind};
use minijinja::{AutoEscape, Environment};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Metadata key naming a node's template explicitly.
pub const TEMPLATE_KEY: &str = "template";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template {template} failed: {message}")]
pub struct TemplateError {
    pub template: String,
    pub message: String,
}

impl TemplateError {
    fn new(template: &str, message: impl Into<String>) -> Self {
        Self {
            template: template.to_string(),
            message: message.into(),
        }
    }
}

pub trait TemplateEngine: Send + Sync {
    /// Fingerprint of the template and everything it references, or `None`
    /// if no template with that id exists.
    fn fingerprint(&self, id: &str) -> Option<String>;

    fn render(&self, id: &str, context: &Value) -> Result<Vec<u8>, TemplateError>;
}

/// Jinja-style templates via `minijinja`, with autoescaping off.
pub struct MiniJinjaEngine {
    env: Environment<'static>,
    fingerprints: BTreeMap<String, String>,
    /// Templates that failed to compile, with the compiler message.
    broken: BTreeMap<String, String>,
}

impl MiniJinjaEngine {
    /// Load every file below `dir`, named by its `/`-separated relative
    /// path. A missing directory yields an engine without templates.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut templates = Vec::new();
        if dir.is_dir() {
            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = entry.map_err(std::io::Error::other)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                templates.push((name, std::fs::read_to_string(entry.path())?));
            }
        } else {
            debug!(dir = %dir.display(), "templates directory missing");
        }
        Ok(Self::from_templates(templates))
    }

    pub fn from_templates<I, N, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let sources: BTreeMap<String, String> = templates
            .into_iter()
            .map(|(name, source)| (name.into(), source.into()))
            .collect();

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("with_tag", with_tag);
        env.add_filter("sorted_by_title", sorted_by_title);
        env.add_filter("sorted_by_tag", sorted_by_tag);
        let mut broken = BTreeMap::new();
        for (name, source) in &sources {
            if let Err(e) = env.add_template_owned(name.clone(), source.clone()) {
                debug!(template = %name, error = %e, "template failed to compile");
                broken.insert(name.clone(), e.to_string());
            }
        }

        let fingerprints = sources
            .keys()
            .map(|name| (name.clone(), transitive_fingerprint(name, &sources)))
            .collect();

        Self {
            env,
            fingerprints,
            broken,
        }
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn fingerprint(&self, id: &str) -> Option<String> {
        self.fingerprints.get(id).cloned()
    }

    fn render(&self, id: &str, context: &Value) -> Result<Vec<u8>, TemplateError> {
        if let Some(message) = self.broken.get(id) {
            return Err(TemplateError::new(id, message.clone()));
        }
        let template = self
            .env
            .get_template(id)
            .map_err(|e| TemplateError::new(id, e.to_string()))?;
        template
            .render(context)
            .map(String::into_bytes)
            .map_err(|e| TemplateError::new(id, e.to_string()))
    }
}

// ============================================================================
// Child query filters
// ============================================================================

type JinjaValue = minijinja::Value;

fn attr(item: &JinjaValue, key: &str) -> Option<JinjaValue> {
    item.get_attr(key)
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_none())
}

fn with_tag(items: Vec<JinjaValue>, key: &str, value: Option<JinjaValue>) -> Vec<JinjaValue> {
    items
        .into_iter()
        .filter(|item| {
            let Some(found) = attr(item, key) else {
                return false;
            };
            match &value {
                None => true,
                Some(wanted) if found == *wanted => true,
                Some(wanted) => {
                    found.kind() == ValueKind::Seq
                        && found
                            .try_iter()
                            .is_ok_and(|mut entries| entries.any(|entry| entry == *wanted))
                }
            }
        })
        .collect()
}

fn sort_by_key(mut items: Vec<JinjaValue>, key: &str, reverse: bool) -> Vec<JinjaValue> {
    items.sort_by(|a, b| match (attr(a, key), attr(b, key)) {
        (Some(a), Some(b)) => {
            let order = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if reverse { order.reverse() } else { order }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    items
}

fn reverse_flag(kwargs: &Kwargs) -> Result<bool, minijinja::Error> {
    let reverse = kwargs.get::<Option<bool>>("reverse")?.unwrap_or(false);
    kwargs.assert_all_used()?;
    Ok(reverse)
}

fn sorted_by_title(items: Vec<JinjaValue>, kwargs: Kwargs) -> Result<Vec<JinjaValue>, minijinja::Error> {
    Ok(sort_by_key(items, "title", reverse_flag(&kwargs)?))
}

fn sorted_by_tag(
    items: Vec<JinjaValue>,
    key: &str,
    kwargs: Kwargs,
) -> Result<Vec<JinjaValue>, minijinja::Error> {
    Ok(sort_by_key(items, key, reverse_flag(&kwargs)?))
}

// ============================================================================
// References
// ============================================================================

/// Target of an `extends`, `include`, `import` or `from` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    Named(String),
    /// Computed at render time.
    Dynamic,
}

/// Templates referenced by `extends`, `include`, `import` and `from` tags,
/// in source order.
pub fn referenced_templates(source: &str) -> Vec<TemplateRef> {
    let mut found = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{%") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("%}") else {
            break;
        };
        let tag = after[..end].trim_matches(|c: char| c == '-' || c == '+' || c.is_whitespace());
        let mut words = tag.splitn(2, char::is_whitespace);
        if let (Some("extends" | "include" | "import" | "from"), Some(args)) =
            (words.next(), words.next())
        {
            found.extend(parse_reference(args));
        }
        rest = &after[end + 2..];
    }
    found
}

/// A single literal or a list of literals, followed by nothing or a tag
/// keyword. Anything else is an expression.
fn parse_reference(args: &str) -> Vec<TemplateRef> {
    let args = args.trim_start();
    let parsed = match args.strip_prefix('[') {
        Some(list) => literal_list(list),
        None => string_literal(args).map(|(name, rest)| (vec![name], rest)),
    };
    match parsed {
        Some((names, rest)) if ends_reference(rest) => names
            .into_iter()
            .map(|name| TemplateRef::Named(name.to_string()))
            .collect(),
        _ => vec![TemplateRef::Dynamic],
    }
}

fn string_literal(s: &str) -> Option<(&str, &str)> {
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &s[1..];
    let close = body.find(quote)?;
    Some((&body[..close], &body[close + 1..]))
}

fn literal_list(mut s: &str) -> Option<(Vec<&str>, &str)> {
    let mut names = Vec::new();
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix(']') {
            return Some((names, rest));
        }
        let (name, rest) = string_literal(s)?;
        names.push(name);
        let rest = rest.trim_start();
        s = match rest.strip_prefix(',') {
            Some(next) => next,
            None if rest.starts_with(']') => rest,
            None => return None,
        };
    }
}

fn ends_reference(rest: &str) -> bool {
    matches!(
        rest.split_whitespace().next(),
        None | Some("ignore" | "with" | "without" | "as" | "import")
    )
}

fn transitive_fingerprint(root: &str, sources: &BTreeMap<String, String>) -> String {
    let mut seen = BTreeSet::new();
    let mut pending = vec![root.to_string()];
    let mut dynamic = false;
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(source) = sources.get(&name) else {
            continue;
        };
        for reference in referenced_templates(source) {
            match reference {
                TemplateRef::Named(target) => pending.push(target),
                TemplateRef::Dynamic => dynamic = true,
            }
        }
    }
    if dynamic {
        seen.extend(sources.keys().cloned());
    }
    // Ordered by name; a referenced but missing template hashes as its name
    // only, so creating it later changes the fingerprint.
    hash_parts(seen.iter().flat_map(|name| {
        let source = sources.get(name).map(String::as_str).unwrap_or("\u{0}missing");
        [name.as_str(), source]
    }))
}

/// Picks the template id for a node.
#[derive(Debug, Clone, Default)]
pub struct TemplateSelector {
    default: Option<String>,
    kinds: BTreeMap<NodeKind, String>,
    /// Glob pattern → template, longest pattern first.
    routes: Vec<(String, String)>,
}

impl TemplateSelector {
    pub fn new(default: Option<String>) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn from_config(config: &TemplatesConfig) -> Self {
        let mut selector = Self::new(config.default.clone());
        for (kind, template) in &config.kinds {
            if let Some(kind) = NodeKind::parse(kind) {
                selector.kinds.insert(kind, template.clone());
            }
        }
        for (pattern, template) in &config.routes {
            selector = selector.with_route(pattern.clone(), template.clone());
        }
        selector
    }

    pub fn with_kind(mut self, kind: NodeKind, template: impl Into<String>) -> Self {
        self.kinds.insert(kind, template.into());
        self
    }

    /// Add a route pattern. Among patterns of equal length the one added
    /// first wins.
    pub fn with_route(mut self, pattern: impl Into<String>, template: impl Into<String>) -> Self {
        self.routes.push((pattern.into(), template.into()));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Template id for a node, given its effective metadata.
    pub fn select(&self, node: &Node, metadata: &Metadata) -> Option<String> {
        if let Some(Value::String(explicit)) = metadata.get(TEMPLATE_KEY) {
            return Some(explicit.clone());
        }
        let path = node.path();
        if let Some((_, template)) = self.routes.iter().find(|(pattern, _)| path.matches(pattern)) {
            return Some(template.clone());
        }
        self.kinds
            .get(&node.kind())
            .or(self.default.as_ref())
            .cloned()
    }
}
