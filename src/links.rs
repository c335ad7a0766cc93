//! Internal link checking.
//!
//! After the parallel phase every rendered HTML artifact is scanned for
//! `href` and `src` attributes. Site-absolute targets (`/about.html`,
//! `/blog/`) that match no artifact of the build are reported as warnings;
//! relative, protocol-relative and external links are not checked.

use crate::path::SitePath;
use crate::route::{INDEX_FILE, url_for};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static LINK_ATTR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:href|src)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()
});

/// True for artifacts whose bytes are scanned for links.
pub fn is_html(artifact: &SitePath) -> bool {
    matches!(artifact.extension(), Some("html" | "htm"))
}

/// Site-absolute link targets in `html`, in document order, without
/// fragment or query.
pub fn internal_links(html: &str) -> Vec<String> {
    let Some(pattern) = LINK_ATTR.as_ref() else {
        return Vec::new();
    };
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| internal_target(m.as_str()))
        .collect()
}

fn internal_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !raw.starts_with('/') || raw.starts_with("//") {
        return None;
    }
    let end = raw.find(['#', '?']).unwrap_or(raw.len());
    Some(raw[..end].to_string())
}

/// Every address an artifact of this build answers to.
#[derive(Debug, Default)]
pub struct LinkIndex {
    known: HashSet<String>,
}

impl LinkIndex {
    pub fn new<'a>(artifacts: impl IntoIterator<Item = &'a SitePath>) -> Self {
        let mut known = HashSet::new();
        for artifact in artifacts {
            known.insert(artifact.to_string());
            known.insert(url_for(artifact));
        }
        Self { known }
    }

    /// Whether `link` reaches an artifact. `/dir` and `/dir/` both resolve
    /// to `/dir/index.html`.
    pub fn resolves(&self, link: &str) -> bool {
        let trimmed = link.trim_end_matches('/');
        self.known.contains(link)
            || self.known.contains(&format!("{trimmed}/"))
            || self.known.contains(&format!("{trimmed}/{INDEX_FILE}"))
    }

    pub fn broken<'l>(&self, links: &'l [String]) -> impl Iterator<Item = &'l str> {
        links
            .iter()
            .map(String::as_str)
            .filter(|link| !self.resolves(link))
    }
}
