//! Site-relative paths.
//!
//! Every node in the content tree and every output artifact is addressed by a
//! [`SitePath`]: an ordered list of segments relative to the site root. The
//! textual form always starts with `/` (`/blog/first-post`), the root is `/`.
//!
//! Paths are normalized on parse: empty segments and `.` are dropped, `..` is
//! rejected rather than resolved so a path can never escape the site root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path segment {segment:?} in {path:?}")]
    InvalidSegment { path: String, segment: String },
}

/// A normalized, site-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SitePath {
    segments: Vec<String>,
}

impl SitePath {
    /// The site root, `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path, normalizing redundant separators.
    ///
    /// Both `"a/b"` and `"/a//b/"` parse to `/a/b`.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(PathError::InvalidSegment {
                        path: raw.to_string(),
                        segment: segment.to_string(),
                    });
                }
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Build a path from a filesystem path relative to some content root.
    pub fn from_relative(rel: &Path) -> Result<Self, PathError> {
        Self::parse(&rel.to_string_lossy())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<SitePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Final segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Final segment without its extension.
    pub fn file_stem(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => Some(name),
            Some(dot) => Some(&name[..dot]),
        }
    }

    /// Extension of the final segment, case preserved.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(dot) => Some(&name[dot + 1..]),
        }
    }

    /// Append one segment. The segment must not contain separators.
    pub fn child(&self, segment: &str) -> Result<SitePath, PathError> {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\'])
        {
            return Err(PathError::InvalidSegment {
                path: self.to_string(),
                segment: segment.to_string(),
            });
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Replace (or add) the extension of the final segment.
    ///
    /// Has no effect on the root.
    pub fn with_extension(&self, ext: &str) -> SitePath {
        let Some(stem) = self.file_stem() else {
            return self.clone();
        };
        let name = if ext.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{ext}")
        };
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            *last = name;
        }
        Self { segments }
    }

    /// Replace the final segment. Has no effect on the root.
    pub fn with_file_name(&self, name: &str) -> SitePath {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            *last = name.to_string();
        }
        Self { segments }
    }

    /// All strict ancestors, root first.
    pub fn ancestors(&self) -> Vec<SitePath> {
        (0..self.depth())
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Resolve against a directory on disk.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in &self.segments {
            out.push(segment);
        }
        out
    }

    /// Path without the leading slash, as used for artifact keys on disk.
    pub fn to_relative_string(&self) -> String {
        self.segments.join("/")
    }

    /// Match the textual form (`/a/b`) against a glob pattern.
    ///
    /// See [`glob_match`] for the pattern syntax.
    pub fn matches(&self, pattern: &str) -> bool {
        glob_match(pattern, &self.to_string())
    }
}

/// Minimal glob matcher: `*` matches any run of characters (including `/`),
/// `?` matches exactly one character, everything else matches literally.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, at)) => {
                    p = star + 1;
                    t = at + 1;
                    backtrack = Some((star, at + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

impl fmt::Display for SitePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl TryFrom<String> for SitePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SitePath> for String {
    fn from(value: SitePath) -> Self {
        value.to_string()
    }
}
