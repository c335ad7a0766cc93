//! CLI output formatting.
//!
//! Output is **node-centric**: every line starts with the site path of the
//! node it is about, with artifacts and errors as secondary context.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! / (document) → /index.html
//!     about (document) → /about.html
//!     blog (index) → /blog/index.html
//!         first (document) → /blog/first.html
//!     authors (data)
//!
//! Problems
//!     /broken: TemplateNotFound: template not found: nope.html
//! ```
//!
//! ## Build
//!
//! ```text
//! /about → /about.html
//! /img/photo.jpg → /img/photo.jpg, /img/photo-400.jpg (2 written)
//!
//! Failed
//!     /broken: TemplateNotFound: template not found: nope.html
//!
//! Warnings
//!     /post.md: ignoring front-matter: YAML error: ...
//!
//! 5 cached, 2 rendered (7 total), 1 failed, 3 written in 12ms
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::builder::CheckReport;
use crate::path::SitePath;
use crate::report::{BuildReport, Diagnostic, NodeError, NodeStatus};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn error_line(path: &SitePath, err: &NodeError) -> String {
    format!("{}{}: {}: {}", indent(1), path, err.kind, err.message)
}

fn diagnostic_line(diagnostic: &Diagnostic) -> String {
    match &diagnostic.path {
        Some(path) => format!("{}{}: {}", indent(1), path, diagnostic.message),
        None => format!("{}{}", indent(1), diagnostic.message),
    }
}

fn artifact_list(artifacts: &[SitePath]) -> String {
    artifacts
        .iter()
        .map(SitePath::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_section(lines: &mut Vec<String>, title: &str, body: Vec<String>) {
    if body.is_empty() {
        return;
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(title.to_string());
    lines.extend(body);
}

// ============================================================================
// Check
// ============================================================================

/// Format the site tree with routes, then problems and warnings.
pub fn format_check_output(report: &CheckReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .tree
        .walk()
        .map(|node| {
            let path = node.path();
            let name = if path.is_root() {
                "/".to_string()
            } else {
                path.file_name().unwrap_or_default().to_string()
            };
            let head = format!(
                "{}{} ({})",
                indent(path.depth()),
                name,
                node.kind().as_str()
            );
            match report.routes.get(path) {
                Some(artifact) => format!("{head} → {artifact}"),
                None => head,
            }
        })
        .collect();

    let problems = report
        .problems
        .iter()
        .map(|(path, err)| error_line(path, err))
        .collect();
    push_section(&mut lines, "Problems", problems);
    push_section(
        &mut lines,
        "Warnings",
        report.diagnostics.iter().map(diagnostic_line).collect(),
    );
    lines
}

pub fn print_check_output(report: &CheckReport) {
    for line in format_check_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format a build report: rendered nodes, failures, warnings and a summary.
///
/// Skipped nodes are not listed individually; they show up in the summary.
pub fn format_build_output(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    for node in &report.nodes {
        if let NodeStatus::Rendered { artifacts, written } = &node.status {
            let mut line = format!("{} → {}", node.path, artifact_list(artifacts));
            if artifacts.len() > 1 {
                line.push_str(&format!(" ({written} written)"));
            } else if *written == 0 {
                line.push_str(" (unchanged)");
            }
            lines.push(line);
        }
    }

    let failed = report
        .failures()
        .map(|(path, err)| error_line(path, err))
        .collect();
    push_section(&mut lines, "Failed", failed);
    push_section(
        &mut lines,
        "Warnings",
        report.warnings().map(diagnostic_line).collect(),
    );

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format_summary(report));
    lines
}

/// One-line summary of a build.
pub fn format_summary(report: &BuildReport) -> String {
    let mut summary = report.cache.to_string();
    let failed = report.failures().count();
    if failed > 0 {
        summary.push_str(&format!(", {failed} failed"));
    }
    let cancelled = report.cancelled();
    if cancelled > 0 {
        summary.push_str(&format!(", {cancelled} cancelled"));
    }
    summary.push_str(&format!(
        ", {} written in {}ms",
        report.written(),
        report.duration.as_millis()
    ));
    summary
}

pub fn print_build_output(report: &BuildReport) {
    for line in format_build_output(report) {
        println!("{}", line);
    }
}
