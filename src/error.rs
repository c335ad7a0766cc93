//! Per-node error types shared by the pipeline stages.
//!
//! Tree construction, collection, configuration and cache errors live with
//! their modules. This module holds the errors a single node can end in, and
//! the [`ErrorKind`] used to summarize failures at the end of a build.

use crate::path::SitePath;
use crate::template::TemplateError;
use crate::writer::WriteError;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure, used in build summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum ErrorKind {
    DuplicatePath,
    OrphanedPath,
    NotFound,
    UnsupportedContentType,
    TemplateNotFound,
    TemplateError,
    DataNotFound,
    RouteConflict,
    TransformFailed,
    PostProcessFailed,
    WriteFailed,
    CacheBackendError,
    Io,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DuplicatePath => "DuplicatePath",
            ErrorKind::OrphanedPath => "OrphanedPath",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::UnsupportedContentType => "UnsupportedContentType",
            ErrorKind::TemplateNotFound => "TemplateNotFound",
            ErrorKind::TemplateError => "TemplateError",
            ErrorKind::DataNotFound => "DataNotFound",
            ErrorKind::RouteConflict => "RouteConflict",
            ErrorKind::TransformFailed => "TransformFailed",
            ErrorKind::PostProcessFailed => "PostProcessFailed",
            ErrorKind::WriteFailed => "WriteFailed",
            ErrorKind::CacheBackendError => "CacheBackendError",
            ErrorKind::Io => "Io",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Failure of one node in one of the processing stages.
///
/// Stage errors never abort a build: the node is marked failed, nothing is
/// written for it, and its cache entries are left untouched.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("no transformer registered for {format:?} content")]
    UnsupportedContentType { format: String },
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("referenced data node not found: {0}")]
    DataNotFound(String),
    #[error("artifact {artifact} is already produced by {owner}")]
    RouteConflict { artifact: SitePath, owner: SitePath },
    #[error("transformer {transformer} failed: {message}")]
    Transform { transformer: String, message: String },
    #[error("post-processor {processor} failed: {message}")]
    PostProcess { processor: String, message: String },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("build cancelled")]
    Cancelled,
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::UnsupportedContentType { .. } => ErrorKind::UnsupportedContentType,
            StageError::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            StageError::Template(_) => ErrorKind::TemplateError,
            StageError::DataNotFound(_) => ErrorKind::DataNotFound,
            StageError::RouteConflict { .. } => ErrorKind::RouteConflict,
            StageError::Transform { .. } => ErrorKind::TransformFailed,
            StageError::PostProcess { .. } => ErrorKind::PostProcessFailed,
            StageError::Write(_) => ErrorKind::WriteFailed,
            StageError::Io(_) => ErrorKind::Io,
            StageError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
