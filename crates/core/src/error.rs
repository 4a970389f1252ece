//! Error taxonomy for the analysis pipeline.
//!
//! Only conditions that abort a run or a query are [`Error`]s. Per-file parse
//! failures, missed resolutions and an unavailable diff are ordinary values
//! ([`ParseError`], [`crate::resolve::Resolution`], [`DiffUnavailable`]) so the
//! rest of the graph stays valid.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Project root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Node not found: {0}")]
    NotFound(String),

    /// An edge or node references something the assembler never produced.
    /// This is a bug in the resolver or assembler, not a bad input.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Layout store error: {0}")]
    Layout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A file that could not be analysed. The file contributes no nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub path: String,
    /// 1-based line of the first syntax error, when known.
    pub line: Option<usize>,
    pub message: String,
}

/// Why the diff overlay could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DiffUnavailable {
    NoRepository,
    UnknownRevision(String),
    Git(String),
    Io(String),
}

impl std::fmt::Display for DiffUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffUnavailable::NoRepository => write!(f, "no git repository"),
            DiffUnavailable::UnknownRevision(rev) => {
                write!(f, "cannot resolve baseline '{rev}' (no commits?)")
            }
            DiffUnavailable::Git(msg) => write!(f, "git error: {msg}"),
            DiffUnavailable::Io(msg) => write!(f, "could not read diff: {msg}"),
        }
    }
}
