//! Fatal conditions raised while correlating hook events
//!
//! Every variant aborts the current root-method run. Expected no-ops
//! (events outside a session, identity mismatches, "do not capture")
//! are never errors and never reach this type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the hook entry points
#[derive(Error, Debug)]
pub enum HookError {
    #[error("code line key is duplicated: {0}")]
    DuplicateLineKey(String),

    #[error("code line key not found: {0}")]
    LineKeyNotFound(String),

    #[error("unresolved test step statement reached capture decision: {method} [{index}]")]
    UnresolvedTestStep { method: String, index: usize },

    #[error("{count} root methods match {class}.{method}, expected exactly one")]
    AmbiguousRootMethod {
        class: String,
        method: String,
        count: usize,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize run result: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl HookError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for hook event handling
pub type Result<T> = std::result::Result<T, HookError>;
