//! Error types for planning state operations
//!
//! Only the fatal class lives here: unreadable files, corrupt manifests,
//! missing directories. Drift, staleness and context warnings are ordinary
//! result values and never travel through these types.

use std::path::PathBuf;
use thiserror::Error;

use crate::checkpoint::ManifestError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::frontmatter::FrontmatterError;
use crate::persist::{AtomicWriteError, LockError, SessionError};

/// Crate result type alias
pub type Result<T> = std::result::Result<T, PlanStateError>;

/// Umbrella error for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum PlanStateError {
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Required directory not found: {0}")]
    DirectoryMissing(PathBuf),

    #[error("Phase '{0}' does not resolve to a phase directory")]
    PhaseNotFound(String),

    #[error(transparent)]
    AtomicWrite(#[from] AtomicWriteError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PlanStateError {
    /// Whether retrying the same call later could succeed.
    ///
    /// Only lock contention qualifies; everything else reflects state on
    /// disk that will not change by itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlanStateError::Lock(LockError::Contended { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_is_transient() {
        let err = PlanStateError::from(LockError::Contended {
            path: "/tmp/STATE.md.lock".into(),
            attempts: 3,
        });
        assert!(err.is_transient());
        assert!(err.to_string().contains("could not acquire lock"));
    }

    #[test]
    fn missing_directory_is_not_transient() {
        let err = PlanStateError::DirectoryMissing("/tmp/nope".into());
        assert!(!err.is_transient());
    }
}
