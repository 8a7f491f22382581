use crate::repository::RepositoryError;
use std::io;
use thiserror::Error;

/// Errors raised while assembling or running an import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("cannot read source '{path}': {source}")]
    Source {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("target path '{0}' does not exist")]
    TargetNotFound(String),
    #[error("invalid importer configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Task is already running")]
    AlreadyRunning,
    #[error("import task failed: {0}")]
    TaskFailed(String),
    #[error("import worker panicked: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub fn unreadable(path: impl Into<String>, source: io::Error) -> Self {
        ImportError::Source {
            path: path.into(),
            source,
        }
    }

    /// Failures scoped to one source node; the import carries on without it.
    pub fn is_node_scoped(&self) -> bool {
        match self {
            ImportError::Source { .. } => true,
            ImportError::Repository(err) => err.is_recoverable(),
            _ => false,
        }
    }
}
