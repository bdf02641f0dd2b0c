use std::path::PathBuf;
use thiserror::Error;

/// Core error type for project loading and configuration.
///
/// Compile-pass failures use [`crate::bundle::CompileError`] instead: they are
/// part of the engine's reload protocol, not host-side faults.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read project file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
