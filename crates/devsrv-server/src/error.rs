//! Server error types.

use std::path::PathBuf;

/// Errors that stop the server from starting or running.
///
/// Every variant is fatal: the server never retries internally.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The directory to serve does not exist.
    #[error("Root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// The root path exists but is not a directory.
    #[error("Root path is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    /// A registered watch path does not exist.
    #[error("Watch path not found: {}", .0.display())]
    WatchPathNotFound(PathBuf),

    /// The listener could not be bound (port in use, permission denied, ...).
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested `host:port`.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// The filesystem watcher could not be created or registered.
    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        /// Path being registered.
        path: PathBuf,
        /// Underlying watcher error.
        source: notify::Error,
    },

    /// An ignore pattern is not a valid glob.
    #[error("Invalid ignore pattern `{pattern}`: {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Glob parse error.
        source: glob::PatternError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns `true` if the listener failed because the address is taken.
    #[must_use]
    pub fn is_addr_in_use(&self) -> bool {
        matches!(
            self,
            Self::Bind { source, .. } if source.kind() == std::io::ErrorKind::AddrInUse
        )
    }
}
