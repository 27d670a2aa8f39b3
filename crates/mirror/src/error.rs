use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reconciling two directory trees.
#[derive(Debug, Error)]
pub enum Error {
    /// The source root of a reconcile request does not exist
    #[error("mirror source does not exist: {0}")]
    SourceMissing(PathBuf),

    /// Source and destination resolve to the same directory
    #[error("mirror source and destination are the same path: {0}")]
    SameRoot(PathBuf),

    /// A glob pattern could not be compiled
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern as written in the configuration
        pattern: String,
        /// Parser message
        message: String,
    },

    /// rsync binary not found
    #[error("rsync not found in PATH")]
    RsyncNotFound,

    /// rsync exited with a non-zero status
    #[error("rsync failed (exit {code:?}): {stderr}")]
    RsyncFailed {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Directory traversal failed
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// IO error
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being accessed when the error occurred
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the failure happened before any file was touched
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::SourceMissing(_)
                | Error::SameRoot(_)
                | Error::InvalidPattern { .. }
                | Error::RsyncNotFound
        )
    }
}

/// Result type for mirror operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let missing = Error::SourceMissing(PathBuf::from("/nope"));
        assert!(missing.is_precondition());

        let failed = Error::RsyncFailed {
            code: Some(23),
            stderr: "partial transfer".into(),
        };
        assert!(!failed.is_precondition());
        assert!(failed.to_string().contains("partial transfer"));
    }
}
