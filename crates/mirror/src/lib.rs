//! # mirror
//!
//! Directory-tree reconciliation between two local roots.
//!
//! Given a source root, a destination root, include/exclude patterns and a
//! deletion flag, a [`Mirror`] makes the destination look like the source and
//! reports every created, updated and deleted path. Every request can also be
//! run as a dry run, which reports the same changes without touching anything.
//!
//! ## Example
//!
//! ```no_run
//! use mirror::{Mirror, MirrorRequest};
//!
//! let mirror = Mirror::new();
//! let request = MirrorRequest::new("/home/me/project", "/dev/shm/me/project")
//!     .with_exclude(vec![".git/**".into(), "target/**".into()])
//!     .with_delete(true);
//!
//! let preview = mirror.preview(&request)?;
//! println!("{} path(s) would change", preview.changes.len());
//!
//! let report = mirror.reconcile(&request)?;
//! println!("created {}, updated {}", report.created(), report.updated());
//! # Ok::<(), mirror::Error>(())
//! ```
//!
//! ## Backends
//!
//! - `rsync` (default feature): shells out to the `rsync` binary
//! - `local`: pure Rust, `walkdir` + `blake3`, no external tools
//!
//! [`Mirror::new`] picks rsync when it is installed and falls back to the
//! local backend otherwise. Tests and embedders can inject their own
//! implementation through [`Mirror::with_backend`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Backend implementations for tree reconciliation.
pub mod backend;
/// Error types for mirror operations.
pub mod error;
/// Include/exclude pattern matching.
pub mod filter;
/// Request and report types.
pub mod types;

pub use backend::Backend;
pub use backend::local::LocalBackend;
#[cfg(feature = "rsync")]
pub use backend::rsync::RsyncBackend;
pub use error::{Error, Result};
pub use filter::Filter;
pub use types::{Change, ChangeKind, MirrorReport, MirrorRequest};

use serde::{Deserialize, Serialize};

/// Which backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// rsync if available, otherwise local
    #[default]
    Auto,
    /// Always rsync
    Rsync,
    /// Always the in-process backend
    Local,
}

/// High-level client for tree reconciliation.
pub struct Mirror {
    backend: Box<dyn Backend>,
}

impl Mirror {
    /// Create a client with the best available backend.
    pub fn new() -> Self {
        #[cfg(feature = "rsync")]
        if let Ok(rsync) = RsyncBackend::new() {
            return Self::with_backend(Box::new(rsync));
        }
        log::debug!("rsync unavailable, using local mirror backend");
        Self::local()
    }

    /// Create a client for an explicitly chosen backend.
    pub fn from_kind(kind: BackendKind) -> Result<Self> {
        match kind {
            BackendKind::Auto => Ok(Self::new()),
            BackendKind::Local => Ok(Self::local()),
            #[cfg(feature = "rsync")]
            BackendKind::Rsync => Ok(Self::with_backend(Box::new(RsyncBackend::new()?))),
            #[cfg(not(feature = "rsync"))]
            BackendKind::Rsync => Err(Error::RsyncNotFound),
        }
    }

    /// Create a client using the in-process backend.
    pub fn local() -> Self {
        Self::with_backend(Box::new(LocalBackend::new()))
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reconcile `request.dest` with `request.source`.
    ///
    /// Patterns are validated before the backend runs, so a bad pattern never
    /// results in a partial transfer.
    pub fn reconcile(&self, request: &MirrorRequest) -> Result<MirrorReport> {
        Filter::for_request(request)?;
        log::debug!(
            "[{}] {} -> {}{}",
            self.backend.name(),
            request.source.display(),
            request.dest.display(),
            if request.dry_run { " (dry run)" } else { "" }
        );
        self.backend.reconcile(request)
    }

    /// Report what [`reconcile`](Self::reconcile) would change.
    pub fn preview(&self, request: &MirrorRequest) -> Result<MirrorReport> {
        self.reconcile(&request.clone().dry_run())
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("backend", &self.backend.name())
            .finish()
    }
}
