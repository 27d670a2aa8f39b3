use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{MirrorReport, MirrorRequest};

pub mod local;
#[cfg(feature = "rsync")]
pub mod rsync;

/// A tree-reconciliation implementation.
///
/// Backends receive requests that have already been validated by
/// [`Mirror`](crate::Mirror). A failed call may have changed part of the
/// destination; callers treat the request as failed as a whole.
pub trait Backend: Send + Sync {
    /// Short name used in logs and status output
    fn name(&self) -> &'static str;

    /// Make `request.dest` match `request.source`, or report what would
    /// change when `request.dry_run` is set.
    fn reconcile(&self, request: &MirrorRequest) -> Result<MirrorReport>;
}

/// Shared precondition checks for every backend.
pub(crate) fn check_roots(request: &MirrorRequest) -> Result<()> {
    if !request.source.is_dir() {
        return Err(Error::SourceMissing(request.source.clone()));
    }
    if same_dir(&request.source, &request.dest) {
        return Err(Error::SameRoot(request.source.clone()));
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
