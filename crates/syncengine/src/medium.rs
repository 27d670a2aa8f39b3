//! Storage medium probe for the RAM root

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Filesystem type backing a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    Tmpfs,
    Ramfs,
    /// Anything else, with the filesystem magic number
    Other(String),
    /// Probe not supported on this platform
    Unknown,
}

impl Medium {
    /// Contents vanish on reboot
    pub fn is_volatile(&self) -> bool {
        matches!(self, Medium::Tmpfs | Medium::Ramfs)
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medium::Tmpfs => f.write_str("tmpfs"),
            Medium::Ramfs => f.write_str("ramfs"),
            Medium::Other(magic) => write!(f, "other ({magic})"),
            Medium::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of probing a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediumInfo {
    /// Nearest existing ancestor that was actually probed
    pub probed: PathBuf,
    pub medium: Medium,
    pub total_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
}

/// Probe the filesystem holding `path`, or its nearest existing ancestor.
pub fn probe(path: &Path) -> Result<MediumInfo> {
    let probed = path
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(Path::new("/"))
        .to_path_buf();
    let info = probe_existing(&probed)?;
    log::debug!("{} is on {}", probed.display(), info.medium);
    Ok(info)
}

#[cfg(target_os = "linux")]
fn probe_existing(path: &Path) -> Result<MediumInfo> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    const TMPFS_MAGIC: i64 = 0x0102_1994;
    const RAMFS_MAGIC: i64 = 0x8584_58f6;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: statfs is a standard Linux call. The buffer is only read after
    // the return value reports success.
    let stat = unsafe {
        let mut stat: MaybeUninit<libc::statfs> = MaybeUninit::uninit();
        if libc::statfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        stat.assume_init()
    };

    let magic = stat.f_type as i64;
    let medium = match magic {
        TMPFS_MAGIC => Medium::Tmpfs,
        RAMFS_MAGIC => Medium::Ramfs,
        other => Medium::Other(format!("{other:#x}")),
    };
    let block = stat.f_bsize as u64;
    Ok(MediumInfo {
        probed: path.to_path_buf(),
        medium,
        total_bytes: Some(stat.f_blocks as u64 * block),
        available_bytes: Some(stat.f_bavail as u64 * block),
    })
}

#[cfg(not(target_os = "linux"))]
fn probe_existing(path: &Path) -> Result<MediumInfo> {
    Ok(MediumInfo {
        probed: path.to_path_buf(),
        medium: Medium::Unknown,
        total_bytes: None,
        available_bytes: None,
    })
}
