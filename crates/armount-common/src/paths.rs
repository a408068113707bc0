//! Mount root and mountpoint paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::{ArmountError, ArmountResult};

/// Prefix of temporary mount roots allocated when no root is configured.
pub const TEMP_PREFIX: &str = "armimg-";

/// Suffix appended to an overlay archive destination.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Name of the overlay upper directory sibling.
pub const UPPER_SUFFIX: &str = "upper";

/// Name of the overlay work directory sibling.
pub const WORK_SUFFIX: &str = "work";

/// Directory under which temporary mount roots are allocated.
pub static TEMP_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("ARMOUNT_TMPDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
});

/// Check that `target` is a canonical absolute mount target and return it
/// relative to the mount root.
///
/// Canonical targets start with `/`, have no trailing slash (except `/`
/// itself), no empty components and no `.` or `..` components. Only for
/// canonical targets does lexicographic order put every parent before its
/// children.
///
/// # Errors
///
/// Returns [`ArmountError::InvalidTarget`] if the target is not canonical.
pub fn normalize_target(target: &str) -> ArmountResult<PathBuf> {
    let invalid = |reason: &str| ArmountError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    if target.is_empty() {
        return Err(invalid("empty targets are skipped, not mounted"));
    }
    if !target.starts_with('/') {
        return Err(invalid("must be absolute within the image, e.g. \"/boot\" rather than \"boot\""));
    }
    if target == "/" {
        return Ok(PathBuf::new());
    }
    if target.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }

    let mut relative = PathBuf::new();
    for component in target[1..].split('/') {
        match component {
            "" => return Err(invalid("must not contain empty components")),
            "." | ".." => return Err(invalid("must not contain '.' or '..'")),
            name => relative.push(name),
        }
    }
    Ok(relative)
}

/// Absolute mountpoint of `target` under `root`.
///
/// `/` maps to the root itself.
///
/// # Errors
///
/// Returns an error if the target is not canonical.
pub fn mountpoint_under(root: &Path, target: &str) -> ArmountResult<PathBuf> {
    let relative = normalize_target(target)?;
    if relative.as_os_str().is_empty() {
        Ok(root.to_path_buf())
    } else {
        Ok(root.join(relative))
    }
}

/// Sibling directory of the mount root, e.g. `/tmp/armimg-x` -> `/tmp/armimg-x-upper`.
///
/// # Errors
///
/// Returns an error if the root has no final component.
pub fn overlay_sibling(root: &Path, suffix: &str) -> ArmountResult<PathBuf> {
    let name = root.file_name().ok_or_else(|| ArmountError::Config {
        message: format!("mount root {} has no directory name", root.display()),
    })?;

    let mut sibling = name.to_os_string();
    sibling.push("-");
    sibling.push(suffix);
    Ok(root.with_file_name(sibling))
}

/// Archive file written for an overlay destination.
#[must_use]
pub fn archive_destination(overlay_path: &Path) -> PathBuf {
    let mut path = OsString::from(overlay_path.as_os_str());
    path.push(ARCHIVE_EXTENSION);
    PathBuf::from(path)
}
