//! OverlayFS composition on top of the mount root.

use std::path::{Path, PathBuf};

use armount_common::paths::{UPPER_SUFFIX, WORK_SUFFIX};
use armount_common::{ArmountError, ArmountResult, overlay_sibling};

use crate::exec::HostCommand;

/// OverlayFS configuration.
///
/// The overlay is mounted on the mount root itself, with the root as its
/// only lower layer, so the merged view replaces the assembled tree in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpec {
    /// Lower directory (the assembled mount root).
    pub lower_dir: PathBuf,
    /// Upper directory (writable layer).
    pub upper_dir: PathBuf,
    /// Work directory (required by overlayfs).
    pub work_dir: PathBuf,
}

impl OverlaySpec {
    /// Overlay for a mount root, with `upper` and `work` siblings of the root.
    pub fn for_root(root: &Path) -> ArmountResult<Self> {
        Ok(Self {
            lower_dir: root.to_path_buf(),
            upper_dir: overlay_sibling(root, UPPER_SUFFIX)?,
            work_dir: overlay_sibling(root, WORK_SUFFIX)?,
        })
    }

    /// Where the overlay is mounted.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.lower_dir
    }

    /// Create fresh, empty upper and work directories.
    ///
    /// Either both are created or neither is. An existing directory at either
    /// path is an error and is left untouched.
    pub fn create_dirs(&self) -> ArmountResult<()> {
        let mut created: Vec<&Path> = Vec::with_capacity(2);
        for dir in [&self.work_dir, &self.upper_dir] {
            if let Err(source) = std::fs::create_dir(dir) {
                for dir in created.iter().rev() {
                    if let Err(e) = std::fs::remove_dir(dir) {
                        tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove overlay directory");
                    }
                }
                return Err(ArmountError::ResourceAllocation {
                    path: dir.clone(),
                    source,
                });
            }
            created.push(dir);
        }
        Ok(())
    }

    /// Remove the upper and work directories and everything in them.
    ///
    /// Only valid once the overlay is unmounted, and only for directories
    /// made by [`create_dirs`](Self::create_dirs).
    pub fn remove_dirs(&self) -> ArmountResult<()> {
        for dir in [&self.work_dir, &self.upper_dir] {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Get the mount options string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower_dir.display(),
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }

    /// `mount -t overlay overlay -o <options> <root>`.
    #[must_use]
    pub fn mount_command(&self) -> HostCommand {
        HostCommand::new("mount")
            .args(["-t", "overlay", "overlay", "-o"])
            .arg(self.mount_options())
            .arg(self.target().to_string_lossy())
    }
}
