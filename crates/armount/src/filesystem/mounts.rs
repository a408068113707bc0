//! Mount operations.

use std::path::{Path, PathBuf};

use armount_common::ArmountResult;
use tokio_util::sync::CancellationToken;

use crate::exec::{Executor, HostCommand};
use crate::plan::PartitionRef;

/// `mount <partition> <target>`.
#[must_use]
pub fn mount_command(partition: &PartitionRef, target: &Path) -> HostCommand {
    HostCommand::new("mount")
        .arg(partition.as_str())
        .arg(target.to_string_lossy())
}

/// `umount <target>`.
#[must_use]
pub fn unmount_command(target: &Path) -> HostCommand {
    HostCommand::new("umount").arg(target.to_string_lossy())
}

/// Mount a partition.
pub async fn mount(
    executor: &dyn Executor,
    partition: &PartitionRef,
    target: &Path,
    cancel: &CancellationToken,
) -> ArmountResult<()> {
    tracing::debug!(
        partition = %partition,
        target = %target.display(),
        "Mounting partition"
    );

    executor.run(&mount_command(partition, target), cancel).await?;

    tracing::info!(partition = %partition, target = %target.display(), "Partition mounted");
    Ok(())
}

/// Unmount a filesystem.
pub async fn unmount(
    executor: &dyn Executor,
    target: &Path,
    cancel: &CancellationToken,
) -> ArmountResult<()> {
    tracing::debug!(target = %target.display(), "Unmounting filesystem");

    executor.run(&unmount_command(target), cancel).await?;

    tracing::info!(target = %target.display(), "Filesystem unmounted");
    Ok(())
}

/// Create `path` and any missing ancestors below `root`.
///
/// Returns the directories created, outermost first. Nothing is created at
/// or above `root`.
pub fn create_missing_dirs(root: &Path, path: &Path) -> ArmountResult<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = path
        .ancestors()
        .take_while(|dir| *dir != root && dir.starts_with(root))
        .take_while(|dir| !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    let mut created: Vec<PathBuf> = Vec::with_capacity(missing.len());
    for dir in missing {
        if let Err(err) = std::fs::create_dir(&dir) {
            // Leave nothing half-built behind.
            for dir in created.iter().rev() {
                if let Err(cleanup) = std::fs::remove_dir(dir) {
                    tracing::warn!(dir = %dir.display(), error = %cleanup, "Failed to remove mountpoint directory");
                }
            }
            return Err(err.into());
        }
        tracing::debug!(dir = %dir.display(), "Created mountpoint directory");
        created.push(dir);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands() {
        let part = PartitionRef::new("/dev/loop0p2");
        assert_eq!(
            mount_command(&part, Path::new("/tmp/armimg-1")).to_string(),
            "mount /dev/loop0p2 /tmp/armimg-1"
        );
        assert_eq!(
            unmount_command(Path::new("/tmp/armimg-1/boot")).to_string(),
            "umount /tmp/armimg-1/boot"
        );
    }

    #[test]
    fn creates_only_missing_dirs_below_root() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir(root.join("boot")).unwrap();

        let created = create_missing_dirs(root, &root.join("boot/efi/x")).unwrap();
        assert_eq!(created, vec![root.join("boot/efi"), root.join("boot/efi/x")]);
        assert!(root.join("boot/efi/x").is_dir());
    }

    #[test]
    fn failed_creation_leaves_nothing_behind() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::write(root.join("boot"), b"not a directory").unwrap();

        assert!(create_missing_dirs(root, &root.join("boot/efi")).is_err());
        assert!(root.join("boot").is_file());
        assert!(!root.join("boot/efi").exists());
    }

    #[test]
    fn existing_mountpoint_creates_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        assert!(create_missing_dirs(root, root).unwrap().is_empty());

        std::fs::create_dir(root.join("boot")).unwrap();
        assert!(create_missing_dirs(root, &root.join("boot")).unwrap().is_empty());
    }
}
