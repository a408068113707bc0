//! Filesystem operations for image mounting.
//!
//! This module handles:
//! - Partition mount and unmount commands
//! - OverlayFS configuration on top of the mount root
//! - Archiving the overlay upper layer
//! - Creating missing mountpoint directories

mod archive;
mod mounts;
mod overlay;

pub use archive::{archive_dir, archive_upper};
pub use mounts::{create_missing_dirs, mount, mount_command, unmount, unmount_command};
pub use overlay::OverlaySpec;
