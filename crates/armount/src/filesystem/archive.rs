//! Overlay upper layer archiving.

use std::fs::File;
use std::path::{Path, PathBuf};

use armount_common::{ArmountError, ArmountResult};
use flate2::Compression;
use flate2::write::GzEncoder;

/// Write the contents of `source` to a gzip tarball at `destination`.
///
/// Entries are stored relative to `source`. Symlinks are archived as links.
pub fn archive_dir(source: &Path, destination: &Path) -> ArmountResult<()> {
    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        "Archiving directory"
    );

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(destination)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source)?;
    builder.into_inner()?.finish()?;

    tracing::info!(destination = %destination.display(), "Archive written");
    Ok(())
}

/// Archive the overlay upper directory off the async runtime.
pub async fn archive_upper(source: PathBuf, destination: PathBuf) -> ArmountResult<()> {
    tokio::task::spawn_blocking(move || archive_dir(&source, &destination))
        .await
        .map_err(|e| ArmountError::Internal {
            message: format!("archive task failed: {e}"),
        })?
}
