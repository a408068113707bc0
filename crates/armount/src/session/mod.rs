//! Mount/overlay session.
//!
//! A [`MountSession`] owns one mount root for its lifetime. It mounts a
//! [`MountPlan`] in order, optionally composes an overlay on top of the
//! assembled tree, and unwinds everything it did in reverse on
//! [`MountSession::teardown`].
//!
//! ```text
//! Idle -> RootPrepared -> Mounting -> Mounted -> [OverlayMounted] -> TearingDown -> Idle
//! ```
//!
//! Teardown never deletes recursively under the mount root: a mount that
//! failed to unwind leaves the root non-empty and its removal fails.

mod teardown;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use armount_common::paths::{TEMP_PREFIX, TEMP_ROOT};
use armount_common::{ArmountError, ArmountResult, mountpoint_under};
use tokio_util::sync::CancellationToken;

use crate::exec::Executor;
use crate::filesystem::{self, OverlaySpec};
use crate::plan::MountPlan;
use crate::report::Reporter;

pub use teardown::{TeardownAction, TeardownReport, TeardownStep};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No root, nothing mounted.
    Idle,
    /// Root (and overlay directories) created.
    RootPrepared,
    /// Partitions are being mounted.
    Mounting,
    /// Every planned partition is mounted.
    Mounted,
    /// The overlay is mounted on the root.
    OverlayMounted,
    /// Unwinding.
    TearingDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RootPrepared => write!(f, "root-prepared"),
            Self::Mounting => write!(f, "mounting"),
            Self::Mounted => write!(f, "mounted"),
            Self::OverlayMounted => write!(f, "overlay-mounted"),
            Self::TearingDown => write!(f, "tearing-down"),
        }
    }
}

/// A successful mount and the directories created for it.
#[derive(Debug, Clone)]
struct MountRecord {
    mountpoint: PathBuf,
    created: Vec<PathBuf>,
}

/// Mounts one image's partitions under a root and unwinds them.
pub struct MountSession {
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    archive_path: Option<PathBuf>,
    create_mountpoints: bool,

    state: SessionState,
    root: Option<PathBuf>,
    overlay: Option<OverlaySpec>,
    overlay_mounted: bool,
    mounted: Vec<MountRecord>,
}

impl MountSession {
    /// Create an idle session without overlay composition.
    pub fn new(executor: Arc<dyn Executor>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            executor,
            reporter,
            archive_path: None,
            create_mountpoints: true,
            state: SessionState::Idle,
            root: None,
            overlay: None,
            overlay_mounted: false,
            mounted: Vec::new(),
        }
    }

    /// Compose an overlay on the root and archive its upper layer to
    /// `archive_path` on teardown.
    #[must_use]
    pub fn with_overlay_archive(mut self, archive_path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(archive_path.into());
        self
    }

    /// Set whether missing mountpoint directories are created.
    #[must_use]
    pub const fn with_create_mountpoints(mut self, create: bool) -> Self {
        self.create_mountpoints = create;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The mount root, while the session is active.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Overlay directories, once prepared.
    #[must_use]
    pub const fn overlay(&self) -> Option<&OverlaySpec> {
        self.overlay.as_ref()
    }

    /// Mountpoints mounted so far, in mount order.
    #[must_use]
    pub fn mounted(&self) -> Vec<&Path> {
        self.mounted.iter().map(|r| r.mountpoint.as_path()).collect()
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> ArmountResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ArmountError::InvalidState {
                message: format!("cannot {operation} while {}", self.state),
            })
        }
    }

    /// Create the mount root, or a fresh temporary one when `root` is `None`,
    /// plus the overlay directories if an overlay is configured.
    ///
    /// On failure the session keeps whatever was created so that
    /// [`teardown`](Self::teardown) can reclaim it.
    pub fn prepare(&mut self, root: Option<&Path>) -> ArmountResult<PathBuf> {
        self.expect_state(SessionState::Idle, "prepare")?;

        let root = match root {
            Some(path) => {
                std::fs::create_dir_all(path).map_err(|source| ArmountError::ResourceAllocation {
                    path: path.to_path_buf(),
                    source,
                })?;
                path.to_path_buf()
            }
            None => tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempdir_in(&*TEMP_ROOT)
                .map_err(|source| ArmountError::ResourceAllocation {
                    path: TEMP_ROOT.clone(),
                    source,
                })?
                .keep(),
        };

        tracing::info!(root = %root.display(), "Mount root prepared");
        self.root = Some(root.clone());
        self.state = SessionState::RootPrepared;

        if self.archive_path.is_some() {
            let overlay = OverlaySpec::for_root(&root)?;
            self.reporter.say(&format!(
                "Using overlayfs with workdir {} and upperdir {}",
                overlay.work_dir.display(),
                overlay.upper_dir.display()
            ));
            // Only directories this session created are ever removed.
            overlay.create_dirs()?;
            self.overlay = Some(overlay);
        }

        Ok(root)
    }

    /// Mount every plan entry in order, stopping at the first failure.
    ///
    /// Each successful mountpoint is recorded before the next is attempted.
    pub async fn mount_all(&mut self, plan: &MountPlan, cancel: &CancellationToken) -> ArmountResult<()> {
        self.expect_state(SessionState::RootPrepared, "mount")?;
        let root = self.root.clone().ok_or_else(|| ArmountError::Internal {
            message: "prepared session has no root".to_string(),
        })?;
        self.state = SessionState::Mounting;

        tracing::info!(root = %root.display(), count = plan.len(), "Mounting partitions");

        for entry in plan {
            let mountpoint = mountpoint_under(&root, entry.target.as_str())?;
            if cancel.is_cancelled() {
                return Err(ArmountError::Cancelled {
                    command: filesystem::mount_command(&entry.partition, &mountpoint).to_string(),
                });
            }

            let created = if self.create_mountpoints {
                filesystem::create_missing_dirs(&root, &mountpoint).map_err(|e| {
                    ArmountError::MountFailed {
                        partition: entry.partition.to_string(),
                        mountpoint: mountpoint.clone(),
                        reason: format!("cannot create mountpoint: {e}"),
                    }
                })?
            } else {
                Vec::new()
            };

            self.reporter.message(&format!("Mounting: {}", entry.partition));

            if let Err(err) =
                filesystem::mount(self.executor.as_ref(), &entry.partition, &mountpoint, cancel).await
            {
                for dir in created.iter().rev() {
                    if let Err(e) = std::fs::remove_dir(dir) {
                        tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove mountpoint directory");
                    }
                }
                if err.is_cancelled() {
                    return Err(err);
                }
                return Err(ArmountError::MountFailed {
                    partition: entry.partition.to_string(),
                    mountpoint,
                    reason: err.to_string(),
                });
            }

            self.mounted.push(MountRecord {
                mountpoint,
                created,
            });
        }

        self.state = SessionState::Mounted;
        Ok(())
    }

    /// Mount the overlay on top of the assembled root, if one is configured.
    pub async fn apply_overlay(&mut self, cancel: &CancellationToken) -> ArmountResult<()> {
        self.expect_state(SessionState::Mounted, "apply overlay")?;
        let Some(overlay) = &self.overlay else {
            return Ok(());
        };

        self.reporter
            .say(&format!("Mounting overlay on {}", overlay.target().display()));
        tracing::debug!(options = %overlay.mount_options(), "Mounting overlayfs");

        match self.executor.run(&overlay.mount_command(), cancel).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                return Err(ArmountError::OverlayFailed {
                    target: overlay.target().to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }

        tracing::info!(target = %overlay.target().display(), "OverlayFS mounted");
        self.overlay_mounted = true;
        self.state = SessionState::OverlayMounted;
        Ok(())
    }

    /// The effective mount root, once everything is mounted.
    ///
    /// The path is the same with or without an overlay.
    pub fn finalize(&self) -> ArmountResult<PathBuf> {
        match (self.state, &self.root) {
            (SessionState::Mounted | SessionState::OverlayMounted, Some(root)) => Ok(root.clone()),
            _ => Err(ArmountError::InvalidState {
                message: format!("cannot finalize while {}", self.state),
            }),
        }
    }

    /// Unwind everything this session mounted and created.
    ///
    /// Every step is attempted regardless of earlier failures, and every
    /// outcome is recorded in the returned report. Calling it on an idle
    /// session does nothing.
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let Some(root) = self.root.clone() else {
            self.state = SessionState::Idle;
            return report;
        };

        self.state = SessionState::TearingDown;
        self.reporter
            .say(&format!("Unmounting everything under {}", root.display()));

        // Teardown must not be aborted by the signal that stopped mounting.
        let cancel = CancellationToken::new();
        let executor = Arc::clone(&self.executor);
        let mut keep_overlay_dirs = false;

        if self.overlay_mounted {
            if let Some(overlay) = &self.overlay {
                let target = overlay.target().to_path_buf();
                let result = filesystem::unmount(executor.as_ref(), &target, &cancel).await;
                if report.record(TeardownAction::UnmountOverlay(target), result) {
                    self.overlay_mounted = false;
                }

                if let Some(destination) = &self.archive_path {
                    self.reporter.say(&format!(
                        "Archiving overlay upper layer to {}",
                        destination.display()
                    ));
                    let result =
                        filesystem::archive_upper(overlay.upper_dir.clone(), destination.clone()).await;
                    let action = TeardownAction::ArchiveUpper {
                        source: overlay.upper_dir.clone(),
                        destination: destination.clone(),
                    };
                    keep_overlay_dirs = !report.record(action, result);
                }
            }
        }

        for record in std::mem::take(&mut self.mounted).into_iter().rev() {
            let result = filesystem::unmount(executor.as_ref(), &record.mountpoint, &cancel).await;
            if !report.record(TeardownAction::Unmount(record.mountpoint), result) {
                continue;
            }
            for dir in record.created.iter().rev() {
                report.record(
                    TeardownAction::RemoveMountpoint(dir.clone()),
                    std::fs::remove_dir(dir),
                );
            }
        }

        report.record(TeardownAction::RemoveRoot(root.clone()), std::fs::remove_dir(&root));

        if let Some(overlay) = self.overlay.take() {
            if self.overlay_mounted || keep_overlay_dirs {
                tracing::warn!(
                    upper = %overlay.upper_dir.display(),
                    work = %overlay.work_dir.display(),
                    "Keeping overlay directories"
                );
            } else {
                report.record(TeardownAction::RemoveOverlayDirs(root), overlay.remove_dirs());
            }
        }

        for failure in report.failures() {
            self.reporter.error(&failure.to_string());
        }

        self.overlay_mounted = false;
        self.root = None;
        self.state = SessionState::Idle;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::HostCommand;
    use crate::plan::{MountTarget, PartitionRef};
    use crate::report::TracingReporter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor for Recorder {
        async fn run(&self, command: &HostCommand, _cancel: &CancellationToken) -> ArmountResult<()> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }

    fn session(recorder: &Arc<Recorder>) -> MountSession {
        MountSession::new(recorder.clone(), Arc::new(TracingReporter))
    }

    #[tokio::test]
    async fn operations_out_of_order_are_rejected() {
        let recorder = Arc::new(Recorder::default());
        let mut session = session(&recorder);

        let plan = MountPlan::default();
        let err = session.mount_all(&plan, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ArmountError::InvalidState { .. }));
        assert!(session.finalize().is_err());
        assert!(session.teardown().await.is_empty());
    }

    #[tokio::test]
    async fn temporary_root_is_allocated_and_removed() {
        let recorder = Arc::new(Recorder::default());
        let mut session = session(&recorder);

        let root = session.prepare(None).unwrap();
        assert!(root.is_dir());
        assert!(
            root.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TEMP_PREFIX)
        );
        assert_eq!(session.state(), SessionState::RootPrepared);

        let report = session.teardown().await;
        assert!(report.is_clean());
        assert!(!root.exists());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.root().is_none());
    }

    #[tokio::test]
    async fn empty_plan_finalizes_to_root() {
        let recorder = Arc::new(Recorder::default());
        let mut session = session(&recorder);
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("root");

        session.prepare(Some(&root)).unwrap();
        session
            .mount_all(&MountPlan::default(), &CancellationToken::new())
            .await
            .unwrap();
        session.apply_overlay(&CancellationToken::new()).await.unwrap();
        assert_eq!(session.finalize().unwrap(), root);
        assert!(recorder.commands.lock().unwrap().is_empty());

        session.teardown().await;
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn cancelled_before_mount_attempts_nothing() {
        let recorder = Arc::new(Recorder::default());
        let mut session = session(&recorder);
        let temp = tempfile::tempdir().unwrap();

        let plan = MountPlan::new(&[PartitionRef::from("/dev/p1")], &[MountTarget::from("/")]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        session.prepare(Some(&temp.path().join("root"))).unwrap();
        let err = session.mount_all(&plan, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(session.mounted().is_empty());
        assert!(recorder.commands.lock().unwrap().is_empty());
    }
}
