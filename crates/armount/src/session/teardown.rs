//! Teardown outcome reporting.

use std::fmt;
use std::path::PathBuf;

use armount_common::ArmountError;

/// One unwind action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownAction {
    /// Unmount the overlay from the mount root.
    UnmountOverlay(PathBuf),
    /// Archive the overlay upper directory.
    ArchiveUpper {
        /// The upper directory.
        source: PathBuf,
        /// The archive written.
        destination: PathBuf,
    },
    /// Unmount a recorded mountpoint.
    Unmount(PathBuf),
    /// Remove a mountpoint directory the session created.
    RemoveMountpoint(PathBuf),
    /// Remove the mount root (non-recursively).
    RemoveRoot(PathBuf),
    /// Remove the overlay upper and work directories.
    RemoveOverlayDirs(PathBuf),
}

impl fmt::Display for TeardownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmountOverlay(p) => write!(f, "unmount overlay {}", p.display()),
            Self::ArchiveUpper {
                source,
                destination,
            } => write!(f, "archive {} to {}", source.display(), destination.display()),
            Self::Unmount(p) => write!(f, "unmount {}", p.display()),
            Self::RemoveMountpoint(p) => write!(f, "remove mountpoint {}", p.display()),
            Self::RemoveRoot(p) => write!(f, "remove mount root {}", p.display()),
            Self::RemoveOverlayDirs(p) => write!(f, "remove overlay directories of {}", p.display()),
        }
    }
}

/// Outcome of one unwind action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownStep {
    /// What was attempted.
    pub action: TeardownAction,
    /// `Err` holds the failure message.
    pub outcome: Result<(), String>,
}

impl TeardownStep {
    /// Whether the action succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The failure as an error value, if any.
    #[must_use]
    pub fn error(&self) -> Option<ArmountError> {
        self.outcome.as_ref().err().map(|reason| ArmountError::Teardown {
            step: self.action.to_string(),
            reason: reason.clone(),
        })
    }
}

/// Every action attempted during teardown, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub(crate) fn record<E: fmt::Display>(&mut self, action: TeardownAction, outcome: Result<(), E>) -> bool {
        let outcome = outcome.map_err(|e| e.to_string());
        match &outcome {
            Ok(()) => tracing::debug!(action = %action, "Teardown step succeeded"),
            Err(reason) => tracing::warn!(action = %action, error = %reason, "Teardown step failed"),
        }
        let ok = outcome.is_ok();
        self.steps.push(TeardownStep { action, outcome });
        ok
    }

    /// All steps in the order they ran.
    #[must_use]
    pub fn steps(&self) -> &[TeardownStep] {
        &self.steps
    }

    /// The actions in the order they ran.
    pub fn actions(&self) -> impl Iterator<Item = &TeardownAction> {
        self.steps.iter().map(|s| &s.action)
    }

    /// Failed steps as errors.
    #[must_use]
    pub fn failures(&self) -> Vec<ArmountError> {
        self.steps.iter().filter_map(TeardownStep::error).collect()
    }

    /// Whether every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(TeardownStep::succeeded)
    }

    /// Whether nothing needed unwinding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
