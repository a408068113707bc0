//! Common error types for armount.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`ArmountError`].
pub type ArmountResult<T> = Result<T, ArmountError>;

/// Errors raised while planning, mounting, or tearing down an image.
#[derive(Error, Diagnostic, Debug)]
pub enum ArmountError {
    /// The image's partition count does not match the declared mount layout.
    #[error("Partition count mismatch: image has {partitions} partitions, {mounts} mounts declared")]
    #[diagnostic(
        code(armount::plan::mismatch),
        help("Declare exactly one entry in image_mounts per partition; use \"\" to skip one")
    )]
    ConfigMismatch {
        /// Number of partitions found in the image.
        partitions: usize,
        /// Number of declared mount targets.
        mounts: usize,
    },

    /// A mount target is not a canonical absolute path.
    #[error("Invalid mount target {target:?}: {reason}")]
    #[diagnostic(
        code(armount::plan::invalid_target),
        help(
            "Targets are absolute paths inside the image such as \"/\", \"/boot\" or \"/boot/efi\"; relative targets like \"boot\" are rejected"
        )
    )]
    InvalidTarget {
        /// The offending target.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two partitions were declared at the same mountpoint.
    #[error("Duplicate mount target: {target}")]
    #[diagnostic(code(armount::plan::duplicate_target))]
    DuplicateTarget {
        /// The target declared more than once.
        target: String,
    },

    /// The mount root or an overlay directory could not be created.
    #[error("Failed to allocate {}: {source}", path.display())]
    #[diagnostic(
        code(armount::session::allocation),
        help("Check permissions and free space on the filesystem holding the mount root")
    )]
    ResourceAllocation {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A partition could not be mounted.
    #[error("Failed to mount {partition} at {}: {reason}", mountpoint.display())]
    #[diagnostic(code(armount::session::mount))]
    MountFailed {
        /// The partition being mounted.
        partition: String,
        /// The absolute mountpoint.
        mountpoint: PathBuf,
        /// Failure detail.
        reason: String,
    },

    /// The overlay could not be mounted on top of the assembled tree.
    #[error("Failed to mount overlay on {}: {reason}", target.display())]
    #[diagnostic(
        code(armount::session::overlay),
        help("overlayfs requires upperdir and workdir on the same filesystem")
    )]
    OverlayFailed {
        /// The overlay target (the mount root).
        target: PathBuf,
        /// Failure detail.
        reason: String,
    },

    /// A teardown step failed.
    #[error("Teardown step failed ({step}): {reason}")]
    #[diagnostic(code(armount::session::teardown))]
    Teardown {
        /// The step that failed.
        step: String,
        /// Failure detail.
        reason: String,
    },

    /// A host command exited unsuccessfully or could not be spawned.
    #[error("Command `{command}` failed: {status}")]
    #[diagnostic(code(armount::exec::failed))]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// Exit status or spawn error, with captured stderr.
        status: String,
    },

    /// A pending command was aborted by cancellation.
    #[error("Command `{command}` cancelled")]
    #[diagnostic(code(armount::exec::cancelled))]
    Cancelled {
        /// The rendered command line.
        command: String,
    },

    /// The session was driven out of order.
    #[error("Invalid session state: {message}")]
    #[diagnostic(code(armount::session::state))]
    InvalidState {
        /// What was attempted.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(armount::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(armount::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(armount::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(armount::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl ArmountError {
    /// Whether this error was caused by cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<serde_json::Error> for ArmountError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
