//! # armount-common
//!
//! Shared types for the armount disk-image mount orchestrator.
//!
//! This crate provides:
//! - The common error type and result alias
//! - Mount root and mountpoint path helpers
//! - Well-known names used by the mount step

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{ArmountError, ArmountResult};
pub use paths::{archive_destination, mountpoint_under, normalize_target, overlay_sibling};
