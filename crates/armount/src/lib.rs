//! # armount
//!
//! Mounts the partitions of a disk image under a single root, in
//! parent-before-child order, optionally composes a copy-on-write overlay on
//! top, and unwinds every mount in reverse on teardown.
//!
//! ## Features
//!
//! - **Ordered mounting**: `/` before `/boot` before `/boot/efi`
//! - **Fail-fast**: the first failed mount stops the session
//! - **Overlay**: writes land in an upper layer that is archived on teardown
//! - **Symmetric teardown**: reverse-order unmounts and non-recursive removal
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use armount::config::MountConfig;
//! use armount::exec::ShellExecutor;
//! use armount::plan::PartitionRef;
//! use armount::report::ConsoleReporter;
//! use armount::step::{GeneratedData, MountImageStep, StepAction};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = MountConfig::new(["/boot", "/"]);
//! let mut step = MountImageStep::new(config, Arc::new(ShellExecutor), Arc::new(ConsoleReporter));
//!
//! let partitions = [PartitionRef::new("/dev/loop0p1"), PartitionRef::new("/dev/loop0p2")];
//! let mut generated = GeneratedData::new();
//! if step.run(&partitions, &mut generated, &CancellationToken::new()).await == StepAction::Continue {
//!     // Work with the image under step.artifact().unwrap().root
//! }
//!
//! // Always unwind, whether the step continued or halted.
//! let report = step.cleanup().await;
//! assert!(report.is_clean());
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod exec;
pub mod filesystem;
pub mod plan;
pub mod report;
pub mod session;
pub mod step;

pub use config::MountConfig;
pub use plan::{MountPlan, MountTarget, PartitionRef};
pub use session::{MountSession, SessionState, TeardownReport};
pub use step::{GeneratedData, MountArtifact, MountImageStep, StepAction};
