//! The image mount step.
//!
//! [`MountImageStep`] is what a build pipeline runs: it validates the
//! configuration, plans and performs the mounts, publishes the mount root,
//! and on [`cleanup`](MountImageStep::cleanup) tears everything down. Cleanup
//! must be called whether [`run`](MountImageStep::run) continued or halted.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use armount_common::{ArmountResult, archive_destination};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::MountConfig;
use crate::exec::Executor;
use crate::plan::{MountPlan, PartitionRef};
use crate::report::Reporter;
use crate::session::{MountSession, TeardownReport};

/// Whether the pipeline should go on after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Run the next step.
    Continue,
    /// Stop; only cleanups run from here.
    Halt,
}

/// The mount root published for later steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountArtifact {
    /// Key the root is published under.
    pub result_key: String,
    /// The effective mount root.
    pub root: PathBuf,
}

/// Values produced by a build for use in templates and post-processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GeneratedData {
    values: BTreeMap<String, serde_json::Value>,
}

impl GeneratedData {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mounts an image's partitions for the rest of a build.
pub struct MountImageStep {
    config: MountConfig,
    reporter: Arc<dyn Reporter>,
    session: MountSession,
    artifact: Option<MountArtifact>,
}

impl MountImageStep {
    /// Create the step from its configuration and collaborators.
    pub fn new(config: MountConfig, executor: Arc<dyn Executor>, reporter: Arc<dyn Reporter>) -> Self {
        let mut session = MountSession::new(executor, Arc::clone(&reporter))
            .with_create_mountpoints(config.create_mountpoints);
        if let Some(overlay) = &config.overlay_path {
            session = session.with_overlay_archive(archive_destination(overlay));
        }

        Self {
            config,
            reporter,
            session,
            artifact: None,
        }
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &MountSession {
        &self.session
    }

    /// The published mount root, after a successful run.
    #[must_use]
    pub const fn artifact(&self) -> Option<&MountArtifact> {
        self.artifact.as_ref()
    }

    /// Mount `partitions`, returning the published root.
    ///
    /// On error the session may hold partial mounts; call
    /// [`cleanup`](Self::cleanup) to release them.
    pub async fn execute(
        &mut self,
        partitions: &[PartitionRef],
        generated: &mut GeneratedData,
        cancel: &CancellationToken,
    ) -> ArmountResult<MountArtifact> {
        let listed: Vec<&str> = partitions.iter().map(PartitionRef::as_str).collect();
        self.reporter.say(&format!("partitions: {listed:?}"));

        self.config.validate()?;
        let plan = MountPlan::new(partitions, &self.config.image_mounts)?;

        let root = self.session.prepare(self.config.mount_path.as_deref())?;
        tracing::info!(root = %root.display(), mounts = plan.len(), "Mounting image");

        self.session.mount_all(&plan, cancel).await?;
        self.session.apply_overlay(cancel).await?;

        let root = self.session.finalize()?;
        generated.insert(
            self.config.generated_data_key.clone(),
            root.to_string_lossy().into_owned(),
        );

        let artifact = MountArtifact {
            result_key: self.config.result_key.clone(),
            root,
        };
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }

    /// Run the step, reporting any failure and signalling whether to go on.
    pub async fn run(
        &mut self,
        partitions: &[PartitionRef],
        generated: &mut GeneratedData,
        cancel: &CancellationToken,
    ) -> StepAction {
        match self.execute(partitions, generated, cancel).await {
            Ok(artifact) => {
                tracing::debug!(key = %artifact.result_key, root = %artifact.root.display(), "Published mount root");
                StepAction::Continue
            }
            Err(err) => {
                tracing::error!(error = %err, "Mount step halted");
                self.reporter.error(&err.to_string());
                StepAction::Halt
            }
        }
    }

    /// Unmount and remove everything the step set up.
    pub async fn cleanup(&mut self) -> TeardownReport {
        self.artifact = None;
        self.session.teardown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_data_upserts() {
        let mut data = GeneratedData::new();
        assert!(data.is_empty());

        data.insert("MountPath", "/tmp/a");
        data.insert("MountPath", "/tmp/b");
        data.insert("Other", 1);

        assert_eq!(data.len(), 2);
        assert_eq!(data.get("MountPath"), Some(&serde_json::json!("/tmp/b")));
        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"MountPath":"/tmp/b","Other":1}"#
        );
    }
}
