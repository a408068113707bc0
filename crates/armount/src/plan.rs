//! Mount planning.
//!
//! A [`MountPlan`] pairs each partition with its declared target, drops the
//! partitions declared with an empty target and sorts the rest by target
//! path. For canonical targets (see [`armount_common::normalize_target`])
//! lexicographic order puts every parent before its children: a parent path
//! is a strict prefix of each child path, so `/` sorts before `/boot`, which
//! sorts before `/boot/efi`.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use armount_common::{ArmountError, ArmountResult, normalize_target};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a partition, such as `/dev/loop0p1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionRef(String);

impl PartitionRef {
    /// Create a partition reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PartitionRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Declared mountpoint of a partition, relative to the mount root.
///
/// The empty target means the partition is left unmounted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountTarget(String);

impl MountTarget {
    /// Create a mount target.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The target path as declared.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this partition is intentionally left unmounted.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.0.is_empty()
    }

    /// Lexical components below the root, ignoring leading and `.` components.
    fn lexical(&self) -> PathBuf {
        Path::new(&self.0)
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::CurDir))
            .collect()
    }
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MountTarget {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// A single planned mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Partition to mount.
    pub partition: PartitionRef,
    /// Where to mount it, relative to the mount root.
    pub target: MountTarget,
}

/// Ordered mounts for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MountPlan {
    entries: Vec<PlanEntry>,
}

impl MountPlan {
    /// Pair partitions with targets positionally and order them parent-first.
    ///
    /// Duplicate targets keep their input order; rejecting them is left to
    /// [`crate::config::MountConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`ArmountError::ConfigMismatch`] if the two lists differ in
    /// length, and [`ArmountError::InvalidTarget`] if a non-empty target is
    /// not canonical.
    pub fn new(partitions: &[PartitionRef], targets: &[MountTarget]) -> ArmountResult<Self> {
        if partitions.len() != targets.len() {
            return Err(ArmountError::ConfigMismatch {
                partitions: partitions.len(),
                mounts: targets.len(),
            });
        }

        let mut entries: Vec<PlanEntry> = partitions
            .iter()
            .zip(targets)
            .filter(|(_, target)| !target.is_skip())
            .map(|(partition, target)| -> ArmountResult<PlanEntry> {
                normalize_target(target.as_str())?;
                Ok(PlanEntry {
                    partition: partition.clone(),
                    target: target.clone(),
                })
            })
            .collect::<ArmountResult<_>>()?;

        entries.sort_by(|a, b| a.target.as_str().cmp(b.target.as_str()));
        Ok(Self { entries })
    }

    /// Planned entries in mount order.
    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Iterate entries in mount order.
    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    /// Number of partitions that will be mounted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing will be mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that no entry is mounted before one of its ancestors.
    #[must_use]
    pub fn parents_first(&self) -> bool {
        let paths: Vec<PathBuf> = self.entries.iter().map(|e| e.target.lexical()).collect();
        paths.iter().enumerate().all(|(i, later)| {
            paths[..i]
                .iter()
                .all(|earlier| earlier == later || !earlier.starts_with(later))
        })
    }
}

impl<'a> IntoIterator for &'a MountPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
