//! Mount step configuration.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use armount_common::{ArmountError, ArmountResult, normalize_target};
use serde::{Deserialize, Serialize};

use crate::plan::MountTarget;

/// Key under which the mount root is published by default.
pub const DEFAULT_RESULT_KEY: &str = "mount_path";

/// Generated-data key holding the mount root by default.
pub const DEFAULT_GENERATED_DATA_KEY: &str = "MountPath";

/// Configuration of one mount step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Declared mountpoint per partition, in partition order. `""` skips one.
    ///
    /// Targets are absolute paths inside the image (`/`, `/boot`,
    /// `/boot/efi`) with no trailing slash and no `.` or `..` components.
    /// Relative targets such as `boot` are rejected by [`Self::validate`].
    pub image_mounts: Vec<MountTarget>,
    /// Mount root to use instead of a fresh temporary directory.
    pub mount_path: Option<PathBuf>,
    /// Enables overlay composition; the upper layer is archived at this path
    /// with a `.tar.gz` suffix.
    pub overlay_path: Option<PathBuf>,
    /// Key the mount root is published under.
    pub result_key: String,
    /// Generated-data key holding the mount root.
    pub generated_data_key: String,
    /// Create missing mountpoint directories before mounting.
    pub create_mountpoints: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            image_mounts: Vec::new(),
            mount_path: None,
            overlay_path: None,
            result_key: DEFAULT_RESULT_KEY.to_string(),
            generated_data_key: DEFAULT_GENERATED_DATA_KEY.to_string(),
            create_mountpoints: true,
        }
    }
}

impl MountConfig {
    /// Configuration with the given mount layout.
    pub fn new<I, T>(image_mounts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<MountTarget>,
    {
        Self {
            image_mounts: image_mounts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load a configuration file; the format follows the extension
    /// (`toml`, `yaml`/`yml` or `json`).
    pub fn from_file(path: &Path) -> ArmountResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(OsStr::to_str) {
            Some("toml") => {
                toml::from_str(&contents).map_err(|e| ArmountError::Serialization(e.to_string()))
            }
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)
                .map_err(|e| ArmountError::Serialization(e.to_string())),
            Some("json") => Ok(serde_json::from_str(&contents)?),
            _ => Err(ArmountError::Config {
                message: format!(
                    "unsupported config format: {} (expected .toml, .yaml or .json)",
                    path.display()
                ),
            }),
        }
    }

    /// Use a fixed mount root.
    #[must_use]
    pub fn with_mount_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_path = Some(path.into());
        self
    }

    /// Enable overlay composition, archiving the upper layer next to `path`.
    #[must_use]
    pub fn with_overlay(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay_path = Some(path.into());
        self
    }

    /// Set the generated-data key.
    #[must_use]
    pub fn with_generated_data_key(mut self, key: impl Into<String>) -> Self {
        self.generated_data_key = key.into();
        self
    }

    /// Set whether missing mountpoints are created.
    #[must_use]
    pub const fn with_create_mountpoints(mut self, create: bool) -> Self {
        self.create_mountpoints = create;
        self
    }

    /// Reject layouts that cannot be mounted safely.
    ///
    /// Every non-empty target must be canonical and unique, and the overlay
    /// archive must not be written inside the mount root.
    pub fn validate(&self) -> ArmountResult<()> {
        let mut seen = BTreeSet::new();
        for target in self.image_mounts.iter().filter(|t| !t.is_skip()) {
            normalize_target(target.as_str())?;
            if !seen.insert(target.as_str()) {
                return Err(ArmountError::DuplicateTarget {
                    target: target.to_string(),
                });
            }
        }

        if let Some(overlay) = &self.overlay_path {
            if overlay.as_os_str().is_empty() {
                return Err(ArmountError::Config {
                    message: "overlay_path must not be empty".to_string(),
                });
            }
            if let Some(root) = &self.mount_path {
                if overlay.starts_with(root) {
                    return Err(ArmountError::Config {
                        message: format!(
                            "overlay archive {} must be outside the mount root {}",
                            overlay.display(),
                            root.display()
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}
