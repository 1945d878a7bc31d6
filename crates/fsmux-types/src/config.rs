//! Runtime configuration.
//!
//! Loaded from RON. Every field has a default, so a config file only needs
//! to name what it overrides:
//!
//! ```ron
//! (
//!     general: (max_open_files: 4, container_name: "fs0.img"),
//!     secure: (create_size: 8192),
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::DescriptorLayout;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// Two descriptor ranges would overlap.
    #[error("descriptor range {range} overlaps {other}")]
    Overlap {
        range: &'static str,
        other: &'static str,
    },

    /// A backend was configured with no open-file slots.
    #[error("max_open_files must be at least 1")]
    ZeroLimit,

    /// The container object name is unusable.
    #[error("invalid container name: {0:?}")]
    ContainerName(String),
}

impl ConfigError {
    /// Create an Overlap error.
    pub fn overlap(range: &'static str, other: &'static str) -> Self {
        Self::Overlap { range, other }
    }
}

/// Descriptor range bases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Console descriptors `0..sys_fds`.
    pub sys_fds: u8,
    /// First general-store descriptor.
    pub general_base: i32,
    /// First secure-store descriptor.
    pub secure_base: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            sys_fds: 3,
            general_base: 10,
            secure_base: 100,
        }
    }
}

/// General-store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Backend's configured max open files.
    pub max_open_files: u32,
    /// Secure-store object that hosts the filesystem image.
    pub container_name: String,
    /// Maximum size of the container object in bytes.
    pub container_size: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_open_files: 8,
            container_name: String::from("fsmux.img"),
            container_size: 64 * 1024,
        }
    }
}

/// Secure-store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureConfig {
    /// Backend's configured max open files.
    pub max_open_files: u32,
    /// Maximum size reserved for files created through `open(O_CREAT)`.
    pub create_size: u32,
}

impl Default for SecureConfig {
    fn default() -> Self {
        Self {
            max_open_files: 8,
            create_size: 4 * 1024,
        }
    }
}

/// Complete fsmux configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsmuxConfig {
    pub layout: LayoutConfig,
    pub general: GeneralConfig,
    pub secure: SecureConfig,
}

impl FsmuxConfig {
    /// Parse and validate a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: FsmuxConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serialize as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.descriptor_layout()?;
        let name = &self.general.container_name;
        if name.is_empty() || name.starts_with(crate::SECURE_PREFIX) {
            return Err(ConfigError::ContainerName(name.clone()));
        }
        Ok(())
    }

    /// Build the validated descriptor layout.
    pub fn descriptor_layout(&self) -> Result<DescriptorLayout, ConfigError> {
        DescriptorLayout::new(
            self.layout.sys_fds,
            self.layout.general_base,
            self.general.max_open_files,
            self.layout.secure_base,
            self.secure.max_open_files,
        )
    }
}
