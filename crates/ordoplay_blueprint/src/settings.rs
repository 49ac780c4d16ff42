// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiler settings, persisted as RON.

use crate::compiler::ErrorPolicy;
use crate::dag::LinkPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Conventional settings file name
pub const SETTINGS_FILE_NAME: &str = "blueprint.ron";

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON for these settings
    #[error("Invalid settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be encoded
    #[error("Failed to encode settings: {0}")]
    Encode(#[from] ron::Error),

    /// File was written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },
}

/// Shader target layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// Bind group holding the material uniforms and textures
    pub bind_group: u32,
    /// Name of the uniform struct type
    pub uniform_struct: String,
    /// Name of the uniform variable
    pub uniform_binding: String,
    /// Composite expressions used more often than this are bound to locals
    pub share_threshold: u32,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            bind_group: 1,
            uniform_struct: "MaterialParams".to_string(),
            uniform_binding: "material".to_string(),
            share_threshold: 1,
        }
    }
}

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Format version
    pub version: u32,
    /// Validation error handling
    pub error_policy: ErrorPolicy,
    /// Handling of links that do not fit the graph
    pub link_policy: LinkPolicy,
    /// Shader target layout
    pub target: TargetSettings,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            error_policy: ErrorPolicy::default(),
            link_policy: LinkPolicy::default(),
            target: TargetSettings::default(),
        }
    }
}

impl CompilerSettings {
    /// Parse settings from RON text
    pub fn from_ron(content: &str) -> Result<Self, SettingsError> {
        let settings: CompilerSettings = ron::from_str(content)?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        Ok(settings)
    }

    /// Encode settings as pretty RON
    pub fn to_ron(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron(&content)?;
        tracing::debug!("Loaded compiler settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CompilerSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert_eq!(settings.link_policy, LinkPolicy::Lenient);
        assert_eq!(settings.target.uniform_binding, "material");
    }

    #[test]
    fn test_serialization() {
        let mut settings = CompilerSettings::default();
        settings.link_policy = LinkPolicy::Strict;
        settings.target.share_threshold = 3;
        let ron_str = settings.to_ron().unwrap();
        let loaded = CompilerSettings::from_ron(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let loaded = CompilerSettings::from_ron("(link_policy: Strict)").unwrap();
        assert_eq!(loaded.link_policy, LinkPolicy::Strict);
        assert_eq!(loaded.target, TargetSettings::default());
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = CompilerSettings::from_ron("(version: 99)").unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let settings = CompilerSettings::default();
        settings.save(&path).unwrap();
        assert_eq!(CompilerSettings::load(&path).unwrap(), settings);
    }
}
