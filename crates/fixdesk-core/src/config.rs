//! Configuration for fixdesk
//!
//! Stored in .fixdesk/config.toml

use crate::{StorageBackend, TransitionPolicy, Visibility};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// fixdesk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend for issue records
    pub storage: StorageBackend,

    /// Which status transitions staff may make
    pub policy: TransitionPolicy,

    /// Visibility of new issues when the reporter does not choose
    pub default_visibility: Visibility,

    /// Display settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// API server settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Jsonl,
            policy: TransitionPolicy::Permissive,
            default_visibility: Visibility::Public,
            display: DisplayConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use colors in output
    pub colors: bool,

    /// Date format for display
    pub date_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3850,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# fixdesk configuration

# Storage backend for issues: "jsonl" or "sqlite"
storage = "jsonl"

# Status transition policy:
#   "permissive"   - any status may follow any other (staff can correct mistakes)
#   "forward_only" - Reported -> Assigned -> In Progress -> Resolved -> Closed only,
#                    and merged duplicates are frozen
policy = "permissive"

# Visibility of new issues: "Public" or "Private"
default_visibility = "Public"

[display]
# Use colors in output
colors = true

# Date format for display (strftime format)
date_format = "%Y-%m-%d %H:%M"

[api]
host = "127.0.0.1"
port = 3850
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_default_matches_default() {
        let parsed: Config = toml::from_str(&Config::default_with_comments()).unwrap();
        let default = Config::default();
        assert_eq!(parsed.storage, default.storage);
        assert_eq!(parsed.policy, default.policy);
        assert_eq!(parsed.default_visibility, default.default_visibility);
        assert_eq!(parsed.api.port, default.api.port);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("policy = \"forward_only\"\n").unwrap();
        assert_eq!(config.policy, TransitionPolicy::ForwardOnly);
        assert_eq!(config.storage, StorageBackend::Jsonl);
        assert!(config.display.colors);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.storage = StorageBackend::Sqlite;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap().storage, StorageBackend::Sqlite);
    }
}
