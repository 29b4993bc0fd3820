//! Execution settings shared by every traversal spawned from a source.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a TOML file to load settings from.
pub const CONFIG_ENV: &str = "SOMBRA_TRAVERSAL_CONFIG";

/// Local execution settings.
///
/// These never enter the bytecode: a remote or bulk-parallel engine applies its
/// own settings to the traversals it replays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Maximum number of traversers a lazy barrier gathers before releasing them.
    pub barrier_size: usize,
    /// Whether the lazy barrier optimization inserts bulking barriers.
    pub lazy_barriers: bool,
    /// Label used by `add_v_default`.
    pub default_vertex_label: String,
    /// Label used when an edge label sub-traversal yields nothing.
    pub default_edge_label: String,
    /// Buffer size for the bulk I/O boundary steps.
    pub io_buffer_bytes: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            barrier_size: 2500,
            lazy_barriers: true,
            default_vertex_label: "vertex".to_owned(),
            default_edge_label: "edge".to_owned(),
            io_buffer_bytes: 64 * 1024,
        }
    }
}

impl TraversalConfig {
    /// Parses settings from TOML text; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from [`CONFIG_ENV`], then the per-user config file, falling
    /// back to defaults when neither exists.
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(PathBuf::from(path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Serializes the settings as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.barrier_size == 0 {
            return Err(ConfigError::Invalid {
                key: "barrier_size",
                reason: "must be at least 1",
            });
        }
        if self.io_buffer_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "io_buffer_bytes",
                reason: "must be at least 1",
            });
        }
        if self.default_vertex_label.is_empty() || self.default_edge_label.is_empty() {
            return Err(ConfigError::Invalid {
                key: "default_*_label",
                reason: "labels cannot be empty",
            });
        }
        Ok(())
    }
}

/// Per-user config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sombra").join("traversal.toml"))
}

/// Failures while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read traversal config {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`TraversalConfig`].
    #[error("failed to parse traversal config{}: {source}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// File that failed, when parsed from disk.
        path: Option<PathBuf>,
        /// Underlying cause.
        source: toml::de::Error,
    },
    /// The settings could not be serialized.
    #[error("failed to serialize traversal config: {source}")]
    Serialize {
        /// Underlying cause.
        source: toml::ser::Error,
    },
    /// A setting is out of range.
    #[error("traversal config key '{key}' is invalid: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TraversalConfig::from_toml_str("barrier_size = 16\n").unwrap();
        assert_eq!(config.barrier_size, 16);
        assert!(config.lazy_barriers);
        assert_eq!(config.default_vertex_label, "vertex");
    }

    #[test]
    fn zero_barrier_rejected() {
        let err = TraversalConfig::from_toml_str("barrier_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "barrier_size", .. }));
    }

    #[test]
    fn load_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traversal.toml");
        let config = TraversalConfig {
            lazy_barriers: false,
            ..TraversalConfig::default()
        };
        fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(TraversalConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_names_path() {
        let err = TraversalConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
