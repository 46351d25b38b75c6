//! TOML-based configuration for the CloudVault core components.
//!
//! Every field has a default, so an empty file (or no file at all, via
//! [`VaultConfig::default`]) yields a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::conflict::strategy::{Strategy, TieBreak};
use crate::errors::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Chunked upload settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Sync conflict resolution settings.
    #[serde(default)]
    pub conflict: ConflictConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            chunking: ChunkingConfig::default(),
            conflict: ConflictConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Chunked upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Size in bytes of every chunk except possibly the last.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Recompute each chunk's checksum while merging.
    #[serde(default = "default_true")]
    pub verify_on_merge: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_true() -> bool {
    true
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            verify_on_merge: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// Conflict resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Strategy used when a resolution call names none.
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// How `newest_wins` breaks equal timestamps.
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Let the `merge` strategy combine non-overlapping line edits.
    #[serde(default)]
    pub line_merge: bool,
}

fn default_strategy() -> String {
    Strategy::NewestWins.to_string()
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            tie_break: TieBreak::default(),
            line_merge: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl VaultConfig {
    /// Load a [`VaultConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: VaultConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunking.chunk_size".into(),
                detail: "chunk size must be > 0".into(),
            });
        }
        if self.conflict.default_strategy.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "conflict.default_strategy".into(),
                detail: "default strategy must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
log_level = "debug"

[chunking]
chunk_size = 1024
verify_on_merge = false

[conflict]
default_strategy = "merge"
tie_break = "prefer_remote"
line_merge = true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: VaultConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.chunking.chunk_size, 1024);
        assert!(!config.chunking.verify_on_merge);
        assert_eq!(config.conflict.default_strategy, "merge");
        assert_eq!(config.conflict.tie_break, TieBreak::PreferRemote);
        assert!(config.conflict.line_merge);
    }

    #[test]
    fn test_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.chunking.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.chunking.verify_on_merge);
        assert_eq!(config.conflict.default_strategy, "newest_wins");
        assert_eq!(config.conflict.tie_break, TieBreak::HigherVersion);
        assert!(!config.conflict.line_merge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudvault.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = VaultConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.chunking.chunk_size, 1024);
    }

    #[test]
    fn test_file_not_found() {
        let result = VaultConfig::load_from_file("/nonexistent/cloudvault.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = \"big\"\n").unwrap();

        let result = VaultConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = VaultConfig::default();
        config.chunking.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "chunking.chunk_size"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = VaultConfig::default();
        config.log_level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "log_level"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_strategy() {
        let mut config = VaultConfig::default();
        config.conflict.default_strategy = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "conflict.default_strategy"
        ));
    }
}
