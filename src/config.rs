//! Replication configuration module
//!
//! Handles loading and parsing of replication settings from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;
use crate::update::WriteOptions;

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Records with at most this many bits use the single-block mask header
    #[serde(default = "default_single_block_threshold")]
    pub single_block_threshold: u32,

    /// Bit width of dynamic collection size prefixes
    #[serde(default = "default_dynamic_size_bits")]
    pub dynamic_size_bits: u32,

    /// Send quest log entries in full instead of with nested change masks
    #[serde(default)]
    pub skip_quest_log_changes_mask: bool,

    /// Largest frame payload `build_packet` will produce
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Simulation tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Map the frames are built for
    #[serde(default)]
    pub map_id: u16,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_single_block_threshold() -> u32 {
    32
}

fn default_dynamic_size_bits() -> u32 {
    32
}

fn default_max_frame_size() -> usize {
    65535
}

fn default_tick_rate() -> u64 {
    600
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/replication.toml"),
            single_block_threshold: default_single_block_threshold(),
            dynamic_size_bits: default_dynamic_size_bits(),
            skip_quest_log_changes_mask: false,
            max_frame_size: default_max_frame_size(),
            tick_rate_ms: default_tick_rate(),
            map_id: 0,
            debug: false,
        }
    }
}

impl ReplicationConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        let config_path = env::var("RUSTSCAPE_REPLICATION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/replication.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RUSTSCAPE_SINGLE_BLOCK_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.single_block_threshold = threshold;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_DYNAMIC_SIZE_BITS") {
            if let Ok(bits) = val.parse() {
                self.dynamic_size_bits = bits;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_SKIP_QUEST_LOG_CHANGES_MASK") {
            self.skip_quest_log_changes_mask = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("RUSTSCAPE_MAX_FRAME_SIZE") {
            if let Ok(size) = val.parse() {
                self.max_frame_size = size;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_MAP_ID") {
            if let Ok(map_id) = val.parse() {
                self.map_id = map_id;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |message: &str| Err(ReplicationError::Config(message.to_string()));

        if self.single_block_threshold == 0 || self.single_block_threshold > 32 {
            return invalid("Single block threshold must be between 1 and 32");
        }

        if self.dynamic_size_bits == 0 || self.dynamic_size_bits > 32 {
            return invalid("Dynamic size bits must be between 1 and 32");
        }

        if self.max_frame_size < 64 {
            return invalid("Max frame size must be at least 64 bytes");
        }

        if self.tick_rate_ms < 50 || self.tick_rate_ms > 5000 {
            return invalid("Tick rate must be between 50ms and 5000ms");
        }

        Ok(())
    }

    /// Serialization options derived from this configuration
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            single_block_threshold: self.single_block_threshold as usize,
            dynamic_size_bits: self.dynamic_size_bits,
            skip_quest_log_changes_mask: self.skip_quest_log_changes_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReplicationConfig::default();
        assert_eq!(config.single_block_threshold, 32);
        assert_eq!(config.dynamic_size_bits, 32);
        assert!(!config.skip_quest_log_changes_mask);
        assert_eq!(config.max_frame_size, 65535);
        assert_eq!(config.tick_rate_ms, 600);
    }

    #[test]
    fn test_validation() {
        let mut config = ReplicationConfig::default();
        assert!(config.validate().is_ok());

        config.single_block_threshold = 0;
        assert!(config.validate().is_err());
        config.single_block_threshold = 33;
        assert!(config.validate().is_err());
        config.single_block_threshold = 16;
        assert!(config.validate().is_ok());

        config.dynamic_size_bits = 40;
        assert!(config.validate().is_err());
        config.dynamic_size_bits = 16;

        config.tick_rate_ms = 10;
        assert!(matches!(
            config.validate(),
            Err(ReplicationError::Config(message)) if message.contains("Tick rate")
        ));
    }

    #[test]
    fn test_from_toml_uses_defaults_for_missing_keys() {
        let config = ReplicationConfig::from_toml(
            r#"
            dynamic_size_bits = 16
            skip_quest_log_changes_mask = true
            "#,
        )
        .unwrap();

        assert_eq!(config.dynamic_size_bits, 16);
        assert!(config.skip_quest_log_changes_mask);
        assert_eq!(config.single_block_threshold, 32);
        assert_eq!(config.tick_rate_ms, 600);
    }

    #[test]
    fn test_write_options() {
        let mut config = ReplicationConfig::default();
        config.single_block_threshold = 8;
        config.skip_quest_log_changes_mask = true;

        let options = config.write_options();
        assert_eq!(options.single_block_threshold, 8);
        assert_eq!(options.dynamic_size_bits, 32);
        assert!(options.skip_quest_log_changes_mask);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        std::env::set_var(
            "RUSTSCAPE_REPLICATION_CONFIG",
            "/nonexistent/rustscape/replication.toml",
        );
        let config = tokio_test::block_on(ReplicationConfig::load()).unwrap();
        std::env::remove_var("RUSTSCAPE_REPLICATION_CONFIG");

        assert_eq!(
            config.config_path,
            PathBuf::from("/nonexistent/rustscape/replication.toml")
        );
        assert_eq!(config.single_block_threshold, 32);
    }
}
