//! Scan configuration, resolved before a cursor is constructed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Initial read buffer cap per field, in bytes. Buffers may later grow past it.
    pub read_buffer_size: usize,

    /// Record per-operation timings and dump them when the cursor closes.
    pub enable_stats: bool,

    /// Directory for the end-of-scan stats dump. Defaults to the OS temp dir.
    pub stats_dir: Option<String>,

    /// Buffers only double while available memory exceeds this multiple of
    /// the current native footprint.
    pub growth_headroom: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 10 * 1024 * 1024, // 10 MiB default
            enable_stats: false,
            stats_dir: None,
            growth_headroom: 4,
        }
    }
}

impl ScanConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `ARRAYSCAN_READ_BUFFER_SIZE`: initial per-field buffer cap in bytes
    /// - `ARRAYSCAN_ENABLE_STATS`: `true`/`false`
    /// - `ARRAYSCAN_STATS_DIR`: stats dump directory
    /// - `ARRAYSCAN_GROWTH_HEADROOM`: memory multiple required before growth
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("ARRAYSCAN_READ_BUFFER_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.read_buffer_size = v;
            }
        }

        if let Ok(s) = std::env::var("ARRAYSCAN_ENABLE_STATS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.enable_stats = v;
            }
        }

        if let Ok(s) = std::env::var("ARRAYSCAN_STATS_DIR") {
            cfg.stats_dir = Some(s);
        }

        if let Ok(s) = std::env::var("ARRAYSCAN_GROWTH_HEADROOM") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.growth_headroom = v;
            }
        }

        cfg
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be positive".into()));
        }
        // Doubling alone needs 2x; anything lower cannot hold the new buffers.
        if self.growth_headroom < 2 {
            return Err(Error::Config(format!(
                "growth_headroom must be at least 2, got {}",
                self.growth_headroom
            )));
        }
        Ok(())
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.stats_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let cfg = ScanConfig::from_json(r#"{"enable_stats": true}"#).unwrap();
        assert!(cfg.enable_stats);
        assert_eq!(cfg.read_buffer_size, 10 * 1024 * 1024);
        assert_eq!(cfg.growth_headroom, 4);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        assert!(ScanConfig::from_json(r#"{"read_buffer_size": 0}"#).is_err());
        assert!(ScanConfig::from_json(r#"{"growth_headroom": 1}"#).is_err());
        assert!(ScanConfig::from_json("not json").is_err());
    }

    #[test]
    fn stats_dir_defaults_to_temp() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.stats_dir(), std::env::temp_dir());
    }
}
