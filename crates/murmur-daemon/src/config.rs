//! Daemon configuration: TOML file with defaults and validation.

use murmur_crypto::merkle::DEFAULT_TREE_DEPTH;
use murmur_types::{MurmurError, MurmurResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// RPC endpoints of the external event log. Empty means the
    /// in-process development log.
    pub endpoints: Vec<String>,
    pub poll_interval_ms: u64,
    pub submit_timeout_secs: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            poll_interval_ms: 1_000,
            submit_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub base_urls: Vec<String>,
    /// Pinned BLAKE3 checksum of the verifying key, hex encoded.
    pub vk_hash: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub tree_depth: usize,
    pub event_log: EventLogConfig,
    pub artifacts: ArtifactConfig,
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tree_depth: DEFAULT_TREE_DEPTH,
            event_log: EventLogConfig::default(),
            artifacts: ArtifactConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".murmur"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/murmur"))
}

impl DaemonConfig {
    pub fn load(path: &Path) -> MurmurResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MurmurError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| MurmurError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> MurmurResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> MurmurResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MurmurError::Config(format!("Failed to create {:?}: {}", parent, e)))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| MurmurError::Serialization(e.to_string()))?;
        std::fs::write(path, contents)
            .map_err(|e| MurmurError::Config(format!("Failed to write {:?}: {}", path, e)))?;
        Ok(())
    }

    pub fn validate(&self) -> MurmurResult<()> {
        if self.tree_depth == 0 || self.tree_depth > 32 {
            return Err(MurmurError::Config(format!(
                "tree_depth must be 1..=32, got {}",
                self.tree_depth
            )));
        }
        if self.event_log.submit_timeout_secs == 0 {
            return Err(MurmurError::Config(
                "submit_timeout_secs must be positive".into(),
            ));
        }
        if self.event_log.poll_interval_ms == 0 {
            return Err(MurmurError::Config(
                "poll_interval_ms must be positive".into(),
            ));
        }
        for url in self
            .event_log
            .endpoints
            .iter()
            .chain(self.artifacts.base_urls.iter())
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(MurmurError::Config(format!("Invalid endpoint URL: {}", url)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(DaemonConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let mut config = DaemonConfig::default();
        config.tree_depth = 0;
        assert!(config.validate().is_err());
        config.tree_depth = 33;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = DaemonConfig::default();
        config.event_log.endpoints = vec!["not-a-url".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: DaemonConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.tree_depth, config.tree_depth);
        assert_eq!(parsed.event_log.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: DaemonConfig = toml::from_str("tree_depth = 8").unwrap();
        assert_eq!(parsed.tree_depth, 8);
        assert_eq!(parsed.event_log.submit_timeout_secs, 60);
    }
}
