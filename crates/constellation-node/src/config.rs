//! Node configuration

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the provider listens on
    pub listen_host: String,

    /// Port the provider listens on
    pub listen_port: u16,

    /// Chunk size in bytes; must match the peers you talk to
    pub chunk_size: usize,

    /// YAML list of files to download
    pub download_files: String,

    /// YAML list of files to serve
    pub share_files: String,

    /// Transfer timing
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Delay between connection attempts, in seconds
    pub connect_backoff_secs: u64,
    /// Per-read timeout once connected, in seconds
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8181,
            chunk_size: constellation_core::DEFAULT_CHUNK_SIZE,
            download_files: "~/.constellation/download_files.yml".to_string(),
            share_files: "~/.constellation/share_files.yml".to_string(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_backoff_secs: 5,
            read_timeout_secs: 3,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(settings)
    }

    /// Load settings from a TOML file, falling back to defaults when it doesn't exist
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Reject settings no transfer could work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if self.transfer.read_timeout_secs == 0 {
            bail!("transfer.read_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn download_files_path(&self) -> PathBuf {
        expand_path(&self.download_files)
    }

    pub fn share_files_path(&self) -> PathBuf {
        expand_path(&self.share_files)
    }
}

/// Timing knobs used by a requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Wait between failed connection attempts
    pub connect_backoff: Duration,
    /// Longest wait for any single response
    pub read_timeout: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        (&TransferConfig::default()).into()
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            connect_backoff: Duration::from_secs(config.connect_backoff_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }
}

/// Expand ~ in a path
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_address(), "0.0.0.0:8181");
        assert!(settings.validate().is_ok());

        let options = TransferOptions::default();
        assert_eq!(options.connect_backoff, Duration::from_secs(5));
        assert_eq!(options.read_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
listen_port = 9000
chunk_size = 2

[transfer]
read_timeout_secs = 10
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.listen_host, "0.0.0.0");
        assert_eq!(settings.listen_port, 9000);
        assert_eq!(settings.chunk_size, 2);
        assert_eq!(settings.transfer.read_timeout_secs, 10);
        assert_eq!(settings.transfer.connect_backoff_secs, 5);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_or_default(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let settings = Settings {
            chunk_size: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/tmp/list.yml"), PathBuf::from("/tmp/list.yml"));
        assert_eq!(expand_path("list.yml"), PathBuf::from("list.yml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/list.yml"), home.join("list.yml"));
        }
    }
}
