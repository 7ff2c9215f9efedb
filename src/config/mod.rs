//! Application configuration
//!
//! Everything tunable lives in a versioned JSON file under the data
//! directory. The vault master key is the one exception: it comes from
//! the environment so it never lands on disk next to the ciphertexts it
//! protects.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the 64-hex-char vault master key
pub const VAULT_KEY_ENV: &str = "STOCKBRIDGE_VAULT_KEY";

const CONFIG_FILE: &str = "stockbridge.json";

/// Config schema migrations
pub trait Migrate {
    fn current_version(&self) -> u32;
    fn target_version() -> u32;
    fn migrate(&mut self) -> Result<()>;
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Address the webhook receiver binds to
    pub bind_addr: SocketAddr,

    /// Number of reconciliation workers
    pub worker_count: usize,

    /// Per-job processing budget in seconds
    pub job_timeout_secs: u64,

    /// Retry schedule for failed sync jobs
    pub retry: RetryConfig,

    /// External platform API settings
    pub platform: PlatformConfig,

    /// Audit log entries older than this are pruned
    pub log_retention_days: u32,
}

/// Backoff schedule for job retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            multiplier: 2.0,
            max_delay_secs: 600,
            max_attempts: 8,
        }
    }
}

/// External platform API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Admin API version segment, e.g. "2025-01"
    pub api_version: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_version: "2025-01".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific data directory
    pub fn load_from(data_dir: &PathBuf) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let mut config: AppConfig = serde_json::from_str(&json)?;

            if config.version < Self::target_version() {
                info!(
                    "Migrating config from v{} to v{}",
                    config.version,
                    Self::target_version()
                );
                config.migrate()?;
                config.save()?;
            }

            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        }
    }

    /// Load or create configuration
    pub fn load_or_create(data_dir: &PathBuf) -> Result<Self> {
        Self::load_from(data_dir).or_else(|_| {
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        })
    }

    /// Create default configuration with specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::target_version(),
            data_dir,
            log_level: "info".to_string(),
            bind_addr: "127.0.0.1:8787".parse().expect("static addr"),
            worker_count: 4,
            job_timeout_secs: 60,
            retry: RetryConfig::default(),
            platform: PlatformConfig::default(),
            log_retention_days: 30,
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Path of the sync database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("stockbridge.db")
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.platform.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::default_with_dir(data_dir)
    }
}

impl Migrate for AppConfig {
    fn current_version(&self) -> u32 {
        self.version
    }

    fn target_version() -> u32 {
        1
    }

    fn migrate(&mut self) -> Result<()> {
        match self.version {
            0 => {
                self.version = 1;
                Ok(())
            }
            1 => Ok(()),
            v => Err(anyhow!("Unknown config version: {}", v)),
        }
    }
}

/// Default data directory for the current platform
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| anyhow!("No data directory available"))?;
    Ok(base.join("stockbridge"))
}

/// Read and decode the vault master key from the environment.
///
/// Missing or malformed keys abort startup: running without the real key
/// would make every stored credential unreadable and every webhook
/// unverifiable, which is strictly worse than not starting.
pub fn vault_key_from_env() -> Result<[u8; 32]> {
    let hex_key = std::env::var(VAULT_KEY_ENV)
        .with_context(|| format!("{} is not set", VAULT_KEY_ENV))?;
    let bytes = hex::decode(hex_key.trim())
        .with_context(|| format!("{} is not valid hex", VAULT_KEY_ENV))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("{} must decode to exactly 32 bytes", VAULT_KEY_ENV))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().to_path_buf();

        let mut config = AppConfig::default_with_dir(data_dir.clone());
        config.worker_count = 9;
        config.save().unwrap();

        let loaded = AppConfig::load_from(&data_dir).unwrap();
        assert_eq!(loaded.worker_count, 9);
        assert_eq!(loaded.version, AppConfig::target_version());
    }

    #[test]
    fn creates_default_when_missing() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_create(&dir.path().to_path_buf()).unwrap();
        assert_eq!(config.retry.max_attempts, 8);
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn migrates_old_versions() {
        let mut config = AppConfig::default();
        config.version = 0;
        config.migrate().unwrap();
        assert_eq!(config.version, 1);
    }
}
