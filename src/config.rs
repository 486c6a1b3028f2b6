use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::accesslink::DEFAULT_RETRY_LIMIT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accesslink: AccessLinkConfig,

    #[serde(default)]
    pub db: DbConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AccessLinkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth bearer token obtained through the authorization flow.
    #[serde(default)]
    pub access_token: Option<String>,

    /// AccessLink user id the token was registered for.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of transactions opened in one session.
    /// Each transaction holds up to 50 exercises.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

// Hand-written so the token never reaches a log line.
impl std::fmt::Debug for AccessLinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLinkConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_limit", &self.retry_limit)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://www.polaraccesslink.com/v3".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

impl Default for AccessLinkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            user_id: None,
            timeout_secs: default_timeout_secs(),
            retry_limit: default_retry_limit(),
        }
    }
}

impl AccessLinkConfig {
    /// Token and user id, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.access_token.as_deref(), self.user_id.as_deref()) {
            (Some(token), Some(user)) if !token.is_empty() && !user.is_empty() => Some((token, user)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_dir")]
    pub dir: PathBuf,
}

fn default_db_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trailstamp")
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { dir: default_db_dir() }
    }
}

impl DbConfig {
    pub fn exercise_path(&self) -> PathBuf {
        self.dir.join("exercise.db")
    }

    pub fn route_path(&self) -> PathBuf {
        self.dir.join("route.db")
    }

    pub fn exif_path(&self) -> PathBuf {
        self.dir.join("exif.db")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Root of the photo tree. Catalog sync is skipped when unset.
    #[serde(default)]
    pub lookup_path: Option<PathBuf>,

    /// Directory names pruned from the walk at any depth.
    #[serde(default)]
    pub ignore_dirs: Vec<String>,

    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_file_extensions() -> Vec<String> {
    vec![
        ".jpg".to_string(),
        ".jpeg".to_string(),
        ".heic".to_string(),
        ".cr2".to_string(),
        ".cr3".to_string(),
        ".nef".to_string(),
        ".arw".to_string(),
        ".dng".to_string(),
    ]
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            lookup_path: None,
            ignore_dirs: Vec::new(),
            file_extensions: default_file_extensions(),
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `TRAILSTAMP_LOG` is unset, e.g. `trailstamp::accesslink=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Send logs to the systemd journal when it is reachable (Linux only).
    #[serde(default = "default_true")]
    pub journald: bool,

    /// Directory for the rolling log file; defaults under the local data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            journald: default_true(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trailstamp")
                .join("logs")
        })
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing a default config there if none exists yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trailstamp")
    }

    /// `TRAILSTAMP_CONFIG` wins over the default location.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TRAILSTAMP_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
