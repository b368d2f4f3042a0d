use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Version of the cached record shape. Bump to force every client to drop
/// its cache and pull a fresh snapshot on next start.
pub const CACHE_PAYLOAD_VERSION: i64 = 3;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub limits: CacheLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the sync endpoint (e.g., "https://videos.example.com/api")
  pub url: Option<String>,
  /// Per-request timeout for mutation pushes
  #[serde(default = "default_request_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: default_request_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Override for the SQLite file (default: $XDG_DATA_HOME/vidsync/cache.db)
  pub db_path: Option<PathBuf>,
}

/// Storage budget and retry limits for the offline cache.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct CacheLimits {
  #[serde(default = "default_max_cached_records")]
  pub max_cached_records: usize,
  #[serde(default = "default_max_cache_bytes")]
  pub max_cache_bytes: u64,
  /// Eviction brings the cache back under this after every pull
  #[serde(default = "default_target_cache_bytes")]
  pub target_cache_bytes: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_pull_timeout_secs")]
  pub pull_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
  15
}
fn default_max_cached_records() -> usize {
  200
}
fn default_max_cache_bytes() -> u64 {
  40 * 1024 * 1024
}
fn default_target_cache_bytes() -> u64 {
  35 * 1024 * 1024
}
fn default_max_retries() -> u32 {
  5
}
fn default_pull_timeout_secs() -> u64 {
  30
}

impl Default for CacheLimits {
  fn default() -> Self {
    Self {
      max_cached_records: default_max_cached_records(),
      max_cache_bytes: default_max_cache_bytes(),
      target_cache_bytes: default_target_cache_bytes(),
      max_retries: default_max_retries(),
      pull_timeout_secs: default_pull_timeout_secs(),
    }
  }
}

impl CacheLimits {
  pub fn pull_timeout(&self) -> Duration {
    Duration::from_secs(self.pull_timeout_secs)
  }

  /// The eviction target, clamped so it never exceeds the hard maximum.
  pub fn effective_target_bytes(&self) -> u64 {
    self.target_cache_bytes.min(self.max_cache_bytes)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vidsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vidsync/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("vidsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vidsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    if config.limits.max_cached_records == 0 {
      return Err(eyre!("limits.max_cached_records must be at least 1"));
    }

    Ok(config)
  }

  /// The remote sync endpoint, required for anything that talks to the network.
  pub fn remote_url(&self) -> Result<&str> {
    self
      .remote
      .url
      .as_deref()
      .ok_or_else(|| eyre!("No remote URL configured. Set remote.url in the config file."))
  }

  /// Optional bearer token passed through to the sync endpoint.
  ///
  /// Reads VIDSYNC_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("VIDSYNC_TOKEN").ok().filter(|t| !t.is_empty())
  }
}
