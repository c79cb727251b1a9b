use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Override for the local data directory (database, logs)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the LegisFlow backend
  pub url: String,
  /// Path prefix the backend serves its REST resources under
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
}

fn default_api_prefix() -> String {
  "/api".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Cache schema version; bumping it retires every existing partition
  pub version: u32,
  /// Offline placeholder document, served when a navigation cannot be
  /// satisfied from network or cache. Must be part of the precache manifest.
  pub offline_url: String,
  /// Asset URLs loaded into the static partition at install time
  pub precache: Vec<String>,
  /// Paths never served from or written to any cache partition
  pub never_cache: Vec<String>,
  /// API paths eligible for the api partition
  pub cacheable_api: Vec<String>,
  /// Path prefixes classified as static assets
  pub static_prefixes: Vec<String>,
  /// File extensions classified as static assets
  pub static_extensions: Vec<String>,
  /// Expiry window for the dynamic partition, in days
  pub dynamic_max_age_days: i64,
  /// Expiry window for the api partition, in hours
  pub api_max_age_hours: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: 1,
      offline_url: "/offline.html".to_string(),
      precache: [
        "/",
        "/offline.html",
        "/favicon.ico",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .map(String::from)
      .to_vec(),
      never_cache: [
        "/api/auth/login",
        "/api/auth/logout",
        "/api/auth/refresh",
      ]
      .map(String::from)
      .to_vec(),
      cacheable_api: [
        "/api/matters",
        "/api/clients",
        "/api/time-entries",
        "/api/deadlines",
        "/api/documents",
      ]
      .map(String::from)
      .to_vec(),
      static_prefixes: ["/static/", "/icons/", "/assets/"].map(String::from).to_vec(),
      static_extensions: [
        "js", "mjs", "css", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff",
        "woff2", "ttf", "eot",
      ]
      .map(String::from)
      .to_vec(),
      dynamic_max_age_days: 7,
      api_max_age_hours: 24,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Health endpoint probed for connectivity transitions
  pub health_path: String,
  /// Seconds between connectivity probes in the agent loop
  pub poll_interval_secs: u64,
  /// Server rejections tolerated before a record is dead-lettered
  pub max_rejections: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      health_path: "/api/health".to_string(),
      poll_interval_secs: 30,
      max_rejections: 5,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lexsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lexsync/config.yaml
  /// 4. ~/.config/lexsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/lexsync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("lexsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lexsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Parsed backend base URL.
  pub fn server_url(&self) -> Result<Url> {
    Url::parse(&self.server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", self.server.url, e))
  }

  /// Resolve the local data directory, honoring the configured override.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("lexsync"))
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Tokens are never read from config files.
  pub fn api_token() -> Option<String> {
    std::env::var("LEXSYNC_API_TOKEN").ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config: Config = serde_yaml::from_str(
      "server:\n  url: https://app.legisflow.example\n",
    )
    .unwrap();

    assert_eq!(config.server.api_prefix, "/api");
    assert_eq!(config.cache.version, 1);
    assert_eq!(config.cache.offline_url, "/offline.html");
    assert!(config.cache.precache.contains(&"/offline.html".to_string()));
    assert_eq!(config.cache.dynamic_max_age_days, 7);
    assert_eq!(config.cache.api_max_age_hours, 24);
    assert_eq!(config.sync.max_rejections, 5);
    assert!(config.data_dir.is_none());
  }

  #[test]
  fn test_overrides_are_honored() {
    let config: Config = serde_yaml::from_str(
      "server:\n  url: http://localhost:3000\n  api_prefix: /v1\n\
       cache:\n  version: 3\n  dynamic_max_age_days: 2\n\
       sync:\n  max_rejections: 1\n  poll_interval_secs: 5\n",
    )
    .unwrap();

    assert_eq!(config.server.api_prefix, "/v1");
    assert_eq!(config.cache.version, 3);
    assert_eq!(config.cache.dynamic_max_age_days, 2);
    assert_eq!(config.sync.max_rejections, 1);
    assert_eq!(config.sync.poll_interval_secs, 5);
  }

  #[test]
  fn test_server_url_must_parse() {
    let config: Config = serde_yaml::from_str("server:\n  url: not a url\n").unwrap();
    assert!(config.server_url().is_err());
  }
}
