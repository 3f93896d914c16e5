//! Application configuration.
//!
//! Values come from an optional JSON settings file, overridden by
//! environment variables. Credentials never fall back to defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::satellite::{Credentials, QueryPolicy};

pub const ENV_SERVER: &str = "SATELLITE_SERVER";
pub const ENV_USER_ID: &str = "DISCORD_USER_ID";
pub const ENV_TOKEN: &str = "SATELLITE_TOKEN";
pub const ENV_QUERY_TIMEOUT: &str = "SATELLITE_QUERY_TIMEOUT_MS";
pub const ENV_AUTO_RECONNECT: &str = "SATELLITE_AUTO_RECONNECT";
pub const ENV_ANSWER_WHILE_PAUSED: &str = "SATELLITE_ANSWER_WHILE_PAUSED";
pub const ENV_CONFIG_PATH: &str = "SATELLITE_CONFIG";

/// Server used when none is configured, for local testing.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

const CONFIG_DIR: &str = "mina-satellite";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("DISCORD_USER_ID is not set. Set it to your Discord user ID, e.g. `DISCORD_USER_ID=123456789 mina-satellite`.")]
  MissingUserId,

  #[error("SATELLITE_TOKEN is not set. Contact the bot administrator for the authentication token.")]
  MissingToken,

  #[error("Invalid server URL '{0}': must start with http://, https://, ws:// or wss://")]
  InvalidServerUrl(String),

  #[error("Query timeout must be between 100 and 30000 ms, got {0}")]
  InvalidQueryTimeout(u64),

  #[error("Invalid value '{value}' for {key}")]
  InvalidValue { key: &'static str, value: String },

  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("Failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },
}

/// Application configuration as stored on disk.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Satellite server address (None = local default).
  #[serde(default)]
  pub server_url: Option<String>,

  /// Discord user ID this satellite belongs to.
  #[serde(default)]
  pub user_id: Option<String>,

  /// Shared authentication token.
  #[serde(default)]
  pub token: Option<String>,

  /// Longest wait for the media info backend before answering "nothing playing".
  #[serde(default = "default_query_timeout_ms")]
  pub query_timeout_ms: u64,

  /// Reconnect with backoff after the server drops the connection.
  #[serde(default = "default_true")]
  pub auto_reconnect: bool,

  /// Keep answering "what's playing?" while paused.
  #[serde(default = "default_true")]
  pub answer_queries_while_paused: bool,
}

impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_url", &self.server_url)
      .field("user_id", &self.user_id)
      .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
      .field("query_timeout_ms", &self.query_timeout_ms)
      .field("auto_reconnect", &self.auto_reconnect)
      .field("answer_queries_while_paused", &self.answer_queries_while_paused)
      .finish()
  }
}

fn default_query_timeout_ms() -> u64 {
  2500
}

fn default_true() -> bool {
  true
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      server_url: None,
      user_id: None,
      token: None,
      query_timeout_ms: default_query_timeout_ms(),
      auto_reconnect: true,
      answer_queries_while_paused: true,
    }
  }
}

/// Validated settings the client runs with.
#[derive(Debug, Clone)]
pub struct Settings {
  pub endpoint: String,
  pub credentials: Credentials,
  pub query_timeout: Duration,
  pub auto_reconnect: bool,
  pub query_policy: QueryPolicy,
}

impl AppConfig {
  /// Default settings file location.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
  }

  /// Load the settings file (if any) and apply the process environment.
  pub fn load() -> Result<Self, ConfigError> {
    let path = std::env::var_os(ENV_CONFIG_PATH)
      .map(PathBuf::from)
      .or_else(Self::default_path);

    let config = match path {
      Some(path) if path.exists() => {
        log::info!("Loading settings from {}", path.display());
        Self::from_file(&path)?
      }
      _ => Self::default(),
    };

    config.with_env(|key| std::env::var(key).ok())
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Override fields with values from `lookup`. Empty values are ignored.
  pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(server_url) = get(ENV_SERVER) {
      self.server_url = Some(server_url);
    }
    if let Some(user_id) = get(ENV_USER_ID) {
      self.user_id = Some(user_id);
    }
    if let Some(token) = get(ENV_TOKEN) {
      self.token = Some(token);
    }
    if let Some(value) = get(ENV_QUERY_TIMEOUT) {
      self.query_timeout_ms = value.parse().map_err(|_| ConfigError::InvalidValue {
        key: ENV_QUERY_TIMEOUT,
        value,
      })?;
    }
    if let Some(value) = get(ENV_AUTO_RECONNECT) {
      self.auto_reconnect = parse_flag(ENV_AUTO_RECONNECT, value)?;
    }
    if let Some(value) = get(ENV_ANSWER_WHILE_PAUSED) {
      self.answer_queries_while_paused = parse_flag(ENV_ANSWER_WHILE_PAUSED, value)?;
    }

    Ok(self)
  }

  /// Validate into runnable settings.
  pub fn resolve(&self) -> Result<Settings, ConfigError> {
    let user_id = non_empty(&self.user_id).ok_or(ConfigError::MissingUserId)?;
    let token = non_empty(&self.token).ok_or(ConfigError::MissingToken)?;

    let endpoint = match non_empty(&self.server_url) {
      Some(url) => url.trim_end_matches('/').to_string(),
      None => {
        log::warn!("{} not set, using {}", ENV_SERVER, DEFAULT_SERVER_URL);
        DEFAULT_SERVER_URL.to_string()
      }
    };
    let has_scheme = ["http://", "https://", "ws://", "wss://"]
      .iter()
      .any(|scheme| endpoint.starts_with(scheme) && endpoint.len() > scheme.len());
    if !has_scheme {
      return Err(ConfigError::InvalidServerUrl(endpoint));
    }

    if !(100..=30_000).contains(&self.query_timeout_ms) {
      return Err(ConfigError::InvalidQueryTimeout(self.query_timeout_ms));
    }

    Ok(Settings {
      endpoint,
      credentials: Credentials::new(user_id, token),
      query_timeout: Duration::from_millis(self.query_timeout_ms),
      auto_reconnect: self.auto_reconnect,
      query_policy: if self.answer_queries_while_paused {
        QueryPolicy::AnswerWhilePaused
      } else {
        QueryPolicy::SuppressWhilePaused
      },
    })
  }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
  match value.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(ConfigError::InvalidValue { key, value }),
  }
}
