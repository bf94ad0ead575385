//! Runtime configuration.
//!
//! Read from a TOML file; every key is optional and falls back to the host's
//! standard locations, so an absent file is equivalent to an empty one.
//!
//! ```toml
//! home_prefix = "/home"
//! default_shell = "/bin/bash"
//!
//! [databases]
//! passwd = "/etc/passwd"
//! shadow = "/etc/shadow"
//! group = "/etc/group"
//! shells = "/etc/shells"
//!
//! [watch]
//! enabled = true
//! debounce_ms = 1000
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_DEBOUNCE_MS, DEFAULT_SHELL, HOME_PREFIX};
use crate::platform::paths;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "USERSYNC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Locations of the account databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasePaths {
  pub passwd: PathBuf,
  pub shadow: PathBuf,
  pub group: PathBuf,
  pub shells: PathBuf,
}

impl Default for DatabasePaths {
  fn default() -> Self {
    Self::under(Path::new("/etc"))
  }
}

impl DatabasePaths {
  /// The four databases under a single directory.
  pub fn under(dir: &Path) -> Self {
    Self {
      passwd: dir.join("passwd"),
      shadow: dir.join("shadow"),
      group: dir.join("group"),
      shells: dir.join("shells"),
    }
  }

  /// Files whose modification triggers a reload.
  pub fn watched(&self) -> Vec<PathBuf> {
    vec![self.group.clone(), self.shadow.clone()]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  pub enabled: bool,
  pub debounce_ms: u64,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      debounce_ms: DEFAULT_DEBOUNCE_MS,
    }
  }
}

impl WatchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub databases: DatabasePaths,
  pub home_prefix: String,
  pub default_shell: String,
  pub watch: WatchConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      databases: DatabasePaths::default(),
      home_prefix: HOME_PREFIX.to_string(),
      default_shell: DEFAULT_SHELL.to_string(),
      watch: WatchConfig::default(),
    }
  }
}

impl Config {
  /// Configuration pointing at databases under `dir`, otherwise default.
  pub fn with_databases(dir: &Path) -> Self {
    Self {
      databases: DatabasePaths::under(dir),
      ..Self::default()
    }
  }

  /// Load from the standard location, see [`config_path`].
  pub fn load() -> Result<Self, ConfigError> {
    match config_path() {
      Some(path) => Self::load_from(&path),
      None => Ok(Self::default()),
    }
  }

  /// Load from `path`. A missing file yields the defaults.
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let text = match fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Self::default());
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }
}

/// `$USERSYNC_CONFIG` if set, else `config.toml` in the per-user config dir.
pub fn config_path() -> Option<PathBuf> {
  if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
    return Some(PathBuf::from(path));
  }
  paths::config_dir().map(|dir| dir.join("config.toml"))
}
