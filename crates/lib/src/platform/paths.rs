//! Per-user directories used to locate the configuration file.

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// The invoking user's home directory, from `$HOME`.
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// `$XDG_CONFIG_HOME/usersync`, falling back to `~/.config/usersync`.
pub fn config_dir() -> Option<PathBuf> {
  let config_home = std::env::var_os("XDG_CONFIG_HOME")
    .filter(|d| !d.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|h| h.join(".config")))?;
  Some(config_home.join(APP_NAME))
}
