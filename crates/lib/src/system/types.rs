//! Error and event types for the reference system.

use std::io;

use thiserror::Error;

use crate::model::SetError;

use super::database::DatabaseError;
use super::password::PasswordError;

/// Errors raised while loading or mutating the reference system.
#[derive(Debug, Error)]
pub enum SystemError {
  /// An account tool exited unsuccessfully. `output` is its stderr verbatim.
  #[error("command `{command}` failed with exit code {code:?}: {output}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    output: String,
  },

  /// An account tool could not be started at all.
  #[error("failed to run `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to load account databases: {0}")]
  Database(#[from] DatabaseError),

  #[error(transparent)]
  Password(#[from] PasswordError),

  #[error("file watcher error: {0}")]
  Watch(#[from] notify::Error),

  /// The operation named a user or group the mirror does not know, or would
  /// create a duplicate. Nothing was executed.
  #[error(transparent)]
  Set(#[from] SetError),

  #[error("group '{0}' has no gid")]
  MissingGid(String),

  /// A value failed its format rule. Nothing was executed.
  #[error("invalid {what}: '{value}'")]
  Invalid { what: &'static str, value: String },
}

impl SystemError {
  /// The captured tool output of a failed command, if this is one.
  pub fn command_output(&self) -> Option<&str> {
    match self {
      SystemError::CommandFailed { output, .. } => Some(output),
      _ => None,
    }
  }
}

/// Published to subscribers after every successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
  Changed { users: usize, groups: usize },
}
