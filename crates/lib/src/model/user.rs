//! User accounts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::{
  DEFAULT_EXPIRE_DAYS, DEFAULT_INACTIVE_DAYS, DEFAULT_MAX_DAYS, DEFAULT_MIN_DAYS, DEFAULT_SHELL, DEFAULT_WARN_DAYS,
  HOME_PREFIX, LOCKED_PASSWORD, REGULAR_UIDS,
};
use crate::system::password;

/// The five descriptive (GECOS) fields of a user record.
///
/// None of the fields may contain `:` or `,`, since the record is stored as a
/// comma-separated string inside a colon-separated line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gecos {
  pub real_name: String,
  pub office: String,
  pub work_phone: String,
  pub home_phone: String,
  pub other: String,
}

impl Gecos {
  /// Split a GECOS string into its five fields.
  ///
  /// Missing trailing fields are padded with empty strings; anything past the
  /// fourth comma stays in `other`.
  pub fn parse(text: &str) -> Self {
    let mut parts = text.splitn(5, ',').map(str::to_string);
    Self {
      real_name: parts.next().unwrap_or_default(),
      office: parts.next().unwrap_or_default(),
      work_phone: parts.next().unwrap_or_default(),
      home_phone: parts.next().unwrap_or_default(),
      other: parts.next().unwrap_or_default(),
    }
  }

  pub fn fields(&self) -> [&str; 5] {
    [
      &self.real_name,
      &self.office,
      &self.work_phone,
      &self.home_phone,
      &self.other,
    ]
  }
}

impl fmt::Display for Gecos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.fields().join(","))
  }
}

/// Shadow password-aging fields, in days.
///
/// Valid values lie in [`AGING_RANGE`](crate::consts::AGING_RANGE); `-1`
/// disables a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aging {
  pub last_change: i64,
  pub min: i64,
  pub max: i64,
  pub warn: i64,
  pub inactive: i64,
  pub expire: i64,
}

impl Aging {
  /// Default aging with the last change set to today.
  pub fn starting_today() -> Self {
    Self {
      last_change: days_since_epoch(),
      ..Self::default()
    }
  }

  pub fn fields(&self) -> [i64; 6] {
    [
      self.last_change,
      self.min,
      self.max,
      self.warn,
      self.inactive,
      self.expire,
    ]
  }
}

impl Default for Aging {
  fn default() -> Self {
    Self {
      last_change: 0,
      min: DEFAULT_MIN_DAYS,
      max: DEFAULT_MAX_DAYS,
      warn: DEFAULT_WARN_DAYS,
      inactive: DEFAULT_INACTIVE_DAYS,
      expire: DEFAULT_EXPIRE_DAYS,
    }
  }
}

/// Whole days elapsed since the Unix epoch (UTC).
pub fn days_since_epoch() -> i64 {
  chrono::Utc::now().timestamp().div_euclid(86_400)
}

/// An OS user account.
///
/// `groups` holds secondary group names only; the primary group is named by
/// `primary_group` and identified by `gid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub name: String,
  pub uid: u32,
  pub gid: u32,
  pub primary_group: String,
  pub gecos: Gecos,
  pub home: String,
  pub shell: String,
  pub groups: Vec<String>,
  pub aging: Aging,
  /// Password hash as stored in the shadow database.
  pub password: String,
  /// Plaintext password awaiting hashing. Never serialized.
  #[serde(skip_serializing, default)]
  pub plain_password: Option<String>,
}

impl User {
  /// Create a user with default home, shell, aging and a locked password.
  pub fn new(name: &str, uid: u32, gid: u32, primary_group: &str) -> Self {
    Self {
      name: name.to_string(),
      uid,
      gid,
      primary_group: primary_group.to_string(),
      gecos: Gecos::default(),
      home: format!("{}/{}", HOME_PREFIX, name),
      shell: DEFAULT_SHELL.to_string(),
      groups: Vec::new(),
      aging: Aging::default(),
      password: LOCKED_PASSWORD.to_string(),
      plain_password: None,
    }
  }

  /// True iff the uid lies outside the regular range.
  pub fn is_system_user(&self) -> bool {
    !REGULAR_UIDS.contains(&self.uid)
  }

  /// True iff the password hash carries a lock prefix.
  pub fn is_locked(&self) -> bool {
    password::is_locked(&self.password)
  }

  /// Secondary groups plus the primary group, without order.
  pub fn effective_groups(&self) -> BTreeSet<&str> {
    let mut groups: BTreeSet<&str> = self.groups.iter().map(String::as_str).collect();
    if !self.primary_group.is_empty() {
      groups.insert(&self.primary_group);
    }
    groups
  }

  /// True iff `group` is one of this user's secondary groups.
  pub fn in_secondary_group(&self, group: &str) -> bool {
    self.groups.iter().any(|g| g == group)
  }

  /// Replace the hash with a fresh hash of the pending plaintext, if any.
  ///
  /// The plaintext is consumed so it can never be persisted.
  pub fn take_plain_password(&mut self) -> Result<(), password::PasswordError> {
    if let Some(plain) = self.plain_password.take() {
      self.password = password::hash_password(&plain)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gecos_pads_missing_fields() {
    let gecos = Gecos::parse("Maria Papadopoulou,Room 4");
    assert_eq!(gecos.real_name, "Maria Papadopoulou");
    assert_eq!(gecos.office, "Room 4");
    assert_eq!(gecos.work_phone, "");
    assert_eq!(gecos.home_phone, "");
    assert_eq!(gecos.other, "");
  }

  #[test]
  fn gecos_keeps_overflow_in_other() {
    let gecos = Gecos::parse("a,b,c,d,e,f");
    assert_eq!(gecos.other, "e,f");
    assert_eq!(gecos.to_string(), "a,b,c,d,e,f");
  }

  #[test]
  fn system_user_boundaries() {
    assert!(User::new("root", 0, 0, "root").is_system_user());
    assert!(User::new("svc", 999, 999, "svc").is_system_user());
    assert!(!User::new("maria", 1000, 1000, "maria").is_system_user());
    assert!(!User::new("last", 29999, 1000, "last").is_system_user());
    assert!(User::new("nobody", 65534, 65534, "nogroup").is_system_user());
  }

  #[test]
  fn effective_groups_include_primary() {
    let mut user = User::new("maria", 1000, 1000, "maria");
    user.groups = vec!["audio".to_string(), "video".to_string()];
    let groups: Vec<_> = user.effective_groups().into_iter().collect();
    assert_eq!(groups, vec!["audio", "maria", "video"]);
  }

  #[test]
  fn plain_password_is_consumed() {
    let mut user = User::new("maria", 1000, 1000, "maria");
    user.plain_password = Some("secret".to_string());
    user.take_plain_password().unwrap();
    assert!(user.plain_password.is_none());
    assert!(user.password.starts_with("$6$"));
  }

  #[test]
  fn plain_password_is_not_serialized() {
    let mut user = User::new("maria", 1000, 1000, "maria");
    user.plain_password = Some("secret".to_string());
    let json = serde_json::to_string(&user).unwrap();
    assert!(!json.contains("secret"));
  }
}
