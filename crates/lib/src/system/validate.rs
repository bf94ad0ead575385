//! Format rules for account attributes.

use std::sync::LazyLock;

use regex::Regex;

use crate::consts::{AGING_RANGE, LAST_GID, LAST_UID, NAME_PATTERN};
use crate::model::Gecos;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(NAME_PATTERN).expect("name pattern compiles"));

/// Lowercase letter followed by lowercase letters, digits, `-` or `_`.
pub fn name_is_valid(name: &str) -> bool {
  NAME_RE.is_match(name)
}

/// A single GECOS field may not contain the record or field separators.
pub fn gecos_field_is_valid(value: &str) -> bool {
  !value.contains([':', ',', '\n'])
}

pub fn gecos_is_valid(gecos: &Gecos) -> bool {
  gecos.fields().iter().all(|f| gecos_field_is_valid(f))
}

pub fn uid_is_valid(uid: u32) -> bool {
  uid <= LAST_UID
}

pub fn gid_is_valid(gid: u32) -> bool {
  gid <= LAST_GID
}

pub fn aging_is_valid(days: i64) -> bool {
  AGING_RANGE.contains(&days)
}
