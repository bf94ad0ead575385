//! Groups.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::consts::REGULAR_GIDS;

/// An OS group.
///
/// Members are held by name; the owning [`AccountSet`](super::AccountSet)
/// resolves them. A group read from an import source may lack a gid until one
/// is allocated at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub name: String,
  pub gid: Option<u32>,
  pub password: String,
  pub members: BTreeSet<String>,
}

impl Group {
  pub fn new(name: &str, gid: u32) -> Self {
    Self {
      name: name.to_string(),
      gid: Some(gid),
      password: "x".to_string(),
      members: BTreeSet::new(),
    }
  }

  pub fn with_members<I, S>(mut self, members: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.members.extend(members.into_iter().map(Into::into));
    self
  }

  /// True iff the gid lies in the regular range.
  pub fn is_user_group(&self) -> bool {
    self.gid.is_some_and(|gid| REGULAR_GIDS.contains(&gid))
  }

  /// A user private group: regular gid and the same-named user as its only member.
  pub fn is_private(&self) -> bool {
    self.is_user_group() && self.members.len() == 1 && self.members.contains(&self.name)
  }
}
