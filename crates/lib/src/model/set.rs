//! Name-keyed arena of users and groups.
//!
//! Users and groups refer to each other by name only, so every cascade
//! (dropping a user from its groups, stripping a removed group from its
//! members) is a plain walk over the two maps.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use super::{Group, User};

/// Structural errors raised by [`AccountSet`] mutators.
///
/// A failed mutation leaves the set untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetError {
  #[error("user '{0}' exists")]
  DuplicateUser(String),

  #[error("group '{0}' exists")]
  DuplicateGroup(String),

  #[error("no such user: {0}")]
  UnknownUser(String),

  #[error("no such group: {0}")]
  UnknownGroup(String),
}

/// A set of users and groups.
///
/// Invariants:
/// - a name in `group.members` has that group in the user's secondary list,
///   unless the group is the user's primary group;
/// - user and group names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSet {
  users: BTreeMap<String, User>,
  groups: BTreeMap<String, Group>,
}

impl AccountSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn users(&self) -> impl Iterator<Item = &User> {
    self.users.values()
  }

  pub fn groups(&self) -> impl Iterator<Item = &Group> {
    self.groups.values()
  }

  pub fn user(&self, name: &str) -> Option<&User> {
    self.users.get(name)
  }

  pub fn group(&self, name: &str) -> Option<&Group> {
    self.groups.get(name)
  }

  pub fn contains_user(&self, name: &str) -> bool {
    self.users.contains_key(name)
  }

  pub fn contains_group(&self, name: &str) -> bool {
    self.groups.contains_key(name)
  }

  pub fn user_count(&self) -> usize {
    self.users.len()
  }

  pub fn group_count(&self) -> usize {
    self.groups.len()
  }

  pub fn uids(&self) -> impl Iterator<Item = u32> + '_ {
    self.users.values().map(|u| u.uid)
  }

  pub fn gids(&self) -> impl Iterator<Item = u32> + '_ {
    self.groups.values().filter_map(|g| g.gid)
  }

  /// Find the group owning `gid`.
  pub fn group_by_gid(&self, gid: u32) -> Option<&Group> {
    self.groups.values().find(|g| g.gid == Some(gid))
  }

  /// Add a user, registering it as a member of its existing primary and
  /// secondary groups.
  pub fn add_user(&mut self, user: User) -> Result<(), SetError> {
    if self.users.contains_key(&user.name) {
      return Err(SetError::DuplicateUser(user.name));
    }

    for group_name in std::iter::once(&user.primary_group).chain(user.groups.iter()) {
      if let Some(group) = self.groups.get_mut(group_name) {
        group.members.insert(user.name.clone());
      }
    }

    debug!(user = %user.name, uid = user.uid, "user added to set");
    self.users.insert(user.name.clone(), user);
    Ok(())
  }

  /// Remove a user and drop it from every group's member list.
  ///
  /// A private group of the user is deleted along with it.
  pub fn remove_user(&mut self, name: &str) -> Result<User, SetError> {
    let user = self
      .users
      .remove(name)
      .ok_or_else(|| SetError::UnknownUser(name.to_string()))?;

    let mut emptied = Vec::new();
    for group in self.groups.values_mut() {
      if !group.members.contains(name) {
        continue;
      }
      if group.is_private() && group.name == name {
        emptied.push(group.name.clone());
      } else {
        group.members.remove(name);
      }
    }
    for group in emptied {
      debug!(group = %group, "removing private group with its owner");
      self.groups.remove(&group);
    }

    Ok(user)
  }

  /// Add a group, appending it to the secondary list of each member that is
  /// present in the set and does not already have it as primary group.
  pub fn add_group(&mut self, group: Group) -> Result<(), SetError> {
    if self.groups.contains_key(&group.name) {
      return Err(SetError::DuplicateGroup(group.name));
    }

    for member in &group.members {
      if let Some(user) = self.users.get_mut(member)
        && user.primary_group != group.name
        && !user.in_secondary_group(&group.name)
      {
        user.groups.push(group.name.clone());
      }
    }

    self.groups.insert(group.name.clone(), group);
    Ok(())
  }

  /// Remove a group and strip it from every user's secondary list.
  ///
  /// Users whose primary group it was are kept as they are.
  pub fn remove_group(&mut self, name: &str) -> Result<Group, SetError> {
    let group = self
      .groups
      .remove(name)
      .ok_or_else(|| SetError::UnknownGroup(name.to_string()))?;

    for user in self.users.values_mut() {
      user.groups.retain(|g| g != name);
    }

    Ok(group)
  }

  /// Replace the user named `old_name` with `user`, carrying memberships over
  /// to the new record. Unlike [`remove_user`](Self::remove_user) this never
  /// deletes groups.
  pub fn replace_user(&mut self, old_name: &str, user: User) -> Result<(), SetError> {
    if !self.users.contains_key(old_name) {
      return Err(SetError::UnknownUser(old_name.to_string()));
    }
    if old_name != user.name && self.users.contains_key(&user.name) {
      return Err(SetError::DuplicateUser(user.name));
    }

    self.users.remove(old_name);
    for group in self.groups.values_mut() {
      group.members.remove(old_name);
    }
    self.add_user(user)
  }

  /// Rename and/or renumber a group, rewriting member references.
  pub fn replace_group(&mut self, old_name: &str, name: &str, gid: u32) -> Result<(), SetError> {
    if old_name != name && self.groups.contains_key(name) {
      return Err(SetError::DuplicateGroup(name.to_string()));
    }
    let mut group = self
      .groups
      .remove(old_name)
      .ok_or_else(|| SetError::UnknownGroup(old_name.to_string()))?;

    group.name = name.to_string();
    group.gid = Some(gid);
    for user in self.users.values_mut() {
      for g in user.groups.iter_mut().filter(|g| *g == old_name) {
        *g = name.to_string();
      }
      if user.primary_group == old_name {
        user.primary_group = name.to_string();
        user.gid = gid;
      }
    }
    self.groups.insert(group.name.clone(), group);
    Ok(())
  }

  /// Make `user` a secondary member of `group`, keeping both sides in step.
  pub fn add_membership(&mut self, user: &str, group: &str) -> Result<(), SetError> {
    let Some(g) = self.groups.get_mut(group) else {
      return Err(SetError::UnknownGroup(group.to_string()));
    };
    let Some(u) = self.users.get_mut(user) else {
      return Err(SetError::UnknownUser(user.to_string()));
    };
    g.members.insert(user.to_string());
    if u.primary_group != group && !u.in_secondary_group(group) {
      u.groups.push(group.to_string());
    }
    Ok(())
  }

  /// Drop `user` from the secondary group `group`.
  pub fn remove_membership(&mut self, user: &str, group: &str) -> Result<(), SetError> {
    let Some(u) = self.users.get_mut(user) else {
      return Err(SetError::UnknownUser(user.to_string()));
    };
    u.groups.retain(|g| g != group);
    let is_primary = u.primary_group == group;
    if let Some(g) = self.groups.get_mut(group)
      && !is_primary
    {
      g.members.remove(user);
    }
    Ok(())
  }

  /// Mutable access for field updates that do not touch names or memberships.
  pub(crate) fn user_mut(&mut self, name: &str) -> Option<&mut User> {
    self.users.get_mut(name)
  }

  pub(crate) fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
    self.groups.get_mut(name)
  }
}
