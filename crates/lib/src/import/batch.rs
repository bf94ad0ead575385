//! Candidate batches.
//!
//! An [`ImportBatch`] holds the users proposed for import in source order,
//! duplicates included, together with the groups the source described. The
//! detector reports against candidate positions, so rows are addressed by
//! index rather than by name.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{AccountSet, FieldError, Group, User, UserField};

use super::complete::{CandidateRecord, complete};
use super::detect::Detector;
use super::types::{BatchError, ImportReport};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
  candidates: Vec<User>,
  groups: BTreeMap<String, Group>,
  home_prefix: String,
}

impl ImportBatch {
  pub fn new(home_prefix: &str) -> Self {
    Self {
      candidates: Vec::new(),
      groups: BTreeMap::new(),
      home_prefix: home_prefix.trim_end_matches('/').to_string(),
    }
  }

  /// Build a batch from a set produced by an import source.
  ///
  /// System users are dropped first, with the usual membership cascade.
  pub fn from_set(set: &AccountSet, home_prefix: &str) -> Self {
    let mut set = set.clone();
    let system: Vec<String> = set
      .users()
      .filter(|u| u.is_system_user())
      .map(|u| u.name.clone())
      .collect();
    for name in &system {
      if let Err(e) = set.remove_user(name) {
        warn!(user = %name, error = %e, "could not drop system user");
      }
    }
    if !system.is_empty() {
      debug!(dropped = system.len(), "system users left out of import");
    }

    let mut batch = Self::new(home_prefix);
    batch.groups = set.groups().map(|g| (g.name.clone(), g.clone())).collect();
    batch.candidates = set.users().cloned().collect();
    batch
  }

  pub fn home_prefix(&self) -> &str {
    &self.home_prefix
  }

  pub fn candidates(&self) -> &[User] {
    &self.candidates
  }

  pub fn candidate(&self, index: usize) -> Option<&User> {
    self.candidates.get(index)
  }

  pub fn groups(&self) -> &BTreeMap<String, Group> {
    &self.groups
  }

  pub fn group(&self, name: &str) -> Option<&Group> {
    self.groups.get(name)
  }

  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  /// Append a candidate and list it as a member of the batch groups it names.
  pub fn push(&mut self, user: User) {
    for name in std::iter::once(&user.primary_group).chain(user.groups.iter()) {
      if let Some(group) = self.groups.get_mut(name) {
        group.members.insert(user.name.clone());
      }
    }
    self.candidates.push(user);
  }

  /// Add or replace a batch group.
  pub fn add_group(&mut self, group: Group) {
    self.groups.insert(group.name.clone(), group);
  }

  /// Complete `record` (see [`complete`]) and append it.
  pub fn push_record(
    &mut self,
    record: CandidateRecord,
    reference: &AccountSet,
    default_shell: &str,
  ) -> Result<&User, BatchError> {
    let user = complete(record, reference, self, default_shell)?;
    self.push(user);
    let index = self.candidates.len() - 1;
    Ok(&self.candidates[index])
  }

  /// Set one field of the candidate at `index` from text.
  ///
  /// A new name must not already be used in the batch and moves the home to
  /// `<home_prefix>/<name>`. A plaintext password replaces the hash at once.
  pub fn edit(&mut self, index: usize, field: UserField, value: &str) -> Result<(), BatchError> {
    if index >= self.candidates.len() {
      return Err(BatchError::NoSuchCandidate(index));
    }

    match field {
      UserField::Name => self.rename(index, value)?,
      UserField::PlainPassword => {
        let user = &mut self.candidates[index];
        if value.is_empty() {
          user.plain_password = None;
        } else {
          user.plain_password = Some(value.to_string());
          user.take_plain_password()?;
        }
      }
      field => field.set(&mut self.candidates[index], value)?,
    }

    debug!(row = index, field = %field, "candidate edited");
    Ok(())
  }

  fn rename(&mut self, index: usize, name: &str) -> Result<(), FieldError> {
    let old = self.candidates[index].name.clone();
    if old == name {
      return Ok(());
    }
    if self.candidates.iter().any(|u| u.name == name) {
      return Err(FieldError::NameTaken(name.to_string()));
    }

    let user = &mut self.candidates[index];
    user.name = name.to_string();
    user.home = format!("{}/{}", self.home_prefix, name);

    if !self.candidates.iter().any(|u| u.name == old) {
      for group in self.groups.values_mut() {
        if group.members.remove(&old) {
          group.members.insert(name.to_string());
        }
      }
    }
    Ok(())
  }

  /// Remove the candidates at `indexes` and diagnose what remains.
  ///
  /// Out-of-range and repeated indexes are ignored.
  pub fn remove_rows(&mut self, indexes: &[usize], detector: &Detector<'_>) -> (Vec<User>, ImportReport) {
    let mut indexes: Vec<usize> = indexes.iter().copied().filter(|i| *i < self.candidates.len()).collect();
    indexes.sort_unstable();
    indexes.dedup();

    let mut removed: Vec<User> = indexes.iter().rev().map(|i| self.remove_candidate(*i)).collect();
    removed.reverse();

    (removed, detector.diagnose(self))
  }

  /// Drop every candidate identical to an existing account and diagnose what
  /// remains.
  pub fn remove_identical(&mut self, detector: &Detector<'_>) -> (Vec<User>, ImportReport) {
    let report = detector.diagnose(self);
    if report.identical.is_empty() {
      return (Vec::new(), report);
    }
    debug!(count = report.identical.len(), "dropping identical candidates");
    self.remove_rows(&report.identical, detector)
  }

  /// Take a candidate out, dropping its batch memberships unless another row
  /// carries the same name. An emptied private group goes with it.
  fn remove_candidate(&mut self, index: usize) -> User {
    let user = self.candidates.remove(index);
    if self.candidates.iter().any(|u| u.name == user.name) {
      return user;
    }

    let mut emptied = Vec::new();
    for group in self.groups.values_mut() {
      if group.name == user.name && group.is_private() {
        emptied.push(group.name.clone());
      } else {
        group.members.remove(&user.name);
      }
    }
    for name in emptied {
      self.groups.remove(&name);
    }
    user
  }

  /// Candidates and groups, mutably, for the resolver.
  pub(crate) fn parts_mut(&mut self) -> (&mut [User], &mut BTreeMap<String, Group>) {
    (&mut self.candidates, &mut self.groups)
  }
}
