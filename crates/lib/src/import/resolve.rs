//! Automatic conflict resolution.
//!
//! Only identifier problems are fixed automatically:
//!
//! - uid `dup`/`con`: next free regular uid, never one already in the batch
//!   or handed out earlier in the same pass;
//! - uid/gid `hijack`: the ids that own the existing home directory, except
//!   that a gid is kept when it is the known gid of the primary group;
//! - gid `mismatch X`: gid X, mirrored onto the batch's own group;
//! - primary group `mismatch X`: group X, moving batch membership along.
//!
//! Names, homes and format problems need a manual edit. Fixing one field can
//! raise or clear diagnoses on another, so the batch is diagnosed again
//! after every pass.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::alloc::{IdKind, IdQuery, find_free};
use crate::consts::REGULAR_UIDS;
use crate::model::{Group, User, UserField};

use super::batch::ImportBatch;
use super::detect::Detector;
use super::types::{Diagnosis, ImportReport};

/// One automatic edit of a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  Uid { user: String, from: u32, to: u32 },
  Gid { user: String, from: u32, to: u32 },
  PrimaryGroup { user: String, from: String, to: String },
}

impl fmt::Display for Change {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Change::Uid { user, from, to } => write!(f, "changed uid of '{}' from {} to {}", user, from, to),
      Change::Gid { user, from, to } => write!(f, "changed gid of '{}' from {} to {}", user, from, to),
      Change::PrimaryGroup { user, from, to } => {
        write!(f, "changed primary group of '{}' from {} to {}", user, from, to)
      }
    }
  }
}

/// Outcome of a resolver pass.
#[derive(Debug, Clone)]
pub struct Resolution {
  pub changes: Vec<Change>,
  /// Diagnosis of the batch after the changes.
  pub report: ImportReport,
}

impl Resolution {
  /// True when no automatic fix applied.
  pub fn is_noop(&self) -> bool {
    self.changes.is_empty()
  }
}

/// Fix every auto-resolvable diagnosis in `batch`, then diagnose it again.
pub fn resolve(batch: &mut ImportBatch, detector: &Detector<'_>) -> Resolution {
  let report = detector.diagnose(batch);
  let accounts = detector.reference().accounts;

  let mut reserved: Vec<u32> = batch.candidates().iter().map(|u| u.uid).collect();
  let mut changes = Vec::new();
  let (candidates, groups) = batch.parts_mut();

  for (user, candidate) in candidates.iter_mut().zip(&report.candidates) {
    // Field order puts uid before gid before the primary group, which
    // adopt_group relies on.
    let fixable = candidate
      .diagnoses
      .iter()
      .filter(|(field, diagnosis)| diagnosis.is_auto_resolvable(**field));

    for (field, diagnosis) in fixable {
      match (*field, diagnosis) {
        (UserField::Uid, Diagnosis::Hijack { owner: Some(uid) }) => {
          reserved.push(*uid);
          changes.push(set_uid(user, *uid));
        }
        (UserField::Uid, _) => {
          let query = IdQuery::new(IdKind::Uid, REGULAR_UIDS).reserved(&reserved);
          match find_free(accounts, &query) {
            Some(uid) => {
              reserved.push(uid);
              changes.push(set_uid(user, uid));
            }
            None => warn!(user = %user.name, "no free uid left"),
          }
        }
        (UserField::Gid, Diagnosis::MismatchGid(gid)) => {
          if let Some(group) = groups.get_mut(&user.primary_group) {
            group.gid = Some(*gid);
          }
          changes.push(set_gid(user, *gid));
        }
        (UserField::Gid, Diagnosis::Hijack { owner: Some(gid) }) => {
          let expected = accounts
            .group(&user.primary_group)
            .and_then(|g| g.gid)
            .or_else(|| groups.get(&user.primary_group).and_then(|g| g.gid));
          match expected {
            Some(expected) if expected != *gid => {
              debug!(
                user = %user.name,
                home_gid = *gid,
                group_gid = expected,
                "home group disagrees with primary group"
              );
            }
            _ => changes.push(set_gid(user, *gid)),
          }
        }
        (UserField::PrimaryGroup, Diagnosis::MismatchGroup(name)) => {
          changes.push(adopt_group(user, name, groups));
        }
        _ => {}
      }
    }
  }

  if changes.is_empty() {
    info!("no automatic fix applies");
  }
  Resolution {
    changes,
    report: detector.diagnose(batch),
  }
}

fn set_uid(user: &mut User, uid: u32) -> Change {
  let change = Change::Uid {
    user: user.name.clone(),
    from: user.uid,
    to: uid,
  };
  info!(user = %user.name, from = user.uid, to = uid, "reassigned uid");
  user.uid = uid;
  change
}

fn set_gid(user: &mut User, gid: u32) -> Change {
  let change = Change::Gid {
    user: user.name.clone(),
    from: user.gid,
    to: gid,
  };
  info!(user = %user.name, from = user.gid, to = gid, "reassigned gid");
  user.gid = gid;
  change
}

/// Make `name` the primary group of `user` within the batch tables.
fn adopt_group(user: &mut User, name: &str, groups: &mut BTreeMap<String, Group>) -> Change {
  groups
    .entry(name.to_string())
    .or_insert_with(|| Group::new(name, user.gid))
    .members
    .insert(user.name.clone());

  let previous = std::mem::replace(&mut user.primary_group, name.to_string());
  if let Some(group) = groups.get_mut(&previous) {
    if group.members.len() == 1 && group.members.contains(&user.name) {
      groups.remove(&previous);
    } else {
      group.members.remove(&user.name);
    }
  }

  info!(user = %user.name, from = %previous, to = %name, "adopted primary group");
  Change::PrimaryGroup {
    user: user.name.clone(),
    from: previous,
    to: name.to_string(),
  }
}
