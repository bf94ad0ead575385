//! Materializing a clean batch into the reference system.
//!
//! The account tools need a user's primary group to exist before the user,
//! and both sides of a membership to exist before it is recorded, so a
//! commit always runs in three phases:
//!
//! 1. create every group the batch references that the system lacks,
//! 2. create every candidate,
//! 3. add the candidates to the groups created in phase 1.
//!
//! [`plan`] computes those phases without side effects; [`commit`] executes
//! them and reloads the reference system at the end.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::alloc::{IdKind, IdQuery, find_free};
use crate::consts::REGULAR_GIDS;
use crate::model::{AccountSet, User};
use crate::system::{CommandRunner, ReferenceSystem};

use super::batch::ImportBatch;
use super::detect::{Detector, HomeInspector, Reference};
use super::types::CommitError;

/// A group to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGroup {
  pub name: String,
  pub gid: u32,
  /// Candidates that will belong to the group, for inspecting a plan.
  /// The group is created empty; primary members join through `useradd -g`
  /// and secondary ones through [`CommitPlan::memberships`].
  pub members: BTreeSet<String>,
}

/// Secondary groups to add a user to once every account exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
  pub user: String,
  pub groups: Vec<String>,
}

/// The ordered work of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
  pub groups: Vec<PlannedGroup>,
  /// Users to create. Their secondary lists omit groups of `groups`, which
  /// are added in the membership phase.
  pub users: Vec<User>,
  pub memberships: Vec<Membership>,
}

impl CommitPlan {
  pub fn is_empty(&self) -> bool {
    self.groups.is_empty() && self.users.is_empty()
  }
}

/// Work out the groups, users and memberships a commit of `batch` needs.
pub fn plan(batch: &ImportBatch, reference: &AccountSet) -> Result<CommitPlan, CommitError> {
  let mut new_groups: BTreeMap<String, PlannedGroup> = BTreeMap::new();

  // Primary groups take the gid their members carry.
  for user in batch.candidates() {
    if reference.contains_group(&user.primary_group) {
      continue;
    }
    new_groups
      .entry(user.primary_group.clone())
      .or_insert_with(|| PlannedGroup {
        name: user.primary_group.clone(),
        gid: user.gid,
        members: BTreeSet::new(),
      })
      .members
      .insert(user.name.clone());
  }

  // Secondary groups keep the batch's gid unless it is missing or taken.
  let mut taken: Vec<u32> = batch.candidates().iter().map(|u| u.gid).collect();
  let reference_gids: BTreeSet<u32> = reference.gids().collect();
  for user in batch.candidates() {
    for name in &user.groups {
      if reference.contains_group(name) {
        continue;
      }
      if !new_groups.contains_key(name) {
        let gid = match batch.group(name).and_then(|g| g.gid) {
          Some(gid) if !taken.contains(&gid) && !reference_gids.contains(&gid) => gid,
          _ => find_free(reference, &IdQuery::new(IdKind::Gid, REGULAR_GIDS).reserved(&taken)).ok_or_else(|| {
            CommitError::GidsExhausted {
              group: name.to_string(),
            }
          })?,
        };
        taken.push(gid);
        new_groups.insert(
          name.clone(),
          PlannedGroup {
            name: name.clone(),
            gid,
            members: BTreeSet::new(),
          },
        );
      }
      if let Some(group) = new_groups.get_mut(name) {
        group.members.insert(user.name.clone());
      }
    }
  }

  let mut users = Vec::with_capacity(batch.len());
  let mut memberships = Vec::new();
  for user in batch.candidates() {
    let mut user = user.clone();
    let deferred: Vec<String> = user
      .groups
      .iter()
      .filter(|g| new_groups.contains_key(g.as_str()))
      .cloned()
      .collect();
    user.groups.retain(|g| !new_groups.contains_key(g.as_str()));
    if !deferred.is_empty() {
      memberships.push(Membership {
        user: user.name.clone(),
        groups: deferred,
      });
    }
    users.push(user);
  }

  Ok(CommitPlan {
    groups: new_groups.into_values().collect(),
    users,
    memberships,
  })
}

/// Create the contents of `batch` in `system`.
///
/// Refused while the batch has any diagnosis. Stops at the first failing
/// step; the reference system is reloaded either way so it reflects what
/// was actually created.
pub async fn commit<R: CommandRunner>(
  batch: &ImportBatch,
  system: &mut ReferenceSystem<R>,
  homes: &dyn HomeInspector,
) -> Result<CommitPlan, CommitError> {
  let report = Detector::new(Reference::of(system), homes).diagnose(batch);
  if !report.is_clean() {
    return Err(CommitError::Blocked {
      errors: report.error_count(),
    });
  }

  let plan = plan(batch, system.accounts())?;
  info!(
    groups = plan.groups.len(),
    users = plan.users.len(),
    memberships = plan.memberships.len(),
    "committing batch"
  );

  let outcome = execute(&plan, system).await;
  let reload = system.reload().map_err(|source| CommitError::System {
    step: "reload".to_string(),
    source,
  });
  outcome?;
  reload?;

  info!("batch committed");
  Ok(plan)
}

async fn execute<R: CommandRunner>(plan: &CommitPlan, system: &mut ReferenceSystem<R>) -> Result<(), CommitError> {
  for group in &plan.groups {
    system
      .create_group(&group.name, Some(group.gid))
      .await
      .map_err(|source| CommitError::System {
        step: format!("create group {}", group.name),
        source,
      })?;
  }

  for user in &plan.users {
    system
      .create_user(user, true)
      .await
      .map_err(|source| CommitError::System {
        step: format!("create user {}", user.name),
        source,
      })?;
  }

  for membership in &plan.memberships {
    system
      .add_user_to_groups(&membership.user, &membership.groups)
      .await
      .map_err(|source| CommitError::System {
        step: format!("add {} to groups", membership.user),
        source,
      })?;
  }

  Ok(())
}
