//! Completion of partially specified import records.
//!
//! Import sources rarely carry every attribute. A [`CandidateRecord`] holds
//! whatever the source provided and [`complete`] fills the gaps:
//!
//! | field         | default                                                     |
//! |---------------|-------------------------------------------------------------|
//! | home          | `<home_prefix>/<name>`                                      |
//! | uid           | first free regular uid not used in the batch                |
//! | primary group | group owning the given gid, else the user's name            |
//! | gid           | gid of the primary group if known, else first free regular  |
//! | shell         | configured default shell                                    |
//! | aging         | last change today, min 0, max 99999, warn 7, others -1      |
//! | password      | `!` (locked), or the hash of the plaintext if one was given |

use serde::{Deserialize, Serialize};

use crate::alloc::{IdKind, IdQuery, find_free};
use crate::consts::{
  DEFAULT_EXPIRE_DAYS, DEFAULT_INACTIVE_DAYS, DEFAULT_MAX_DAYS, DEFAULT_MIN_DAYS, DEFAULT_WARN_DAYS, LOCKED_PASSWORD,
  REGULAR_GIDS, REGULAR_UIDS,
};
use crate::model::{AccountSet, Aging, Gecos, User, days_since_epoch};

use super::batch::ImportBatch;
use super::types::BatchError;

/// A user as delivered by an import source, with every attribute but the
/// name optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
  pub name: String,
  pub uid: Option<u32>,
  pub gid: Option<u32>,
  pub primary_group: Option<String>,
  pub gecos: Gecos,
  pub home: Option<String>,
  pub shell: Option<String>,
  pub groups: Vec<String>,
  pub last_change: Option<i64>,
  pub min: Option<i64>,
  pub max: Option<i64>,
  pub warn: Option<i64>,
  pub inactive: Option<i64>,
  pub expire: Option<i64>,
  pub password: Option<String>,
  pub plain_password: Option<String>,
}

impl CandidateRecord {
  pub fn named(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Self::default()
    }
  }
}

fn given(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

/// Fill the missing attributes of `record` against the reference accounts
/// and the candidates already in `batch`.
pub fn complete(
  record: CandidateRecord,
  reference: &AccountSet,
  batch: &ImportBatch,
  default_shell: &str,
) -> Result<User, BatchError> {
  let name = record.name;

  let home = given(record.home).unwrap_or_else(|| format!("{}/{}", batch.home_prefix(), name));

  let uid = match record.uid {
    Some(uid) => uid,
    None => {
      let taken: Vec<u32> = batch.candidates().iter().map(|u| u.uid).collect();
      find_free(reference, &IdQuery::new(IdKind::Uid, REGULAR_UIDS).reserved(&taken))
        .ok_or(BatchError::IdsExhausted("uid"))?
    }
  };

  let (gid, primary_group) = match record.gid {
    Some(gid) => {
      let primary_group = given(record.primary_group)
        .or_else(|| reference.group_by_gid(gid).map(|g| g.name.clone()))
        .or_else(|| batch.groups().values().find(|g| g.gid == Some(gid)).map(|g| g.name.clone()))
        .unwrap_or_else(|| name.clone());
      (gid, primary_group)
    }
    None => {
      let primary_group = given(record.primary_group).unwrap_or_else(|| name.clone());
      let known = reference
        .group(&primary_group)
        .and_then(|g| g.gid)
        .or_else(|| batch.group(&primary_group).and_then(|g| g.gid))
        .or_else(|| {
          batch
            .candidates()
            .iter()
            .find(|u| u.primary_group == primary_group)
            .map(|u| u.gid)
        });
      let gid = match known {
        Some(gid) => gid,
        None => {
          let taken: Vec<u32> = batch
            .candidates()
            .iter()
            .map(|u| u.gid)
            .chain(batch.groups().values().filter_map(|g| g.gid))
            .collect();
          find_free(reference, &IdQuery::new(IdKind::Gid, REGULAR_GIDS).reserved(&taken))
            .ok_or(BatchError::IdsExhausted("gid"))?
        }
      };
      (gid, primary_group)
    }
  };

  let mut user = User {
    name,
    uid,
    gid,
    primary_group,
    gecos: record.gecos,
    home,
    shell: given(record.shell).unwrap_or_else(|| default_shell.to_string()),
    groups: record.groups,
    aging: Aging {
      last_change: record.last_change.unwrap_or_else(days_since_epoch),
      min: record.min.unwrap_or(DEFAULT_MIN_DAYS),
      max: record.max.unwrap_or(DEFAULT_MAX_DAYS),
      warn: record.warn.unwrap_or(DEFAULT_WARN_DAYS),
      inactive: record.inactive.unwrap_or(DEFAULT_INACTIVE_DAYS),
      expire: record.expire.unwrap_or(DEFAULT_EXPIRE_DAYS),
    },
    password: given(record.password).unwrap_or_else(|| LOCKED_PASSWORD.to_string()),
    plain_password: given(record.plain_password),
  };
  user.take_plain_password()?;

  Ok(user)
}
