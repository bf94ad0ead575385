//! Diagnoses, reports and errors of the import pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{FieldError, UserField};
use crate::system::{PasswordError, SystemError};

/// What is wrong with one field of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
  /// The value fails its own format rule.
  Char,
  /// Collides with an earlier candidate of the same batch.
  Dup,
  /// Collides with an account of the reference system.
  Con,
  /// The reference system maps the candidate's primary group to this gid.
  MismatchGid(u32),
  /// The reference system maps the candidate's gid to this group name.
  MismatchGroup(String),
  /// The home directory exists on disk with a different owner. `owner` is
  /// the directory's actual uid or gid on the id fields and `None` on the
  /// home field.
  Hijack { owner: Option<u32> },
}

impl Diagnosis {
  /// Whether the resolver can fix this diagnosis on `field` without help.
  pub fn is_auto_resolvable(&self, field: UserField) -> bool {
    match (field, self) {
      (UserField::Uid, Diagnosis::Dup | Diagnosis::Con) => true,
      (UserField::Uid | UserField::Gid, Diagnosis::Hijack { owner: Some(_) }) => true,
      (UserField::Gid, Diagnosis::MismatchGid(_)) => true,
      (UserField::PrimaryGroup, Diagnosis::MismatchGroup(_)) => true,
      _ => false,
    }
  }
}

impl fmt::Display for Diagnosis {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Diagnosis::Char => write!(f, "char"),
      Diagnosis::Dup => write!(f, "dup"),
      Diagnosis::Con => write!(f, "con"),
      Diagnosis::MismatchGid(gid) => write!(f, "mismatch {}", gid),
      Diagnosis::MismatchGroup(name) => write!(f, "mismatch {}", name),
      Diagnosis::Hijack { .. } => write!(f, "hijack"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Ok,
  Error,
}

/// Per-field diagnoses of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
  pub name: String,
  pub diagnoses: BTreeMap<UserField, Diagnosis>,
}

impl CandidateReport {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      diagnoses: BTreeMap::new(),
    }
  }

  /// Record `diagnosis` on `field` unless the field already carries one.
  pub fn mark(&mut self, field: UserField, diagnosis: Diagnosis) {
    self.diagnoses.entry(field).or_insert(diagnosis);
  }

  pub fn get(&self, field: UserField) -> Option<&Diagnosis> {
    self.diagnoses.get(&field)
  }

  pub fn status(&self) -> Status {
    if self.diagnoses.is_empty() {
      Status::Ok
    } else {
      Status::Error
    }
  }
}

/// Outcome of one detector pass, aligned with the batch's candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  pub candidates: Vec<CandidateReport>,
  /// Indexes of candidates identical to an existing account.
  pub identical: Vec<usize>,
}

impl ImportReport {
  pub fn is_clean(&self) -> bool {
    self.candidates.iter().all(|c| c.status() == Status::Ok)
  }

  /// Number of candidates carrying at least one diagnosis.
  pub fn error_count(&self) -> usize {
    self.candidates.iter().filter(|c| c.status() == Status::Error).count()
  }
}

/// Errors of batch edits.
#[derive(Debug, Error)]
pub enum BatchError {
  #[error("no candidate at row {0}")]
  NoSuchCandidate(usize),

  #[error("no free {0} left in the regular range")]
  IdsExhausted(&'static str),

  #[error(transparent)]
  Field(#[from] FieldError),

  #[error(transparent)]
  Password(#[from] PasswordError),
}

/// Errors of [`commit`](super::commit).
#[derive(Debug, Error)]
pub enum CommitError {
  #[error("batch still has {errors} candidate(s) with problems")]
  Blocked { errors: usize },

  #[error("no free gid left for group '{group}'")]
  GidsExhausted { group: String },

  #[error("{step} failed: {source}")]
  System {
    step: String,
    #[source]
    source: SystemError,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_diagnosis_wins() {
    let mut report = CandidateReport::new("maria");
    report.mark(UserField::Uid, Diagnosis::Dup);
    report.mark(UserField::Uid, Diagnosis::Con);
    assert_eq!(report.get(UserField::Uid), Some(&Diagnosis::Dup));
    assert_eq!(report.status(), Status::Error);
  }

  #[test]
  fn mismatch_renders_expected_value() {
    assert_eq!(Diagnosis::MismatchGid(2001).to_string(), "mismatch 2001");
    assert_eq!(Diagnosis::MismatchGroup("staff".into()).to_string(), "mismatch staff");
    assert_eq!(Diagnosis::Hijack { owner: Some(3000) }.to_string(), "hijack");
  }

  #[test]
  fn names_and_homes_need_manual_edits() {
    assert!(!Diagnosis::Dup.is_auto_resolvable(UserField::Name));
    assert!(!Diagnosis::Con.is_auto_resolvable(UserField::Home));
    assert!(!Diagnosis::Hijack { owner: None }.is_auto_resolvable(UserField::Home));
    assert!(Diagnosis::Con.is_auto_resolvable(UserField::Uid));
    assert!(Diagnosis::MismatchGid(5).is_auto_resolvable(UserField::Gid));
  }

  #[test]
  fn report_counts_problem_rows() {
    let mut bad = CandidateReport::new("a");
    bad.mark(UserField::Name, Diagnosis::Char);
    bad.mark(UserField::Shell, Diagnosis::Char);
    let report = ImportReport {
      candidates: vec![bad, CandidateReport::new("b")],
      identical: vec![],
    };
    assert!(!report.is_clean());
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.candidates[0].diagnoses.len(), 2);
  }
}
