//! Conflict detection for candidate batches.
//!
//! Candidates are checked in batch order. Each field keeps the first
//! diagnosis it receives, and checks run in a fixed order:
//!
//! 1. own format (`char`),
//! 2. collisions with earlier candidates (`dup`),
//! 3. collisions with the reference system (`con`) and gid/group
//!    disagreements (`mismatch X`),
//! 4. for homes unknown to the reference system, ownership of an existing
//!    directory on disk (`hijack`).
//!
//! Reference lookups are built once per [`Detector`], in-batch lookups grow
//! while the batch is walked, so a pass is linear in the batch size.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::model::{AccountSet, User, UserField};
use crate::system::{CommandRunner, ReferenceSystem, validate};

use super::batch::ImportBatch;
use super::types::{CandidateReport, Diagnosis, ImportReport};

/// Owner of a directory on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
  pub uid: u32,
  pub gid: u32,
}

/// Looks up who owns an existing home directory.
pub trait HomeInspector {
  /// The owner of `path` if it exists and is a directory.
  fn owner(&self, path: &Path) -> Option<Ownership>;
}

/// Inspects the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInspector;

impl HomeInspector for FsInspector {
  #[cfg(unix)]
  fn owner(&self, path: &Path) -> Option<Ownership> {
    let stat = rustix::fs::stat(path).ok()?;
    if !rustix::fs::FileType::from_raw_mode(stat.st_mode as _).is_dir() {
      return None;
    }
    Some(Ownership {
      uid: stat.st_uid as _,
      gid: stat.st_gid as _,
    })
  }

  #[cfg(not(unix))]
  fn owner(&self, _path: &Path) -> Option<Ownership> {
    None
  }
}

/// The parts of the reference system the detector reads.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
  pub accounts: &'a AccountSet,
  pub shells: &'a BTreeSet<String>,
}

impl<'a> Reference<'a> {
  pub fn of<R: CommandRunner>(system: &'a ReferenceSystem<R>) -> Self {
    Self {
      accounts: system.accounts(),
      shells: system.shells(),
    }
  }
}

/// Diagnoses candidate batches against one reference snapshot.
pub struct Detector<'a> {
  reference: Reference<'a>,
  homes: &'a dyn HomeInspector,
  uids: HashSet<u32>,
  dirs: HashSet<&'a str>,
  gid_owners: HashMap<u32, &'a str>,
}

#[derive(Default)]
struct Seen<'b> {
  names: HashSet<&'b str>,
  uids: HashSet<u32>,
  dirs: HashSet<&'b str>,
}

impl<'a> Detector<'a> {
  pub fn new(reference: Reference<'a>, homes: &'a dyn HomeInspector) -> Self {
    let accounts = reference.accounts;
    let mut gid_owners = HashMap::new();
    for group in accounts.groups() {
      if let Some(gid) = group.gid {
        gid_owners.entry(gid).or_insert(group.name.as_str());
      }
    }

    Self {
      reference,
      homes,
      uids: accounts.uids().collect(),
      dirs: accounts.users().map(|u| u.home.as_str()).collect(),
      gid_owners,
    }
  }

  pub fn reference(&self) -> Reference<'a> {
    self.reference
  }

  /// Diagnose every candidate of `batch`. Pure: running it twice on the same
  /// batch gives the same report.
  pub fn diagnose(&self, batch: &ImportBatch) -> ImportReport {
    let mut seen = Seen::default();
    let mut candidates = Vec::with_capacity(batch.len());
    let mut identical = Vec::new();

    for (index, user) in batch.candidates().iter().enumerate() {
      let mut report = CandidateReport::new(&user.name);

      self.check_format(user, &mut report);
      check_duplicates(user, &seen, &mut report);
      self.check_reference(user, &mut report);
      self.check_home(user, &mut report);

      seen.names.insert(&user.name);
      seen.uids.insert(user.uid);
      seen.dirs.insert(&user.home);

      if self.is_identical(user) {
        identical.push(index);
      }
      candidates.push(report);
    }

    let report = ImportReport { candidates, identical };
    debug!(
      candidates = batch.len(),
      errors = report.error_count(),
      identical = report.identical.len(),
      "batch diagnosed"
    );
    report
  }

  fn check_format(&self, user: &User, report: &mut CandidateReport) {
    if !validate::name_is_valid(&user.name) {
      report.mark(UserField::Name, Diagnosis::Char);
    }
    if !validate::uid_is_valid(user.uid) {
      report.mark(UserField::Uid, Diagnosis::Char);
    }
    if !validate::gid_is_valid(user.gid) {
      report.mark(UserField::Gid, Diagnosis::Char);
    }
    if !validate::name_is_valid(&user.primary_group) {
      report.mark(UserField::PrimaryGroup, Diagnosis::Char);
    }
    for (field, value) in UserField::GECOS.into_iter().zip(user.gecos.fields()) {
      if !validate::gecos_field_is_valid(value) {
        report.mark(field, Diagnosis::Char);
      }
    }
    if !self.reference.shells.contains(&user.shell) {
      report.mark(UserField::Shell, Diagnosis::Char);
    }
    if user.groups.iter().any(|g| !validate::name_is_valid(g)) {
      report.mark(UserField::Groups, Diagnosis::Char);
    }
    for (field, days) in UserField::AGING.into_iter().zip(user.aging.fields()) {
      if !validate::aging_is_valid(days) {
        report.mark(field, Diagnosis::Char);
      }
    }
  }

  fn check_reference(&self, user: &User, report: &mut CandidateReport) {
    let accounts = self.reference.accounts;
    if accounts.contains_user(&user.name) {
      report.mark(UserField::Name, Diagnosis::Con);
    }
    if self.uids.contains(&user.uid) {
      report.mark(UserField::Uid, Diagnosis::Con);
    }

    match accounts.group(&user.primary_group).and_then(|g| g.gid) {
      Some(expected) => {
        if expected != user.gid {
          report.mark(UserField::Gid, Diagnosis::MismatchGid(expected));
        }
      }
      None => {
        if let Some(owner) = self.gid_owners.get(&user.gid)
          && *owner != user.primary_group
        {
          report.mark(UserField::PrimaryGroup, Diagnosis::MismatchGroup(owner.to_string()));
        }
      }
    }

    if self.dirs.contains(user.home.as_str()) {
      report.mark(UserField::Home, Diagnosis::Con);
    }
  }

  /// Existing homes unknown to the reference system may be adopted, but only
  /// with the ids that own them.
  fn check_home(&self, user: &User, report: &mut CandidateReport) {
    if self.dirs.contains(user.home.as_str()) {
      return;
    }
    let Some(owner) = self.homes.owner(Path::new(&user.home)) else {
      return;
    };

    if owner.uid != user.uid {
      report.mark(UserField::Uid, Diagnosis::Hijack { owner: Some(owner.uid) });
      report.mark(UserField::Home, Diagnosis::Hijack { owner: None });
    }
    if owner.gid != user.gid {
      report.mark(UserField::Gid, Diagnosis::Hijack { owner: Some(owner.gid) });
      report.mark(UserField::Home, Diagnosis::Hijack { owner: None });
    }
  }

  /// Same attributes (last-change date aside) and the same effective groups as
  /// the existing account of that name.
  fn is_identical(&self, user: &User) -> bool {
    let Some(existing) = self.reference.accounts.user(&user.name) else {
      return false;
    };
    let aging = |u: &User| [u.aging.min, u.aging.max, u.aging.warn, u.aging.inactive, u.aging.expire];

    user.uid == existing.uid
      && user.gid == existing.gid
      && user.primary_group == existing.primary_group
      && user.gecos == existing.gecos
      && user.home == existing.home
      && user.shell == existing.shell
      && aging(user) == aging(existing)
      && user.password == existing.password
      && user.effective_groups() == existing.effective_groups()
  }
}

fn check_duplicates(user: &User, seen: &Seen<'_>, report: &mut CandidateReport) {
  if seen.names.contains(user.name.as_str()) {
    report.mark(UserField::Name, Diagnosis::Dup);
  }
  if seen.uids.contains(&user.uid) {
    report.mark(UserField::Uid, Diagnosis::Dup);
  }
  if seen.dirs.contains(user.home.as_str()) {
    report.mark(UserField::Home, Diagnosis::Dup);
  }
}
