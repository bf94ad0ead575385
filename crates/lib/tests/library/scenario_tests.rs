//! Detection and resolution of the common conflict cases.

use usersync_lib::import::{Change, Detector, Diagnosis, ImportBatch, Reference, resolve};
use usersync_lib::model::{Group, User, UserField};

use super::common::{TestDatabases, TestHomes};

#[test]
fn duplicate_name_is_never_renamed() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut batch = ImportBatch::new("/home");
  batch.push(User::new("maria", 1600, 2001, "teachers"));
  batch.push(User::new("maria", 1600, 2001, "teachers"));

  let report = detector.diagnose(&batch);
  assert_eq!(report.candidates[0].get(UserField::Name), None);
  assert_eq!(report.candidates[1].get(UserField::Name), Some(&Diagnosis::Dup));
  assert_eq!(report.candidates[1].get(UserField::Uid), Some(&Diagnosis::Dup));

  let resolution = resolve(&mut batch, &detector);

  assert_eq!(batch.candidate(0).unwrap().uid, 1600);
  assert_eq!(batch.candidate(1).unwrap().uid, 1000);
  assert_eq!(batch.candidate(1).unwrap().name, "maria");
  assert_eq!(
    resolution.report.candidates[1].get(UserField::Name),
    Some(&Diagnosis::Dup)
  );
  assert!(!resolution.report.is_clean());
}

#[test]
fn uid_taken_by_reference_moves_to_first_free() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut batch = ImportBatch::new("/home");
  batch.push(User::new("nikos", 1500, 2001, "teachers"));

  let report = detector.diagnose(&batch);
  assert_eq!(report.candidates[0].get(UserField::Uid), Some(&Diagnosis::Con));

  let resolution = resolve(&mut batch, &detector);

  let expected = sys.free_uids()[0];
  assert_eq!(
    resolution.changes,
    vec![Change::Uid {
      user: "nikos".into(),
      from: 1500,
      to: expected,
    }]
  );
  assert!(sys.uid_is_free(batch.candidate(0).unwrap().uid));
  assert!(resolution.report.is_clean());
}

#[test]
fn gid_mismatch_follows_reference_group() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut batch = ImportBatch::new("/home");
  batch.add_group(Group::new("teachers", 2000));
  batch.push(User::new("maria", 1600, 2000, "teachers"));

  let report = detector.diagnose(&batch);
  let diagnosis = report.candidates[0].get(UserField::Gid).unwrap();
  assert_eq!(diagnosis, &Diagnosis::MismatchGid(2001));
  assert_eq!(diagnosis.to_string(), "mismatch 2001");

  let resolution = resolve(&mut batch, &detector);

  assert_eq!(batch.candidate(0).unwrap().gid, 2001);
  assert_eq!(batch.group("teachers").unwrap().gid, Some(2001));
  assert!(resolution.report.is_clean());
}

#[test]
fn foreign_home_is_adopted_with_its_owner() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new().with("/home/maria", 3000, 2001);
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut batch = ImportBatch::new("/home");
  batch.push(User::new("maria", 1000, 2001, "teachers"));

  let report = detector.diagnose(&batch);
  assert_eq!(
    report.candidates[0].get(UserField::Uid),
    Some(&Diagnosis::Hijack { owner: Some(3000) })
  );
  assert!(matches!(
    report.candidates[0].get(UserField::Home),
    Some(Diagnosis::Hijack { .. })
  ));
  assert_eq!(report.candidates[0].get(UserField::Gid), None);

  let resolution = resolve(&mut batch, &detector);

  assert_eq!(batch.candidate(0).unwrap().uid, 3000);
  assert!(resolution.report.is_clean());
}

#[test]
fn identical_account_is_removed() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  // Same effective groups, listed differently.
  let mut eleni = sys.accounts().user("eleni").unwrap().clone();
  eleni.groups = vec!["audio".into(), "teachers".into()];
  eleni.aging.last_change = 20000;

  let mut batch = ImportBatch::new("/home");
  batch.push(User::new("nikos", 1600, 2001, "teachers"));
  batch.push(eleni);

  let report = detector.diagnose(&batch);
  assert_eq!(report.identical, vec![1]);
  assert!(!report.is_clean());

  let (removed, report) = batch.remove_identical(&detector);

  assert_eq!(removed.len(), 1);
  assert_eq!(removed[0].name, "eleni");
  assert_eq!(batch.len(), 1);
  assert!(report.is_clean());
  assert!(report.identical.is_empty());
}

#[test]
fn different_shell_is_not_identical() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut eleni = sys.accounts().user("eleni").unwrap().clone();
  eleni.shell = "/bin/sh".into();
  let mut batch = ImportBatch::new("/home");
  batch.push(eleni);

  let report = detector.diagnose(&batch);
  assert!(report.identical.is_empty());
  assert_eq!(report.candidates[0].get(UserField::Name), Some(&Diagnosis::Con));
}

#[test]
fn detection_and_resolution_are_stable() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let homes = TestHomes::new();
  let detector = Detector::new(Reference::of(&sys), &homes);

  let mut batch = ImportBatch::new("/home");
  batch.push(User::new("maria", 1500, 2000, "teachers"));
  batch.push(User::new("petros", 1500, 2500, "office"));
  batch.push(User::new("Bad:Name", 1700, 2001, "teachers"));

  assert_eq!(detector.diagnose(&batch), detector.diagnose(&batch));

  let first = resolve(&mut batch, &detector);
  assert!(!first.is_noop());
  let after_first = batch.clone();

  assert_eq!(batch.candidate(1).unwrap().primary_group, "staff");
  assert_eq!(first.report.error_count(), 1);

  let second = resolve(&mut batch, &detector);
  assert!(second.is_noop());
  assert_eq!(batch, after_first);
  assert_eq!(second.report, first.report);
}
