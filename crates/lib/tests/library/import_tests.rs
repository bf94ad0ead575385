//! Whole import runs: records in, account commands out.

use usersync_lib::import::{
  CandidateRecord, CommitError, Detector, Diagnosis, ImportBatch, Reference, commit, plan, resolve,
};
use usersync_lib::model::UserField;
use usersync_lib::system::SystemEvent;

use super::common::{TestDatabases, TestHomes};

const RECORDS: &str = r#"[
  { "name": "nikos", "plain_password": "s3cret" },
  { "name": "eleni", "groups": ["audio", "lab"] },
  { "name": "maria", "uid": 1500, "primary_group": "teachers" }
]"#;

fn load(dbs: &TestDatabases, batch: &mut ImportBatch) {
  let sys = dbs.dry_run();
  let records: Vec<CandidateRecord> = serde_json::from_str(RECORDS).unwrap();
  for record in records {
    batch
      .push_record(record, sys.accounts(), &sys.config().default_shell)
      .unwrap();
  }
}

#[test]
fn records_are_completed_against_reference() {
  let dbs = TestDatabases::school();
  let mut batch = ImportBatch::new(&dbs.config.home_prefix);
  load(&dbs, &mut batch);

  let ids: Vec<(u32, u32, &str)> = batch
    .candidates()
    .iter()
    .map(|u| (u.uid, u.gid, u.primary_group.as_str()))
    .collect();
  assert_eq!(
    ids,
    vec![(1000, 1000, "nikos"), (1002, 1001, "eleni"), (1500, 2001, "teachers")]
  );

  let nikos = batch.candidate(0).unwrap();
  assert!(nikos.password.starts_with("$6$"));
  assert!(nikos.plain_password.is_none());
  assert_eq!(nikos.home, "/home/nikos");
}

#[tokio::test]
async fn full_import_commits_in_order() {
  let dbs = TestDatabases::school();
  let mut sys = dbs.dry_run();
  let mut events = sys.subscribe();
  let homes = TestHomes::new();

  let mut batch = ImportBatch::new(&dbs.config.home_prefix);
  load(&dbs, &mut batch);

  {
    let detector = Detector::new(Reference::of(&sys), &homes);
    let resolution = resolve(&mut batch, &detector);
    assert_eq!(resolution.changes.len(), 1);
    assert_eq!(
      resolution.changes[0].to_string(),
      "changed uid of 'maria' from 1500 to 1003"
    );

    // Name clashes are left for a manual edit.
    let eleni = &resolution.report.candidates[1];
    assert_eq!(eleni.get(UserField::Name), Some(&Diagnosis::Con));
    assert_eq!(eleni.get(UserField::Home), Some(&Diagnosis::Con));
  }

  let err = commit(&batch, &mut sys, &homes).await.unwrap_err();
  assert!(matches!(err, CommitError::Blocked { errors: 1 }));
  assert!(sys.runner().calls().is_empty());

  batch.edit(1, UserField::Name, "elena").unwrap();
  assert_eq!(batch.candidate(1).unwrap().home, "/home/elena");

  let plan = commit(&batch, &mut sys, &homes).await.unwrap();
  assert_eq!(plan.users.len(), 3);

  let lines = sys.runner().command_lines();
  assert_eq!(lines.len(), 16);
  assert_eq!(
    &lines[..3],
    &["groupadd -g 1001 eleni", "groupadd -g 1002 lab", "groupadd -g 1000 nikos"]
  );
  assert!(lines[3].starts_with("useradd"));
  assert!(lines[3].ends_with("nikos"));
  assert_eq!(lines[15], "usermod -a -G lab elena");
  assert!(lines.iter().all(|l| !l.contains("s3cret")));

  assert!(matches!(events.try_recv(), Ok(SystemEvent::Changed { users: 2, .. })));
}

#[test]
fn plan_leaves_existing_groups_alone() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();
  let mut batch = ImportBatch::new("/home");
  let mut record = CandidateRecord::named("nikos");
  record.primary_group = Some("teachers".into());
  record.groups = vec!["audio".into(), "staff".into()];
  batch.push_record(record, sys.accounts(), "/bin/bash").unwrap();

  let plan = plan(&batch, sys.accounts()).unwrap();

  assert!(plan.groups.is_empty());
  assert!(plan.memberships.is_empty());
  assert_eq!(plan.users[0].groups, vec!["audio".to_string(), "staff".to_string()]);
}
