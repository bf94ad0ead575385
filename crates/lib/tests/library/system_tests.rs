//! Reference system loading, reloading and change watching.

use std::time::Duration;

use usersync_lib::config::Config;
use usersync_lib::system::{RecordingRunner, ReferenceSystem, SystemError, SystemEvent};

use super::common::TestDatabases;

#[test]
fn loads_accounts_and_memberships() {
  let dbs = TestDatabases::school();
  let sys = dbs.dry_run();

  let accounts = sys.accounts();
  assert_eq!(accounts.user_count(), 2);
  assert_eq!(accounts.group_count(), 3);

  let eleni = accounts.user("eleni").unwrap();
  assert_eq!(eleni.primary_group, "teachers");
  assert_eq!(eleni.groups, vec!["audio".to_string()]);
  assert_eq!(eleni.aging.inactive, -1);

  let admin = accounts.user("admin").unwrap();
  assert_eq!(admin.gecos.real_name, "Administrator");
  assert!(sys.shell_is_valid("/bin/sh"));
}

#[test]
fn config_file_selects_databases() {
  let dbs = TestDatabases::school();
  let config_path = dbs.temp.path().join("config.toml");
  let text = format!(
    "home_prefix = \"/srv/home\"\n\n[databases]\npasswd = {:?}\nshadow = {:?}\ngroup = {:?}\nshells = {:?}\n",
    dbs.paths().passwd,
    dbs.paths().shadow,
    dbs.paths().group,
    dbs.paths().shells,
  );
  std::fs::write(&config_path, text).unwrap();

  let config = Config::load_from(&config_path).unwrap();
  assert_eq!(config.home_prefix, "/srv/home");
  assert_eq!(&config.databases, dbs.paths());

  let sys = ReferenceSystem::with_runner(config, RecordingRunner::new()).unwrap();
  assert!(sys.accounts().contains_user("admin"));
}

#[test]
fn malformed_database_is_reported() {
  let dbs = TestDatabases::school();
  dbs.write(&dbs.paths().group, "teachers:x:2001:\nbroken\n");

  let err = ReferenceSystem::with_runner(dbs.config.clone(), RecordingRunner::new())
    .err()
    .unwrap();

  assert!(matches!(err, SystemError::Database(_)));
  assert!(err.to_string().contains(":2:"));
}

#[test]
fn reload_replaces_mirror_and_notifies() {
  let dbs = TestDatabases::school();
  let mut sys = dbs.dry_run();
  let mut events = sys.subscribe();

  dbs.write(
    &dbs.paths().group,
    "teachers:x:2001:\nstaff:x:2500:\naudio:x:29:eleni,admin\nlab:x:3000:\n",
  );
  sys.reload().unwrap();

  assert!(sys.accounts().contains_group("lab"));
  assert!(sys.accounts().user("admin").unwrap().in_secondary_group("audio"));
  assert_eq!(
    events.try_recv().unwrap(),
    SystemEvent::Changed { users: 2, groups: 4 }
  );
}

#[test]
fn failed_reload_keeps_previous_mirror() {
  let dbs = TestDatabases::school();
  let mut sys = dbs.dry_run();
  let before = sys.accounts().clone();

  std::fs::remove_file(&dbs.paths().passwd).unwrap();

  assert!(sys.reload().is_err());
  assert_eq!(sys.accounts(), &before);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn watcher_triggers_reload() {
  let mut dbs = TestDatabases::school();
  dbs.config.watch.debounce_ms = 50;
  let mut sys = dbs.dry_run();
  let mut events = sys.subscribe();
  let mut watcher = sys.watcher().unwrap().expect("watching is enabled by default");

  dbs.write(&dbs.paths().group, "teachers:x:2001:\nstaff:x:2500:\naudio:x:29:eleni\nlab:x:3000:\n");

  let synced = tokio::time::timeout(Duration::from_secs(5), sys.sync_once(&mut watcher))
    .await
    .expect("no change observed")
    .unwrap();

  assert!(synced);
  assert!(sys.accounts().contains_group("lab"));
  assert!(matches!(events.try_recv(), Ok(SystemEvent::Changed { groups: 4, .. })));
}
