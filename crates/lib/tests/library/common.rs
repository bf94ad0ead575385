//! Shared helpers for library integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use usersync_lib::config::{Config, DatabasePaths};
use usersync_lib::import::{HomeInspector, Ownership};
use usersync_lib::system::{RecordingRunner, ReferenceSystem};

/// Account databases in a temporary directory.
///
/// The default set describes a small school:
///
/// | user  | uid  | primary  | secondary |
/// |-------|------|----------|-----------|
/// | admin | 1001 | teachers |           |
/// | eleni | 1500 | teachers | audio     |
pub struct TestDatabases {
  pub temp: TempDir,
  pub config: Config,
}

impl TestDatabases {
  pub fn school() -> Self {
    let temp = TempDir::new().unwrap();
    let config = Config::with_databases(temp.path());
    let dbs = Self { temp, config };

    dbs.write(
      &dbs.config.databases.passwd,
      "admin:x:1001:2001:Administrator,,,:/home/admin:/bin/bash\n\
       eleni:x:1500:2001::/home/eleni:/bin/bash\n",
    );
    dbs.write(
      &dbs.config.databases.shadow,
      "admin:!:19000:0:99999:7:::\neleni:!:19000:0:99999:7:::\n",
    );
    dbs.write(
      &dbs.config.databases.group,
      "teachers:x:2001:\nstaff:x:2500:\naudio:x:29:eleni\n",
    );
    dbs.write(&dbs.config.databases.shells, "/bin/sh\n/bin/bash\n");
    dbs
  }

  pub fn paths(&self) -> &DatabasePaths {
    &self.config.databases
  }

  pub fn write(&self, path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
  }

  /// Reference system over these databases that records instead of running
  /// the account tools.
  pub fn dry_run(&self) -> ReferenceSystem<RecordingRunner> {
    ReferenceSystem::with_runner(self.config.clone(), RecordingRunner::new()).unwrap()
  }
}

/// Home directories that exist on "disk", by owner.
#[derive(Default)]
pub struct TestHomes {
  owners: HashMap<PathBuf, Ownership>,
}

impl TestHomes {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, path: &str, uid: u32, gid: u32) -> Self {
    self.owners.insert(PathBuf::from(path), Ownership { uid, gid });
    self
  }
}

impl HomeInspector for TestHomes {
  fn owner(&self, path: &Path) -> Option<Ownership> {
    self.owners.get(path).copied()
  }
}
