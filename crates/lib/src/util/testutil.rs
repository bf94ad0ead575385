//! Test fixtures for usersync-lib.
//!
//! [`FixtureDb`] writes a throwaway passwd/shadow/group/shells quartet so the
//! reference system can be loaded without touching `/etc`. [`ScriptedRunner`]
//! and [`FakeHomes`] stand in for the account tools and the filesystem.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::config::{Config, DatabasePaths};
use crate::import::{HomeInspector, Ownership};
use crate::system::{CommandOutput, CommandRunner};

/// Builder for a temporary set of account databases.
#[derive(Debug, Default)]
pub struct FixtureDb {
  passwd: Vec<String>,
  shadow: Vec<String>,
  group: Vec<String>,
}

/// Databases on disk. Dropping it removes the directory.
pub struct Fixture {
  pub dir: TempDir,
  pub paths: DatabasePaths,
}

impl FixtureDb {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a user with home `/home/<name>`, shell `/bin/bash` and a locked password.
  pub fn user(mut self, name: &str, uid: u32, gid: u32, gecos: &str) -> Self {
    self
      .passwd
      .push(format!("{name}:x:{uid}:{gid}:{gecos}:/home/{name}:/bin/bash"));
    self.shadow.push(format!("{name}:!:19000:0:99999:7:::"));
    self
  }

  pub fn group(mut self, name: &str, gid: u32, members: &[&str]) -> Self {
    self.group.push(format!("{name}:x:{gid}:{}", members.join(",")));
    self
  }

  pub fn write(self) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let paths = DatabasePaths::under(dir.path());
    let join = |lines: &[String]| lines.iter().map(|l| format!("{l}\n")).collect::<String>();

    std::fs::write(&paths.passwd, join(&self.passwd)).unwrap();
    std::fs::write(&paths.shadow, join(&self.shadow)).unwrap();
    std::fs::write(&paths.group, join(&self.group)).unwrap();
    std::fs::write(&paths.shells, "# valid login shells\n/bin/sh\n/bin/bash\n/usr/bin/zsh\n").unwrap();

    Fixture { dir, paths }
  }
}

impl Fixture {
  pub fn config(&self) -> Config {
    Config {
      databases: self.paths.clone(),
      ..Config::default()
    }
  }
}

/// Records calls like [`RecordingRunner`](crate::system::RecordingRunner) but
/// fails every invocation of a chosen program.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
  calls: Mutex<Vec<String>>,
  failures: HashMap<String, (i32, String)>,
}

impl ScriptedRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_on(mut self, program: &str, code: i32, stderr: &str) -> Self {
    self.failures.insert(program.to_string(), (code, stderr.to_string()));
    self
  }

  pub fn command_lines(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl CommandRunner for ScriptedRunner {
  async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
    let mut line = vec![program.to_string()];
    line.extend(args.iter().cloned());
    self.calls.lock().unwrap().push(line.join(" "));

    Ok(match self.failures.get(program) {
      Some((code, stderr)) => CommandOutput::failed(*code, stderr),
      None => CommandOutput::succeeded(),
    })
  }
}

/// Home directory owners keyed by path.
#[derive(Debug, Default)]
pub struct FakeHomes {
  owners: HashMap<PathBuf, Ownership>,
}

impl FakeHomes {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, path: &str, uid: u32, gid: u32) -> Self {
    self.owners.insert(PathBuf::from(path), Ownership { uid, gid });
    self
  }
}

impl HomeInspector for FakeHomes {
  fn owner(&self, path: &Path) -> Option<Ownership> {
    self.owners.get(path).copied()
  }
}
