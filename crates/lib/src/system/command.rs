//! Account-management commands and the runners that execute them.
//!
//! Every change to the OS account databases goes through one of the shadow
//! utilities (`useradd`, `usermod`, `chfn`, ...). [`AccountCommand`] names each
//! call and renders its argv; a [`CommandRunner`] executes it and captures the
//! output.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Mutex;

use tokio::process::Command;
use tracing::debug;

use crate::model::{Aging, Gecos, User};

/// One invocation of an account-management tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCommand {
  /// `useradd [-m -d HOME] -g GID NAME`
  CreateUser {
    name: String,
    gid: u32,
    home: Option<String>,
  },
  /// `usermod -d HOME -g GID -G GROUPS -l NAME [-p HASH] -s SHELL -u UID CURRENT`
  ModifyUser {
    current_name: String,
    name: String,
    uid: u32,
    gid: u32,
    home: String,
    shell: String,
    groups: Vec<String>,
    password: Option<String>,
  },
  /// `userdel [-r] NAME`
  DeleteUser { name: String, remove_home: bool },
  /// `chfn -f -r -w -h -o NAME`
  SetGecos { name: String, gecos: Gecos },
  /// `chage -d -E -I -m -M -W NAME`
  SetAging { name: String, aging: Aging },
  /// `usermod -L NAME`
  LockUser { name: String },
  /// `usermod -U NAME`
  UnlockUser { name: String },
  /// `groupadd -g GID NAME`
  CreateGroup { name: String, gid: u32 },
  /// `groupmod -g GID -n NAME CURRENT`
  ModifyGroup {
    current_name: String,
    name: String,
    gid: u32,
  },
  /// `usermod -a -G GROUPS USER`
  AppendGroups { user: String, groups: Vec<String> },
  /// `usermod -G GROUPS USER`
  SetGroups { user: String, groups: Vec<String> },
  /// `groupdel NAME`
  DeleteGroup { name: String },
}

impl AccountCommand {
  /// Build the `usermod` call that pushes every main attribute of `user`.
  pub fn modify_user(current_name: &str, user: &User) -> Self {
    AccountCommand::ModifyUser {
      current_name: current_name.to_string(),
      name: user.name.clone(),
      uid: user.uid,
      gid: user.gid,
      home: user.home.clone(),
      shell: user.shell.clone(),
      groups: user.groups.clone(),
      password: (!user.password.is_empty()).then(|| user.password.clone()),
    }
  }

  pub fn program(&self) -> &'static str {
    match self {
      AccountCommand::CreateUser { .. } => "useradd",
      AccountCommand::ModifyUser { .. }
      | AccountCommand::LockUser { .. }
      | AccountCommand::UnlockUser { .. }
      | AccountCommand::AppendGroups { .. }
      | AccountCommand::SetGroups { .. } => "usermod",
      AccountCommand::DeleteUser { .. } => "userdel",
      AccountCommand::SetGecos { .. } => "chfn",
      AccountCommand::SetAging { .. } => "chage",
      AccountCommand::CreateGroup { .. } => "groupadd",
      AccountCommand::ModifyGroup { .. } => "groupmod",
      AccountCommand::DeleteGroup { .. } => "groupdel",
    }
  }

  pub fn args(&self) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    match self {
      AccountCommand::CreateUser { name, gid, home } => {
        if let Some(home) = home {
          push(&["-m", "-d", home]);
        }
        push(&["-g", &gid.to_string(), name]);
      }
      AccountCommand::ModifyUser {
        current_name,
        name,
        uid,
        gid,
        home,
        shell,
        groups,
        password,
      } => {
        push(&["-d", home, "-g", &gid.to_string(), "-G", &groups.join(","), "-l", name]);
        if let Some(password) = password {
          push(&["-p", password]);
        }
        push(&["-s", shell, "-u", &uid.to_string(), current_name]);
      }
      AccountCommand::DeleteUser { name, remove_home } => {
        if *remove_home {
          push(&["-r"]);
        }
        push(&[name]);
      }
      AccountCommand::SetGecos { name, gecos } => {
        push(&[
          "-f",
          &gecos.real_name,
          "-r",
          &gecos.office,
          "-w",
          &gecos.work_phone,
          "-h",
          &gecos.home_phone,
          "-o",
          &gecos.other,
          name,
        ]);
      }
      AccountCommand::SetAging { name, aging } => {
        push(&[
          "-d",
          &aging.last_change.to_string(),
          "-E",
          &aging.expire.to_string(),
          "-I",
          &aging.inactive.to_string(),
          "-m",
          &aging.min.to_string(),
          "-M",
          &aging.max.to_string(),
          "-W",
          &aging.warn.to_string(),
          name,
        ]);
      }
      AccountCommand::LockUser { name } => push(&["-L", name]),
      AccountCommand::UnlockUser { name } => push(&["-U", name]),
      AccountCommand::CreateGroup { name, gid } => push(&["-g", &gid.to_string(), name]),
      AccountCommand::ModifyGroup {
        current_name,
        name,
        gid,
      } => push(&["-g", &gid.to_string(), "-n", name, current_name]),
      AccountCommand::AppendGroups { user, groups } => push(&["-a", "-G", &groups.join(","), user]),
      AccountCommand::SetGroups { user, groups } => push(&["-G", &groups.join(","), user]),
      AccountCommand::DeleteGroup { name } => push(&[name]),
    }

    args
  }
}

impl fmt::Display for AccountCommand {
  /// The command line with any password hash masked.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program())?;
    let mut mask_next = false;
    for arg in self.args() {
      if mask_next {
        write!(f, " ***")?;
        mask_next = false;
        continue;
      }
      mask_next = matches!(self, AccountCommand::ModifyUser { .. }) && arg == "-p";
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn succeeded() -> Self {
    Self {
      code: Some(0),
      ..Self::default()
    }
  }

  pub fn failed(code: i32, stderr: &str) -> Self {
    Self {
      code: Some(code),
      stdout: String::new(),
      stderr: stderr.to_string(),
    }
  }

  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Executes account-management programs.
///
/// A non-zero exit is reported through [`CommandOutput`]; `Err` is reserved
/// for failing to start the program.
pub trait CommandRunner {
  fn run(&self, program: &str, args: &[String]) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
  async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
    debug!(program = %program, "spawning process");

    // Tool messages are surfaced verbatim, so keep them in a stable locale.
    let output = Command::new(program).args(args).env("LC_ALL", "C").output().await?;

    Ok(CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
  }
}

/// Records every command and reports success without running anything.
///
/// Used for dry runs: the recorded argv lists show exactly what would be
/// executed, in order.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Recorded invocations, each as `[program, args...]`.
  pub fn calls(&self) -> Vec<Vec<String>> {
    self.calls.lock().map(|c| c.clone()).unwrap_or_default()
  }

  /// Recorded invocations rendered as single command lines.
  pub fn command_lines(&self) -> Vec<String> {
    self.calls().iter().map(|c| c.join(" ")).collect()
  }
}

impl CommandRunner for RecordingRunner {
  async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
    let mut call = vec![program.to_string()];
    call.extend(args.iter().cloned());
    if let Ok(mut calls) = self.calls.lock() {
      calls.push(call);
    }
    Ok(CommandOutput::succeeded())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_user_with_home() {
    let cmd = AccountCommand::CreateUser {
      name: "maria".to_string(),
      gid: 2000,
      home: Some("/home/maria".to_string()),
    };
    assert_eq!(cmd.program(), "useradd");
    assert_eq!(cmd.args(), vec!["-m", "-d", "/home/maria", "-g", "2000", "maria"]);
  }

  #[test]
  fn modify_user_carries_every_main_field() {
    let mut user = User::new("mpapa", 1500, 2000, "teachers");
    user.groups = vec!["audio".to_string(), "video".to_string()];
    user.password = "$6$salt$hash".to_string();

    let cmd = AccountCommand::modify_user("maria", &user);

    assert_eq!(
      cmd.args(),
      vec![
        "-d",
        "/home/mpapa",
        "-g",
        "2000",
        "-G",
        "audio,video",
        "-l",
        "mpapa",
        "-p",
        "$6$salt$hash",
        "-s",
        "/bin/bash",
        "-u",
        "1500",
        "maria"
      ]
    );
  }

  #[test]
  fn display_masks_password_hash() {
    let mut user = User::new("maria", 1000, 1000, "maria");
    user.password = "$6$salt$hash".to_string();
    let line = AccountCommand::modify_user("maria", &user).to_string();
    assert!(line.starts_with("usermod -d /home/maria"));
    assert!(line.contains("-p ***"));
    assert!(!line.contains("$6$salt$hash"));
  }

  #[test]
  fn aging_flags_follow_chage_order() {
    let cmd = AccountCommand::SetAging {
      name: "maria".to_string(),
      aging: Aging {
        last_change: 19000,
        min: 0,
        max: 99999,
        warn: 7,
        inactive: -1,
        expire: -1,
      },
    };
    assert_eq!(
      cmd.args(),
      vec!["-d", "19000", "-E", "-1", "-I", "-1", "-m", "0", "-M", "99999", "-W", "7", "maria"]
    );
  }

  #[test]
  fn group_membership_commands() {
    let append = AccountCommand::AppendGroups {
      user: "maria".to_string(),
      groups: vec!["audio".to_string(), "video".to_string()],
    };
    assert_eq!(append.to_string(), "usermod -a -G audio,video maria");

    let set = AccountCommand::SetGroups {
      user: "maria".to_string(),
      groups: vec![],
    };
    assert_eq!(set.args(), vec!["-G", "", "maria"]);
  }

  #[tokio::test]
  async fn recording_runner_keeps_order() {
    let runner = RecordingRunner::new();
    runner.run("groupadd", &["-g".into(), "2000".into(), "teachers".into()]).await.unwrap();
    runner.run("userdel", &["maria".into()]).await.unwrap();

    assert_eq!(runner.command_lines(), vec!["groupadd -g 2000 teachers", "userdel maria"]);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn process_runner_captures_failure() {
    let output = ProcessRunner
      .run("/bin/sh", &["-c".into(), "echo oops >&2; exit 3".into()])
      .await
      .unwrap();
    assert!(!output.success());
    assert_eq!(output.code, Some(3));
    assert_eq!(output.stderr, "oops");
  }
}
