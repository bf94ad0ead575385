//! The reference system: an authoritative mirror of the host's accounts.
//!
//! [`ReferenceSystem`] loads passwd, shadow and group in full at construction
//! and is only ever replaced wholesale by [`reload`](ReferenceSystem::reload)
//! when the files change underneath it. Mutations go out through the account
//! tools first; the mirror is updated only once the tool reports success.
//!
//! # Lifecycle
//!
//! ```text
//! init ──► accounts()/mutators ──► reload (on change or after commit) ──► shutdown
//!               │                        │
//!               └── subscribe() ◄────────┘ SystemEvent::Changed
//! ```
//!
//! Every mutator takes `&mut self`, so a reload can never start while another
//! is running; change notifications that arrive meanwhile wait in the
//! [`ChangeWatcher`] queue and are picked up by the next
//! [`sync_once`](ReferenceSystem::sync_once).

pub mod command;
pub mod database;
pub mod password;
pub mod types;
pub mod validate;
pub mod watch;

use std::collections::BTreeSet;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use command::{AccountCommand, CommandOutput, CommandRunner, ProcessRunner, RecordingRunner};
pub use database::{DatabaseError, load_accounts, read_shells};
pub use password::{PasswordError, hash_password};
pub use types::{SystemError, SystemEvent};
pub use watch::{ChangeWatcher, Debouncer};

use crate::config::Config;
use crate::consts::REGULAR_UIDS;
use crate::model::{AccountSet, Aging, Gecos, Group, SetError, User};
use crate::platform;

const EVENT_CAPACITY: usize = 16;

/// Live mirror of the host account databases.
///
/// `R` executes the account tools; [`ProcessRunner`] runs them for real while
/// [`RecordingRunner`] turns every mutation into a dry run.
pub struct ReferenceSystem<R = ProcessRunner> {
  config: Config,
  accounts: AccountSet,
  shells: BTreeSet<String>,
  runner: R,
  events: broadcast::Sender<SystemEvent>,
}

impl ReferenceSystem<ProcessRunner> {
  /// Load the databases named by `config` and execute changes for real.
  pub fn init(config: Config) -> Result<Self, SystemError> {
    Self::with_runner(config, ProcessRunner)
  }
}

impl<R: CommandRunner> ReferenceSystem<R> {
  pub fn with_runner(config: Config, runner: R) -> Result<Self, SystemError> {
    if !platform::is_elevated() {
      warn!("not running as root, account commands are likely to fail");
    }

    let accounts = load_accounts(&config.databases)?;
    let shells = read_shells(&config.databases.shells)?;
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    info!(
      users = accounts.user_count(),
      groups = accounts.group_count(),
      shells = shells.len(),
      "reference system loaded"
    );

    Ok(Self {
      config,
      accounts,
      shells,
      runner,
      events,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn accounts(&self) -> &AccountSet {
    &self.accounts
  }

  /// Login shells listed in the configured shells file.
  pub fn shells(&self) -> &BTreeSet<String> {
    &self.shells
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }

  /// Receive a [`SystemEvent::Changed`] after every successful reload.
  pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
    self.events.subscribe()
  }

  /// Rebuild the mirror from the databases and notify subscribers.
  ///
  /// On failure the previous mirror is kept.
  pub fn reload(&mut self) -> Result<(), SystemError> {
    let accounts = load_accounts(&self.config.databases)?;
    let shells = read_shells(&self.config.databases.shells)?;
    self.accounts = accounts;
    self.shells = shells;

    let event = SystemEvent::Changed {
      users: self.accounts.user_count(),
      groups: self.accounts.group_count(),
    };
    info!(?event, "reference system reloaded");
    if self.events.send(event).is_err() {
      debug!("no subscribers for change event");
    }
    Ok(())
  }

  /// Start watching the group and shadow databases, or `None` when watching
  /// is turned off in the configuration.
  pub fn watcher(&self) -> Result<Option<ChangeWatcher>, SystemError> {
    if !self.config.watch.enabled {
      debug!("change watching disabled");
      return Ok(None);
    }
    ChangeWatcher::new(&self.config.databases.watched(), self.config.watch.debounce()).map(Some)
  }

  /// Wait for the next debounced change burst and reload.
  ///
  /// Returns `false` once the watcher has stopped.
  pub async fn sync_once(&mut self, watcher: &mut ChangeWatcher) -> Result<bool, SystemError> {
    match watcher.next_change().await {
      Some(events) => {
        debug!(events, "account databases changed");
        self.reload()?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Drop the mirror. Subscribers observe a closed channel.
  pub fn shutdown(self) {
    info!(subscribers = self.events.receiver_count(), "reference system shut down");
  }

  pub fn name_is_valid(&self, name: &str) -> bool {
    validate::name_is_valid(name)
  }

  pub fn gecos_is_valid(&self, gecos: &Gecos) -> bool {
    validate::gecos_is_valid(gecos)
  }

  pub fn shell_is_valid(&self, shell: &str) -> bool {
    self.shells.contains(shell)
  }

  pub fn uid_is_valid(&self, uid: u32) -> bool {
    validate::uid_is_valid(uid)
  }

  pub fn gid_is_valid(&self, gid: u32) -> bool {
    validate::gid_is_valid(gid)
  }

  pub fn uid_is_free(&self, uid: u32) -> bool {
    self.uid_is_valid(uid) && !self.accounts.uids().any(|u| u == uid)
  }

  pub fn gid_is_free(&self, gid: u32) -> bool {
    self.gid_is_valid(gid) && self.accounts.group_by_gid(gid).is_none()
  }

  /// Every unused uid of the regular range, ascending.
  pub fn free_uids(&self) -> Vec<u32> {
    let used: BTreeSet<u32> = self.accounts.uids().collect();
    REGULAR_UIDS.filter(|uid| !used.contains(uid)).collect()
  }

  /// Create `user`, then push its full attribute set, GECOS and aging.
  ///
  /// A pending plaintext password is hashed first and never leaves this call.
  pub async fn create_user(&mut self, user: &User, create_home: bool) -> Result<(), SystemError> {
    if self.accounts.contains_user(&user.name) {
      return Err(SetError::DuplicateUser(user.name.clone()).into());
    }
    self.check_user(user)?;

    let mut user = user.clone();
    user.take_plain_password()?;

    info!(user = %user.name, uid = user.uid, gid = user.gid, "creating user");
    self
      .execute_all(&[
        AccountCommand::CreateUser {
          name: user.name.clone(),
          gid: user.gid,
          home: create_home.then(|| user.home.clone()),
        },
        AccountCommand::modify_user(&user.name, &user),
        AccountCommand::SetGecos {
          name: user.name.clone(),
          gecos: user.gecos.clone(),
        },
        AccountCommand::SetAging {
          name: user.name.clone(),
          aging: user.aging,
        },
      ])
      .await?;

    self.resolve_primary_group(&mut user);
    self.accounts.add_user(user)?;
    Ok(())
  }

  /// Replace the user `current_name` with `user` (rename, home, groups, shell,
  /// uid and password hash).
  pub async fn modify_user(&mut self, current_name: &str, user: &User) -> Result<(), SystemError> {
    if !self.accounts.contains_user(current_name) {
      return Err(SetError::UnknownUser(current_name.to_string()).into());
    }
    if current_name != user.name && self.accounts.contains_user(&user.name) {
      return Err(SetError::DuplicateUser(user.name.clone()).into());
    }
    self.check_user(user)?;

    let mut user = user.clone();
    user.take_plain_password()?;

    info!(user = %current_name, new_name = %user.name, "modifying user");
    self.execute(&AccountCommand::modify_user(current_name, &user)).await?;

    self.resolve_primary_group(&mut user);
    self.accounts.replace_user(current_name, user)?;
    Ok(())
  }

  pub async fn delete_user(&mut self, name: &str, remove_home: bool) -> Result<(), SystemError> {
    self.require_user(name)?;

    info!(user = %name, remove_home, "deleting user");
    self
      .execute(&AccountCommand::DeleteUser {
        name: name.to_string(),
        remove_home,
      })
      .await?;

    self.accounts.remove_user(name)?;
    Ok(())
  }

  pub async fn set_gecos(&mut self, name: &str, gecos: &Gecos) -> Result<(), SystemError> {
    self.require_user(name)?;
    if !validate::gecos_is_valid(gecos) {
      return Err(SystemError::Invalid {
        what: "gecos",
        value: gecos.to_string(),
      });
    }

    self
      .execute(&AccountCommand::SetGecos {
        name: name.to_string(),
        gecos: gecos.clone(),
      })
      .await?;

    if let Some(user) = self.accounts.user_mut(name) {
      user.gecos = gecos.clone();
    }
    Ok(())
  }

  pub async fn set_aging(&mut self, name: &str, aging: &Aging) -> Result<(), SystemError> {
    self.require_user(name)?;
    check_aging(aging)?;

    self
      .execute(&AccountCommand::SetAging {
        name: name.to_string(),
        aging: *aging,
      })
      .await?;

    if let Some(user) = self.accounts.user_mut(name) {
      user.aging = *aging;
    }
    Ok(())
  }

  pub async fn lock_user(&mut self, name: &str) -> Result<(), SystemError> {
    self.require_user(name)?;
    self
      .execute(&AccountCommand::LockUser { name: name.to_string() })
      .await?;

    if let Some(user) = self.accounts.user_mut(name) {
      user.password = password::locked(&user.password);
    }
    Ok(())
  }

  pub async fn unlock_user(&mut self, name: &str) -> Result<(), SystemError> {
    self.require_user(name)?;
    self
      .execute(&AccountCommand::UnlockUser { name: name.to_string() })
      .await?;

    if let Some(user) = self.accounts.user_mut(name) {
      user.password = password::unlocked(&user.password);
    }
    Ok(())
  }

  /// Create an empty group. Members are added separately with
  /// [`add_user_to_groups`](Self::add_user_to_groups).
  pub async fn create_group(&mut self, name: &str, gid: Option<u32>) -> Result<(), SystemError> {
    let gid = gid.ok_or_else(|| SystemError::MissingGid(name.to_string()))?;
    if self.accounts.contains_group(name) {
      return Err(SetError::DuplicateGroup(name.to_string()).into());
    }
    check_name(name)?;
    check_gid(gid)?;

    info!(group = %name, gid, "creating group");
    self
      .execute(&AccountCommand::CreateGroup {
        name: name.to_string(),
        gid,
      })
      .await?;

    self.accounts.add_group(Group::new(name, gid))?;
    Ok(())
  }

  /// Rename and/or renumber a group.
  pub async fn modify_group(&mut self, current_name: &str, name: &str, gid: u32) -> Result<(), SystemError> {
    if !self.accounts.contains_group(current_name) {
      return Err(SetError::UnknownGroup(current_name.to_string()).into());
    }
    if current_name != name && self.accounts.contains_group(name) {
      return Err(SetError::DuplicateGroup(name.to_string()).into());
    }
    check_name(name)?;
    check_gid(gid)?;

    info!(group = %current_name, new_name = %name, gid, "modifying group");
    self
      .execute(&AccountCommand::ModifyGroup {
        current_name: current_name.to_string(),
        name: name.to_string(),
        gid,
      })
      .await?;

    self.accounts.replace_group(current_name, name, gid)?;
    Ok(())
  }

  pub async fn delete_group(&mut self, name: &str) -> Result<(), SystemError> {
    if !self.accounts.contains_group(name) {
      return Err(SetError::UnknownGroup(name.to_string()).into());
    }

    info!(group = %name, "deleting group");
    self
      .execute(&AccountCommand::DeleteGroup { name: name.to_string() })
      .await?;

    self.accounts.remove_group(name)?;
    Ok(())
  }

  /// Append `groups` to the secondary groups of `user`.
  pub async fn add_user_to_groups(&mut self, user: &str, groups: &[String]) -> Result<(), SystemError> {
    let current = self.require_user(user)?;
    let missing: Vec<String> = groups
      .iter()
      .filter(|g| current.primary_group != **g && !current.in_secondary_group(g))
      .cloned()
      .collect();
    if missing.is_empty() {
      debug!(user = %user, "already a member of every requested group");
      return Ok(());
    }
    if let Some(unknown) = missing.iter().find(|g| !self.accounts.contains_group(g)) {
      return Err(SetError::UnknownGroup(unknown.clone()).into());
    }

    self
      .execute(&AccountCommand::AppendGroups {
        user: user.to_string(),
        groups: missing.clone(),
      })
      .await?;

    for group in &missing {
      self.accounts.add_membership(user, group)?;
    }
    Ok(())
  }

  /// Drop `groups` from the secondary groups of `user`.
  pub async fn remove_user_from_groups(&mut self, user: &str, groups: &[String]) -> Result<(), SystemError> {
    let current = self.require_user(user)?;
    let remaining: Vec<String> = current.groups.iter().filter(|g| !groups.contains(g)).cloned().collect();
    if remaining.len() == current.groups.len() {
      debug!(user = %user, "not a member of any group to remove");
      return Ok(());
    }

    self
      .execute(&AccountCommand::SetGroups {
        user: user.to_string(),
        groups: remaining,
      })
      .await?;

    for group in groups {
      self.accounts.remove_membership(user, group)?;
    }
    Ok(())
  }

  fn require_user(&self, name: &str) -> Result<&User, SystemError> {
    self
      .accounts
      .user(name)
      .ok_or_else(|| SetError::UnknownUser(name.to_string()).into())
  }

  fn check_user(&self, user: &User) -> Result<(), SystemError> {
    check_name(&user.name)?;
    if !validate::uid_is_valid(user.uid) {
      return Err(SystemError::Invalid {
        what: "uid",
        value: user.uid.to_string(),
      });
    }
    check_gid(user.gid)?;
    if !validate::gecos_is_valid(&user.gecos) {
      return Err(SystemError::Invalid {
        what: "gecos",
        value: user.gecos.to_string(),
      });
    }
    check_aging(&user.aging)
  }

  /// The tools identify the primary group by gid; mirror what they record.
  fn resolve_primary_group(&self, user: &mut User) {
    if let Some(group) = self.accounts.group_by_gid(user.gid) {
      user.primary_group = group.name.clone();
    }
  }

  async fn execute(&self, command: &AccountCommand) -> Result<CommandOutput, SystemError> {
    info!(command = %command, "running account command");

    let output = self
      .runner
      .run(command.program(), &command.args())
      .await
      .map_err(|source| SystemError::Spawn {
        command: command.program().to_string(),
        source,
      })?;

    if !output.success() {
      debug!(stdout = %output.stdout, stderr = %output.stderr, "command output");
      warn!(command = %command, code = ?output.code, "account command failed");
      let text = if output.stderr.is_empty() {
        output.stdout
      } else {
        output.stderr
      };
      return Err(SystemError::CommandFailed {
        command: command.to_string(),
        code: output.code,
        output: text,
      });
    }

    Ok(output)
  }

  /// Run `commands` in order, stopping at the first failure.
  ///
  /// If a later step fails after earlier ones changed the host, the mirror
  /// is reloaded so it reflects what actually happened.
  async fn execute_all(&mut self, commands: &[AccountCommand]) -> Result<(), SystemError> {
    for (step, command) in commands.iter().enumerate() {
      if let Err(e) = self.execute(command).await {
        if step > 0 {
          warn!(completed = step, "resynchronizing after partial failure");
          if let Err(reload) = self.reload() {
            warn!(error = %reload, "resynchronization failed");
          }
        }
        return Err(e);
      }
    }
    Ok(())
  }
}

fn check_name(name: &str) -> Result<(), SystemError> {
  if validate::name_is_valid(name) {
    Ok(())
  } else {
    Err(SystemError::Invalid {
      what: "name",
      value: name.to_string(),
    })
  }
}

fn check_gid(gid: u32) -> Result<(), SystemError> {
  if validate::gid_is_valid(gid) {
    Ok(())
  } else {
    Err(SystemError::Invalid {
      what: "gid",
      value: gid.to_string(),
    })
  }
}

fn check_aging(aging: &Aging) -> Result<(), SystemError> {
  match aging.fields().into_iter().find(|d| !validate::aging_is_valid(*d)) {
    Some(days) => Err(SystemError::Invalid {
      what: "aging",
      value: days.to_string(),
    }),
    None => Ok(()),
  }
}
