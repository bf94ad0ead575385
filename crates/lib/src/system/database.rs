//! Readers for the passwd, shadow and group databases.
//!
//! # Record Formats
//!
//! ```text
//! passwd:  name:password:uid:gid:gecos:home:shell
//! shadow:  name:password:lastchg:min:max:warn:inactive:expire:reserved
//! group:   name:password:gid:member,member,...
//! ```
//!
//! Blank lines, `#` comments and NIS compat entries (`+`/`-`) are skipped.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DatabasePaths;
use crate::model::{AccountSet, Aging, Gecos, Group, User};

#[derive(Debug, Error)]
pub enum DatabaseError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{path}:{line}: {message}")]
  Parse {
    path: PathBuf,
    line: usize,
    message: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
  pub name: String,
  pub password: String,
  pub uid: u32,
  pub gid: u32,
  pub gecos: String,
  pub home: String,
  pub shell: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowEntry {
  pub name: String,
  pub password: String,
  pub aging: Aging,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
  pub name: String,
  pub password: String,
  pub gid: u32,
  pub members: Vec<String>,
}

/// Aging for accounts without a shadow entry: every field disabled.
const NO_AGING: Aging = Aging {
  last_change: -1,
  min: -1,
  max: -1,
  warn: -1,
  inactive: -1,
  expire: -1,
};

struct Records<'a> {
  path: &'a Path,
  lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Records<'a> {
  fn new(path: &'a Path, text: &'a str) -> Self {
    Self {
      path,
      lines: text.lines().enumerate(),
    }
  }

  fn error(&self, line: usize, message: impl Into<String>) -> DatabaseError {
    DatabaseError::Parse {
      path: self.path.to_path_buf(),
      line,
      message: message.into(),
    }
  }

  /// Next record as (1-based line number, fields).
  fn next_record(&mut self, min_fields: usize) -> Option<Result<(usize, Vec<&'a str>), DatabaseError>> {
    loop {
      let (idx, line) = self.lines.next()?;
      let trimmed = line.trim_end();
      if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('+') || trimmed.starts_with('-') {
        continue;
      }
      let fields: Vec<&str> = trimmed.split(':').collect();
      if fields.len() < min_fields {
        return Some(Err(self.error(
          idx + 1,
          format!("expected {} fields, found {}", min_fields, fields.len()),
        )));
      }
      return Some(Ok((idx + 1, fields)));
    }
  }

  fn id(&self, line: usize, what: &str, value: &str) -> Result<u32, DatabaseError> {
    value
      .parse()
      .map_err(|_| self.error(line, format!("invalid {}: '{}'", what, value)))
  }

  fn days(&self, line: usize, value: &str) -> Result<i64, DatabaseError> {
    if value.is_empty() {
      return Ok(-1);
    }
    value
      .parse()
      .map_err(|_| self.error(line, format!("invalid day count: '{}'", value)))
  }
}

pub fn parse_passwd(path: &Path, text: &str) -> Result<Vec<PasswdEntry>, DatabaseError> {
  let mut records = Records::new(path, text);
  let mut entries = Vec::new();
  while let Some(record) = records.next_record(7) {
    let (line, f) = record?;
    entries.push(PasswdEntry {
      name: f[0].to_string(),
      password: f[1].to_string(),
      uid: records.id(line, "uid", f[2])?,
      gid: records.id(line, "gid", f[3])?,
      gecos: f[4].to_string(),
      home: f[5].to_string(),
      shell: f[6].to_string(),
    });
  }
  Ok(entries)
}

pub fn parse_shadow(path: &Path, text: &str) -> Result<Vec<ShadowEntry>, DatabaseError> {
  let mut records = Records::new(path, text);
  let mut entries = Vec::new();
  while let Some(record) = records.next_record(8) {
    let (line, f) = record?;
    entries.push(ShadowEntry {
      name: f[0].to_string(),
      password: f[1].to_string(),
      aging: Aging {
        last_change: records.days(line, f[2])?,
        min: records.days(line, f[3])?,
        max: records.days(line, f[4])?,
        warn: records.days(line, f[5])?,
        inactive: records.days(line, f[6])?,
        expire: records.days(line, f[7])?,
      },
    });
  }
  Ok(entries)
}

pub fn parse_group(path: &Path, text: &str) -> Result<Vec<GroupEntry>, DatabaseError> {
  let mut records = Records::new(path, text);
  let mut entries = Vec::new();
  while let Some(record) = records.next_record(4) {
    let (line, f) = record?;
    entries.push(GroupEntry {
      name: f[0].to_string(),
      password: f[1].to_string(),
      gid: records.id(line, "gid", f[2])?,
      members: f[3]
        .split(',')
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect(),
    });
  }
  Ok(entries)
}

/// Assemble a set from parsed database records.
///
/// Secondary group lists come from group member lists; every user is also
/// listed as a member of its primary group.
pub fn build_set(passwd: Vec<PasswdEntry>, shadow: Vec<ShadowEntry>, groups: Vec<GroupEntry>) -> AccountSet {
  let mut shadow: HashMap<String, ShadowEntry> = shadow.into_iter().map(|s| (s.name.clone(), s)).collect();
  let gid_names: HashMap<u32, &str> = groups.iter().map(|g| (g.gid, g.name.as_str())).collect();

  let mut set = AccountSet::new();
  for entry in passwd {
    let (password, aging) = match shadow.remove(&entry.name) {
      Some(s) => (s.password, s.aging),
      None => (entry.password, NO_AGING),
    };
    let user = User {
      primary_group: gid_names.get(&entry.gid).copied().unwrap_or_default().to_string(),
      gecos: Gecos::parse(&entry.gecos),
      home: entry.home,
      shell: entry.shell,
      groups: Vec::new(),
      aging,
      password,
      plain_password: None,
      name: entry.name,
      uid: entry.uid,
      gid: entry.gid,
    };
    if let Err(e) = set.add_user(user) {
      warn!(error = %e, "skipping duplicate passwd entry");
    }
  }

  for entry in groups {
    let members = entry.members.into_iter().filter(|m| set.contains_user(m));
    let mut group = Group::new(&entry.name, entry.gid).with_members(members);
    group.password = entry.password;
    if let Err(e) = set.add_group(group) {
      warn!(error = %e, "skipping duplicate group entry");
    }
  }

  let primaries: Vec<(String, String)> = set
    .users()
    .filter(|u| !u.primary_group.is_empty())
    .map(|u| (u.primary_group.clone(), u.name.clone()))
    .collect();
  for (group, user) in primaries {
    if let Some(g) = set.group_mut(&group) {
      g.members.insert(user);
    }
  }

  set
}

fn read(path: &Path) -> Result<String, DatabaseError> {
  fs::read_to_string(path).map_err(|source| DatabaseError::Read {
    path: path.to_path_buf(),
    source,
  })
}

/// Read all three databases and build the account set.
///
/// A missing shadow file is treated as empty; every other read failure is an
/// error.
pub fn load_accounts(paths: &DatabasePaths) -> Result<AccountSet, DatabaseError> {
  let passwd = parse_passwd(&paths.passwd, &read(&paths.passwd)?)?;
  let shadow = match fs::read_to_string(&paths.shadow) {
    Ok(text) => parse_shadow(&paths.shadow, &text)?,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      warn!(path = %paths.shadow.display(), "shadow database not found, loading without aging data");
      Vec::new()
    }
    Err(source) => {
      return Err(DatabaseError::Read {
        path: paths.shadow.clone(),
        source,
      });
    }
  };
  let groups = parse_group(&paths.group, &read(&paths.group)?)?;

  debug!(
    users = passwd.len(),
    shadow = shadow.len(),
    groups = groups.len(),
    "parsed account databases"
  );

  Ok(build_set(passwd, shadow, groups))
}

/// Read the list of login shells. A missing file yields no valid shells.
pub fn read_shells(path: &Path) -> Result<BTreeSet<String>, DatabaseError> {
  let text = match fs::read_to_string(path) {
    Ok(text) => text,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
    Err(source) => {
      return Err(DatabaseError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  Ok(
    text
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty() && !l.starts_with('#'))
      .map(str::to_string)
      .collect(),
  )
}
