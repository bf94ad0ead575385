//! Per-field access to [`User`] records.
//!
//! Import diagnoses and batch edits address a user's attributes by
//! [`UserField`]. Each field maps to a typed getter and setter through a fixed
//! table, so text coming from an editor or tabular reader is parsed once, in
//! one place.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::User;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
  #[error("{field} expects an integer, got '{value}'")]
  NotAnInteger { field: UserField, value: String },

  #[error("{field} is out of range: {value}")]
  OutOfRange { field: UserField, value: String },

  #[error("name '{0}' is already taken")]
  NameTaken(String),

  #[error("{0} cannot be edited directly")]
  ReadOnly(UserField),
}

/// Addressable attributes of a user, in display column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
  Name,
  Uid,
  Gid,
  PrimaryGroup,
  RealName,
  Office,
  WorkPhone,
  HomePhone,
  Other,
  Home,
  Shell,
  Groups,
  LastChange,
  MinDays,
  MaxDays,
  WarnDays,
  InactiveDays,
  ExpireDays,
  Password,
  PlainPassword,
}

impl UserField {
  pub const ALL: [UserField; 20] = [
    UserField::Name,
    UserField::Uid,
    UserField::Gid,
    UserField::PrimaryGroup,
    UserField::RealName,
    UserField::Office,
    UserField::WorkPhone,
    UserField::HomePhone,
    UserField::Other,
    UserField::Home,
    UserField::Shell,
    UserField::Groups,
    UserField::LastChange,
    UserField::MinDays,
    UserField::MaxDays,
    UserField::WarnDays,
    UserField::InactiveDays,
    UserField::ExpireDays,
    UserField::Password,
    UserField::PlainPassword,
  ];

  pub const GECOS: [UserField; 5] = [
    UserField::RealName,
    UserField::Office,
    UserField::WorkPhone,
    UserField::HomePhone,
    UserField::Other,
  ];

  pub const AGING: [UserField; 6] = [
    UserField::LastChange,
    UserField::MinDays,
    UserField::MaxDays,
    UserField::WarnDays,
    UserField::InactiveDays,
    UserField::ExpireDays,
  ];

  pub fn as_str(self) -> &'static str {
    self.access().label
  }

  /// Render the field's current value as text.
  pub fn get(self, user: &User) -> String {
    (self.access().get)(user)
  }

  /// Parse `value` and store it in the field.
  ///
  /// `Name` and `PlainPassword` have side effects on other fields and are
  /// handled by the batch editor, so they are refused here.
  pub fn set(self, user: &mut User, value: &str) -> Result<(), FieldError> {
    match self.access().set {
      Some(set) => set(user, value),
      None => Err(FieldError::ReadOnly(self)),
    }
  }

  fn access(self) -> &'static FieldAccess {
    &FIELD_TABLE[self as usize]
  }
}

impl fmt::Display for UserField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

type Getter = fn(&User) -> String;
type Setter = fn(&mut User, &str) -> Result<(), FieldError>;

struct FieldAccess {
  label: &'static str,
  get: Getter,
  set: Option<Setter>,
}

fn parse_id(field: UserField, value: &str) -> Result<u32, FieldError> {
  let value = value.trim();
  let n: i64 = value.parse().map_err(|_| FieldError::NotAnInteger {
    field,
    value: value.to_string(),
  })?;
  u32::try_from(n).map_err(|_| FieldError::OutOfRange {
    field,
    value: value.to_string(),
  })
}

fn parse_days(field: UserField, value: &str) -> Result<i64, FieldError> {
  let value = value.trim();
  value.parse().map_err(|_| FieldError::NotAnInteger {
    field,
    value: value.to_string(),
  })
}

/// Indexed by `UserField as usize`; order must follow the enum.
static FIELD_TABLE: [FieldAccess; 20] = [
  FieldAccess {
    label: "name",
    get: |u| u.name.clone(),
    set: None,
  },
  FieldAccess {
    label: "uid",
    get: |u| u.uid.to_string(),
    set: Some(|u, v| {
      u.uid = parse_id(UserField::Uid, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "gid",
    get: |u| u.gid.to_string(),
    set: Some(|u, v| {
      u.gid = parse_id(UserField::Gid, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "primary_group",
    get: |u| u.primary_group.clone(),
    set: Some(|u, v| {
      u.primary_group = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "real_name",
    get: |u| u.gecos.real_name.clone(),
    set: Some(|u, v| {
      u.gecos.real_name = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "office",
    get: |u| u.gecos.office.clone(),
    set: Some(|u, v| {
      u.gecos.office = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "work_phone",
    get: |u| u.gecos.work_phone.clone(),
    set: Some(|u, v| {
      u.gecos.work_phone = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "home_phone",
    get: |u| u.gecos.home_phone.clone(),
    set: Some(|u, v| {
      u.gecos.home_phone = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "other",
    get: |u| u.gecos.other.clone(),
    set: Some(|u, v| {
      u.gecos.other = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "home",
    get: |u| u.home.clone(),
    set: Some(|u, v| {
      u.home = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "shell",
    get: |u| u.shell.clone(),
    set: Some(|u, v| {
      u.shell = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "groups",
    get: |u| u.groups.join(","),
    set: Some(|u, v| {
      u.groups = v
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
      Ok(())
    }),
  },
  FieldAccess {
    label: "last_change",
    get: |u| u.aging.last_change.to_string(),
    set: Some(|u, v| {
      u.aging.last_change = parse_days(UserField::LastChange, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "min_days",
    get: |u| u.aging.min.to_string(),
    set: Some(|u, v| {
      u.aging.min = parse_days(UserField::MinDays, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "max_days",
    get: |u| u.aging.max.to_string(),
    set: Some(|u, v| {
      u.aging.max = parse_days(UserField::MaxDays, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "warn_days",
    get: |u| u.aging.warn.to_string(),
    set: Some(|u, v| {
      u.aging.warn = parse_days(UserField::WarnDays, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "inactive_days",
    get: |u| u.aging.inactive.to_string(),
    set: Some(|u, v| {
      u.aging.inactive = parse_days(UserField::InactiveDays, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "expire_days",
    get: |u| u.aging.expire.to_string(),
    set: Some(|u, v| {
      u.aging.expire = parse_days(UserField::ExpireDays, v)?;
      Ok(())
    }),
  },
  FieldAccess {
    label: "password",
    get: |u| u.password.clone(),
    set: Some(|u, v| {
      u.password = v.to_string();
      Ok(())
    }),
  },
  FieldAccess {
    label: "plain_password",
    get: |u| u.plain_password.clone().unwrap_or_default(),
    set: None,
  },
];
