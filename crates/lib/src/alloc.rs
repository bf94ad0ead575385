//! Free user/group id search.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use crate::model::AccountSet;

/// Which id space of a set to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
  /// Uids of the set's users.
  Uid,
  /// Gids of the set's groups.
  Gid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
  #[default]
  Ascending,
  Descending,
}

/// Parameters of a free-id search.
#[derive(Debug, Clone)]
pub struct IdQuery<'a> {
  pub kind: IdKind,
  pub range: RangeInclusive<u32>,
  pub direction: Direction,
  /// An id that counts as free even if used, e.g. the current id of the
  /// record being edited.
  pub treat_as_free: Option<u32>,
  /// Ids to avoid in addition to those used in the set.
  pub reserved: &'a [u32],
}

impl<'a> IdQuery<'a> {
  pub fn new(kind: IdKind, range: RangeInclusive<u32>) -> Self {
    Self {
      kind,
      range,
      direction: Direction::Ascending,
      treat_as_free: None,
      reserved: &[],
    }
  }

  pub fn descending(mut self) -> Self {
    self.direction = Direction::Descending;
    self
  }

  pub fn treat_as_free(mut self, id: u32) -> Self {
    self.treat_as_free = Some(id);
    self
  }

  pub fn reserved(mut self, reserved: &'a [u32]) -> Self {
    self.reserved = reserved;
    self
  }
}

/// Return the first id in the query range, scanned in the query direction,
/// that equals `treat_as_free` or is used neither by `set` nor in `reserved`.
///
/// Returns `None` when the range is exhausted.
pub fn find_free(set: &AccountSet, query: &IdQuery<'_>) -> Option<u32> {
  let mut used: HashSet<u32> = match query.kind {
    IdKind::Uid => set.uids().collect(),
    IdKind::Gid => set.gids().collect(),
  };
  used.extend(query.reserved.iter().copied());

  let is_free = |id: &u32| Some(*id) == query.treat_as_free || !used.contains(id);

  match query.direction {
    Direction::Ascending => query.range.clone().find(is_free),
    Direction::Descending => query.range.clone().rev().find(is_free),
  }
}
