//! Identifier ranges, naming rules and account defaults.

use std::ops::RangeInclusive;

pub const APP_NAME: &str = "usersync";

pub const FIRST_SYSTEM_UID: u32 = 0;
pub const LAST_SYSTEM_UID: u32 = 999;
pub const FIRST_SYSTEM_GID: u32 = 0;
pub const LAST_SYSTEM_GID: u32 = 999;

pub const FIRST_UID: u32 = 1000;
pub const LAST_UID: u32 = 29999;
pub const FIRST_GID: u32 = 1000;
pub const LAST_GID: u32 = 29999;

/// Regular (non-system) user ids.
pub const REGULAR_UIDS: RangeInclusive<u32> = FIRST_UID..=LAST_UID;
/// Regular (non-system) group ids.
pub const REGULAR_GIDS: RangeInclusive<u32> = FIRST_GID..=LAST_GID;

/// User and group names: a lowercase letter followed by lowercase letters, digits, `-` or `_`.
pub const NAME_PATTERN: &str = "^[a-z][-a-z0-9_]*$";

pub const HOME_PREFIX: &str = "/home";
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Placeholder hash for accounts without a usable password.
pub const LOCKED_PASSWORD: &str = "!";

pub const DEFAULT_MIN_DAYS: i64 = 0;
pub const DEFAULT_MAX_DAYS: i64 = 99999;
pub const DEFAULT_WARN_DAYS: i64 = 7;
pub const DEFAULT_INACTIVE_DAYS: i64 = -1;
pub const DEFAULT_EXPIRE_DAYS: i64 = -1;

/// Valid range of the shadow password-aging fields.
pub const AGING_RANGE: RangeInclusive<i64> = -1..=2_147_483_647;

/// Length of the random salt used for password hashes.
pub const SALT_LEN: usize = 8;

/// Default quiet period before a burst of database changes triggers a reload.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;
