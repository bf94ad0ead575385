//! Entity model: users, groups and the sets that own them.

pub mod field;
pub mod group;
pub mod set;
pub mod user;

pub use field::{FieldError, UserField};
pub use group::Group;
pub use set::{AccountSet, SetError};
pub use user::{Aging, Gecos, User, days_since_epoch};
