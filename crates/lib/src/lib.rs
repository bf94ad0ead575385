//! usersync-lib: reconciliation of local user and group accounts
//!
//! This crate provides:
//! - `model`: users, groups and the account sets they live in
//! - `system`: a live mirror of passwd/shadow/group kept in sync through the
//!   shadow-utils commands and file watching
//! - `import`: diagnosis, resolution and commit of candidate account batches
//! - `alloc`: free uid/gid search

pub mod alloc;
pub mod config;
pub mod consts;
pub mod import;
pub mod model;
pub mod platform;
pub mod system;
pub mod util;
