//! Host platform queries.

pub mod paths;

/// True when running with root privileges, which the account tools require.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}
