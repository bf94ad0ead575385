//! Password hashing and lock-state conventions.

use rand::Rng;
use rand::distributions::Alphanumeric;
use sha_crypt::{Sha512Params, sha512_crypt_b64};
use thiserror::Error;

use crate::consts::SALT_LEN;

#[derive(Debug, Error)]
pub enum PasswordError {
  #[error("failed to hash password: {0}")]
  Hash(String),
}

/// Hash a plaintext password as SHA-512 crypt (`$6$<salt>$<hash>`) with a
/// random alphanumeric salt.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
  let salt: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(SALT_LEN)
    .map(char::from)
    .collect();
  hash_with_salt(plain, &salt)
}

fn hash_with_salt(plain: &str, salt: &str) -> Result<String, PasswordError> {
  let params = Sha512Params::default();
  let hash = sha512_crypt_b64(plain.as_bytes(), salt.as_bytes(), &params)
    .map_err(|e| PasswordError::Hash(format!("{:?}", e)))?;
  Ok(format!("$6${}${}", salt, hash))
}

/// A hash starting with `!` or `*` marks a locked (or never usable) account.
pub fn is_locked(hash: &str) -> bool {
  hash.starts_with('!') || hash.starts_with('*')
}

/// The hash as `usermod -L` leaves it.
pub fn locked(hash: &str) -> String {
  if hash.starts_with('!') {
    hash.to_string()
  } else {
    format!("!{}", hash)
  }
}

/// The hash as `usermod -U` leaves it.
pub fn unlocked(hash: &str) -> String {
  hash.strip_prefix('!').unwrap_or(hash).to_string()
}
