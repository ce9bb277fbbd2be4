//! Error types for `wepool-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A required field is missing or malformed.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The acting account lacks the capability the operation requires.
  #[error("permission denied: {0}")]
  Permission(String),

  /// The operation is incompatible with the current state (e.g. an
  /// ineligible or identical assignment pair).
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("member not found: {0}")]
  MemberNotFound(Uuid),

  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  /// The account exists but has no member profile attached.
  #[error("account {0} has no member profile")]
  NoProfile(Uuid),

  #[error("unknown verification token")]
  TokenNotFound,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error. Used as `.map_err(Error::store)` on store calls.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
