//! Error type for `wepool-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value no variant matches.
  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  #[error("referral {referrer} -> {referred} already exists")]
  DuplicateReferral {
    referrer: uuid::Uuid,
    referred: uuid::Uuid,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
