//! HTTP Basic-auth extractor resolving the calling [`Actor`].
//!
//! Credentials are checked against the accounts table: the username must
//! exist, the account must be active, and the password must verify against
//! the stored argon2 PHC string.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use wepool_core::{Error as CoreError, account::Actor, store::MemberStore};

use crate::{AppState, error::ApiError};

/// The authenticated caller. Present in a handler means the request carried
/// valid credentials for an active account.
pub struct CurrentActor(pub Actor);

/// Hash `password` into an argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)?
      .to_string(),
  )
}

/// Split a `Basic` authorization header into username and password.
fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((username.to_owned(), password.to_owned()))
}

fn verify_password(password: &str, hash: &str) -> Result<(), ApiError> {
  let parsed = PasswordHash::new(hash).map_err(|_| ApiError::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .map_err(|_| ApiError::Unauthorized)
}

impl<S> FromRequestParts<AppState<S>> for CurrentActor
where
  S: MemberStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (username, password) = basic_credentials(&parts.headers)?;

    let account = state
      .store
      .find_account_by_username(&username)
      .await
      .map_err(CoreError::store)?
      .ok_or(ApiError::Unauthorized)?;

    verify_password(&password, &account.password_hash)?;
    if !account.is_active {
      tracing::debug!(%username, "rejected inactive account");
      return Err(ApiError::Unauthorized);
    }

    Ok(CurrentActor(account.actor()))
  }
}
