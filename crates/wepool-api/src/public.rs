//! Unauthenticated endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/register` | Body: [`RegisterBody`]; returns 201 |
//! | `GET`  | `/verify/{token}` | Email verification link target |
//! | `GET`  | `/referrers/{phone}` | 404 if no member has that phone |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use wepool_core::{
  Error as CoreError,
  member::{Member, MemberKind, ProfileDetails},
  store::MemberStore,
  workflow::{self, ReferrerSummary, RegistrationForm},
};

use crate::{AppState, auth::hash_password, error::ApiError};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub username:              String,
  pub email:                 String,
  pub first_name:            String,
  pub last_name:             String,
  pub password:              String,
  pub phone:                 String,
  pub referrer_phone:        Option<String>,
  pub kind:                  MemberKind,
  pub date_of_birth:         Option<NaiveDate>,
  #[serde(default)]
  pub city:                  String,
  #[serde(default)]
  pub state:                 String,
  #[serde(default)]
  pub country:               String,
  #[serde(default)]
  pub zip_code:              String,
  #[serde(default)]
  pub agreed_to_terms:       bool,
  #[serde(default)]
  pub communications_opt_in: bool,
}

/// `POST /register`: returns 201 with the created account and member.
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  if body.password.chars().count() < MIN_PASSWORD_LEN {
    return Err(
      CoreError::Validation(format!(
        "password must be at least {MIN_PASSWORD_LEN} characters"
      ))
      .into(),
    );
  }
  let password_hash =
    hash_password(&body.password).map_err(|e| ApiError::Internal(e.to_string()))?;

  let form = RegistrationForm {
    username: body.username,
    email: body.email,
    first_name: body.first_name,
    last_name: body.last_name,
    password_hash,
    phone: body.phone,
    referrer_phone: body.referrer_phone,
    kind: body.kind,
    details: ProfileDetails {
      date_of_birth:         body.date_of_birth,
      city:                  body.city,
      state:                 body.state,
      country:               body.country,
      zip_code:              body.zip_code,
      agreed_to_terms:       body.agreed_to_terms,
      terms_agreed_at:       None,
      communications_opt_in: body.communications_opt_in,
    },
  };

  let outcome =
    workflow::register(&*state.store, &*state.notifier, &state.mail, form).await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

// ─── Verify ──────────────────────────────────────────────────────────────────

/// `GET /verify/{token}`
pub async fn verify<S>(
  State(state): State<AppState<S>>,
  Path(token): Path<Uuid>,
) -> Result<Json<Member>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let member = workflow::verify_email(&*state.store, token).await?;
  Ok(Json(member))
}

// ─── Referrer lookup ─────────────────────────────────────────────────────────

/// `GET /referrers/{phone}`
pub async fn referrer<S>(
  State(state): State<AppState<S>>,
  Path(phone): Path<String>,
) -> Result<Json<ReferrerSummary>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let summary = workflow::lookup_referrer(&*state.store, &phone)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no member with phone {phone}")))?;
  Ok(Json(summary))
}
