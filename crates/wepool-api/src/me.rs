//! Self-service endpoints for the authenticated member.

use axum::{Json, extract::State};
use serde::Deserialize;
use wepool_core::{
  member::Member,
  store::MemberStore,
  workflow::{self, ExternalUpdate, MemberDashboard, ProfileUpdate},
};

use crate::{AppState, auth::CurrentActor, error::ApiError};

/// `GET /me`: own record, four referral levels and referral counters.
pub async fn dashboard<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<MemberDashboard>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(workflow::my_dashboard(&*state.store, &actor).await?))
}

/// `PATCH /me` with any of `date_of_birth`, `city`, `state`, `country`,
/// `zip_code` and `communications_opt_in`.
pub async fn update_profile<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<ProfileUpdate>,
) -> Result<Json<Member>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(workflow::update_profile(&*state.store, &actor, body).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExternalBody {
  pub registered: bool,
  pub link:       Option<String>,
}

/// `POST /me/external` with `{"registered":true,"link":"https://..."}`
pub async fn external<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<ExternalBody>,
) -> Result<Json<ExternalUpdate>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let update =
    workflow::update_external(&*state.store, &actor, body.registered, body.link)
      .await?;
  Ok(Json(update))
}
