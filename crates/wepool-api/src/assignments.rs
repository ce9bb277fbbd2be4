//! Handlers for the assignment matcher.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/pools` | Eligible yellow and sponsored members |
//! | `GET`  | `/assignments` | `?limit=` (default 10) most recent completed |
//! | `POST` | `/assignments` | Body: [`AssignBody`]; returns 201 |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use wepool_core::{
  assignment::{self, Assignment, Pools},
  store::MemberStore,
};

use crate::{AppState, auth::CurrentActor, error::ApiError};

/// `GET /pools`
pub async fn pools<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Pools>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(assignment::pools(&*state.store, &actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
  pub limit: Option<usize>,
}

/// `GET /assignments[?limit=n]`
pub async fn recent<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Assignment>>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let limit = params.limit.unwrap_or(10);
  Ok(Json(assignment::recent(&*state.store, &actor, limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub yellow_member_id:    Uuid,
  pub sponsored_member_id: Uuid,
}

/// `POST /assignments`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<AssignBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let created = assignment::assign(
    &*state.store,
    &actor,
    body.yellow_member_id,
    body.sponsored_member_id,
  )
  .await?;
  Ok((StatusCode::CREATED, Json(created)))
}
