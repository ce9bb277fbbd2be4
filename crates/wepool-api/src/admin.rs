//! Staff batch and reporting endpoints: `/bulk`, `/sweep` and `/stats`.

use axum::{Json, extract::State};
use serde::Deserialize;
use uuid::Uuid;
use wepool_core::{
  store::{DashboardStats, MemberStore},
  workflow::{self, BulkAction, BulkReport, SweepReport},
};

use crate::{AppState, auth::CurrentActor, error::ApiError};

/// `{"member_ids":[...],"action":"set_status","status":"green"}` or
/// `{"member_ids":[...],"action":"toggle_active"}`. A `set_status` without a
/// status is rejected by the extractor.
#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub member_ids: Vec<Uuid>,
  #[serde(flatten)]
  pub action:     BulkAction,
}

/// `POST /bulk`: best effort; the report lists per-member failures.
pub async fn bulk<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<BulkBody>,
) -> Result<Json<BulkReport>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let report =
    workflow::bulk_update(&*state.store, &actor, &body.member_ids, body.action)
      .await?;
  Ok(Json(report))
}

/// `POST /sweep`: run the qualification checks over every candidate.
pub async fn sweep<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<SweepReport>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  actor.require_staff()?;
  Ok(Json(workflow::check_qualifications(&*state.store).await?))
}

/// `GET /stats`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<DashboardStats>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(workflow::dashboard_stats(&*state.store, &actor).await?))
}
