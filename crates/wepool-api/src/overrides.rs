//! Handlers for the override ledger.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/members/{id}/overrides` | Body: `{"kind":"qualification","reason":"..."}` |
//! | `DELETE` | `/members/{id}/overrides/{kind}` | `kind` is `qualification` or `admin_promotion` |
//! | `GET`    | `/overrides` | Every member with an active override |

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;
use wepool_core::{
  ledger::{self, OverrideHistory, OverrideKind, OverrideOutcome},
  store::MemberStore,
};

use crate::{AppState, auth::CurrentActor, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ApplyBody {
  pub kind:   OverrideKind,
  #[serde(default)]
  pub reason: String,
}

/// `POST /members/{id}/overrides`
pub async fn apply<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<ApplyBody>,
) -> Result<Json<OverrideOutcome>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let outcome = ledger::apply(&*state.store, &actor, id, body.kind, &body.reason).await?;
  Ok(Json(outcome))
}

/// `DELETE /members/{id}/overrides/{kind}`
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path((id, kind)): Path<(Uuid, OverrideKind)>,
) -> Result<Json<OverrideOutcome>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(ledger::remove(&*state.store, &actor, id, kind).await?))
}

/// `GET /overrides`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<OverrideHistory>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(ledger::history(&*state.store, &actor).await?))
}
