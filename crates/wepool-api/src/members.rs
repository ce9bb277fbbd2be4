//! Staff endpoints over individual members.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/members` | Filters and queues: [`ListParams`] |
//! | `GET`    | `/members/{id}` | Detail view with referrals and overrides |
//! | `PATCH`  | `/members/{id}` | Body: [`MemberEdit`]; re-runs the checks |
//! | `DELETE` | `/members/{id}` | 204; removes account, edges, assignments |
//! | `GET`    | `/members/{id}/referrals` | `?depth=` (default 4, max [`MAX_TREE_DEPTH`]) |
//! | `POST`   | `/members/{id}/status` | Body: `{"decision":"approve"\|"reject"}` |

use std::str::FromStr;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;
use wepool_core::{
  Error as CoreError,
  member::{Member, MemberKind, Status},
  referral::{self, DEFAULT_DEPTH, ReferralTree},
  store::{MemberQuery, MemberStore, OverrideFilter},
  workflow::{self, EditOutcome, MemberDetail, MemberEdit},
};

use crate::{AppState, auth::CurrentActor, error::ApiError};

/// Deepest referral tree a caller may request.
pub const MAX_TREE_DEPTH: usize = 8;

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// `paying` or `sponsored`: that kind's pending review queue. Takes
  /// precedence over `kind` and `status`.
  pub queue:              Option<MemberKind>,
  pub kind:               Option<MemberKind>,
  /// Comma-separated statuses, e.g. `pending,yellow`.
  pub status:             Option<String>,
  pub overrides:          Option<OverrideFilter>,
  pub paid_for_self:      Option<bool>,
  pub paid_for_sponsored: Option<bool>,
  /// Free text over phone, username, email and names.
  pub q:                  Option<String>,
  pub limit:              Option<usize>,
  pub offset:             Option<usize>,
}

impl TryFrom<ListParams> for MemberQuery {
  type Error = CoreError;

  fn try_from(p: ListParams) -> Result<Self, Self::Error> {
    if let Some(kind) = p.queue {
      return Ok(MemberQuery {
        text: p.q,
        limit: p.limit,
        offset: p.offset,
        ..MemberQuery::queue(kind)
      });
    }

    let statuses = p
      .status
      .as_deref()
      .map(|s| {
        s.split(',')
          .map(str::trim)
          .filter(|t| !t.is_empty())
          .map(|t| {
            Status::from_str(t)
              .map_err(|_| CoreError::Validation(format!("unknown status {t:?}")))
          })
          .collect::<Result<Vec<_>, _>>()
      })
      .transpose()?
      .unwrap_or_default();

    Ok(MemberQuery {
      kind: p.kind,
      statuses,
      overrides: p.overrides,
      paid_for_self: p.paid_for_self,
      paid_for_sponsored: p.paid_for_sponsored,
      text: p.q,
      limit: p.limit,
      offset: p.offset,
    })
  }
}

/// `GET /members[?kind=..][&status=..][&overrides=..][&q=..][&limit=..][&offset=..]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Member>>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let query = MemberQuery::try_from(params)?;
  Ok(Json(workflow::list_members(&*state.store, &actor, &query).await?))
}

// ─── Get / edit / delete ─────────────────────────────────────────────────────

/// `GET /members/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<Json<MemberDetail>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(workflow::member_detail(&*state.store, &actor, id).await?))
}

/// `PATCH /members/{id}`
pub async fn edit<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<MemberEdit>,
) -> Result<Json<EditOutcome>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  Ok(Json(workflow::edit_member(&*state.store, &actor, id, body).await?))
}

/// `DELETE /members/{id}`
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  workflow::delete_member(&*state.store, &actor, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Referral tree ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TreeParams {
  pub depth: Option<usize>,
}

/// `GET /members/{id}/referrals[?depth=n]`
pub async fn referrals<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Query(params): Query<TreeParams>,
) -> Result<Json<ReferralTree>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  actor.require_staff()?;
  let depth = params.depth.unwrap_or(DEFAULT_DEPTH);
  if !(1..=MAX_TREE_DEPTH).contains(&depth) {
    return Err(
      CoreError::Validation(format!("depth must be between 1 and {MAX_TREE_DEPTH}"))
        .into(),
    );
  }

  let store = &*state.store;
  if store
    .get_member(id)
    .await
    .map_err(CoreError::store)?
    .is_none()
  {
    return Err(CoreError::MemberNotFound(id).into());
  }
  Ok(Json(referral::build_tree(store, id, depth).await?))
}

// ─── Yellow queue decision ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
  /// Move to `yellow`.
  Approve,
  /// Send back to `pending`.
  Reject,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub decision: Decision,
}

/// `POST /members/{id}/status`
pub async fn set_status<S>(
  State(state): State<AppState<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<Member>, ApiError>
where
  S: MemberStore + Clone + 'static,
{
  let status = match body.decision {
    Decision::Approve => Status::Yellow,
    Decision::Reject => Status::Pending,
  };
  Ok(Json(workflow::set_status(&*state.store, &actor, id, status).await?))
}
