//! The assignment matcher: pairing a yellow member, who pays a sponsorship
//! forward, with a qualified sponsored member, whose membership it settles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::Actor,
  member::{Member, MemberKind, Status},
  store::{Changeset, MemberQuery, MemberStore, commit_changes},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub assignment_id:       Uuid,
  pub yellow_member_id:    Uuid,
  pub sponsored_member_id: Uuid,
  pub assigned_at:         DateTime<Utc>,
  pub completed:           bool,
}

// ─── Pools ───────────────────────────────────────────────────────────────────

/// A yellow member who has not yet paid for a sponsored member.
pub fn is_yellow_eligible(member: &Member) -> bool {
  member.status == Status::Yellow && !member.paid_for_sponsored
}

/// A qualified sponsored member whose own membership is still unpaid.
pub fn is_sponsored_eligible(member: &Member) -> bool {
  member.kind == MemberKind::Sponsored
    && member.status == Status::Qualified
    && !member.paid_for_self
}

impl MemberQuery {
  pub fn yellow_pool() -> Self {
    Self {
      statuses: vec![Status::Yellow],
      paid_for_sponsored: Some(false),
      ..Self::default()
    }
  }

  pub fn sponsored_pool() -> Self {
    Self {
      kind: Some(MemberKind::Sponsored),
      statuses: vec![Status::Qualified],
      paid_for_self: Some(false),
      ..Self::default()
    }
  }
}

/// Both selection pools, as shown on the assignment screen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Pools {
  pub yellow:    Vec<Member>,
  pub sponsored: Vec<Member>,
}

pub async fn pools<S: MemberStore>(store: &S, actor: &Actor) -> Result<Pools> {
  actor.require_staff()?;
  let yellow = store
    .list_members(&MemberQuery::yellow_pool())
    .await
    .map_err(Error::store)?;
  let sponsored = store
    .list_members(&MemberQuery::sponsored_pool())
    .await
    .map_err(Error::store)?;
  Ok(Pools { yellow, sponsored })
}

// ─── Assign ──────────────────────────────────────────────────────────────────

/// Pair `yellow_id` with `sponsored_id`.
///
/// The assignment record, the yellow member's `paid_for_sponsored` flag and
/// the sponsored member's settlement (`green` + `paid_for_self`) are written
/// in one commit. There is no undo.
pub async fn assign<S: MemberStore>(
  store: &S,
  actor: &Actor,
  yellow_id: Uuid,
  sponsored_id: Uuid,
) -> Result<Assignment> {
  actor.require_staff()?;
  if yellow_id == sponsored_id {
    return Err(Error::Conflict(
      "cannot assign a member to themselves".into(),
    ));
  }

  let mut yellow = store
    .get_member(yellow_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::MemberNotFound(yellow_id))?;
  let mut sponsored = store
    .get_member(sponsored_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::MemberNotFound(sponsored_id))?;

  if !is_yellow_eligible(&yellow) {
    return Err(Error::Conflict(format!(
      "member {yellow_id} is not an unpaid yellow member"
    )));
  }
  if !is_sponsored_eligible(&sponsored) {
    return Err(Error::Conflict(format!(
      "member {sponsored_id} is not an unpaid qualified sponsored member"
    )));
  }

  let mut assignment = Assignment {
    assignment_id:       Uuid::new_v4(),
    yellow_member_id:    yellow_id,
    sponsored_member_id: sponsored_id,
    assigned_at:         Utc::now(),
    completed:           false,
  };

  yellow.paid_for_sponsored = true;
  sponsored.status = Status::Green;
  sponsored.paid_for_self = true;
  assignment.completed = true;

  // Both members are re-checked under the transaction: a concurrent
  // assignment that settled either of them first turns this into a conflict.
  commit_changes(
    store,
    Changeset::new()
      .member(yellow)
      .member(sponsored)
      .assignment(assignment.clone()),
  )
  .await?;

  tracing::info!(
    assignment = %assignment.assignment_id,
    yellow = %yellow_id,
    sponsored = %sponsored_id,
    by = %actor.username,
    "assignment completed"
  );

  Ok(assignment)
}

/// Most recent completed assignments, newest first.
pub async fn recent<S: MemberStore>(
  store: &S,
  actor: &Actor,
  limit: usize,
) -> Result<Vec<Assignment>> {
  actor.require_staff()?;
  store
    .list_assignments(Some(true), Some(limit))
    .await
    .map_err(Error::store)
}
