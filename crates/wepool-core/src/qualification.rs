//! The qualification engine.
//!
//! The decision functions are pure: they inspect a member, possibly move its
//! status forward, and report whether they did. Persisting the result is the
//! caller's job, which lets a check run inside a larger atomic change (an
//! override removal, an admin edit) as well as on its own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  member::{Member, MemberKind, Status},
  store::{Changeset, MemberStore, commit_changes},
};

/// Paying direct referrals a sponsored member needs to qualify.
pub const PAYING_REFERRAL_THRESHOLD: usize = 4;

// ─── Pure decisions ──────────────────────────────────────────────────────────

/// Move a `pending` member to `yellow` once they have verified their email
/// and registered externally with a link.
///
/// Suppressed while a qualification override is active. Never demotes a
/// member already past `pending`.
pub fn yellow_check(member: &mut Member) -> bool {
  if member.is_qualification_overridden() || member.status != Status::Pending {
    return false;
  }
  if !(member.verified_email
    && member.externally_registered
    && member.has_external_link())
  {
    return false;
  }
  member.status = Status::Yellow;
  true
}

/// Whether [`sponsored_check`] could fire for this member at all, i.e.
/// whether counting its referrals is worth a query.
pub fn sponsored_candidate(member: &Member) -> bool {
  !member.is_qualification_overridden()
    && member.kind == MemberKind::Sponsored
    && matches!(member.status, Status::Pending | Status::Yellow)
}

/// Move a sponsored member to `qualified` once `paying_referrals` reaches
/// [`PAYING_REFERRAL_THRESHOLD`].
pub fn sponsored_check(member: &mut Member, paying_referrals: usize) -> bool {
  if !sponsored_candidate(member) || paying_referrals < PAYING_REFERRAL_THRESHOLD
  {
    return false;
  }
  member.status = Status::Qualified;
  true
}

/// Eligibility for administrative capability. Derived, never stored.
pub fn is_promotable(member: &Member) -> bool {
  if member.is_admin_overridden() {
    return true;
  }
  member.status == Status::Green && member.paid_for_self && member.paid_for_sponsored
}

// ─── Store-backed evaluation ─────────────────────────────────────────────────

/// Which checks fired during an [`evaluate`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
  pub yellow:    bool,
  pub qualified: bool,
}

impl Evaluation {
  pub fn changed(&self) -> bool { self.yellow || self.qualified }
}

/// Run both checks against an in-memory member, reading its referral count
/// only when the sponsored check could fire. Does not persist.
pub async fn evaluate<S: MemberStore>(
  store: &S,
  member: &mut Member,
) -> Result<Evaluation> {
  let yellow = yellow_check(member);
  let qualified = if sponsored_candidate(member) {
    let paying = store
      .count_referrals(member.member_id, Some(MemberKind::Paying))
      .await
      .map_err(Error::store)?;
    sponsored_check(member, paying)
  } else {
    false
  };
  Ok(Evaluation { yellow, qualified })
}

async fn load<S: MemberStore>(store: &S, member_id: Uuid) -> Result<Member> {
  store
    .get_member(member_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::MemberNotFound(member_id))
}

/// Load, run the yellow check, and persist immediately if it fired.
pub async fn run_yellow_check<S: MemberStore>(
  store: &S,
  member_id: Uuid,
) -> Result<bool> {
  let mut member = load(store, member_id).await?;
  if !yellow_check(&mut member) {
    return Ok(false);
  }
  commit_changes(store, Changeset::new().member(member)).await?;
  tracing::info!(member = %member_id, "member moved to yellow");
  Ok(true)
}

/// Load, run the sponsored check, and persist immediately if it fired.
pub async fn run_sponsored_check<S: MemberStore>(
  store: &S,
  member_id: Uuid,
) -> Result<bool> {
  let mut member = load(store, member_id).await?;
  if !sponsored_candidate(&member) {
    return Ok(false);
  }
  let paying = store
    .count_referrals(member_id, Some(MemberKind::Paying))
    .await
    .map_err(Error::store)?;
  if !sponsored_check(&mut member, paying) {
    return Ok(false);
  }
  commit_changes(store, Changeset::new().member(member)).await?;
  tracing::info!(member = %member_id, paying, "sponsored member qualified");
  Ok(true)
}
