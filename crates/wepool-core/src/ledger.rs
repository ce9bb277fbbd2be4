//! The override ledger.
//!
//! Staff may suspend the automatic qualification checks for a member, and a
//! superuser may grant a member administrative capability regardless of the
//! promotion rules. Every override carries a reason, the acting account and a
//! timestamp. Applying or removing one commits the member, the member's
//! account and any resulting status change as a single [`Changeset`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::{Account, Actor},
  member::{Member, OverrideStamp},
  qualification::{self, Evaluation},
  store::{Changeset, MemberQuery, MemberStore, OverrideFilter, commit_changes},
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverrideKind {
  /// Suspends the yellow and sponsored checks. Any staff member.
  Qualification,
  /// Grants administrative capability. Superusers only.
  AdminPromotion,
}

impl OverrideKind {
  fn authorize(self, actor: &Actor) -> Result<()> {
    actor.require_staff()?;
    if self == Self::AdminPromotion {
      actor.require_superuser()?;
    }
    Ok(())
  }

  fn slot(self, member: &mut Member) -> &mut Option<OverrideStamp> {
    match self {
      Self::Qualification => &mut member.qualification_override,
      Self::AdminPromotion => &mut member.admin_override,
    }
  }
}

/// The state committed by an apply or remove.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideOutcome {
  pub member:        Member,
  pub account:       Account,
  /// Checks that fired when a qualification override was removed.
  pub evaluation:    Evaluation,
  /// Whether the account's administrative capability changed.
  pub staff_changed: bool,
}

async fn load_pair<S: MemberStore>(
  store: &S,
  member_id: Uuid,
) -> Result<(Member, Account)> {
  let member = store
    .get_member(member_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::MemberNotFound(member_id))?;
  let account = store
    .get_account(member.account_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::AccountNotFound(member.account_id))?;
  Ok((member, account))
}

/// Activate an override of `kind` on a member. Re-applying replaces the
/// existing stamp.
pub async fn apply<S: MemberStore>(
  store: &S,
  actor: &Actor,
  member_id: Uuid,
  kind: OverrideKind,
  reason: &str,
) -> Result<OverrideOutcome> {
  kind.authorize(actor)?;
  let reason = reason.trim();
  if reason.is_empty() {
    return Err(Error::Validation(format!(
      "a reason is required for a {kind} override"
    )));
  }

  let (mut member, mut account) = load_pair(store, member_id).await?;

  *kind.slot(&mut member) = Some(OverrideStamp {
    reason: reason.to_owned(),
    by:     Some(actor.account_id),
    at:     Utc::now(),
  });

  let staff_changed = kind == OverrideKind::AdminPromotion && !account.is_staff;
  if kind == OverrideKind::AdminPromotion {
    account.is_staff = true;
  }

  commit_changes(
    store,
    Changeset::new().member(member.clone()).account(account.clone()),
  )
  .await?;

  tracing::info!(
    member = %member_id,
    %kind,
    by = %actor.username,
    reason,
    "override applied"
  );

  Ok(OverrideOutcome {
    member,
    account,
    evaluation: Evaluation::default(),
    staff_changed,
  })
}

/// Clear an override of `kind` and let the automatic rules take over again.
///
/// Removing a qualification override re-runs both checks rather than
/// restoring any earlier status. Removing an admin-promotion override revokes
/// administrative capability unless the member is promotable on its own.
pub async fn remove<S: MemberStore>(
  store: &S,
  actor: &Actor,
  member_id: Uuid,
  kind: OverrideKind,
) -> Result<OverrideOutcome> {
  kind.authorize(actor)?;

  let (mut member, mut account) = load_pair(store, member_id).await?;
  *kind.slot(&mut member) = None;

  let mut evaluation = Evaluation::default();
  let mut staff_changed = false;
  match kind {
    OverrideKind::Qualification => {
      evaluation = qualification::evaluate(store, &mut member).await?;
    }
    OverrideKind::AdminPromotion => {
      if !qualification::is_promotable(&member) && account.is_staff {
        account.is_staff = false;
        staff_changed = true;
      }
    }
  }

  commit_changes(
    store,
    Changeset::new().member(member.clone()).account(account.clone()),
  )
  .await?;

  tracing::info!(
    member = %member_id,
    %kind,
    by = %actor.username,
    status = %member.status,
    staff_revoked = staff_changed,
    "override removed"
  );

  Ok(OverrideOutcome { member, account, evaluation, staff_changed })
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Members with an active override, newest override first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverrideHistory {
  pub qualification:   Vec<Member>,
  pub admin_promotion: Vec<Member>,
}

pub async fn history<S: MemberStore>(
  store: &S,
  actor: &Actor,
) -> Result<OverrideHistory> {
  actor.require_staff()?;

  let mut qualification = store
    .list_members(&MemberQuery {
      overrides: Some(OverrideFilter::Overridden),
      ..MemberQuery::default()
    })
    .await
    .map_err(Error::store)?;
  qualification.sort_by(|a, b| {
    let at = |m: &Member| m.qualification_override.as_ref().map(|s| s.at);
    at(b).cmp(&at(a))
  });

  let mut admin_promotion = store
    .list_members(&MemberQuery {
      overrides: Some(OverrideFilter::AdminOverridden),
      ..MemberQuery::default()
    })
    .await
    .map_err(Error::store)?;
  admin_promotion.sort_by(|a, b| {
    let at = |m: &Member| m.admin_override.as_ref().map(|s| s.at);
    at(b).cmp(&at(a))
  });

  Ok(OverrideHistory { qualification, admin_promotion })
}

/// One row of a member's active-override audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideEntry {
  pub kind:  OverrideKind,
  #[serde(flatten)]
  pub stamp: OverrideStamp,
}

/// The active overrides on a single member.
pub fn entries(member: &Member) -> Vec<OverrideEntry> {
  [
    (OverrideKind::Qualification, &member.qualification_override),
    (OverrideKind::AdminPromotion, &member.admin_override),
  ]
  .into_iter()
  .filter_map(|(kind, stamp)| {
    stamp.clone().map(|stamp| OverrideEntry { kind, stamp })
  })
  .collect()
}
