//! Referral edges and the bounded referral tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  member::{Member, MemberKind, Status},
  store::MemberStore,
};

/// How many levels below a member the dashboard shows.
pub const DEFAULT_DEPTH: usize = 4;

/// A directed "referrer introduced referred" relationship. Unique per
/// ordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
  pub referral_id: Uuid,
  pub referrer_id: Uuid,
  pub referred_id: Uuid,
  pub created_at:  DateTime<Utc>,
}

// ─── Tree ────────────────────────────────────────────────────────────────────

/// The forward referral tree of a member, flattened into levels. `levels[0]`
/// holds direct referrals. Always exactly `depth` levels long; levels past
/// the last non-empty one are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferralTree {
  pub root:   Uuid,
  pub levels: Vec<Vec<Member>>,
}

impl ReferralTree {
  /// Level `n`, 1-based; `None` beyond the computed depth.
  pub fn level(&self, n: usize) -> Option<&[Member]> {
    n.checked_sub(1)
      .and_then(|i| self.levels.get(i))
      .map(Vec::as_slice)
  }

  pub fn depth(&self) -> usize { self.levels.len() }

  pub fn total(&self) -> usize { self.levels.iter().map(Vec::len).sum() }
}

/// Walk the referral edges breadth-first from `root`, at most `depth`
/// levels down. Stops querying as soon as a level comes back empty.
///
/// Cycles are not detected: a cyclic edge set just repeats members until
/// the depth bound cuts it off.
pub async fn build_tree<S: MemberStore>(
  store: &S,
  root: Uuid,
  depth: usize,
) -> Result<ReferralTree> {
  let mut levels: Vec<Vec<Member>> = Vec::with_capacity(depth);
  let mut frontier = vec![root];

  while levels.len() < depth {
    if frontier.is_empty() {
      levels.push(Vec::new());
      continue;
    }
    let next = store
      .referred_by(&frontier)
      .await
      .map_err(Error::store)?;
    tracing::debug!(
      root = %root,
      level = levels.len() + 1,
      size = next.len(),
      "referral level resolved"
    );
    frontier = next.iter().map(|m| m.member_id).collect();
    levels.push(next);
  }

  Ok(ReferralTree { root, levels })
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Direct-referral counters shown on member pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
  pub total:     usize,
  pub paying:    usize,
  pub sponsored: usize,
  /// Referred members currently `yellow` or `green`.
  pub active:    usize,
}

impl ReferralStats {
  pub fn from_referrals(referrals: &[Member]) -> Self {
    referrals.iter().fold(Self::default(), |mut acc, m| {
      acc.total += 1;
      match m.kind {
        MemberKind::Paying => acc.paying += 1,
        MemberKind::Sponsored => acc.sponsored += 1,
      }
      if matches!(m.status, Status::Yellow | Status::Green) {
        acc.active += 1;
      }
      acc
    })
  }
}

/// Direct referrals of `member_id` and their counters.
pub async fn direct_referrals<S: MemberStore>(
  store: &S,
  member_id: Uuid,
) -> Result<(Vec<Member>, ReferralStats)> {
  let referrals = store
    .referred_by(&[member_id])
    .await
    .map_err(Error::store)?;
  let stats = ReferralStats::from_referrals(&referrals);
  Ok((referrals, stats))
}
