//! The `MemberStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `wepool-store-sqlite`).
//! Engine, ledger, matcher and workflows depend on this abstraction only.
//!
//! Multi-step mutations never issue several independent writes. They build a
//! [`Changeset`] holding the complete new state of every touched row and
//! hand it to [`MemberStore::commit`], which applies it as one transaction.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result as CoreResult,
  account::{Account, NewAccount},
  assignment::Assignment,
  member::{Member, MemberKind, NewMember, Status},
  referral::ReferralEdge,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Filter on override state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideFilter {
  /// Qualification override active.
  Overridden,
  /// Qualification override inactive.
  Normal,
  /// Admin-promotion override active.
  AdminOverridden,
}

/// Parameters for [`MemberStore::list_members`]. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct MemberQuery {
  pub kind:               Option<MemberKind>,
  /// Any of these statuses; empty means any status.
  pub statuses:           Vec<Status>,
  pub overrides:          Option<OverrideFilter>,
  pub paid_for_self:      Option<bool>,
  pub paid_for_sponsored: Option<bool>,
  /// Case-insensitive substring over phone, username, email and names.
  pub text:               Option<String>,
  pub limit:              Option<usize>,
  pub offset:             Option<usize>,
}

impl MemberQuery {
  pub fn with_status(status: Status) -> Self {
    Self {
      statuses: vec![status],
      ..Self::default()
    }
  }

  /// A review queue: `pending` members of one kind.
  pub fn queue(kind: MemberKind) -> Self {
    Self {
      kind: Some(kind),
      statuses: vec![Status::Pending],
      ..Self::default()
    }
  }
}

// ─── Changeset ───────────────────────────────────────────────────────────────

/// Full-row writes applied atomically by [`MemberStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Changeset {
  pub members:    Vec<Member>,
  pub accounts:   Vec<Account>,
  pub assignment: Option<Assignment>,
}

impl Changeset {
  pub fn new() -> Self { Self::default() }

  /// Add a member row, stamping `updated_at`.
  pub fn member(mut self, mut member: Member) -> Self {
    member.updated_at = Utc::now();
    self.members.push(member);
    self
  }

  pub fn account(mut self, account: Account) -> Self {
    self.accounts.push(account);
    self
  }

  pub fn assignment(mut self, assignment: Assignment) -> Self {
    self.assignment = Some(assignment);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty() && self.accounts.is_empty() && self.assignment.is_none()
  }
}

/// What [`MemberStore::commit`] did with a [`Changeset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
  Applied,
  /// This member row was rewritten after the changeset's copy was read.
  /// Nothing was written.
  Stale(Uuid),
}

/// Commit `changes`, reporting a stale member row as [`Error::Conflict`].
///
/// Workflows decide on rows they read before the transaction starts; the
/// revision check makes the decision and the write one atomic step.
pub async fn commit_changes<S: MemberStore>(
  store: &S,
  changes: Changeset,
) -> CoreResult<()> {
  match store.commit(changes).await.map_err(Error::store)? {
    Commit::Applied => Ok(()),
    Commit::Stale(id) => {
      tracing::warn!(member = %id, "write rejected: member changed concurrently");
      Err(Error::Conflict(format!(
        "member {id} was changed by another request; reload and retry"
      )))
    }
  }
}

// ─── Registration result ─────────────────────────────────────────────────────

/// Everything created by [`MemberStore::register`].
#[derive(Debug, Clone)]
pub struct Registered {
  pub account:  Account,
  pub member:   Member,
  pub referral: Option<ReferralEdge>,
}

// ─── Dashboard counters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
  pub pending:   usize,
  pub yellow:    usize,
  pub green:     usize,
  pub qualified: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
  pub total_members:           usize,
  pub paying_members:          usize,
  pub sponsored_members:       usize,
  pub active_accounts:         usize,
  pub verified_emails:         usize,
  pub status_breakdown:        StatusBreakdown,
  pub qualification_overrides: usize,
  pub admin_overrides:         usize,
  pub recent_registrations:    usize,
  pub completed_assignments:   usize,
  pub pending_assignments:     usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a WePool persistence backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MemberStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Create an account with no member profile (e.g. a bootstrap superuser).
  fn create_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<Account, Self::Error>> + Send + '_;

  fn get_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn find_account_by_username<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  fn find_account_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  // ── Members ───────────────────────────────────────────────────────────

  /// Create an account, its member profile (status `pending`) and, when
  /// `referrer` is given, the referral edge to it, as one transaction.
  fn register(
    &self,
    account: NewAccount,
    member: NewMember,
    referrer: Option<Uuid>,
  ) -> impl Future<Output = Result<Registered, Self::Error>> + Send + '_;

  fn get_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  fn find_member_by_phone<'a>(
    &'a self,
    phone: &'a str,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + 'a;

  fn find_member_by_account(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  fn find_member_by_token(
    &self,
    token: Uuid,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  /// Members matching `query`, newest first.
  fn list_members<'a>(
    &'a self,
    query: &'a MemberQuery,
  ) -> impl Future<Output = Result<Vec<Member>, Self::Error>> + Send + 'a;

  /// Delete a member together with its account, referral edges and
  /// assignments. Returns `false` if the member did not exist.
  fn delete_member(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Referrals ─────────────────────────────────────────────────────────

  /// Record that `referrer` introduced `referred`. Errors if the ordered pair
  /// already exists.
  fn add_referral(
    &self,
    referrer: Uuid,
    referred: Uuid,
  ) -> impl Future<Output = Result<ReferralEdge, Self::Error>> + Send + '_;

  /// Members directly referred by any of `referrers`, in edge creation order.
  fn referred_by<'a>(
    &'a self,
    referrers: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Member>, Self::Error>> + Send + 'a;

  /// Count direct referral edges out of `referrer`, optionally restricted to
  /// referred members of `kind`.
  fn count_referrals(
    &self,
    referrer: Uuid,
    kind: Option<MemberKind>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Assignments ───────────────────────────────────────────────────────

  /// Assignments newest first, optionally filtered on `completed`.
  fn list_assignments(
    &self,
    completed: Option<bool>,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Assignment>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply every row in `changes` in a single transaction: either all rows
  /// are written or none are. A member row is only overwritten if its stored
  /// revision still equals [`Member::revision`]; otherwise the transaction is
  /// rolled back and [`Commit::Stale`] names the member.
  fn commit(
    &self,
    changes: Changeset,
  ) -> impl Future<Output = Result<Commit, Self::Error>> + Send + '_;

  // ── Reporting ─────────────────────────────────────────────────────────

  /// Aggregate counters; `since` bounds `recent_registrations`.
  fn dashboard_stats(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<DashboardStats, Self::Error>> + Send + '_;
}
