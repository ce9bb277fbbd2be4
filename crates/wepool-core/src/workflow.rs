//! Request-level workflows: registration, verification, staff edits, bulk
//! updates and the qualification sweep.
//!
//! Each function validates its input, gathers the state it needs, runs the
//! engine in memory and commits once. The exceptions are [`bulk_update`] and
//! [`check_qualifications`], which commit member by member and skip the
//! members that fail.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::{Account, Actor, NewAccount},
  ledger::{self, OverrideEntry},
  member::{Member, MemberKind, NewMember, ProfileDetails, Status, validate_phone},
  notify::{MailSettings, Message, Notifier},
  qualification::{self, Evaluation},
  referral::{self, ReferralEdge, ReferralStats, ReferralTree},
  store::{Changeset, DashboardStats, MemberQuery, MemberStore, commit_changes},
};

/// Window counted as "recent" on the staff dashboard.
pub const RECENT_REGISTRATION_DAYS: i64 = 7;

async fn load_member<S: MemberStore>(store: &S, id: Uuid) -> Result<Member> {
  store
    .get_member(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::MemberNotFound(id))
}

async fn load_account<S: MemberStore>(store: &S, id: Uuid) -> Result<Account> {
  store
    .get_account(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::AccountNotFound(id))
}

fn required(field: &str, value: &str) -> Result<String> {
  let value = value.trim();
  if value.is_empty() {
    return Err(Error::Validation(format!("{field} is required")));
  }
  Ok(value.to_owned())
}

// ─── Registration ────────────────────────────────────────────────────────────

/// A self-service sign-up. The password arrives already hashed.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
  pub username:       String,
  pub email:          String,
  pub first_name:     String,
  pub last_name:      String,
  pub password_hash:  String,
  pub phone:          String,
  pub referrer_phone: Option<String>,
  pub kind:           MemberKind,
  pub details:        ProfileDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
  pub account:            Account,
  pub member:             Member,
  /// `None` when no referrer phone was given or it matched no member.
  pub referral:           Option<ReferralEdge>,
  /// The new referral pushed a sponsored referrer over the threshold.
  pub referrer_qualified: bool,
}

/// Register a new member.
///
/// The account (inactive until email verification), the `pending` member and
/// the referral edge are created in one transaction. A referrer phone that
/// matches no member is logged and skipped; the registration still succeeds.
/// A recorded referral re-runs the referrer's sponsored check. Mail is sent
/// afterwards; neither step can fail the committed registration.
pub async fn register<S: MemberStore>(
  store: &S,
  notifier: &dyn Notifier,
  mail: &MailSettings,
  form: RegistrationForm,
) -> Result<RegistrationOutcome> {
  let username = required("username", &form.username)?;
  let email = required("email", &form.email)?;
  if !email.contains('@') {
    return Err(Error::Validation("email is not a valid address".into()));
  }
  let first_name = required("first name", &form.first_name)?;
  let last_name = required("last name", &form.last_name)?;
  let phone = validate_phone("phone", &form.phone)?;
  let referrer_phone = form
    .referrer_phone
    .as_deref()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .map(|p| validate_phone("referrer phone", p))
    .transpose()?;
  if !form.details.agreed_to_terms {
    return Err(Error::Validation(
      "the terms and conditions must be accepted".into(),
    ));
  }

  if store
    .find_account_by_username(&username)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::Validation(format!(
      "username {username:?} already exists"
    )));
  }
  if store
    .find_account_by_email(&email)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::Validation(format!("email {email:?} is already in use")));
  }
  if store
    .find_member_by_phone(&phone)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    return Err(Error::Validation(format!(
      "phone {phone} is already registered"
    )));
  }

  let referrer = match referrer_phone.as_deref() {
    Some(p) => {
      let found = store.find_member_by_phone(p).await.map_err(Error::store)?;
      if found.is_none() {
        tracing::warn!(
          referrer_phone = p,
          %username,
          "referrer phone matches no member; referral not recorded"
        );
      }
      found.map(|m| m.member_id)
    }
    None => None,
  };

  let mut details = form.details;
  details.terms_agreed_at = Some(Utc::now());

  let registered = store
    .register(
      NewAccount {
        username,
        email,
        first_name,
        last_name,
        password_hash: form.password_hash,
        is_active: false,
        is_staff: false,
        is_superuser: false,
      },
      NewMember { phone, referrer_phone, kind: form.kind, details },
      referrer,
    )
    .await
    .map_err(Error::store)?;

  tracing::info!(
    member = %registered.member.member_id,
    kind = %registered.member.kind,
    referred = registered.referral.is_some(),
    "member registered"
  );

  let referrer_qualified = match &registered.referral {
    Some(edge) => requalify_referrer(store, edge.referrer_id).await,
    None => false,
  };

  send_registration_mail(notifier, mail, &registered.account, &registered.member);

  Ok(RegistrationOutcome {
    account: registered.account,
    member: registered.member,
    referral: registered.referral,
    referrer_qualified,
  })
}

/// The sweep picks up a referrer this misses.
async fn requalify_referrer<S: MemberStore>(store: &S, referrer: Uuid) -> bool {
  match qualification::run_sponsored_check(store, referrer).await {
    Ok(qualified) => qualified,
    Err(e) => {
      tracing::warn!(%referrer, error = %e, "referrer re-evaluation failed");
      false
    }
  }
}

fn send_registration_mail(
  notifier: &dyn Notifier,
  mail: &MailSettings,
  account: &Account,
  member: &Member,
) {
  let link = format!(
    "{}/api/verify/{}",
    mail.base_url.trim_end_matches('/'),
    member.verification_token
  );
  let verification = Message {
    from:    mail.from_email.clone(),
    to:      vec![account.email.clone()],
    subject: "Verify your WePool account".into(),
    body:    format!(
      "Welcome to WePool! Follow this link to verify your email: {link}"
    ),
  };
  if let Err(e) = notifier.send(&verification) {
    tracing::warn!(account = %account.account_id, error = %e, "verification mail failed");
  }

  let kind = match member.kind {
    MemberKind::Paying => "Paying Member",
    MemberKind::Sponsored => "PIF Member",
  };
  let notice = Message {
    from:    mail.from_email.clone(),
    to:      vec![mail.admin_email.clone()],
    subject: "New member registration".into(),
    body:    format!(
      "A new member has registered: {} ({})\nMember type: {kind}\nPhone: {}",
      account.full_name(),
      account.email,
      member.phone
    ),
  };
  if let Err(e) = notifier.send(&notice) {
    tracing::warn!(error = %e, "admin registration notice failed");
  }
}

/// Mark the member owning `token` as verified, activate its account and run
/// the yellow check, all in one commit.
pub async fn verify_email<S: MemberStore>(store: &S, token: Uuid) -> Result<Member> {
  let mut member = store
    .find_member_by_token(token)
    .await
    .map_err(Error::store)?
    .ok_or(Error::TokenNotFound)?;
  let mut account = load_account(store, member.account_id).await?;

  member.verified_email = true;
  account.is_active = true;
  let yellow = qualification::yellow_check(&mut member);

  commit_changes(store, Changeset::new().member(member.clone()).account(account))
    .await?;
  tracing::info!(member = %member.member_id, yellow, "email verified");
  Ok(member)
}

// ─── Self-service ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ExternalUpdate {
  pub qualified_for_yellow: bool,
  pub status:               Status,
}

/// Record the caller's external registration and re-run the yellow check.
/// A link is required when `registered` is set; an empty link keeps the
/// stored one.
pub async fn update_external<S: MemberStore>(
  store: &S,
  actor: &Actor,
  registered: bool,
  link: Option<String>,
) -> Result<ExternalUpdate> {
  let mut member = own_member(store, actor).await?;

  let link = link
    .map(|l| l.trim().to_owned())
    .filter(|l| !l.is_empty());
  if link.is_some() {
    member.external_link = link;
  }
  member.externally_registered = registered;
  if registered && !member.has_external_link() {
    return Err(Error::Validation(
      "an external link is required when marked as registered".into(),
    ));
  }

  let qualified_for_yellow = qualification::yellow_check(&mut member);
  let status = member.status;
  commit_changes(store, Changeset::new().member(member)).await?;
  Ok(ExternalUpdate { qualified_for_yellow, status })
}

/// Profile fields a member may change about themselves. Unset fields are
/// left alone. The phone and the terms acceptance are not editable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
  pub date_of_birth:         Option<NaiveDate>,
  pub city:                  Option<String>,
  pub state:                 Option<String>,
  pub country:               Option<String>,
  pub zip_code:              Option<String>,
  pub communications_opt_in: Option<bool>,
}

pub async fn update_profile<S: MemberStore>(
  store: &S,
  actor: &Actor,
  update: ProfileUpdate,
) -> Result<Member> {
  let mut member = own_member(store, actor).await?;
  let details = &mut member.details;

  if let Some(dob) = update.date_of_birth {
    if dob > Utc::now().date_naive() {
      return Err(Error::Validation(
        "date of birth cannot be in the future".into(),
      ));
    }
    details.date_of_birth = Some(dob);
  }
  for (slot, value) in [
    (&mut details.city, update.city),
    (&mut details.state, update.state),
    (&mut details.country, update.country),
    (&mut details.zip_code, update.zip_code),
  ] {
    if let Some(value) = value {
      *slot = value.trim().to_owned();
    }
  }
  if let Some(v) = update.communications_opt_in {
    details.communications_opt_in = v;
  }

  commit_changes(store, Changeset::new().member(member.clone())).await?;
  tracing::info!(member = %member.member_id, "profile updated");
  Ok(member)
}

async fn own_member<S: MemberStore>(store: &S, actor: &Actor) -> Result<Member> {
  store
    .find_member_by_account(actor.account_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NoProfile(actor.account_id))
}

/// What a member sees on their own page.
#[derive(Debug, Clone, Serialize)]
pub struct MemberDashboard {
  pub member:    Member,
  pub referrals: ReferralTree,
  pub stats:     ReferralStats,
}

pub async fn my_dashboard<S: MemberStore>(
  store: &S,
  actor: &Actor,
) -> Result<MemberDashboard> {
  let member = own_member(store, actor).await?;
  let referrals =
    referral::build_tree(store, member.member_id, referral::DEFAULT_DEPTH).await?;
  let stats = ReferralStats::from_referrals(referrals.level(1).unwrap_or_default());
  Ok(MemberDashboard { member, referrals, stats })
}

/// Public answer to "does this referrer exist?".
#[derive(Debug, Clone, Serialize)]
pub struct ReferrerSummary {
  pub name: String,
  pub kind: MemberKind,
}

pub async fn lookup_referrer<S: MemberStore>(
  store: &S,
  phone: &str,
) -> Result<Option<ReferrerSummary>> {
  let phone = validate_phone("phone", phone)?;
  let Some(member) = store
    .find_member_by_phone(&phone)
    .await
    .map_err(Error::store)?
  else {
    return Ok(None);
  };
  let account = load_account(store, member.account_id).await?;
  Ok(Some(ReferrerSummary { name: account.full_name(), kind: member.kind }))
}

// ─── Staff views ─────────────────────────────────────────────────────────────

pub async fn list_members<S: MemberStore>(
  store: &S,
  actor: &Actor,
  query: &MemberQuery,
) -> Result<Vec<Member>> {
  actor.require_staff()?;
  store.list_members(query).await.map_err(Error::store)
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberDetail {
  pub member:    Member,
  pub account:   Account,
  pub stats:     ReferralStats,
  pub referrals: Vec<Member>,
  /// The member whose phone matches the stated referrer phone, if any.
  pub referrer:  Option<Member>,
  pub overrides: Vec<OverrideEntry>,
}

pub async fn member_detail<S: MemberStore>(
  store: &S,
  actor: &Actor,
  id: Uuid,
) -> Result<MemberDetail> {
  actor.require_staff()?;
  let member = load_member(store, id).await?;
  let account = load_account(store, member.account_id).await?;
  let (referrals, stats) = referral::direct_referrals(store, id).await?;
  let referrer = match member.referrer_phone.as_deref() {
    Some(p) => store.find_member_by_phone(p).await.map_err(Error::store)?,
    None => None,
  };
  let overrides = ledger::entries(&member);
  Ok(MemberDetail { member, account, stats, referrals, referrer, overrides })
}

pub async fn dashboard_stats<S: MemberStore>(
  store: &S,
  actor: &Actor,
) -> Result<DashboardStats> {
  actor.require_staff()?;
  let since = Utc::now() - Duration::days(RECENT_REGISTRATION_DAYS);
  store.dashboard_stats(since).await.map_err(Error::store)
}

// ─── Staff edits ─────────────────────────────────────────────────────────────

/// Field changes a staff member may make. Unset fields are left alone.
/// Overrides are not editable here; see [`crate::ledger`]. Changing
/// `is_staff` takes a superuser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberEdit {
  pub username:              Option<String>,
  pub email:                 Option<String>,
  pub first_name:            Option<String>,
  pub last_name:             Option<String>,
  pub is_active:             Option<bool>,
  pub is_staff:              Option<bool>,
  pub kind:                  Option<MemberKind>,
  pub status:                Option<Status>,
  pub verified_email:        Option<bool>,
  pub externally_registered: Option<bool>,
  pub external_link:         Option<String>,
  pub paid_for_self:         Option<bool>,
  pub paid_for_sponsored:    Option<bool>,
  pub details:               Option<ProfileDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
  pub member:     Member,
  pub account:    Account,
  pub evaluation: Evaluation,
}

impl MemberEdit {
  /// Apply the account half of the edit. Usernames and emails stay unique
  /// across accounts.
  async fn apply_account<S: MemberStore>(
    &self,
    store: &S,
    actor: &Actor,
    account: &mut Account,
  ) -> Result<()> {
    if let Some(raw) = &self.username {
      let username = required("username", raw)?;
      if username != account.username {
        let taken = store
          .find_account_by_username(&username)
          .await
          .map_err(Error::store)?
          .is_some_and(|other| other.account_id != account.account_id);
        if taken {
          return Err(Error::Validation(format!(
            "username {username:?} already exists"
          )));
        }
        account.username = username;
      }
    }
    if let Some(raw) = &self.email {
      let email = required("email", raw)?;
      if !email.contains('@') {
        return Err(Error::Validation("email is not a valid address".into()));
      }
      if email != account.email {
        let taken = store
          .find_account_by_email(&email)
          .await
          .map_err(Error::store)?
          .is_some_and(|other| other.account_id != account.account_id);
        if taken {
          return Err(Error::Validation(format!(
            "email {email:?} is already in use"
          )));
        }
        account.email = email;
      }
    }
    if let Some(raw) = &self.first_name {
      account.first_name = required("first name", raw)?;
    }
    if let Some(raw) = &self.last_name {
      account.last_name = required("last name", raw)?;
    }
    if let Some(v) = self.is_active {
      account.is_active = v;
    }
    if let Some(v) = self.is_staff
      && v != account.is_staff
    {
      actor.require_superuser()?;
      account.is_staff = v;
    }
    Ok(())
  }
}

/// Apply `edit`, then run both checks (they stay quiet under an active
/// qualification override). One commit.
pub async fn edit_member<S: MemberStore>(
  store: &S,
  actor: &Actor,
  id: Uuid,
  edit: MemberEdit,
) -> Result<EditOutcome> {
  actor.require_staff()?;
  let mut member = load_member(store, id).await?;
  let mut account = load_account(store, member.account_id).await?;
  edit.apply_account(store, actor, &mut account).await?;

  if let Some(kind) = edit.kind {
    member.kind = kind;
  }
  if let Some(status) = edit.status {
    member.status = status;
  }
  if let Some(v) = edit.verified_email {
    member.verified_email = v;
  }
  if let Some(v) = edit.externally_registered {
    member.externally_registered = v;
  }
  if let Some(link) = edit.external_link {
    let link = link.trim().to_owned();
    member.external_link = (!link.is_empty()).then_some(link);
  }
  if let Some(v) = edit.paid_for_self {
    member.paid_for_self = v;
  }
  if let Some(v) = edit.paid_for_sponsored {
    member.paid_for_sponsored = v;
  }
  if let Some(details) = edit.details {
    member.details = details;
  }
  if member.externally_registered && !member.has_external_link() {
    return Err(Error::Validation(
      "an external link is required when marked as registered".into(),
    ));
  }

  let evaluation = qualification::evaluate(store, &mut member).await?;
  commit_changes(
    store,
    Changeset::new().member(member.clone()).account(account.clone()),
  )
  .await?;
  tracing::info!(member = %id, by = %actor.username, status = %member.status, "member edited");
  Ok(EditOutcome { member, account, evaluation })
}

/// Manually set a member's status (the yellow-queue approve/reject action).
/// The automatic checks are not consulted.
pub async fn set_status<S: MemberStore>(
  store: &S,
  actor: &Actor,
  id: Uuid,
  status: Status,
) -> Result<Member> {
  actor.require_staff()?;
  let mut member = load_member(store, id).await?;
  member.status = status;
  commit_changes(store, Changeset::new().member(member.clone())).await?;
  tracing::info!(member = %id, by = %actor.username, %status, "status set manually");
  Ok(member)
}

/// Delete a member, its account, its referral edges and its assignments.
pub async fn delete_member<S: MemberStore>(
  store: &S,
  actor: &Actor,
  id: Uuid,
) -> Result<()> {
  actor.require_staff()?;
  let member = load_member(store, id).await?;
  if !store.delete_member(id).await.map_err(Error::store)? {
    return Err(Error::MemberNotFound(id));
  }
  tracing::info!(
    member = %id,
    phone = %member.phone,
    by = %actor.username,
    qualification_override = ?member.qualification_override.as_ref().map(|s| s.by),
    admin_override = ?member.admin_override.as_ref().map(|s| s.by),
    "member deleted"
  );
  Ok(())
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "status", rename_all = "snake_case")]
pub enum BulkAction {
  /// Set the status, then re-run both checks.
  SetStatus(Status),
  /// Flip each member's account between active and inactive.
  ToggleActive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
  pub member_id: Uuid,
  pub error:     String,
}

/// Per-member results of a bulk update. The batch is not atomic: every id in
/// `updated` has been committed even when `failed` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
  pub updated: Vec<Uuid>,
  pub failed:  Vec<BulkFailure>,
}

impl BulkReport {
  pub fn updated_count(&self) -> usize { self.updated.len() }
}

pub async fn bulk_update<S: MemberStore>(
  store: &S,
  actor: &Actor,
  ids: &[Uuid],
  action: BulkAction,
) -> Result<BulkReport> {
  actor.require_staff()?;
  if ids.is_empty() {
    return Err(Error::Validation("no members selected".into()));
  }

  let mut report = BulkReport::default();
  for &id in ids {
    match bulk_one(store, id, action).await {
      Ok(()) => report.updated.push(id),
      Err(e) => {
        tracing::warn!(member = %id, error = %e, "bulk update skipped member");
        report.failed.push(BulkFailure { member_id: id, error: e.to_string() });
      }
    }
  }

  tracing::info!(
    by = %actor.username,
    ?action,
    updated = report.updated.len(),
    failed = report.failed.len(),
    "bulk update finished"
  );
  Ok(report)
}

async fn bulk_one<S: MemberStore>(
  store: &S,
  id: Uuid,
  action: BulkAction,
) -> Result<()> {
  let mut member = load_member(store, id).await?;
  let changes = match action {
    BulkAction::SetStatus(status) => {
      member.status = status;
      qualification::evaluate(store, &mut member).await?;
      Changeset::new().member(member)
    }
    BulkAction::ToggleActive => {
      let mut account = load_account(store, member.account_id).await?;
      account.is_active = !account.is_active;
      // The unchanged member row carries the revision check for the account.
      Changeset::new().member(member).account(account)
    }
  };
  commit_changes(store, changes).await
}

// ─── Sweep ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub yellow:    usize,
  pub qualified: usize,
  /// Members whose check failed; they are logged and left for the next run.
  pub skipped:   usize,
}

/// Re-run the checks over every member they could apply to. Safe to repeat:
/// a second sweep over unchanged data reports zero transitions. A failure on
/// one member does not stop the sweep.
pub async fn check_qualifications<S: MemberStore>(store: &S) -> Result<SweepReport> {
  let mut report = SweepReport::default();

  let pending = store
    .list_members(&MemberQuery::with_status(Status::Pending))
    .await
    .map_err(Error::store)?;
  for member in pending {
    match qualification::run_yellow_check(store, member.member_id).await {
      Ok(true) => report.yellow += 1,
      Ok(false) => {}
      Err(e) => {
        tracing::warn!(member = %member.member_id, error = %e, "yellow check skipped member");
        report.skipped += 1;
      }
    }
  }

  let sponsored = store
    .list_members(&MemberQuery {
      kind: Some(MemberKind::Sponsored),
      statuses: vec![Status::Pending, Status::Yellow],
      ..MemberQuery::default()
    })
    .await
    .map_err(Error::store)?;
  for member in sponsored {
    match qualification::run_sponsored_check(store, member.member_id).await {
      Ok(true) => report.qualified += 1,
      Ok(false) => {}
      Err(e) => {
        tracing::warn!(member = %member.member_id, error = %e, "sponsored check skipped member");
        report.skipped += 1;
      }
    }
  }

  tracing::info!(
    yellow = report.yellow,
    qualified = report.qualified,
    skipped = report.skipped,
    "qualification sweep finished"
  );
  Ok(report)
}
