//! Member records: the unit the qualification engine operates on.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

/// Longest phone number accepted, in digits.
pub const MAX_PHONE_LEN: usize = 15;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// How a member's own membership is funded.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberKind {
  Paying,
  /// Paid forward by someone else ("PIF" in the member-facing UI).
  Sponsored,
}

/// Lifecycle status. Ordered: a member only moves forward through the
/// automatic checks.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Pending,
  /// Verified and externally registered.
  Yellow,
  /// Sponsorship settled.
  Green,
  /// Sponsored member that reached the paying-referral threshold.
  Qualified,
}

// ─── Override stamp ──────────────────────────────────────────────────────────

/// Audit record of an active administrative override. The override is
/// active exactly when the stamp is present, so an override without a
/// reason cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideStamp {
  pub reason: String,
  /// The account that applied the override; `None` once that account has
  /// been deleted.
  pub by:     Option<Uuid>,
  pub at:     DateTime<Utc>,
}

// ─── Profile details ─────────────────────────────────────────────────────────

/// Personal details collected at registration. Not consulted by any rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
  pub date_of_birth:         Option<NaiveDate>,
  #[serde(default)]
  pub city:                  String,
  #[serde(default)]
  pub state:                 String,
  #[serde(default)]
  pub country:               String,
  #[serde(default)]
  pub zip_code:              String,
  #[serde(default)]
  pub agreed_to_terms:       bool,
  pub terms_agreed_at:       Option<DateTime<Utc>>,
  #[serde(default)]
  pub communications_opt_in: bool,
}

// ─── Member ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
  pub member_id:              Uuid,
  pub account_id:             Uuid,
  /// Unique; the key other members use to name their referrer.
  pub phone:                  String,
  /// The referrer phone stated at registration, whether or not it resolved.
  pub referrer_phone:         Option<String>,
  pub kind:                   MemberKind,
  pub status:                 Status,
  pub verified_email:         bool,
  #[serde(skip)]
  pub verification_token:     Uuid,
  pub externally_registered:  bool,
  pub external_link:          Option<String>,
  pub paid_for_self:          bool,
  pub paid_for_sponsored:     bool,
  pub qualification_override: Option<OverrideStamp>,
  pub admin_override:         Option<OverrideStamp>,
  pub details:                ProfileDetails,
  pub created_at:             DateTime<Utc>,
  pub updated_at:             DateTime<Utc>,
  /// Write counter for optimistic concurrency. A commit only overwrites the
  /// row if it still carries the revision this copy was read at.
  #[serde(skip)]
  pub revision:               i64,
}

impl Member {
  pub fn has_external_link(&self) -> bool {
    self
      .external_link
      .as_deref()
      .is_some_and(|l| !l.trim().is_empty())
  }

  pub fn is_qualification_overridden(&self) -> bool {
    self.qualification_override.is_some()
  }

  pub fn is_admin_overridden(&self) -> bool { self.admin_override.is_some() }
}

/// Input to registration. Identity, status and timestamps are assigned by
/// the store; new members always start `pending`.
#[derive(Debug, Clone)]
pub struct NewMember {
  pub phone:          String,
  pub referrer_phone: Option<String>,
  pub kind:           MemberKind,
  pub details:        ProfileDetails,
}

// ─── Validation helpers ──────────────────────────────────────────────────────

/// Normalise and validate a phone number: digits only, 1..=15 long.
pub fn validate_phone(field: &str, raw: &str) -> Result<String> {
  let phone = raw.trim();
  if phone.is_empty() {
    return Err(Error::Validation(format!("{field} is required")));
  }
  if !phone.chars().all(|c| c.is_ascii_digit()) {
    return Err(Error::Validation(format!(
      "{field} must contain only digits"
    )));
  }
  if phone.len() > MAX_PHONE_LEN {
    return Err(Error::Validation(format!(
      "{field} must be at most {MAX_PHONE_LEN} digits"
    )));
  }
  Ok(phone.to_owned())
}
