//! Accounts and the acting identity.
//!
//! An account is the login identity behind a member (or behind a bare staff
//! user). Its lifecycle is independent of any member record that refers to
//! it; override stamps hold only the acting account's UUID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A login identity with its capability flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
  pub account_id:    Uuid,
  pub username:      String,
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  /// PHC string produced by argon2; never serialised.
  #[serde(skip)]
  pub password_hash: String,
  pub is_active:     bool,
  /// Administrative capability: may use the staff dashboard.
  pub is_staff:      bool,
  pub is_superuser:  bool,
  pub created_at:    DateTime<Utc>,
}

impl Account {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
      .trim()
      .to_owned()
  }

  /// The capabilities this account acts with.
  pub fn actor(&self) -> Actor {
    Actor {
      account_id:   self.account_id,
      username:     self.username.clone(),
      is_staff:     self.is_staff,
      is_superuser: self.is_superuser,
    }
  }
}

/// Input to [`crate::store::MemberStore::create_account`] and to
/// registration. `account_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub username:      String,
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  pub password_hash: String,
  pub is_active:     bool,
  pub is_staff:      bool,
  pub is_superuser:  bool,
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub account_id:   Uuid,
  pub username:     String,
  pub is_staff:     bool,
  pub is_superuser: bool,
}

impl Actor {
  /// Staff capability is required for every dashboard operation.
  /// Superusers are implicitly staff.
  pub fn require_staff(&self) -> Result<()> {
    if self.is_staff || self.is_superuser {
      Ok(())
    } else {
      Err(Error::Permission(format!(
        "{} is not a staff member",
        self.username
      )))
    }
  }

  pub fn require_superuser(&self) -> Result<()> {
    if self.is_superuser {
      Ok(())
    } else {
      Err(Error::Permission(format!(
        "{} is not a superuser",
        self.username
      )))
    }
  }
}
