//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, enums
//! their snake_case names, and profile details compact JSON.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use wepool_core::{
  account::Account,
  assignment::Assignment,
  member::{Member, MemberKind, OverrideStamp, Status},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn encode_kind(k: MemberKind) -> &'static str { k.into() }

pub fn decode_kind(s: &str) -> Result<MemberKind> {
  MemberKind::from_str(s).map_err(|_| Error::UnknownValue {
    column: "kind",
    value:  s.to_owned(),
  })
}

pub fn encode_status(s: Status) -> &'static str { s.into() }

pub fn decode_status(s: &str) -> Result<Status> {
  Status::from_str(s).map_err(|_| Error::UnknownValue {
    column: "status",
    value:  s.to_owned(),
  })
}

// ─── Override stamps ──────────────────────────────────────────────────────────

/// Column triple `(reason, by, at)` for an optional stamp.
pub type StampColumns = (Option<String>, Option<String>, Option<String>);

pub fn encode_stamp(stamp: Option<&OverrideStamp>) -> StampColumns {
  match stamp {
    Some(s) => (
      Some(s.reason.clone()),
      s.by.map(encode_uuid),
      Some(encode_dt(s.at)),
    ),
    None => (None, None, None),
  }
}

pub fn decode_stamp(cols: StampColumns) -> Result<Option<OverrideStamp>> {
  let (reason, by, at) = cols;
  let (Some(reason), Some(at)) = (reason, at) else {
    return Ok(None);
  };
  Ok(Some(OverrideStamp {
    reason,
    by: by.as_deref().map(decode_uuid).transpose()?,
    at: decode_dt(&at)?,
  }))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawMember::from_row`]; expects `members AS m`.
pub const MEMBER_COLUMNS: &str = "
  m.member_id, m.account_id, m.phone, m.referrer_phone, m.kind, m.status,
  m.verified_email, m.verification_token, m.externally_registered,
  m.external_link, m.paid_for_self, m.paid_for_sponsored,
  m.qualification_reason, m.qualification_by, m.qualification_at,
  m.admin_reason, m.admin_by, m.admin_at,
  m.details_json, m.created_at, m.updated_at, m.revision";

/// Raw values read directly from a `members` row.
pub struct RawMember {
  pub member_id:             String,
  pub account_id:            String,
  pub phone:                 String,
  pub referrer_phone:        Option<String>,
  pub kind:                  String,
  pub status:                String,
  pub verified_email:        bool,
  pub verification_token:    String,
  pub externally_registered: bool,
  pub external_link:         Option<String>,
  pub paid_for_self:         bool,
  pub paid_for_sponsored:    bool,
  pub qualification:         StampColumns,
  pub admin:                 StampColumns,
  pub details_json:          String,
  pub created_at:            String,
  pub updated_at:            String,
  pub revision:              i64,
}

impl RawMember {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:             row.get(0)?,
      account_id:            row.get(1)?,
      phone:                 row.get(2)?,
      referrer_phone:        row.get(3)?,
      kind:                  row.get(4)?,
      status:                row.get(5)?,
      verified_email:        row.get(6)?,
      verification_token:    row.get(7)?,
      externally_registered: row.get(8)?,
      external_link:         row.get(9)?,
      paid_for_self:         row.get(10)?,
      paid_for_sponsored:    row.get(11)?,
      qualification:         (row.get(12)?, row.get(13)?, row.get(14)?),
      admin:                 (row.get(15)?, row.get(16)?, row.get(17)?),
      details_json:          row.get(18)?,
      created_at:            row.get(19)?,
      updated_at:            row.get(20)?,
      revision:              row.get(21)?,
    })
  }

  pub fn into_member(self) -> Result<Member> {
    Ok(Member {
      member_id:              decode_uuid(&self.member_id)?,
      account_id:             decode_uuid(&self.account_id)?,
      phone:                  self.phone,
      referrer_phone:         self.referrer_phone,
      kind:                   decode_kind(&self.kind)?,
      status:                 decode_status(&self.status)?,
      verified_email:         self.verified_email,
      verification_token:     decode_uuid(&self.verification_token)?,
      externally_registered:  self.externally_registered,
      external_link:          self.external_link,
      paid_for_self:          self.paid_for_self,
      paid_for_sponsored:     self.paid_for_sponsored,
      qualification_override: decode_stamp(self.qualification)?,
      admin_override:         decode_stamp(self.admin)?,
      details:                serde_json::from_str(&self.details_json)?,
      created_at:             decode_dt(&self.created_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
      revision:               self.revision,
    })
  }
}

/// Owned column values for writing a full `members` row.
pub struct MemberRow {
  pub member_id:             String,
  pub account_id:            String,
  pub phone:                 String,
  pub referrer_phone:        Option<String>,
  pub kind:                  &'static str,
  pub status:                &'static str,
  pub verified_email:        bool,
  pub verification_token:    String,
  pub externally_registered: bool,
  pub external_link:         Option<String>,
  pub paid_for_self:         bool,
  pub paid_for_sponsored:    bool,
  pub qualification:         StampColumns,
  pub admin:                 StampColumns,
  pub details_json:          String,
  pub created_at:            String,
  pub updated_at:            String,
  /// The revision the member was read at.
  pub revision:              i64,
}

impl MemberRow {
  pub fn encode(m: &Member) -> Result<Self> {
    Ok(Self {
      member_id:             encode_uuid(m.member_id),
      account_id:            encode_uuid(m.account_id),
      phone:                 m.phone.clone(),
      referrer_phone:        m.referrer_phone.clone(),
      kind:                  encode_kind(m.kind),
      status:                encode_status(m.status),
      verified_email:        m.verified_email,
      verification_token:    encode_uuid(m.verification_token),
      externally_registered: m.externally_registered,
      external_link:         m.external_link.clone(),
      paid_for_self:         m.paid_for_self,
      paid_for_sponsored:    m.paid_for_sponsored,
      qualification:         encode_stamp(m.qualification_override.as_ref()),
      admin:                 encode_stamp(m.admin_override.as_ref()),
      details_json:          serde_json::to_string(&m.details)?,
      created_at:            encode_dt(m.created_at),
      updated_at:            encode_dt(m.updated_at),
      revision:              m.revision,
    })
  }

  /// Insert the row, or fully overwrite the stored one if its revision still
  /// matches `self.revision` (bumping it). Returns 0 when the stored row has
  /// moved on.
  pub fn upsert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute(
      "INSERT INTO members (
         member_id, account_id, phone, referrer_phone, kind, status,
         verified_email, verification_token, externally_registered,
         external_link, paid_for_self, paid_for_sponsored,
         qualification_reason, qualification_by, qualification_at,
         admin_reason, admin_by, admin_at,
         details_json, created_at, updated_at, revision
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                 ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
       ON CONFLICT (member_id) DO UPDATE SET
         phone                 = excluded.phone,
         referrer_phone        = excluded.referrer_phone,
         kind                  = excluded.kind,
         status                = excluded.status,
         verified_email        = excluded.verified_email,
         externally_registered = excluded.externally_registered,
         external_link         = excluded.external_link,
         paid_for_self         = excluded.paid_for_self,
         paid_for_sponsored    = excluded.paid_for_sponsored,
         qualification_reason  = excluded.qualification_reason,
         qualification_by      = excluded.qualification_by,
         qualification_at      = excluded.qualification_at,
         admin_reason          = excluded.admin_reason,
         admin_by              = excluded.admin_by,
         admin_at              = excluded.admin_at,
         details_json          = excluded.details_json,
         updated_at            = excluded.updated_at,
         revision              = members.revision + 1
       WHERE members.revision = excluded.revision",
      rusqlite::params![
        self.member_id,
        self.account_id,
        self.phone,
        self.referrer_phone,
        self.kind,
        self.status,
        self.verified_email,
        self.verification_token,
        self.externally_registered,
        self.external_link,
        self.paid_for_self,
        self.paid_for_sponsored,
        self.qualification.0,
        self.qualification.1,
        self.qualification.2,
        self.admin.0,
        self.admin.1,
        self.admin.2,
        self.details_json,
        self.created_at,
        self.updated_at,
        self.revision,
      ],
    )
  }
}

/// Column list matching [`RawAccount::from_row`]; expects `accounts AS a`.
pub const ACCOUNT_COLUMNS: &str = "
  a.account_id, a.username, a.email, a.first_name, a.last_name,
  a.password_hash, a.is_active, a.is_staff, a.is_superuser, a.created_at";

/// Raw values read directly from an `accounts` row.
pub struct RawAccount {
  pub account_id:    String,
  pub username:      String,
  pub email:         String,
  pub first_name:    String,
  pub last_name:     String,
  pub password_hash: String,
  pub is_active:     bool,
  pub is_staff:      bool,
  pub is_superuser:  bool,
  pub created_at:    String,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:    row.get(0)?,
      username:      row.get(1)?,
      email:         row.get(2)?,
      first_name:    row.get(3)?,
      last_name:     row.get(4)?,
      password_hash: row.get(5)?,
      is_active:     row.get(6)?,
      is_staff:      row.get(7)?,
      is_superuser:  row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id:    decode_uuid(&self.account_id)?,
      username:      self.username,
      email:         self.email,
      first_name:    self.first_name,
      last_name:     self.last_name,
      password_hash: self.password_hash,
      is_active:     self.is_active,
      is_staff:      self.is_staff,
      is_superuser:  self.is_superuser,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Insert or fully overwrite an `accounts` row.
pub fn upsert_account(
  conn: &rusqlite::Connection,
  a: &Account,
) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO accounts (
       account_id, username, email, first_name, last_name,
       password_hash, is_active, is_staff, is_superuser, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT (account_id) DO UPDATE SET
       username      = excluded.username,
       email         = excluded.email,
       first_name    = excluded.first_name,
       last_name     = excluded.last_name,
       password_hash = excluded.password_hash,
       is_active     = excluded.is_active,
       is_staff      = excluded.is_staff,
       is_superuser  = excluded.is_superuser",
    rusqlite::params![
      encode_uuid(a.account_id),
      a.username,
      a.email,
      a.first_name,
      a.last_name,
      a.password_hash,
      a.is_active,
      a.is_staff,
      a.is_superuser,
      encode_dt(a.created_at),
    ],
  )
}

/// Raw values read directly from an `assignments` row.
pub struct RawAssignment {
  pub assignment_id:       String,
  pub yellow_member_id:    String,
  pub sponsored_member_id: String,
  pub assigned_at:         String,
  pub completed:           bool,
}

impl RawAssignment {
  pub fn into_assignment(self) -> Result<Assignment> {
    Ok(Assignment {
      assignment_id:       decode_uuid(&self.assignment_id)?,
      yellow_member_id:    decode_uuid(&self.yellow_member_id)?,
      sponsored_member_id: decode_uuid(&self.sponsored_member_id)?,
      assigned_at:         decode_dt(&self.assigned_at)?,
      completed:           self.completed,
    })
  }
}
