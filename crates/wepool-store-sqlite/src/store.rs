//! [`SqliteStore`]: the SQLite implementation of [`MemberStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use wepool_core::{
  account::{Account, NewAccount},
  assignment::Assignment,
  member::{Member, MemberKind, NewMember, Status},
  referral::ReferralEdge,
  store::{
    Changeset, Commit, DashboardStats, MemberQuery, MemberStore, OverrideFilter,
    Registered, StatusBreakdown,
  },
};

use crate::{
  Error, Result,
  encode::{
    ACCOUNT_COLUMNS, MEMBER_COLUMNS, MemberRow, RawAccount, RawAssignment,
    RawMember, decode_uuid, encode_dt, encode_kind, encode_status, encode_uuid,
    upsert_account,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A WePool member store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    tracing::debug!(path = %path.as_ref().display(), "opening sqlite store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the connection.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch at most one member with a single-parameter `WHERE` clause.
  async fn member_where(
    &self,
    clause: &'static str,
    param: String,
  ) -> Result<Option<Member>> {
    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members m WHERE {clause}");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![param], RawMember::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  /// Fetch at most one account with a single-parameter `WHERE` clause.
  async fn account_where(
    &self,
    clause: &'static str,
    param: String,
  ) -> Result<Option<Account>> {
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE {clause}");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![param], RawAccount::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }
}

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── MemberStore impl ────────────────────────────────────────────────────────

impl MemberStore for SqliteStore {
  type Error = Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn create_account(&self, input: NewAccount) -> Result<Account> {
    let account = Account {
      account_id:    Uuid::new_v4(),
      username:      input.username,
      email:         input.email,
      first_name:    input.first_name,
      last_name:     input.last_name,
      password_hash: input.password_hash,
      is_active:     input.is_active,
      is_staff:      input.is_staff,
      is_superuser:  input.is_superuser,
      created_at:    Utc::now(),
    };

    let row = account.clone();
    self
      .conn
      .call(move |conn| {
        upsert_account(conn, &row)?;
        Ok(())
      })
      .await?;

    Ok(account)
  }

  async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
    self.account_where("a.account_id = ?1", encode_uuid(id)).await
  }

  async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
    self.account_where("a.username = ?1", username.to_owned()).await
  }

  async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
    self
      .account_where("a.email = ?1 COLLATE NOCASE", email.to_owned())
      .await
  }

  // ── Members ───────────────────────────────────────────────────────────────

  async fn register(
    &self,
    account: NewAccount,
    member: NewMember,
    referrer: Option<Uuid>,
  ) -> Result<Registered> {
    let now = Utc::now();
    let account = Account {
      account_id:    Uuid::new_v4(),
      username:      account.username,
      email:         account.email,
      first_name:    account.first_name,
      last_name:     account.last_name,
      password_hash: account.password_hash,
      is_active:     account.is_active,
      is_staff:      account.is_staff,
      is_superuser:  account.is_superuser,
      created_at:    now,
    };
    let member = Member {
      member_id:              Uuid::new_v4(),
      account_id:             account.account_id,
      phone:                  member.phone,
      referrer_phone:         member.referrer_phone,
      kind:                   member.kind,
      status:                 Status::Pending,
      verified_email:         false,
      verification_token:     Uuid::new_v4(),
      externally_registered:  false,
      external_link:          None,
      paid_for_self:          false,
      paid_for_sponsored:     false,
      qualification_override: None,
      admin_override:         None,
      details:                member.details,
      created_at:             now,
      updated_at:             now,
      revision:               0,
    };
    let referral = referrer.map(|referrer_id| ReferralEdge {
      referral_id: Uuid::new_v4(),
      referrer_id,
      referred_id: member.member_id,
      created_at:  now,
    });

    let account_row = account.clone();
    let member_row = MemberRow::encode(&member)?;
    let referral_row = referral.as_ref().map(|r| {
      (
        encode_uuid(r.referral_id),
        encode_uuid(r.referrer_id),
        encode_uuid(r.referred_id),
        encode_dt(r.created_at),
      )
    });

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        upsert_account(&tx, &account_row)?;
        member_row.upsert(&tx)?;
        if let Some((id, referrer, referred, at)) = referral_row {
          tx.execute(
            "INSERT INTO referrals (referral_id, referrer_id, referred_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, referrer, referred, at],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(Registered { account, member, referral })
  }

  async fn get_member(&self, id: Uuid) -> Result<Option<Member>> {
    self.member_where("m.member_id = ?1", encode_uuid(id)).await
  }

  async fn find_member_by_phone(&self, phone: &str) -> Result<Option<Member>> {
    self.member_where("m.phone = ?1", phone.to_owned()).await
  }

  async fn find_member_by_account(&self, account_id: Uuid) -> Result<Option<Member>> {
    self
      .member_where("m.account_id = ?1", encode_uuid(account_id))
      .await
  }

  async fn find_member_by_token(&self, token: Uuid) -> Result<Option<Member>> {
    self
      .member_where("m.verification_token = ?1", encode_uuid(token))
      .await
  }

  async fn list_members(&self, query: &MemberQuery) -> Result<Vec<Member>> {
    // Build WHERE clause dynamically; every condition binds positionally.
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<Value> = vec![];

    if let Some(kind) = query.kind {
      conds.push("m.kind = ?".into());
      params.push(Value::Text(encode_kind(kind).into()));
    }
    if !query.statuses.is_empty() {
      conds.push(format!("m.status IN ({})", placeholders(query.statuses.len())));
      params.extend(
        query
          .statuses
          .iter()
          .map(|s| Value::Text(encode_status(*s).into())),
      );
    }
    match query.overrides {
      Some(OverrideFilter::Overridden) => {
        conds.push("m.qualification_reason IS NOT NULL".into())
      }
      Some(OverrideFilter::Normal) => conds.push("m.qualification_reason IS NULL".into()),
      Some(OverrideFilter::AdminOverridden) => {
        conds.push("m.admin_reason IS NOT NULL".into())
      }
      None => {}
    }
    if let Some(paid) = query.paid_for_self {
      conds.push("m.paid_for_self = ?".into());
      params.push(Value::Integer(paid.into()));
    }
    if let Some(paid) = query.paid_for_sponsored {
      conds.push("m.paid_for_sponsored = ?".into());
      params.push(Value::Integer(paid.into()));
    }
    if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
      let pattern = format!("%{text}%");
      conds.push(
        "(m.phone LIKE ? OR a.username LIKE ? OR a.email LIKE ?
          OR a.first_name LIKE ? OR a.last_name LIKE ?)"
          .into(),
      );
      params.extend(std::iter::repeat_n(Value::Text(pattern), 5));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    params.push(Value::Integer(query.limit.map_or(-1, |l| l as i64)));
    params.push(Value::Integer(query.offset.unwrap_or(0) as i64));

    let raws: Vec<RawMember> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {MEMBER_COLUMNS}
           FROM members m
           JOIN accounts a ON a.account_id = m.account_id
           {where_clause}
           ORDER BY m.created_at DESC, m.rowid DESC
           LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMember::into_member).collect()
  }

  async fn delete_member(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let account_id: Option<String> = tx
          .query_row(
            "SELECT account_id FROM members WHERE member_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(account_id) = account_id else {
          return Ok(false);
        };

        tx.execute(
          "DELETE FROM referrals WHERE referrer_id = ?1 OR referred_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM assignments
           WHERE yellow_member_id = ?1 OR sponsored_member_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM members WHERE member_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "DELETE FROM accounts WHERE account_id = ?1",
          rusqlite::params![account_id],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if deleted {
      tracing::debug!(member_id = %id, "member row and dependents removed");
    }
    Ok(deleted)
  }

  // ── Referrals ─────────────────────────────────────────────────────────────

  async fn add_referral(&self, referrer: Uuid, referred: Uuid) -> Result<ReferralEdge> {
    let edge = ReferralEdge {
      referral_id: Uuid::new_v4(),
      referrer_id: referrer,
      referred_id: referred,
      created_at:  Utc::now(),
    };

    let id_str       = encode_uuid(edge.referral_id);
    let referrer_str = encode_uuid(referrer);
    let referred_str = encode_uuid(referred);
    let at_str       = encode_dt(edge.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO referrals (referral_id, referrer_id, referred_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, referrer_str, referred_str, at_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateReferral { referrer, referred });
    }
    Ok(edge)
  }

  async fn referred_by(&self, referrers: &[Uuid]) -> Result<Vec<Member>> {
    if referrers.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<Value> = referrers
      .iter()
      .map(|id| Value::Text(encode_uuid(*id)))
      .collect();

    let raws: Vec<RawMember> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {MEMBER_COLUMNS}
           FROM referrals r
           JOIN members m ON m.member_id = r.referred_id
           WHERE r.referrer_id IN ({})
           ORDER BY r.rowid",
          placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(ids.iter()), RawMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMember::into_member).collect()
  }

  async fn count_referrals(&self, referrer: Uuid, kind: Option<MemberKind>) -> Result<usize> {
    let referrer_str = encode_uuid(referrer);
    let kind_str     = kind.map(encode_kind);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*)
           FROM referrals r
           JOIN members m ON m.member_id = r.referred_id
           WHERE r.referrer_id = ?1
             AND (?2 IS NULL OR m.kind = ?2)",
          rusqlite::params![referrer_str, kind_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count as usize)
  }

  // ── Assignments ───────────────────────────────────────────────────────────

  async fn list_assignments(
    &self,
    completed: Option<bool>,
    limit: Option<usize>,
  ) -> Result<Vec<Assignment>> {
    let limit_val = limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawAssignment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT assignment_id, yellow_member_id, sponsored_member_id,
                  assigned_at, completed
           FROM assignments
           WHERE ?1 IS NULL OR completed = ?1
           ORDER BY assigned_at DESC, rowid DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![completed, limit_val], |row| {
            Ok(RawAssignment {
              assignment_id:       row.get(0)?,
              yellow_member_id:    row.get(1)?,
              sponsored_member_id: row.get(2)?,
              assigned_at:         row.get(3)?,
              completed:           row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAssignment::into_assignment).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit(&self, changes: Changeset) -> Result<Commit> {
    if changes.is_empty() {
      return Ok(Commit::Applied);
    }

    let members = changes
      .members
      .iter()
      .map(MemberRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let accounts = changes.accounts;
    let assignment = changes.assignment.map(|a| {
      (
        encode_uuid(a.assignment_id),
        encode_uuid(a.yellow_member_id),
        encode_uuid(a.sponsored_member_id),
        encode_dt(a.assigned_at),
        a.completed,
      )
    });

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for account in &accounts {
          upsert_account(&tx, account)?;
        }
        for member in &members {
          if member.upsert(&tx)? == 0 {
            // Dropping `tx` rolls back.
            return Ok(Err(member.member_id.clone()));
          }
        }
        if let Some((id, yellow, sponsored, at, completed)) = assignment {
          tx.execute(
            "INSERT INTO assignments (
               assignment_id, yellow_member_id, sponsored_member_id,
               assigned_at, completed
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (assignment_id) DO UPDATE SET completed = excluded.completed",
            rusqlite::params![id, yellow, sponsored, at, completed],
          )?;
        }
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    match outcome {
      Ok(()) => Ok(Commit::Applied),
      Err(stale) => {
        tracing::debug!(member = %stale, "commit rejected: stale member revision");
        Ok(Commit::Stale(decode_uuid(&stale)?))
      }
    }
  }

  // ── Reporting ─────────────────────────────────────────────────────────────

  async fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats> {
    let since_str = encode_dt(since);

    let counts: [i64; 14] = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM members),
             (SELECT COUNT(*) FROM members WHERE kind = 'paying'),
             (SELECT COUNT(*) FROM members WHERE kind = 'sponsored'),
             (SELECT COUNT(*) FROM members m
                JOIN accounts a ON a.account_id = m.account_id
                WHERE a.is_active = 1),
             (SELECT COUNT(*) FROM members WHERE verified_email = 1),
             (SELECT COUNT(*) FROM members WHERE status = 'pending'),
             (SELECT COUNT(*) FROM members WHERE status = 'yellow'),
             (SELECT COUNT(*) FROM members WHERE status = 'green'),
             (SELECT COUNT(*) FROM members WHERE status = 'qualified'),
             (SELECT COUNT(*) FROM members WHERE qualification_reason IS NOT NULL),
             (SELECT COUNT(*) FROM members WHERE admin_reason IS NOT NULL),
             (SELECT COUNT(*) FROM members WHERE created_at >= ?1),
             (SELECT COUNT(*) FROM assignments WHERE completed = 1),
             (SELECT COUNT(*) FROM assignments WHERE completed = 0)",
          rusqlite::params![since_str],
          |row| {
            let mut out = [0i64; 14];
            for (i, slot) in out.iter_mut().enumerate() {
              *slot = row.get(i)?;
            }
            Ok(out)
          },
        )?)
      })
      .await?;

    let n = |i: usize| counts[i] as usize;
    Ok(DashboardStats {
      total_members:           n(0),
      paying_members:          n(1),
      sponsored_members:       n(2),
      active_accounts:         n(3),
      verified_emails:         n(4),
      status_breakdown:        StatusBreakdown {
        pending:   n(5),
        yellow:    n(6),
        green:     n(7),
        qualified: n(8),
      },
      qualification_overrides: n(9),
      admin_overrides:         n(10),
      recent_registrations:    n(11),
      completed_assignments:   n(12),
      pending_assignments:     n(13),
    })
  }
}
