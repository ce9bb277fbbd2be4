//! SQL schema for the WePool SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    account_id    TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 0,
    is_staff      INTEGER NOT NULL DEFAULT 0,
    is_superuser  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

-- One row per member. An override is active exactly when its reason column
-- is non-NULL; the by/at columns travel with it.
CREATE TABLE IF NOT EXISTS members (
    member_id              TEXT PRIMARY KEY,
    account_id             TEXT NOT NULL UNIQUE
                           REFERENCES accounts(account_id) ON DELETE CASCADE,
    phone                  TEXT NOT NULL UNIQUE,
    referrer_phone         TEXT,
    kind                   TEXT NOT NULL,   -- 'paying' | 'sponsored'
    status                 TEXT NOT NULL DEFAULT 'pending',
    verified_email         INTEGER NOT NULL DEFAULT 0,
    verification_token     TEXT NOT NULL UNIQUE,
    externally_registered  INTEGER NOT NULL DEFAULT 0,
    external_link          TEXT,
    paid_for_self          INTEGER NOT NULL DEFAULT 0,
    paid_for_sponsored     INTEGER NOT NULL DEFAULT 0,
    qualification_reason   TEXT,
    qualification_by       TEXT REFERENCES accounts(account_id) ON DELETE SET NULL,
    qualification_at       TEXT,
    admin_reason           TEXT,
    admin_by               TEXT REFERENCES accounts(account_id) ON DELETE SET NULL,
    admin_at               TEXT,
    details_json           TEXT NOT NULL DEFAULT '{}',
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    revision               INTEGER NOT NULL DEFAULT 0,
    CHECK ((qualification_reason IS NULL) = (qualification_at IS NULL)),
    CHECK ((admin_reason IS NULL) = (admin_at IS NULL))
);

CREATE TABLE IF NOT EXISTS referrals (
    referral_id  TEXT PRIMARY KEY,
    referrer_id  TEXT NOT NULL REFERENCES members(member_id) ON DELETE CASCADE,
    referred_id  TEXT NOT NULL REFERENCES members(member_id) ON DELETE CASCADE,
    created_at   TEXT NOT NULL,
    UNIQUE (referrer_id, referred_id)
);

CREATE TABLE IF NOT EXISTS assignments (
    assignment_id        TEXT PRIMARY KEY,
    yellow_member_id     TEXT NOT NULL REFERENCES members(member_id) ON DELETE CASCADE,
    sponsored_member_id  TEXT NOT NULL REFERENCES members(member_id) ON DELETE CASCADE,
    assigned_at          TEXT NOT NULL,
    completed            INTEGER NOT NULL DEFAULT 0,
    CHECK (yellow_member_id != sponsored_member_id)
);

CREATE INDEX IF NOT EXISTS members_status_idx     ON members(status);
CREATE INDEX IF NOT EXISTS members_kind_idx       ON members(kind);
CREATE INDEX IF NOT EXISTS referrals_referrer_idx ON referrals(referrer_id);
CREATE INDEX IF NOT EXISTS assignments_at_idx     ON assignments(assigned_at);

PRAGMA user_version = 1;
";
