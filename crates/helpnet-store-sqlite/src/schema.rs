//! SQL schema for the HelpNet SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per (user, provider) decision. Revocation flips `granted` and
-- stamps `revoked_at`; rows are never created implicitly.
CREATE TABLE IF NOT EXISTS consents (
    user_id     TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    granted     INTEGER NOT NULL,
    granted_at  TEXT NOT NULL,
    revoked_at  TEXT,
    PRIMARY KEY (user_id, provider_id)
);

-- Ciphertext only. Plaintext tokens never reach this table.
CREATE TABLE IF NOT EXISTS tokens (
    user_id           TEXT NOT NULL,
    provider_id       TEXT NOT NULL,
    access_token_enc  TEXT NOT NULL,
    refresh_token_enc TEXT,
    expires_at        TEXT,            -- NULL for non-expiring sessions
    stored_at         TEXT NOT NULL,
    PRIMARY KEY (user_id, provider_id)
);

-- Maintained by the wider platform; read-only to the core.
CREATE TABLE IF NOT EXISTS user_metrics (
    user_id             TEXT PRIMARY KEY,
    invite_success_rate REAL NOT NULL DEFAULT 0,
    spam_reports        INTEGER NOT NULL DEFAULT 0,
    karma_score         REAL NOT NULL DEFAULT 0
);

-- Append-only send log backing daily invite quotas.
CREATE TABLE IF NOT EXISTS invites (
    invite_id   TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    external_id TEXT NOT NULL,
    sent_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS help_requests (
    id           TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL,
    category     TEXT NOT NULL CHECK (category IN
                   ('food', 'health', 'shelter', 'education', 'climate', 'finance', 'urgent')),
    urgency      INTEGER NOT NULL CHECK (urgency >= 1 AND urgency <= 10),
    title        TEXT NOT NULL,
    description  TEXT,
    lat          REAL NOT NULL,
    lon          REAL NOT NULL,
    status       TEXT NOT NULL DEFAULT 'open' CHECK (status IN
                   ('open', 'in_progress', 'resolved', 'cancelled')),
    confidence   REAL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS helpers (
    id                 TEXT PRIMARY KEY,
    lat                REAL NOT NULL,
    lon                REAL NOT NULL,
    skills             TEXT NOT NULL DEFAULT '[]',   -- JSON array of categories
    karma_score        REAL NOT NULL DEFAULT 0,
    availability_score REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS invites_user_sent_idx ON invites(user_id, sent_at);
CREATE INDEX IF NOT EXISTS help_requests_status_idx ON help_requests(status);
CREATE INDEX IF NOT EXISTS help_requests_geo_idx ON help_requests(lat, lon);
CREATE INDEX IF NOT EXISTS helpers_geo_idx ON helpers(lat, lon);

PRAGMA user_version = 1;
";
