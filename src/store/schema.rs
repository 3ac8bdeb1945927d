//! PostgreSQL DDL applied by `PgStore::migrate`.
//!
//! Statuses are stored as their canonical upper-case names.

pub const CREATE_CASES: &str = r#"
CREATE TABLE IF NOT EXISTS cases_tb (
    case_id              TEXT PRIMARY KEY,
    owner_id             BIGINT NOT NULL,
    assigned_provider_id BIGINT,
    title                TEXT NOT NULL,
    description          TEXT NOT NULL DEFAULT '',
    category             TEXT NOT NULL,
    status               TEXT NOT NULL,
    agreed_fee           NUMERIC(14, 2),
    deleted              BOOLEAN NOT NULL DEFAULT FALSE,
    created_at           TIMESTAMPTZ NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_OFFERS: &str = r#"
CREATE TABLE IF NOT EXISTS offers_tb (
    offer_id     TEXT PRIMARY KEY,
    case_id      TEXT NOT NULL REFERENCES cases_tb (case_id),
    provider_id  BIGINT NOT NULL,
    proposed_fee NUMERIC(14, 2) NOT NULL,
    status       TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    expires_at   TIMESTAMPTZ NOT NULL,
    accepted_at  TIMESTAMPTZ,
    rejected_at  TIMESTAMPTZ,
    CONSTRAINT offers_case_provider_uq UNIQUE (case_id, provider_id)
)
"#;

pub const CREATE_OFFERS_EXPIRY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS offers_submitted_expiry_idx
    ON offers_tb (expires_at) WHERE status = 'SUBMITTED'
"#;

pub const CREATE_PAYMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS payments_tb (
    payment_id          TEXT PRIMARY KEY,
    case_id             TEXT NOT NULL REFERENCES cases_tb (case_id),
    offer_id            TEXT,
    provider_fee        NUMERIC(14, 2) NOT NULL,
    platform_commission NUMERIC(14, 2) NOT NULL,
    total_amount        NUMERIC(14, 2) NOT NULL,
    currency            TEXT NOT NULL,
    receipt             TEXT NOT NULL,
    gateway_order_id    TEXT NOT NULL UNIQUE,
    gateway_payment_id  TEXT,
    signature           TEXT,
    failure_reason      TEXT,
    status              TEXT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_AUDIT_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events_tb (
    event_id   TEXT PRIMARY KEY,
    case_id    TEXT NOT NULL,
    event_type TEXT NOT NULL,
    old_status TEXT,
    new_status TEXT,
    message    TEXT NOT NULL,
    actor_id   BIGINT NOT NULL,
    actor_role TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_AUDIT_CASE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS audit_events_case_idx
    ON audit_events_tb (case_id, created_at DESC)
"#;

pub const CREATE_PROVIDER_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS provider_stats_tb (
    provider_id     BIGINT PRIMARY KEY,
    completed_cases BIGINT NOT NULL DEFAULT 0
)
"#;

/// In dependency order.
pub const ALL: [&str; 7] = [
    CREATE_CASES,
    CREATE_OFFERS,
    CREATE_OFFERS_EXPIRY_INDEX,
    CREATE_PAYMENTS,
    CREATE_AUDIT_EVENTS,
    CREATE_AUDIT_CASE_INDEX,
    CREATE_PROVIDER_STATS,
];
