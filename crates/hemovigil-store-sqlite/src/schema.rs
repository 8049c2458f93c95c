//! SQL schema for the hemovigil SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// The idempotency guarantee and the one-delivery-per-pair invariant are
/// enforced here, by UNIQUE constraints, rather than by application locking.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Created lazily on first observation; never updated or deleted.
CREATE TABLE IF NOT EXISTS regions (
    region_id   TEXT PRIMARY KEY,
    key         TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS institutions (
    institution_id TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    region_id      TEXT NOT NULL REFERENCES regions(region_id),
    created_at     TEXT NOT NULL
);

-- Latest known state per (source, region, category); upserted in place.
CREATE TABLE IF NOT EXISTS reserves (
    reserve_id     TEXT PRIMARY KEY,
    source_key     TEXT NOT NULL,
    region_id      TEXT NOT NULL REFERENCES regions(region_id),
    region_key     TEXT NOT NULL,
    category       TEXT NOT NULL,
    value          REAL,
    status_key     TEXT,
    status_label   TEXT,
    captured_at    TEXT NOT NULL,   -- ISO 8601 UTC
    reference_date TEXT,            -- ISO date the data describes
    updated_at     TEXT NOT NULL,
    UNIQUE (source_key, region_key, category)
);

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    event_id        TEXT PRIMARY KEY,
    rule_key        TEXT NOT NULL,
    source_key      TEXT NOT NULL,
    region_key      TEXT NOT NULL,
    category        TEXT NOT NULL,
    signal          TEXT NOT NULL,   -- mirrors payload_json.signal
    transition      TEXT NOT NULL,   -- mirrors payload_json.transition
    payload_json    TEXT NOT NULL,
    reserve_id      TEXT NOT NULL REFERENCES reserves(reserve_id),
    idempotency_key TEXT NOT NULL UNIQUE,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id TEXT PRIMARY KEY,
    source_key      TEXT NOT NULL,
    channel_type    TEXT NOT NULL,
    target          TEXT NOT NULL,
    scope_json      TEXT NOT NULL,   -- JSON-encoded Scope
    category        TEXT NOT NULL,   -- category key or '*'
    enabled         INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    disabled_at     TEXT
);

-- At most one delivery per (event, subscription) pair.
CREATE TABLE IF NOT EXISTS deliveries (
    delivery_id     TEXT PRIMARY KEY,
    event_id        TEXT NOT NULL REFERENCES events(event_id),
    subscription_id TEXT NOT NULL REFERENCES subscriptions(subscription_id),
    attempts        INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'sent' | 'failed'
    last_error      TEXT,
    created_at      TEXT NOT NULL,
    sent_at         TEXT,
    UNIQUE (event_id, subscription_id)
);

CREATE INDEX IF NOT EXISTS reserves_source_idx      ON reserves(source_key);
CREATE INDEX IF NOT EXISTS events_reserve_idx       ON events(reserve_id);
CREATE INDEX IF NOT EXISTS events_scope_idx         ON events(region_key, category);
CREATE INDEX IF NOT EXISTS subscriptions_source_idx ON subscriptions(source_key, enabled);
CREATE INDEX IF NOT EXISTS deliveries_sub_idx       ON deliveries(subscription_id);

PRAGMA user_version = 1;
";
