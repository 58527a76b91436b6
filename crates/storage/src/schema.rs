use rusqlite::Connection;

use crate::error::StoreError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS versions (
    version INTEGER PRIMARY KEY AUTOINCREMENT,
    stamp INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    driver TEXT NOT NULL,
    version INTEGER NOT NULL,
    deleted_at_version INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_live_name
    ON entities (name) WHERE deleted_at_version IS NULL;
CREATE INDEX IF NOT EXISTS idx_entities_kind
    ON entities (kind) WHERE deleted_at_version IS NULL;

CREATE TABLE IF NOT EXISTS attributes (
    attr_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id),
    key TEXT NOT NULL,
    subkey TEXT,
    number INTEGER,
    datatype TEXT NOT NULL CHECK (datatype IN ('int', 'text', 'datetime', 'relation')),
    int_value INTEGER,
    text_value TEXT,
    datetime_value INTEGER,
    relation_id INTEGER REFERENCES entities (entity_id),
    is_claim INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL,
    deleted_at_version INTEGER
);
CREATE INDEX IF NOT EXISTS idx_attrs_entity_key ON attributes (entity_id, key);
CREATE INDEX IF NOT EXISTS idx_attrs_relation
    ON attributes (relation_id) WHERE relation_id IS NOT NULL;

-- Claim uniqueness lives in the database, not in a check-then-write in
-- application code: a second live exclusive claim of the same (key, value)
-- fails the insert. Forced claims (is_claim = 2) sit outside the index.
CREATE UNIQUE INDEX IF NOT EXISTS idx_attrs_claim ON attributes (
    key,
    datatype,
    coalesce(int_value, 0),
    coalesce(text_value, ''),
    coalesce(datetime_value, 0),
    coalesce(relation_id, 0)
) WHERE is_claim = 1 AND deleted_at_version IS NULL;

CREATE TABLE IF NOT EXISTS counters (
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id),
    key TEXT NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (entity_id, key)
);
";
