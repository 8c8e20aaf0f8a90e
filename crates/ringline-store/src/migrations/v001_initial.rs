//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `call_log`, `blocks`, and `presence`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Call log (one row per recipient; group calls fan out)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS call_log (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    room_id       TEXT NOT NULL,
    chat_id       TEXT NOT NULL,
    caller        TEXT NOT NULL,               -- user id
    recipient     TEXT NOT NULL,               -- user id
    call_type     TEXT NOT NULL,               -- 'audio' | 'video'
    outcome       TEXT NOT NULL,               -- 'missed' | 'declined' | 'completed'
    duration_secs INTEGER,                     -- only for 'completed'
    created_at    TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_call_log_chat_ts
    ON call_log(chat_id, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_call_log_recipient
    ON call_log(recipient, created_at DESC);

-- ----------------------------------------------------------------
-- Block relationships (directed edges)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    user_id    TEXT NOT NULL,
    blocked_id TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, blocked_id)
);

CREATE INDEX IF NOT EXISTS idx_blocks_user ON blocks(user_id);

-- ----------------------------------------------------------------
-- Presence (one row per user, upserted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS presence (
    user_id        TEXT PRIMARY KEY NOT NULL,
    is_online      INTEGER NOT NULL,           -- 0 | 1
    last_active_at TEXT NOT NULL               -- ISO-8601 / RFC-3339
);
"#;

/// Apply the v001 schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
