//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `couples`, `user_profiles`, `events`,
//! `love_notes`, and `memories`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Couples
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS couples (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    couple_code      TEXT NOT NULL UNIQUE,        -- 6 chars, uppercase
    anniversary_date TEXT,                        -- ISO-8601 date
    created_at       TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- User profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_profiles (
    id         TEXT PRIMARY KEY NOT NULL,         -- UUID of the auth identity
    name       TEXT NOT NULL,
    couple_id  TEXT,                              -- nullable FK -> couples(id)
    avatar_url TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (couple_id) REFERENCES couples(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_user_profiles_couple_id ON user_profiles(couple_id);

-- ----------------------------------------------------------------
-- Events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY NOT NULL,        -- UUID v4
    couple_id   TEXT NOT NULL,                    -- FK -> couples(id)
    title       TEXT NOT NULL,
    description TEXT,
    event_date  TEXT NOT NULL,                    -- ISO-8601 date
    event_time  TEXT,                             -- HH:MM:SS
    event_type  TEXT NOT NULL DEFAULT 'date',     -- date | anniversary | todo
    color       TEXT NOT NULL DEFAULT '#FF6B9D',  -- #RRGGBB
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (couple_id) REFERENCES couples(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_events_couple_date
    ON events(couple_id, event_date ASC);

-- ----------------------------------------------------------------
-- Love notes
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS love_notes (
    id           TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    couple_id    TEXT NOT NULL,                   -- FK -> couples(id)
    from_user_id TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,
    message      TEXT NOT NULL,
    is_read      INTEGER NOT NULL DEFAULT 0,      -- boolean 0/1
    read_at      TEXT,                            -- RFC-3339, set once
    created_at   TEXT NOT NULL,

    FOREIGN KEY (couple_id) REFERENCES couples(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_love_notes_couple_ts
    ON love_notes(couple_id, created_at ASC);

CREATE INDEX IF NOT EXISTS idx_love_notes_unread
    ON love_notes(to_user_id, is_read);

-- ----------------------------------------------------------------
-- Memories
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS memories (
    id          TEXT PRIMARY KEY NOT NULL,        -- UUID v4
    couple_id   TEXT NOT NULL,                    -- FK -> couples(id)
    title       TEXT NOT NULL,
    description TEXT,
    image_url   TEXT,
    memory_date TEXT NOT NULL,                    -- ISO-8601 date
    category    TEXT,
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (couple_id) REFERENCES couples(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_memories_couple_date
    ON memories(couple_id, memory_date DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
