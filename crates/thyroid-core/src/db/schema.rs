//! SQLite schema definition.

/// Complete database schema for the thyroid tracker.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Checkup Records
-- ============================================================================

CREATE TABLE IF NOT EXISTS checkup_records (
    id TEXT PRIMARY KEY,                          -- client-generated UUID
    date TEXT NOT NULL,                           -- YYYY-MM-DD
    checkup_type TEXT NOT NULL,                   -- comprehensive | thyroglobulin | ultrasound
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Duplicate checks and latest-per-type lookups
CREATE INDEX IF NOT EXISTS idx_records_type_date ON checkup_records(checkup_type, date);
CREATE INDEX IF NOT EXISTS idx_records_date ON checkup_records(date);

-- ============================================================================
-- Indicators
-- ============================================================================

CREATE TABLE IF NOT EXISTS indicators (
    id TEXT PRIMARY KEY,
    record_id TEXT NOT NULL REFERENCES checkup_records(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,                    -- order within the record
    name TEXT NOT NULL,
    value REAL NOT NULL,
    unit TEXT NOT NULL DEFAULT '',
    normal_range TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL                          -- low | normal | high, derived on write
);

CREATE INDEX IF NOT EXISTS idx_indicators_record ON indicators(record_id, position);
CREATE INDEX IF NOT EXISTS idx_indicators_name ON indicators(name);

-- ============================================================================
-- History Records (scanned report archive)
-- ============================================================================

CREATE TABLE IF NOT EXISTS history_records (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    title TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_history_date ON history_records(date);

CREATE TABLE IF NOT EXISTS history_images (
    record_id TEXT NOT NULL REFERENCES history_records(id) ON DELETE CASCADE,
    digest TEXT NOT NULL,                         -- hex SHA-256 of data
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (record_id, digest)
);

-- ============================================================================
-- Reminder Settings (one row per checkup type)
-- ============================================================================

CREATE TABLE IF NOT EXISTS reminder_settings (
    checkup_type TEXT PRIMARY KEY,
    custom_date TEXT,                             -- YYYY-MM-DD, used only when enabled
    is_enabled INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Preferences (usage counters, reminder preferences)
-- ============================================================================

CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,                          -- JSON-encoded value
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
