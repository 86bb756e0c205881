//! SQLite schema definition.

/// Complete database schema for the durable store.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Aggregate Store (one JSON document per namespaced aggregate name)
-- ============================================================================

CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,                        -- namespace prefix + aggregate name
    value TEXT NOT NULL,                         -- JSON-serialized collection
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Sync State
-- ============================================================================

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Track when a remote snapshot was last applied
INSERT OR IGNORE INTO sync_state (key, value) VALUES ('last_remote_sync', '');
"#;
