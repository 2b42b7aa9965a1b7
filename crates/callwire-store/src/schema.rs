/// SQL DDL for the callwire database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS call_sessions (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL,
    caller_user_id TEXT NOT NULL,
    callee_user_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    last_event_type TEXT,
    last_event_at TEXT,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_call_sessions_room ON call_sessions(room_id);
CREATE INDEX IF NOT EXISTS idx_call_sessions_caller ON call_sessions(caller_user_id);
CREATE INDEX IF NOT EXISTS idx_call_sessions_callee ON call_sessions(callee_user_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_call_sessions_one_active
    ON call_sessions(room_id) WHERE active = 1;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
