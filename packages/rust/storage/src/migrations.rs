//! SQL migration definitions for the run journal database.
//!
//! Migrations are applied in order on [`Journal::open`](crate::Journal::open).
//! The catalog databases are owned by whoever curates the media library and
//! are never migrated from here.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: runs, run_steps",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per enrichment run
CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    article_path TEXT NOT NULL,
    article_hash TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    status       TEXT NOT NULL,
    output_path  TEXT
);

-- Step payloads (profile, shortlist, attempt_N, ...)
CREATE TABLE IF NOT EXISTS run_steps (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    step         TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_run_steps_run_id ON run_steps(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index runs by article hash",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_runs_article_hash ON runs(article_hash);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
