//! Database schema definitions
//!
//! This module contains the SQL schema for the job and page record store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl job
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    max_depth INTEGER NOT NULL CHECK (max_depth >= 1),
    max_pages INTEGER NOT NULL CHECK (max_pages >= 1)
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_requested_at ON jobs(requested_at);

-- One row per (job, url); the row doubles as the visited marker
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT REFERENCES jobs(id) ON DELETE SET NULL,
    url TEXT NOT NULL,
    last_crawled_at TEXT,
    http_status INTEGER,
    storage_key_raw TEXT,
    search_index_key TEXT,
    error TEXT,
    UNIQUE(job_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_url ON pages(url);
CREATE INDEX IF NOT EXISTS idx_pages_job ON pages(job_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
