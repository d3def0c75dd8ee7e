//! Database schema definitions
//!
//! Bookkeeping tables only. Data tables are created at job creation time from
//! the inferred schema.

use crate::schema::{quote_identifier, sanitize_column_name, ColumnType};
use std::collections::{BTreeMap, HashSet};

/// SQL schema for the bookkeeping tables
pub const SCHEMA_SQL: &str = r#"
-- Crawl job configuration and progress
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    curl_command TEXT NOT NULL,
    table_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    pagination_type TEXT NOT NULL DEFAULT 'none',
    start_interval INTEGER NOT NULL DEFAULT 5,
    end_interval INTEGER NOT NULL DEFAULT 15,
    randomize_interval INTEGER NOT NULL DEFAULT 1,
    start_date TEXT,
    end_date TEXT,
    max_pages INTEGER,
    total_records INTEGER NOT NULL DEFAULT 0,
    current_page INTEGER NOT NULL DEFAULT 0,
    current_offset INTEGER NOT NULL DEFAULT 0,
    cursor_value TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status ON crawl_jobs(status);

-- Durable, append-only job logs
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_logs_job ON crawl_logs(job_id, id);

-- Run outcome notifications
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    job_id TEXT,
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_read ON notifications(is_read);
"#;

/// Initializes the bookkeeping schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Builds the CREATE TABLE statement for a data table
///
/// Column names are sanitized; when two fields sanitize to the same name,
/// ignoring ASCII case as SQLite does, the first one wins.
pub fn create_table_sql(table: &str, schema: &BTreeMap<String, ColumnType>) -> String {
    let mut seen = HashSet::new();
    let mut columns = vec![
        "\"_id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "\"_crawled_at\" TEXT DEFAULT CURRENT_TIMESTAMP".to_string(),
    ];

    for (name, column_type) in schema {
        let column = sanitize_column_name(name);
        if seen.insert(column.to_ascii_lowercase()) {
            columns.push(format!("{} {}", quote_identifier(&column), column_type.sql_name()));
        }
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table),
        columns.join(", ")
    )
}
