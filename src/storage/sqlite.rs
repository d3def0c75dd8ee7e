//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::logbus::{LogEntry, LogLevel};
use crate::pagination::PaginationStrategy;
use crate::schema::{quote_identifier, sanitize_column_name, ColumnType};
use crate::state::JobStatus;
use crate::storage::schema::{create_table_sql, initialize_schema};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{JobRecord, JobUpdate, NewJob, NotificationKind, NotificationRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const JOB_COLUMNS: &str = "id, curl_command, table_name, status, pagination_type, \
     start_interval, end_interval, randomize_interval, start_date, end_date, max_pages, \
     total_records, current_page, current_offset, cursor_value, retry_count, error_message, \
     created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Data Tables =====

    fn table_exists(&self, table: &str) -> StorageResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_table(
        &mut self,
        table: &str,
        schema: &BTreeMap<String, ColumnType>,
    ) -> StorageResult<bool> {
        if self.table_exists(table)? {
            return Ok(false);
        }
        self.conn.execute_batch(&create_table_sql(table, schema))?;
        tracing::debug!("Created table {} with {} columns", table, schema.len());
        Ok(true)
    }

    fn table_columns(&self, table: &str) -> StorageResult<Vec<String>> {
        if !self.table_exists(table)? {
            return Err(StorageError::TableNotFound(table.to_string()));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn insert_records(&mut self, table: &str, records: &[Value]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // SQLite column names are case-insensitive
        let known: HashMap<String, String> = self
            .table_columns(table)?
            .into_iter()
            .map(|column| (column.to_ascii_lowercase(), column))
            .collect();
        let quoted_table = quote_identifier(table);
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        for (index, record) in records.iter().enumerate() {
            let Some(object) = record.as_object() else {
                tracing::warn!("Skipping record {} in {}: not an object", index, table);
                continue;
            };

            let mut columns: Vec<&str> = Vec::new();
            let mut values = Vec::new();
            for (field, value) in object {
                let key = sanitize_column_name(field).to_ascii_lowercase();
                if let Some(column) = known.get(&key) {
                    if !columns.contains(&column.as_str()) {
                        columns.push(column);
                        values.push(to_sql_value(value));
                    }
                }
            }

            if columns.is_empty() {
                tracing::warn!("Skipping record {} in {}: no known columns", index, table);
                continue;
            }

            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted_table,
                columns
                    .iter()
                    .map(|c| quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", "),
                vec!["?"; columns.len()].join(", ")
            );

            match tx.execute(&sql, params_from_iter(values)) {
                Ok(_) => inserted += 1,
                Err(e) => tracing::warn!("Failed to insert record {} into {}: {}", index, table, e),
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    // ===== Jobs =====

    fn create_job(&mut self, job: &NewJob) -> StorageResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO crawl_jobs (id, curl_command, table_name, status, pagination_type,
             start_interval, end_interval, randomize_interval, start_date, end_date, max_pages,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                job.curl_command,
                job.table_name,
                JobStatus::Pending.to_db_string(),
                job.pagination_type.to_db_string(),
                job.start_interval as i64,
                job.end_interval as i64,
                job.randomize_interval,
                job.start_date.map(|d| d.to_rfc3339()),
                job.end_date.map(|d| d.to_rfc3339()),
                job.max_pages.map(|p| p as i64),
                now,
            ],
        )?;

        Ok(id)
    }

    fn load_job(&self, job_id: &str) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_jobs ORDER BY rowid DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn save_job_fields(&mut self, job_id: &str, update: &JobUpdate) -> StorageResult<()> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(status) = update.status {
            assignments.push("status");
            values.push(SqlValue::Text(status.to_db_string().to_string()));
        }
        if let Some(page) = update.current_page {
            assignments.push("current_page");
            values.push(SqlValue::Integer(page as i64));
        }
        if let Some(offset) = update.current_offset {
            assignments.push("current_offset");
            values.push(SqlValue::Integer(offset as i64));
        }
        if let Some(cursor) = &update.cursor_value {
            assignments.push("cursor_value");
            values.push(optional_text(cursor));
        }
        if let Some(total) = update.total_records {
            assignments.push("total_records");
            values.push(SqlValue::Integer(total as i64));
        }
        if let Some(retries) = update.retry_count {
            assignments.push("retry_count");
            values.push(SqlValue::Integer(i64::from(retries)));
        }
        if let Some(message) = &update.error_message {
            assignments.push("error_message");
            values.push(optional_text(message));
        }

        assignments.push("updated_at");
        values.push(SqlValue::Text(Utc::now().to_rfc3339()));

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(SqlValue::Text(job_id.to_string()));

        let changed = self.conn.execute(
            &format!(
                "UPDATE crawl_jobs SET {} WHERE id = ?{}",
                set_clause,
                values.len()
            ),
            params_from_iter(values),
        )?;

        if changed == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    // ===== Logs =====

    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<i64> {
        let details = entry
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO crawl_logs (job_id, level, message, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.job_id,
                entry.level.to_db_string(),
                entry.message,
                details,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn read_logs(
        &self,
        job_id: &str,
        limit: usize,
        since_id: Option<i64>,
    ) -> StorageResult<Vec<LogEntry>> {
        let limit = limit as i64;
        let entries = match since_id {
            Some(since) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, job_id, level, message, details, created_at FROM crawl_logs
                     WHERE job_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![job_id, since, limit], log_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, job_id, level, message, details, created_at FROM (
                         SELECT * FROM crawl_logs WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2
                     ) ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![job_id, limit], log_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(entries)
    }

    fn clear_logs(&mut self, job_id: &str) -> StorageResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM crawl_logs WHERE job_id = ?1", params![job_id])?;
        Ok(removed)
    }

    // ===== Notifications =====

    fn create_notification(
        &mut self,
        job_id: Option<&str>,
        kind: NotificationKind,
        message: &str,
    ) -> StorageResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO notifications (id, job_id, type, message, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![id, job_id, kind.to_db_string(), message, Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    fn list_notifications(
        &self,
        unread_only: bool,
        limit: usize,
    ) -> StorageResult<Vec<NotificationRecord>> {
        let filter = if unread_only { "WHERE is_read = 0" } else { "" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, job_id, type, message, is_read, created_at FROM notifications
             {} ORDER BY rowid DESC LIMIT ?1",
            filter
        ))?;

        let notifications = stmt
            .query_map(params![limit as i64], |row| {
                let kind: String = row.get(2)?;
                Ok(NotificationRecord {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    kind: NotificationKind::from_db_string(&kind)
                        .unwrap_or(NotificationKind::Info),
                    message: row.get(3)?,
                    is_read: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn mark_notification_read(&mut self, notification_id: &str) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            params![notification_id],
        )?;
        Ok(changed > 0)
    }
}

/// Converts a JSON value into a SQLite value
///
/// Booleans become 0/1; nested objects and arrays are stored as JSON text.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn optional_text(value: &Option<String>) -> SqlValue {
    value
        .as_ref()
        .map(|s| SqlValue::Text(s.clone()))
        .unwrap_or(SqlValue::Null)
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn optional_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(index)?
        .map(|raw| parse_timestamp(index, &raw))
        .transpose()
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(3)?;
    let pagination: String = row.get(4)?;

    Ok(JobRecord {
        id: row.get(0)?,
        curl_command: row.get(1)?,
        table_name: row.get(2)?,
        status: JobStatus::from_db_string(&status).unwrap_or(JobStatus::Failed),
        pagination_type: PaginationStrategy::from_db_string(&pagination)
            .unwrap_or(PaginationStrategy::None),
        start_interval: row.get::<_, i64>(5)?.max(0) as u64,
        end_interval: row.get::<_, i64>(6)?.max(0) as u64,
        randomize_interval: row.get(7)?,
        start_date: optional_timestamp(row, 8)?,
        end_date: optional_timestamp(row, 9)?,
        max_pages: row.get::<_, Option<i64>>(10)?.map(|p| p.max(0) as u64),
        total_records: row.get::<_, i64>(11)?.max(0) as u64,
        current_page: row.get::<_, i64>(12)?.max(0) as u64,
        current_offset: row.get::<_, i64>(13)?.max(0) as u64,
        cursor_value: row.get(14)?,
        retry_count: row.get(15)?,
        error_message: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let level: String = row.get(2)?;
    let details: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(LogEntry {
        id: Some(row.get(0)?),
        job_id: row.get(1)?,
        level: LogLevel::from_db_string(&level).unwrap_or(LogLevel::Info),
        message: row.get(3)?,
        detail: details
            .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(4, e)))
            .transpose()?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}
