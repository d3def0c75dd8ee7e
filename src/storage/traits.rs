//! Storage traits and error types
//!
//! This module defines the persistence seam the engine, the log bus and the
//! control surface talk to, and the errors it can raise.

use crate::logbus::LogEntry;
use crate::schema::ColumnType;
use crate::storage::{JobRecord, JobUpdate, NewJob, NotificationKind, NotificationRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Implementations are driven from several tasks through a shared mutex, so
/// every method is synchronous and short.
pub trait Storage {
    // ===== Data Tables =====

    /// Returns true if a table with this exact name exists
    fn table_exists(&self, table: &str) -> StorageResult<bool>;

    /// Creates a data table from an inferred schema
    ///
    /// The table gets an auto-increment `_id` and a `_crawled_at` timestamp in
    /// addition to the inferred columns.
    ///
    /// # Returns
    ///
    /// `true` if the table was created, `false` if it already existed
    fn create_table(
        &mut self,
        table: &str,
        schema: &BTreeMap<String, ColumnType>,
    ) -> StorageResult<bool>;

    /// Lists the column names of a table in declaration order
    fn table_columns(&self, table: &str) -> StorageResult<Vec<String>>;

    /// Inserts extracted records into a data table
    ///
    /// Records that are not objects, carry no known column, or fail to insert
    /// are skipped. Fields without a matching column are dropped.
    ///
    /// # Returns
    ///
    /// The number of records actually inserted
    fn insert_records(&mut self, table: &str, records: &[Value]) -> StorageResult<usize>;

    // ===== Jobs =====

    /// Persists a new job in the Pending state and returns its id
    fn create_job(&mut self, job: &NewJob) -> StorageResult<String>;

    /// Loads a job by id
    fn load_job(&self, job_id: &str) -> StorageResult<Option<JobRecord>>;

    /// Lists all jobs, newest first
    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>>;

    /// Writes the fields set in `update` and bumps `updated_at`
    fn save_job_fields(&mut self, job_id: &str, update: &JobUpdate) -> StorageResult<()>;

    // ===== Logs =====

    /// Appends an entry to the durable log and returns its id
    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<i64>;

    /// Reads a job's durable log
    ///
    /// With `since_id`, returns entries newer than that id in ascending
    /// order. Without, returns the latest `limit` entries in chronological
    /// order.
    fn read_logs(
        &self,
        job_id: &str,
        limit: usize,
        since_id: Option<i64>,
    ) -> StorageResult<Vec<LogEntry>>;

    /// Deletes a job's durable log, returning the number of removed entries
    fn clear_logs(&mut self, job_id: &str) -> StorageResult<usize>;

    // ===== Notifications =====

    /// Records a notification and returns its id
    fn create_notification(
        &mut self,
        job_id: Option<&str>,
        kind: NotificationKind,
        message: &str,
    ) -> StorageResult<String>;

    /// Lists notifications newest first
    fn list_notifications(
        &self,
        unread_only: bool,
        limit: usize,
    ) -> StorageResult<Vec<NotificationRecord>>;

    /// Marks a notification read; returns false if it does not exist
    fn mark_notification_read(&mut self, notification_id: &str) -> StorageResult<bool>;
}
