//! Storage module for persisting crawl data
//!
//! This module handles all database operations, including:
//! - Bookkeeping schema management (jobs, logs, notifications)
//! - Data table creation from inferred schemas and record insertion
//! - Job progress persistence for pause / resume
//! - The durable, append-only job log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::pagination::PaginationStrategy;
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by the engine, the log bus and the control surface
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Opens (or creates) the database at `path` and wraps it for sharing
pub fn open_storage(path: &Path) -> StorageResult<SharedStorage> {
    Ok(shared(SqliteStorage::new(path)?))
}

/// Wraps a storage backend for sharing
pub fn shared<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks a shared storage handle
///
/// The guard must be dropped before the caller awaits anything.
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// A persisted crawl job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub curl_command: String,
    pub table_name: String,
    pub status: JobStatus,
    pub pagination_type: PaginationStrategy,
    pub start_interval: u64,
    pub end_interval: u64,
    pub randomize_interval: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_pages: Option<u64>,
    pub total_records: u64,
    pub current_page: u64,
    pub current_offset: u64,
    pub cursor_value: Option<String>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable configuration of a job about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub curl_command: String,
    pub table_name: String,
    pub pagination_type: PaginationStrategy,
    pub start_interval: u64,
    pub end_interval: u64,
    pub randomize_interval: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_pages: Option<u64>,
}

/// A partial update of a job's mutable state
///
/// Unset fields are left untouched. The nested options of `cursor_value`
/// and `error_message` distinguish "leave" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current_page: Option<u64>,
    pub current_offset: Option<u64>,
    pub cursor_value: Option<Option<String>>,
    pub total_records: Option<u64>,
    pub retry_count: Option<u32>,
    pub error_message: Option<Option<String>>,
}

impl JobUpdate {
    /// An update that only changes the status
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Returns true if no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Kind of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Success,
    Info,
}

impl NotificationKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Success => "success",
            Self::Info => "info",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_db_string())
    }
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: String,
    pub job_id: Option<String>,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}
