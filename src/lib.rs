//! api-harvest: recurring, paginated API ingestion
//!
//! This crate turns a captured `curl` invocation into a crawl job. It infers
//! how the target API paginates, fetches pages on a jittered schedule, stores
//! the extracted records in a table whose schema is inferred on the fly, and
//! publishes a live, replayable log stream for every job.

pub mod config;
pub mod crawler;
pub mod logbus;
pub mod pagination;
pub mod request;
pub mod schema;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for api-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid cURL command: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Request failed: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Crawl job error: {0}")]
    Job(#[from] crawler::JobError),

    #[error("Job control error: {0}")]
    Control(#[from] crawler::ControlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while parsing a request descriptor
///
/// These are surfaced to the caller before any job exists and are never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Failed to parse command: unbalanced quotes or dangling escape")]
    MalformedQuoting,

    #[error("Command must start with 'curl'")]
    MissingKeyword,

    #[error("No URL found in cURL command")]
    MissingUrl,

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors raised by the pre-flight validation of a new job
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid cURL command: {0}")]
    Parse(#[from] ParseError),

    #[error("API returned error status: {status}")]
    Status { status: u16 },

    #[error("API response is not valid JSON")]
    NotJson { status: u16, preview: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid table name '{0}'")]
    TableName(String),

    #[error("Invalid interval: start ({start}s) must not exceed end ({end}s)")]
    Interval { start: u64, end: u64 },
}

/// Result type alias for api-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlService, Engine, RunOutcome, Scheduler};
pub use logbus::{LogBus, LogEntry, LogLevel};
pub use pagination::{detect, next_page, PaginationStrategy};
pub use request::{parse_curl_command, RequestDescriptor};
pub use schema::{infer_schema, ColumnType};
pub use state::JobStatus;
