use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for api-harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

/// Crawl engine and scheduler behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of job runs executing at the same time
    #[serde(rename = "max-concurrent-jobs")]
    pub max_concurrent_jobs: usize,

    /// Attempts per page before the job is marked failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Unit of the exponential backoff (milliseconds); wait = base * 2^attempt
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Interval lower bound used when a job does not specify one (seconds)
    #[serde(rename = "default-start-interval")]
    pub default_start_interval: u64,

    /// Interval upper bound used when a job does not specify one (seconds)
    #[serde(rename = "default-end-interval")]
    pub default_end_interval: u64,
}

impl EngineConfig {
    /// Backoff to wait after the given zero-based failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            max_attempts: 3,
            backoff_base_ms: 1000,
            default_start_interval: 5,
            default_end_interval: 15,
        }
    }
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-attempt request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// User agent sent when the captured command does not set one
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("api-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Live log stream settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Number of recent entries kept in memory per job
    #[serde(rename = "ring-capacity")]
    pub ring_capacity: usize,

    /// Silence after which a subscriber receives a keepalive (seconds)
    #[serde(rename = "keepalive-secs")]
    pub keepalive_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 100,
            keepalive_secs: 30,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./api_harvest.db".to_string(),
        }
    }
}
