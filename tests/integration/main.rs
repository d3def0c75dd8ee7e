//! Integration tests for api-harvest
//!
//! These tests use wiremock to create mock APIs and drive jobs through the
//! control surface against a SQLite database in a temporary directory.

mod control_tests;
mod crawl_tests;

use api_harvest::config::Config;
use api_harvest::crawler::{build_service, CrawlService, JobConfig};
use api_harvest::storage::{open_storage, JobRecord};
use std::path::PathBuf;
use tempfile::TempDir;

/// A service over a fresh on-disk database
pub struct TestHarness {
    pub service: CrawlService,
    pub db_path: PathBuf,
    _dir: TempDir,
}

impl TestHarness {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("harvest.db");

        let mut config = Config::default();
        config.engine.max_concurrent_jobs = max_concurrent_jobs;
        config.engine.backoff_base_ms = 10;
        config.engine.default_start_interval = 0;
        config.engine.default_end_interval = 0;
        config.http.request_timeout_secs = 5;

        let storage = open_storage(&db_path).expect("Failed to open storage");
        let service = build_service(storage, &config).expect("Failed to build service");

        Self {
            service,
            db_path,
            _dir: dir,
        }
    }

    pub fn job(&self, job_id: &str) -> JobRecord {
        self.service
            .job(job_id)
            .expect("Failed to load job")
            .expect("Job missing")
    }

    /// Counts rows of a data table through a separate connection
    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = rusqlite::Connection::open(&self.db_path).expect("Failed to open DB");
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
            row.get(0)
        })
        .expect("Failed to count rows")
    }

    /// Messages of a job's durable log, oldest first
    pub fn log_messages(&self, job_id: &str) -> Vec<String> {
        self.service
            .bus()
            .read_page(job_id, 1000, None)
            .expect("Failed to read logs")
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }
}

/// A job over `url` with no wait between requests
pub fn job_config(url: &str, table: &str) -> JobConfig {
    let mut config = JobConfig::new(format!("curl '{}' -H 'Accept: application/json'", url), table);
    config.start_interval = Some(0);
    config.end_interval = Some(0);
    config.randomize_interval = false;
    config
}
