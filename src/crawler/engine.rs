//! Crawl engine
//!
//! Executes one run of a job: fetch a page, store its records, work out the
//! next page, wait, repeat. Progress is persisted after every page so a
//! paused job resumes on the page after the last one it finished.

use crate::config::EngineConfig;
use crate::crawler::fetcher::{execute_request, preview, FetchError, FetchResponse};
use crate::crawler::scheduler::{CancelToken, JobRunner};
use crate::logbus::{LogBus, LogLevel};
use crate::pagination::{
    detect, extract_data_array, next_page, PageDelta, PaginationInfo, PaginationState,
    PaginationStrategy,
};
use crate::request::{parse_curl_command, RequestDescriptor};
use crate::state::JobStatus;
use crate::storage::{self, JobRecord, JobUpdate, NotificationKind, SharedStorage, StorageError};
use crate::url::build_url_with_pagination;
use crate::ParseError;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Pagination ended, a boundary was reached, or the run was stopped
    Completed { reason: String },

    /// Retries were exhausted or an unexpected error ended the run
    Failed { message: String },

    /// Cancellation was observed; the job's status is left to the controller
    Cancelled,
}

impl RunOutcome {
    /// The job status this outcome leaves behind, if the engine sets one
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            RunOutcome::Completed { .. } => Some(JobStatus::Completed),
            RunOutcome::Failed { .. } => Some(JobStatus::Failed),
            RunOutcome::Cancelled => None,
        }
    }
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid stored cURL command: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to build request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: FetchError },
}

/// Runs crawl jobs against the shared storage and log bus
pub struct Engine {
    storage: SharedStorage,
    bus: Arc<LogBus>,
    client: Client,
    config: EngineConfig,
}

/// Fingerprint of the last page, used to stop cursor loops
struct PageFingerprint {
    cursor: Option<String>,
    hash: String,
}

impl Engine {
    pub fn new(storage: SharedStorage, bus: Arc<LogBus>, client: Client, config: EngineConfig) -> Self {
        Self {
            storage,
            bus,
            client,
            config,
        }
    }

    /// Executes one run of a job
    ///
    /// Never fails: every error is logged, persisted on the job, and turned
    /// into a `Failed` outcome with an error notification.
    ///
    /// # Arguments
    ///
    /// * `job_id` - The job to run
    /// * `cancel` - Checked at every loop boundary
    pub async fn run(&self, job_id: &str, cancel: &CancelToken) -> RunOutcome {
        self.bus.publish(
            job_id,
            LogLevel::Info,
            "Starting crawl job",
            Some(json!({ "job_id": job_id })),
        );

        match self.crawl(job_id, cancel).await {
            Ok(outcome) => outcome,
            Err(JobError::NotFound(_)) => {
                let message = "Job not found in database".to_string();
                self.bus.error(job_id, message.clone());
                RunOutcome::Failed { message }
            }
            Err(e @ JobError::RetriesExhausted { .. }) => {
                self.fail(job_id, Some(cancel), e.to_string())
            }
            Err(e) => self.fail(job_id, Some(cancel), format!("Crawl job error: {}", e)),
        }
    }

    async fn crawl(&self, job_id: &str, cancel: &CancelToken) -> Result<RunOutcome, JobError> {
        let job = storage::lock(&self.storage)?
            .load_job(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        self.bus.info(job_id, format!("Target table: {}", job.table_name));
        self.bus.info(job_id, format!("Pagination type: {}", job.pagination_type));

        {
            // A stop or pause issued before this point must not be overwritten
            let mut storage = storage::lock(&self.storage)?;
            if cancel.is_cancelled() {
                drop(storage);
                self.bus.warning(job_id, "Cancellation requested before start");
                return Ok(RunOutcome::Cancelled);
            }
            storage.save_job_fields(
                job_id,
                &JobUpdate {
                    status: Some(JobStatus::Running),
                    retry_count: Some(0),
                    error_message: Some(None),
                    ..Default::default()
                },
            )?;
        }
        self.bus.success(job_id, "Job status updated to RUNNING");

        let request = parse_curl_command(&job.curl_command)?;
        self.bus.info(
            job_id,
            format!("Parsed: {} {}", request.method, preview(&request.url, 80)),
        );

        let strategy = job.pagination_type;
        let mut state = PaginationState {
            page: job.current_page.max(1),
            offset: job.current_offset,
            cursor: job.cursor_value.clone(),
        };
        let mut total_records = job.total_records;
        let mut info = PaginationInfo::default();
        let mut last_page: Option<PageFingerprint> = None;
        let mut request_count = 0u64;

        self.bus.info(
            job_id,
            format!(
                "Starting from page {}, {} existing records",
                state.page, total_records
            ),
        );

        loop {
            if cancel.is_cancelled() {
                self.bus.warning(job_id, "Cancellation requested, stopping crawl");
                return Ok(RunOutcome::Cancelled);
            }

            if let Some(reason) = boundary_reached(&job, &state) {
                self.bus.warning(job_id, format!("{}, stopping crawl", reason));
                return self.complete(
                    job_id,
                    cancel,
                    total_records,
                    reason,
                    Some(reason.to_string()),
                );
            }

            let url = build_url_with_pagination(&request.url, strategy, &state)?;
            request_count += 1;
            self.bus.info(
                job_id,
                format!(
                    "Request #{}: {} {}",
                    request_count,
                    request.method,
                    preview(&url, 100)
                ),
            );

            let Some(response) = self.fetch_with_retry(job_id, &request, &url, cancel).await?
            else {
                self.bus.warning(job_id, "Cancellation requested during backoff");
                return Ok(RunOutcome::Cancelled);
            };

            let records = extract_data_array(&response.body);

            if strategy == PaginationStrategy::CursorBased && !records.is_empty() {
                let fingerprint = PageFingerprint {
                    cursor: state.cursor.clone(),
                    hash: hash_records(records),
                };
                if let Some(previous) = &last_page {
                    if previous.cursor == fingerprint.cursor && previous.hash == fingerprint.hash {
                        self.bus.warning(
                            job_id,
                            "Received the same page again with an unchanged cursor",
                        );
                        return self.complete(
                            job_id,
                            cancel,
                            total_records,
                            "Repeated page detected",
                            None,
                        );
                    }
                }
                last_page = Some(fingerprint);
            }

            if records.is_empty() {
                self.bus.warning(job_id, "No data extracted from response");
            } else {
                let inserted = storage::lock(&self.storage)?.insert_records(&job.table_name, records)?;
                total_records += inserted as u64;
                self.save(
                    job_id,
                    JobUpdate {
                        total_records: Some(total_records),
                        current_page: Some(state.page),
                        ..Default::default()
                    },
                )?;

                self.bus.publish(
                    job_id,
                    LogLevel::Success,
                    format!("Inserted {} records (Total: {})", inserted, total_records),
                    Some(json!({
                        "inserted": inserted,
                        "total": total_records,
                        "page": state.page,
                    })),
                );

                let skipped = records.len() - inserted;
                if skipped > 0 {
                    self.bus.warning(
                        job_id,
                        format!("Skipped {} records that could not be stored", skipped),
                    );
                }
            }

            let (_, mut detected) = detect(&request.url, &response.body);
            detected.merge_missing(&info);
            info = detected;

            let Some(delta) = next_page(strategy, &info, &state, &response.body) else {
                let outcome = self.complete(job_id, cancel, total_records, "No more pages", None)?;
                if matches!(outcome, RunOutcome::Completed { .. }) {
                    self.bus.success(
                        job_id,
                        format!("Crawl completed! Total records: {}", total_records),
                    );
                }
                return Ok(outcome);
            };

            state.apply(&delta);
            self.save(
                job_id,
                JobUpdate {
                    current_page: Some(state.page),
                    current_offset: Some(state.offset),
                    cursor_value: Some(state.cursor.clone()),
                    ..Default::default()
                },
            )?;
            self.log_position(job_id, &delta, &state);

            let interval = self.next_interval(&job);
            self.bus.info(
                job_id,
                format!("Waiting {}s before next request", interval.as_secs()),
            );
            if !sleep_unless_cancelled(interval, cancel).await {
                self.bus.warning(job_id, "Cancellation requested, stopping crawl");
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    /// Sends the request, retrying failures with exponential backoff
    ///
    /// Returns `Ok(None)` if cancellation was requested during a backoff wait.
    async fn fetch_with_retry(
        &self,
        job_id: &str,
        request: &RequestDescriptor,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<Option<FetchResponse>, JobError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match execute_request(&self.client, request, url).await {
                Ok(response) => {
                    if attempt > 0 {
                        self.save(
                            job_id,
                            JobUpdate {
                                retry_count: Some(0),
                                ..Default::default()
                            },
                        )?;
                    }
                    self.bus.publish(
                        job_id,
                        LogLevel::Success,
                        format!(
                            "Response: {} ({:.2}s)",
                            response.status,
                            response.elapsed.as_secs_f64()
                        ),
                        Some(json!({
                            "status_code": response.status,
                            "elapsed": response.elapsed.as_secs_f64(),
                        })),
                    );
                    return Ok(Some(response));
                }
                Err(e) => {
                    attempt += 1;
                    self.save(
                        job_id,
                        JobUpdate {
                            retry_count: Some(attempt),
                            ..Default::default()
                        },
                    )?;
                    self.bus.warning(
                        job_id,
                        format!(
                            "Attempt {}/{} failed: {}",
                            attempt,
                            max_attempts,
                            preview(&e.to_string(), 100)
                        ),
                    );

                    if attempt >= max_attempts {
                        return Err(JobError::RetriesExhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let wait = self.config.backoff_for(attempt - 1);
                    self.bus.info(job_id, format!("Waiting {:?} before retry", wait));
                    if !sleep_unless_cancelled(wait, cancel).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn next_interval(&self, job: &JobRecord) -> Duration {
        let start = job.start_interval;
        let end = job.end_interval.max(start);
        let secs = if job.randomize_interval {
            rand::thread_rng().gen_range(start..=end)
        } else {
            start
        };
        Duration::from_secs(secs)
    }

    fn log_position(&self, job_id: &str, delta: &PageDelta, state: &PaginationState) {
        let message = match delta {
            PageDelta::Page(page) => format!("Next page: {}", page),
            PageDelta::Offset(offset) => format!("Next offset: {}", offset),
            PageDelta::Cursor(cursor) => format!("Next cursor: {}", preview(cursor, 50)),
            PageDelta::Unchanged => format!("Continuing with the same cursor (page {})", state.page),
        };
        self.bus.debug(job_id, message);
    }

    fn save(&self, job_id: &str, update: JobUpdate) -> Result<(), StorageError> {
        storage::lock(&self.storage)?.save_job_fields(job_id, &update)
    }

    /// Writes a terminal update unless a control verb already settled the job
    ///
    /// Returns false, leaving the row untouched, when the run was cancelled
    /// or the stored status is no longer Running.
    fn settle(
        &self,
        job_id: &str,
        cancel: Option<&CancelToken>,
        update: JobUpdate,
    ) -> Result<bool, StorageError> {
        let mut storage = storage::lock(&self.storage)?;
        let cancelled = cancel.map(CancelToken::is_cancelled).unwrap_or(false);
        let running = storage
            .load_job(job_id)?
            .map(|job| job.status == JobStatus::Running)
            .unwrap_or(false);
        if cancelled || !running {
            return Ok(false);
        }

        storage.save_job_fields(job_id, &update)?;
        Ok(true)
    }

    fn complete(
        &self,
        job_id: &str,
        cancel: &CancelToken,
        total_records: u64,
        reason: &str,
        stored_reason: Option<String>,
    ) -> Result<RunOutcome, JobError> {
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            error_message: Some(stored_reason),
            ..Default::default()
        };
        if !self.settle(job_id, Some(cancel), update)? {
            self.bus.warning(
                job_id,
                format!("Run ended ({}) after the job was stopped or paused", reason),
            );
            return Ok(RunOutcome::Cancelled);
        }

        let message = format!(
            "Crawl completed ({})! Collected {} records.",
            reason, total_records
        );
        if let Err(e) = self.bus.notify(job_id, NotificationKind::Success, &message) {
            tracing::warn!("Failed to record completion notification for {}: {}", job_id, e);
        }

        Ok(RunOutcome::Completed {
            reason: reason.to_string(),
        })
    }

    /// Marks the job Failed; bookkeeping failures only reach `tracing`
    fn fail(&self, job_id: &str, cancel: Option<&CancelToken>, message: String) -> RunOutcome {
        self.bus.error(job_id, message.clone());

        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            error_message: Some(Some(message.clone())),
            ..Default::default()
        };
        match self.settle(job_id, cancel, update) {
            Ok(true) => {}
            Ok(false) => return RunOutcome::Cancelled,
            Err(e) => tracing::error!("Failed to mark job {} as failed: {}", job_id, e),
        }

        let notification = format!("Crawl job failed: {}", message);
        if let Err(e) = self.bus.notify(job_id, NotificationKind::Error, &notification) {
            tracing::error!("Failed to record failure notification for {}: {}", job_id, e);
        }

        RunOutcome::Failed { message }
    }
}

#[async_trait]
impl JobRunner for Engine {
    async fn run(&self, job_id: &str, cancel: &CancelToken) -> RunOutcome {
        Engine::run(self, job_id, cancel).await
    }

    fn on_panic(&self, job_id: &str, message: &str) {
        self.fail(job_id, None, format!("Crawl job error: run panicked: {}", message));
    }
}

/// Returns the reason a job must stop before fetching the next page
fn boundary_reached(job: &JobRecord, state: &PaginationState) -> Option<&'static str> {
    if job.end_date.map(|end| Utc::now() > end).unwrap_or(false) {
        return Some("End date reached");
    }
    if job.max_pages.map(|max| state.page > max).unwrap_or(false) {
        return Some("Max pages reached");
    }
    None
}

fn hash_records(records: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Sleeps for `duration`; returns false if cancellation came first
async fn sleep_unless_cancelled(duration: Duration, cancel: &CancelToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => !cancel.is_cancelled(),
        _ = cancel.cancelled() => false,
    }
}
