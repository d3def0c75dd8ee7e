//! Job control surface
//!
//! The verbs an operator (or the CLI) uses to drive jobs: create, start,
//! pause, resume, stop, and the read-only views of jobs and notifications.

use crate::config::EngineConfig;
use crate::crawler::scheduler::{JobHandle, Scheduler};
use crate::crawler::validate::validate_curl;
use crate::logbus::LogBus;
use crate::schema::validate_table_name;
use crate::state::JobStatus;
use crate::storage::{
    self, JobRecord, JobUpdate, NewJob, NotificationRecord, SharedStorage, StorageError,
};
use crate::{HarvestError, ValidationError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

/// Most notifications returned by one listing
const NOTIFICATION_LIMIT: usize = 50;

/// Errors raised by the control verbs
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is {status}; cannot {action}")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration of a job to create
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub curl_command: String,
    pub table_name: String,
    /// Seconds between requests; `None` uses the configured default
    pub start_interval: Option<u64>,
    pub end_interval: Option<u64>,
    pub randomize_interval: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_pages: Option<u64>,
}

impl JobConfig {
    pub fn new(curl_command: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            curl_command: curl_command.into(),
            table_name: table_name.into(),
            start_interval: None,
            end_interval: None,
            randomize_interval: true,
            start_date: None,
            end_date: None,
            max_pages: None,
        }
    }
}

/// Entry point for job control
pub struct CrawlService {
    storage: SharedStorage,
    bus: Arc<LogBus>,
    scheduler: Arc<Scheduler>,
    client: Client,
    defaults: EngineConfig,
}

impl CrawlService {
    pub fn new(
        storage: SharedStorage,
        bus: Arc<LogBus>,
        scheduler: Arc<Scheduler>,
        client: Client,
        defaults: EngineConfig,
    ) -> Self {
        Self {
            storage,
            bus,
            scheduler,
            client,
            defaults,
        }
    }

    pub fn bus(&self) -> &Arc<LogBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Validates a job configuration and persists it as a Pending job
    ///
    /// The request is sent once; its response decides the pagination
    /// strategy and, if the table does not exist yet, its schema.
    ///
    /// # Returns
    ///
    /// The new job's id
    pub async fn create_job(&self, config: JobConfig) -> Result<String, HarvestError> {
        let start_interval = config
            .start_interval
            .unwrap_or(self.defaults.default_start_interval);
        let end_interval = config
            .end_interval
            .unwrap_or(self.defaults.default_end_interval.max(start_interval));
        if start_interval > end_interval {
            return Err(ValidationError::Interval {
                start: start_interval,
                end: end_interval,
            }
            .into());
        }
        validate_table_name(&config.table_name)?;

        let report = validate_curl(&self.client, &config.curl_command).await?;

        let job_id = {
            let mut storage = storage::lock(&self.storage)?;
            if storage.create_table(&config.table_name, &report.schema)? {
                tracing::info!(
                    "Created table {} ({} columns)",
                    config.table_name,
                    report.schema.len()
                );
            }
            storage.create_job(&NewJob {
                curl_command: config.curl_command,
                table_name: config.table_name.clone(),
                pagination_type: report.strategy,
                start_interval,
                end_interval,
                randomize_interval: config.randomize_interval,
                start_date: config.start_date,
                end_date: config.end_date,
                max_pages: config.max_pages,
            })?
        };

        self.bus.info(
            &job_id,
            format!(
                "Job created for table {} ({} pagination)",
                config.table_name, report.strategy
            ),
        );
        Ok(job_id)
    }

    /// Launches a job that is not already running
    pub fn start(&self, job_id: &str) -> Result<JobHandle, ControlError> {
        let job = self.require(job_id)?;
        if !job.status.can_start() {
            return Err(invalid_state(&job, "start"));
        }
        Ok(self.scheduler.launch(job_id))
    }

    /// Cancels a running job and keeps its progress for a later resume
    pub fn pause(&self, job_id: &str) -> Result<(), ControlError> {
        {
            // The engine settles a finished run under the same lock
            let mut storage = storage::lock(&self.storage)?;
            let job = storage
                .load_job(job_id)?
                .ok_or_else(|| ControlError::NotFound(job_id.to_string()))?;
            if job.status != JobStatus::Running {
                return Err(invalid_state(&job, "pause"));
            }

            self.scheduler.cancel(job_id);
            storage.save_job_fields(job_id, &JobUpdate::status(JobStatus::Paused))?;
        }
        self.bus.warning(job_id, "Job paused");
        Ok(())
    }

    /// Re-launches a paused job from its persisted progress
    pub fn resume(&self, job_id: &str) -> Result<JobHandle, ControlError> {
        let job = self.require(job_id)?;
        if job.status != JobStatus::Paused {
            return Err(invalid_state(&job, "resume"));
        }

        self.bus.info(job_id, "Job resumed");
        Ok(self.scheduler.launch(job_id))
    }

    /// Cancels a job for good and marks it Completed
    pub fn stop(&self, job_id: &str) -> Result<(), ControlError> {
        {
            let mut storage = storage::lock(&self.storage)?;
            if storage.load_job(job_id)?.is_none() {
                return Err(ControlError::NotFound(job_id.to_string()));
            }

            self.scheduler.cancel(job_id);
            storage.save_job_fields(
                job_id,
                &JobUpdate {
                    status: Some(JobStatus::Completed),
                    error_message: Some(Some("Manually stopped".to_string())),
                    ..Default::default()
                },
            )?;
        }
        self.bus.warning(job_id, "Job stopped manually");
        Ok(())
    }

    pub fn job(&self, job_id: &str) -> Result<Option<JobRecord>, ControlError> {
        Ok(storage::lock(&self.storage)?.load_job(job_id)?)
    }

    pub fn jobs(&self) -> Result<Vec<JobRecord>, ControlError> {
        Ok(storage::lock(&self.storage)?.list_jobs()?)
    }

    /// Lists notifications newest first, capped at fifty
    pub fn notifications(&self, unread_only: bool) -> Result<Vec<NotificationRecord>, ControlError> {
        Ok(storage::lock(&self.storage)?.list_notifications(unread_only, NOTIFICATION_LIMIT)?)
    }

    pub fn mark_notification_read(&self, notification_id: &str) -> Result<bool, ControlError> {
        Ok(storage::lock(&self.storage)?.mark_notification_read(notification_id)?)
    }

    fn require(&self, job_id: &str) -> Result<JobRecord, ControlError> {
        self.job(job_id)?
            .ok_or_else(|| ControlError::NotFound(job_id.to_string()))
    }
}

fn invalid_state(job: &JobRecord, action: &'static str) -> ControlError {
    ControlError::InvalidState {
        job_id: job.id.clone(),
        status: job.status,
        action,
    }
}
