//! Crawler module for paginated API ingestion
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and response classification
//! - The per-job crawl loop with retry and backoff
//! - Job scheduling under a concurrency ceiling
//! - Pre-flight validation and the job control verbs

mod control;
mod engine;
mod fetcher;
mod scheduler;
mod validate;

pub use control::{ControlError, CrawlService, JobConfig};
pub use engine::{Engine, JobError, RunOutcome};
pub use fetcher::{build_http_client, execute_request, FetchError, FetchResponse};
pub use scheduler::{CancelToken, JobHandle, JobRunner, Scheduler};
pub use validate::{validate_curl, ValidationReport};

use crate::config::Config;
use crate::logbus::LogBus;
use crate::storage::SharedStorage;
use std::sync::Arc;

/// Wires the engine, scheduler and control surface over one storage handle
///
/// # Arguments
///
/// * `storage` - The shared persistence handle
/// * `config` - The loaded configuration
///
/// # Returns
///
/// * `Ok(CrawlService)` - Ready to create and launch jobs
/// * `Err(reqwest::Error)` - The HTTP client could not be built
pub fn build_service(storage: SharedStorage, config: &Config) -> Result<CrawlService, reqwest::Error> {
    let client = build_http_client(&config.http)?;
    let bus = Arc::new(LogBus::new(storage.clone(), &config.logging));
    let engine = Engine::new(
        storage.clone(),
        Arc::clone(&bus),
        client.clone(),
        config.engine.clone(),
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(engine),
        config.engine.max_concurrent_jobs,
    ));

    Ok(CrawlService::new(
        storage,
        bus,
        scheduler,
        client,
        config.engine.clone(),
    ))
}
