//! Pre-flight validation of a captured request
//!
//! Before a job exists, its request is parsed and sent once. The sample
//! response drives pagination detection and schema inference.

use crate::crawler::fetcher::{execute_request, FetchError};
use crate::pagination::{detect, PaginationInfo, PaginationStrategy};
use crate::request::{parse_curl_command, RequestDescriptor};
use crate::schema::{infer_schema, ColumnType};
use crate::ValidationError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything learned from one test request
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub request: RequestDescriptor,
    pub status: u16,
    pub sample: Value,
    pub strategy: PaginationStrategy,
    pub pagination: PaginationInfo,
    pub schema: BTreeMap<String, ColumnType>,
}

impl From<FetchError> for ValidationError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout => ValidationError::Timeout,
            FetchError::Status { status, .. } => ValidationError::Status { status },
            FetchError::Decode { status, preview } => ValidationError::NotJson { status, preview },
            FetchError::Transport(message) | FetchError::InvalidRequest(message) => {
                ValidationError::Request(message)
            }
        }
    }
}

/// Parses a `curl` command, sends it once and analyses the response
///
/// # Arguments
///
/// * `client` - The HTTP client to send the test request with
/// * `curl_command` - The captured command line
///
/// # Returns
///
/// The report, or why the command cannot back a crawl job
pub async fn validate_curl(
    client: &Client,
    curl_command: &str,
) -> Result<ValidationReport, ValidationError> {
    let request = parse_curl_command(curl_command)?;
    tracing::debug!("Validating {} {}", request.method, request.url);

    let response = execute_request(client, &request, &request.url).await?;
    let (strategy, pagination) = detect(&request.url, &response.body);
    let schema = infer_schema(&response.body);

    tracing::info!(
        "Validated {}: {} pagination, {} columns",
        request.url,
        strategy,
        schema.len()
    );

    Ok(ValidationReport {
        request,
        status: response.status,
        sample: response.body,
        strategy,
        pagination,
        schema,
    })
}
