//! Job control verbs: pause, resume, stop, and the concurrency ceiling

use crate::{job_config, TestHarness};
use api_harvest::crawler::{ControlError, RunOutcome};
use api_harvest::logbus::StreamEvent;
use api_harvest::{HarvestError, JobStatus, ValidationError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Two pages of `/pages`, announced through `meta.total_pages`
async fn mount_two_pages(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/pages"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}],
            "meta": {"page": 1, "total_pages": 2},
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pages"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 3}],
            "meta": {"page": 2, "total_pages": 2},
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_pause_and_resume_continue_without_double_counting() {
    let mock_server = MockServer::start().await;
    mount_two_pages(&mock_server).await;

    let harness = TestHarness::new(2);
    let url = format!("{}/pages?page=1", mock_server.uri());
    let mut config = job_config(&url, "paged");
    config.start_interval = Some(60);
    config.end_interval = Some(60);
    let job_id = harness
        .service
        .create_job(config)
        .await
        .expect("Failed to create job");

    let mut subscription = harness.service.bus().subscribe(&job_id);
    let mut handle = harness.service.start(&job_id).expect("Failed to start");

    // Wait until the first page is stored and the job is sleeping
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = subscription.next().await {
            if let StreamEvent::Entry(entry) = event {
                if entry.message.ends_with("before next request") {
                    break;
                }
            }
        }
    })
    .await
    .expect("First page was never processed");

    harness.service.pause(&job_id).expect("Failed to pause");
    assert_eq!(handle.wait().await, RunOutcome::Cancelled);

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Paused);
    assert_eq!(job.current_page, 2);
    assert_eq!(job.total_records, 2);

    let mut handle = harness.service.resume(&job_id).expect("Failed to resume");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_records, 3);
    assert_eq!(harness.count_rows("paged"), 3);

    let logs = harness.log_messages(&job_id);
    assert!(logs.iter().any(|m| m == "Starting from page 2, 2 existing records"));
}

#[tokio::test]
async fn test_stop_marks_job_completed() {
    let mock_server = MockServer::start().await;
    mount_two_pages(&mock_server).await;

    let harness = TestHarness::new(2);
    let url = format!("{}/pages?page=1", mock_server.uri());
    let mut config = job_config(&url, "stopped");
    config.start_interval = Some(60);
    config.end_interval = Some(60);
    let job_id = harness
        .service
        .create_job(config)
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    harness.service.stop(&job_id).expect("Failed to stop");
    assert_eq!(handle.wait().await, RunOutcome::Cancelled);

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.error_message.as_deref(), Some("Manually stopped"));
    assert!(!harness.service.scheduler().status(&job_id));
}

/// A single-page API whose response takes a while to arrive
async fn mount_slow_page(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/slow-page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}, {"id": 2}]))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_stop_during_in_flight_request_is_kept() {
    let mock_server = MockServer::start().await;
    mount_slow_page(&mock_server).await;

    let harness = TestHarness::new(2);
    let url = format!("{}/slow-page", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "in_flight"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.job(&job_id).status, JobStatus::Running);

    harness.service.stop(&job_id).expect("Failed to stop");
    assert_eq!(handle.wait().await, RunOutcome::Cancelled);

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.error_message.as_deref(), Some("Manually stopped"));

    // The run that finished after the stop raised no notification of its own
    assert!(harness.service.notifications(false).expect("notifications").is_empty());
}

#[tokio::test]
async fn test_pause_during_in_flight_request_is_kept() {
    let mock_server = MockServer::start().await;
    mount_slow_page(&mock_server).await;

    let harness = TestHarness::new(2);
    let url = format!("{}/slow-page", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "paused_in_flight"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(150)).await;

    harness.service.pause(&job_id).expect("Failed to pause");
    assert_eq!(handle.wait().await, RunOutcome::Cancelled);
    assert_eq!(harness.job(&job_id).status, JobStatus::Paused);

    let mut handle = harness.service.resume(&job_id).expect("Failed to resume");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));
    assert_eq!(harness.job(&job_id).status, JobStatus::Completed);
}

#[tokio::test]
async fn test_concurrency_ceiling_queues_extra_jobs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(1);
    let url = format!("{}/slow", mock_server.uri());

    let first = harness
        .service
        .create_job(job_config(&url, "slow_a"))
        .await
        .expect("Failed to create job");
    let second = harness
        .service
        .create_job(job_config(&url, "slow_b"))
        .await
        .expect("Failed to create job");

    let mut first_handle = harness.service.start(&first).expect("Failed to start");
    let mut second_handle = harness.service.start(&second).expect("Failed to start");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let scheduler = harness.service.scheduler();
    assert_eq!(scheduler.active_count(), 2);
    assert_eq!(scheduler.running_count(), 1);

    assert!(matches!(first_handle.wait().await, RunOutcome::Completed { .. }));
    assert!(matches!(second_handle.wait().await, RunOutcome::Completed { .. }));
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(harness.job(&second).total_records, 1);
}

#[tokio::test]
async fn test_verbs_reject_invalid_states() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/once"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/once", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "once"))
        .await
        .expect("Failed to create job");

    // Pending jobs can be neither paused nor resumed
    assert!(matches!(
        harness.service.pause(&job_id),
        Err(ControlError::InvalidState { action: "pause", .. })
    ));
    assert!(matches!(
        harness.service.resume(&job_id),
        Err(ControlError::InvalidState { action: "resume", .. })
    ));
    assert!(matches!(
        harness.service.start("no-such-job"),
        Err(ControlError::NotFound(_))
    ));

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    // A completed job may be started again
    let mut handle = harness.service.start(&job_id).expect("Failed to restart");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));
    assert_eq!(harness.job(&job_id).total_records, 2);
}

#[tokio::test]
async fn test_create_job_rejects_bad_input_before_any_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/any", mock_server.uri());

    let mut config = job_config(&url, "fine");
    config.start_interval = Some(10);
    config.end_interval = Some(5);
    assert!(matches!(
        harness.service.create_job(config).await,
        Err(HarvestError::Validation(ValidationError::Interval { start: 10, end: 5 }))
    ));

    assert!(matches!(
        harness.service.create_job(job_config(&url, "crawl_jobs")).await,
        Err(HarvestError::Validation(ValidationError::TableName(_)))
    ));

    assert!(matches!(
        harness
            .service
            .create_job(api_harvest::crawler::JobConfig::new("wget http://x", "fine"))
            .await,
        Err(HarvestError::Validation(ValidationError::Parse(_)))
    ));

    assert!(harness.service.jobs().expect("jobs").is_empty());
}

#[tokio::test]
async fn test_create_job_rejects_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/secret", mock_server.uri());

    assert!(matches!(
        harness.service.create_job(job_config(&url, "secret")).await,
        Err(HarvestError::Validation(ValidationError::Status { status: 401 }))
    ));
    assert!(harness.service.jobs().expect("jobs").is_empty());
}
