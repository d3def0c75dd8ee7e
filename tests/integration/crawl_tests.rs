//! End-to-end crawl runs for each pagination strategy

use crate::{job_config, TestHarness};
use api_harvest::crawler::RunOutcome;
use api_harvest::storage::NotificationKind;
use api_harvest::{JobStatus, PaginationStrategy};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cursor_run_single_fetch_when_cursor_disappears() {
    let mock_server = MockServer::start().await;

    // The validation call sees a cursor field
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1, "name": "alpha"}],
            "cursor": "c1",
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": 1, "name": "alpha"},
                {"id": 2, "name": "beta"},
                {"id": 3, "name": "gamma"},
            ],
            "has_more": false,
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/items", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "items"))
        .await
        .expect("Failed to create job");

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.pagination_type, PaginationStrategy::CursorBased);

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    let outcome = handle.wait().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            reason: "No more pages".to_string()
        }
    );

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_records, 3);
    assert_eq!(harness.count_rows("items"), 3);

    let notifications = harness.service.notifications(true).expect("notifications");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Success);
    assert!(notifications[0].message.contains("Collected 3 records"));
}

#[tokio::test]
async fn test_cursor_run_follows_tokens() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("cursor", "tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 3}],
            "next_cursor": null,
            "has_more": false,
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}],
            "next_cursor": "tok-2",
        })))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/events", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "events"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.pagination_type, PaginationStrategy::CursorBased);
    assert_eq!(job.total_records, 3);
    assert_eq!(job.cursor_value.as_deref(), Some("tok-2"));
    assert_eq!(harness.count_rows("events"), 3);
}

#[tokio::test]
async fn test_cursor_run_stops_on_repeated_page() {
    let mock_server = MockServer::start().await;

    // Always echoes the same page with an empty cursor
    Mock::given(method("GET"))
        .and(path("/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}],
            "next_cursor": null,
        })))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/echo", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "echo"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert_eq!(
        handle.wait().await,
        RunOutcome::Completed {
            reason: "Repeated page detected".to_string()
        }
    );

    // The second, identical page is not stored
    let job = harness.job(&job_id);
    assert_eq!(job.total_records, 2);
    assert_eq!(harness.count_rows("echo"), 2);
}

#[tokio::test]
async fn test_page_based_run_stops_at_total_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "score": 1.5}, {"id": 2, "score": 2.5}],
            "meta": {"page": 1, "total_pages": 2},
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 3, "score": 3.5}],
            "meta": {"page": 2, "total_pages": 2},
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/users?page=1", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "users"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.pagination_type, PaginationStrategy::PageBased);
    assert_eq!(job.total_records, 3);
    assert_eq!(job.current_page, 2);
    assert_eq!(harness.count_rows("users"), 3);

    let logs = harness.log_messages(&job_id);
    assert!(logs.iter().any(|m| m == "Next page: 2"));
    assert!(logs.iter().any(|m| m == "Crawl completed! Total records: 3"));
}

#[tokio::test]
async fn test_offset_run_stops_on_short_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("offset", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 3}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/orders?offset=0&limit=2", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "orders"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.pagination_type, PaginationStrategy::OffsetBased);
    assert_eq!(job.current_offset, 2);
    assert_eq!(job.total_records, 3);
    assert_eq!(harness.count_rows("orders"), 3);
}

#[tokio::test]
async fn test_max_pages_bounds_the_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}],
            "meta": {"page": 1, "total_pages": 100},
        })))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/feed?page=1", mock_server.uri());
    let mut config = job_config(&url, "feed");
    config.max_pages = Some(2);
    let job_id = harness
        .service
        .create_job(config)
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert_eq!(
        handle.wait().await,
        RunOutcome::Completed {
            reason: "Max pages reached".to_string()
        }
    );

    let job = harness.job(&job_id);
    assert_eq!(job.total_records, 2);
    assert_eq!(job.error_message.as_deref(), Some("Max pages reached"));
}

#[tokio::test]
async fn test_retries_exhausted_fails_job() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}],
            "next_cursor": "n",
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/flaky", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "flaky"))
        .await
        .expect("Failed to create job");

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    let outcome = handle.wait().await;
    assert!(matches!(outcome, RunOutcome::Failed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.total_records, 0);
    assert!(job.error_message.is_some());

    let logs = harness.log_messages(&job_id);
    let retries = logs.iter().filter(|m| m.ends_with("before retry")).count();
    assert_eq!(retries, 2);
    assert!(logs.iter().any(|m| m.starts_with("Attempt 3/3 failed")));

    let notifications = harness.service.notifications(false).expect("notifications");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Error);
    assert!(notifications[0].message.starts_with("Crawl job failed:"));
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let mock_server = MockServer::start().await;

    // Validation, then one failed attempt, then success
    Mock::given(method("GET"))
        .and(path("/recover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recover"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .mount(&mock_server)
        .await;

    let harness = TestHarness::new(2);
    let url = format!("{}/recover", mock_server.uri());
    let job_id = harness
        .service
        .create_job(job_config(&url, "recover"))
        .await
        .expect("Failed to create job");

    let job = harness.job(&job_id);
    assert_eq!(job.pagination_type, PaginationStrategy::None);

    let mut handle = harness.service.start(&job_id).expect("Failed to start");
    assert!(matches!(handle.wait().await, RunOutcome::Completed { .. }));

    let job = harness.job(&job_id);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.total_records, 2);
}
