//! HTTP fetcher implementation
//!
//! This module replays a request descriptor against a (possibly rewritten)
//! URL and classifies the outcome:
//! - Building the shared HTTP client from the `[http]` configuration
//! - Applying headers, body and cookies from the descriptor
//! - Turning transport errors, timeouts, error statuses and non-JSON bodies
//!   into a [`FetchError`]

use crate::config::HttpConfig;
use crate::request::RequestDescriptor;
use reqwest::header::COOKIE;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Length of the body excerpt kept in status errors
const STATUS_PREVIEW_CHARS: usize = 200;

/// Length of the body excerpt kept when a body is not JSON
const DECODE_PREVIEW_CHARS: usize = 500;

/// A transient fetch failure; the engine retries these
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {preview}")]
    Status { status: u16, preview: String },

    #[error("Response is not valid JSON (HTTP {status})")]
    Decode { status: u16, preview: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// A successfully fetched and decoded JSON response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Value,
    pub elapsed: Duration,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The `[http]` configuration section
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use api_harvest::config::HttpConfig;
/// use api_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends one request and decodes the JSON body
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `request` - The descriptor providing method, headers, body and cookies
/// * `url` - The URL to send it to, usually rewritten for the current page
///
/// # Returns
///
/// The decoded response, or the classified failure
pub async fn execute_request(
    client: &Client,
    request: &RequestDescriptor,
    url: &str,
) -> Result<FetchResponse, FetchError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| FetchError::InvalidRequest(format!("bad method {}", request.method)))?;

    let mut builder = client.request(method, url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.has_header("Cookie") {
        if let Some(cookies) = request.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let started = Instant::now();
    let response = builder.send().await?;
    let status = response.status();
    let text = response.text().await?;
    let elapsed = started.elapsed();

    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            preview: preview(&text, STATUS_PREVIEW_CHARS),
        });
    }

    let body = serde_json::from_str(&text).map_err(|_| FetchError::Decode {
        status: status.as_u16(),
        preview: preview(&text, DECODE_PREVIEW_CHARS),
    })?;

    Ok(FetchResponse {
        status: status.as_u16(),
        body,
        elapsed,
    })
}

/// Returns at most `max_chars` characters of `text`
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_curl_command;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        build_http_client(&HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_replays_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(query_param("page", "2"))
            .and(header("x-api-key", "k"))
            .and(header("cookie", "session=s1"))
            .and(body_string("{\"q\":1}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [1]})))
            .expect(1)
            .mount(&server)
            .await;

        let command = format!(
            "curl {}/search -H 'X-Api-Key: k' -b 'session=s1' --data '{{\"q\":1}}'",
            server.uri()
        );
        let request = parse_curl_command(&command).unwrap();
        let url = format!("{}/search?page=2", server.uri());

        let response = execute_request(&client(), &request, &url).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"data": [1]}));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let request = parse_curl_command(&format!("curl {}", server.uri())).unwrap();
        let err = execute_request(&client(), &request, &request.url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, ref preview } if preview == "down"));
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let request = parse_curl_command(&format!("curl {}", server.uri())).unwrap();
        let err = execute_request(&client(), &request, &request.url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let slow_client = Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let request = parse_curl_command(&format!("curl {}", server.uri())).unwrap();
        let err = execute_request(&slow_client, &request, &request.url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }
}
