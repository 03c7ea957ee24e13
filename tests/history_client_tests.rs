//! Integration tests for the history client
//!
//! A `wiremock` server stands in for the remote API; every test checks both
//! the outcome and what actually went over the wire.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use payment_history::history::{ClientConfig, Credentials, FixedClock, Signer};
use payment_history::logging::LogLevel;
use payment_history::{
    Configuration, FailureKind, HistoryClient, HistoryError, HistoryRecord, MemoryLog,
    RequestWindow, Timestamp,
};

const PUBLIC_TOKEN: &str = "pub_test_token";
const SECRET_KEY: &str = "sk_test_very_secret";
const API_VERSION: &str = "2024-06";

// =============================================================================
// Test Utilities
// =============================================================================

fn signing_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn client_for(server: &MockServer, log: Arc<MemoryLog>) -> HistoryClient {
    let config = Configuration::new(server.uri(), API_VERSION)
        .with_credentials(PUBLIC_TOKEN, SECRET_KEY);
    HistoryClient::with_config(
        None,
        None,
        &config,
        ClientConfig::default()
            .with_logger(log)
            .with_clock(Arc::new(FixedClock(signing_time()))),
    )
    .unwrap()
}

async fn mount_response(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/historystd"))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

fn query_of(request: &Request) -> BTreeMap<String, String> {
    request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn jan(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap().into()
}

/// A local port with nothing listening on it.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

// =============================================================================
// Success Path
// =============================================================================

#[tokio::test]
async fn test_fetch_success_returns_records() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(200).set_body_string(r#"[{"id":"1","amount":"10.00"}]"#),
    )
    .await;

    let client = client_for(&server, Arc::new(MemoryLog::new()));
    let records = client.fetch(None, None).await.unwrap();

    assert_eq!(records, vec![HistoryRecord::new("1", "10.00")]);
    assert_eq!(requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_fetch_preserves_server_order() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(200).set_body_string(
            r#"[{"id":"3","amount":"1.00"},{"id":"1","amount":"2.00"},{"id":"2","amount":"3.00"}]"#,
        ),
    )
    .await;

    let client = client_for(&server, Arc::new(MemoryLog::new()));
    let ids: Vec<String> = client
        .fetch(None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();

    assert_eq!(ids, ["3", "1", "2"]);
}

#[tokio::test]
async fn test_empty_array_is_success_not_failure() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;

    let log = Arc::new(MemoryLog::new());
    let client = client_for(&server, log.clone());
    let records = client.fetch(None, None).await.unwrap();

    assert!(records.is_empty());
    assert!(log.messages(LogLevel::Error).is_empty());
}

// =============================================================================
// Request Construction
// =============================================================================

#[tokio::test]
async fn test_only_present_bounds_are_sent() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    client.fetch(None, None).await.unwrap();
    client.fetch(Some(jan(1)), None).await.unwrap();
    client.fetch(None, Some(jan(31))).await.unwrap();
    client.fetch(Some(jan(1)), Some(jan(31))).await.unwrap();

    let sent: Vec<_> = requests(&server).await.iter().map(query_of).collect();
    assert_eq!(sent.len(), 4);

    assert!(sent[0].is_empty());

    assert_eq!(sent[1].len(), 1);
    assert_eq!(sent[1]["timestamp_from"], "2024-01-01T00:00:00Z");

    assert_eq!(sent[2].len(), 1);
    assert_eq!(sent[2]["timestamp_to"], "2024-01-31T00:00:00Z");

    assert_eq!(sent[3].len(), 2);
    assert_eq!(sent[3]["timestamp_from"], "2024-01-01T00:00:00Z");
    assert_eq!(sent[3]["timestamp_to"], "2024-01-31T00:00:00Z");
}

#[tokio::test]
async fn test_headers_carry_signature_and_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/historystd"))
        .and(header("x-api-version", API_VERSION))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryLog::new()));
    client.fetch(Some(jan(1)), Some(jan(31))).await.unwrap();

    let sent = requests(&server).await;
    let authorization = sent[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let expected = Signer::new(Credentials::new(PUBLIC_TOKEN, SECRET_KEY), "/historystd")
        .with_clock(Arc::new(FixedClock(signing_time())))
        .sign("GET", &query_of(&sent[0]))
        .unwrap();
    assert_eq!(authorization, expected.as_str());
    assert!(authorization.starts_with(&format!("S3 {}:", PUBLIC_TOKEN)));
    assert!(!authorization.contains(SECRET_KEY));
}

#[tokio::test]
async fn test_signature_tracks_the_window() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    client.fetch(Some(jan(1)), None).await.unwrap();
    client.fetch(Some(jan(1)), None).await.unwrap();
    client.fetch(Some(jan(2)), None).await.unwrap();

    let headers: Vec<String> = requests(&server)
        .await
        .iter()
        .map(|r| r.headers.get("authorization").unwrap().to_str().unwrap().to_string())
        .collect();

    assert_eq!(headers[0], headers[1]);
    assert_ne!(headers[0], headers[2]);
}

#[tokio::test]
async fn test_reversed_window_is_not_rejected() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    client.fetch(Some(jan(31)), Some(jan(1))).await.unwrap();

    let sent = query_of(&requests(&server).await[0]);
    assert_eq!(sent["timestamp_from"], "2024-01-31T00:00:00Z");
    assert_eq!(sent["timestamp_to"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_bounds_sent_without_normalising() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    let half_past = Utc.timestamp_millis_opt(1_704_067_200_500).unwrap();
    let later = Utc.timestamp_millis_opt(1_704_067_200_900).unwrap();
    client
        .fetch(Some(half_past.into()), Some(later.into()))
        .await
        .unwrap();
    client
        .fetch(Some("2024-01-01T02:00:00.250+02:00".into()), None)
        .await
        .unwrap();

    let sent = requests(&server).await;
    assert_eq!(sent.len(), 2);
    let typed = query_of(&sent[0]);
    assert_eq!(typed["timestamp_from"], "2024-01-01T00:00:00.500Z");
    assert_eq!(typed["timestamp_to"], "2024-01-01T00:00:00.900Z");
    let raw = query_of(&sent[1]);
    assert_eq!(raw["timestamp_from"], "2024-01-01T02:00:00.250+02:00");
    assert!(!raw.contains_key("timestamp_to"));
}

// =============================================================================
// Pre-flight Failures
// =============================================================================

#[tokio::test]
async fn test_invalid_timestamp_makes_no_http_call() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;
    let log = Arc::new(MemoryLog::new());
    let client = client_for(&server, log.clone());

    let err = client
        .fetch(Some("not-a-time".into()), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidArgument);
    assert_eq!(err.to_string(), "timestamp_from is invalid");

    let err = client
        .fetch(Some(jan(1)), Some("2024-13-45".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidArgument);
    assert_eq!(err.to_string(), "timestamp_to is invalid");

    assert!(requests(&server).await.is_empty());
    assert_eq!(log.messages(LogLevel::Error).len(), 2);
}

#[tokio::test]
async fn test_empty_explicit_secret_is_signing_error() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(200).set_body_string("[]")).await;

    let config = Configuration::new(server.uri(), API_VERSION);
    let client = HistoryClient::new(Some(PUBLIC_TOKEN.to_string()), Some(String::new()), &config)
        .unwrap();

    let err = client.fetch(None, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Signing);
    assert!(requests(&server).await.is_empty());
}

// =============================================================================
// Response Mapping
// =============================================================================

#[tokio::test]
async fn test_401_is_authentication_error() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(401).set_body_string(r#"{"error":"bad signature"}"#),
    )
    .await;
    let log = Arc::new(MemoryLog::new());
    let client = client_for(&server, log.clone());

    let err = client.fetch(None, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Authentication);
    assert_eq!(err.to_string(), "Request could not be authenticated.");

    let errors = log.messages(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("bad signature"));
}

#[tokio::test]
async fn test_500_is_unexpected_status_with_diagnostics() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(500).set_body_string("boom")).await;
    let log = Arc::new(MemoryLog::new());
    let client = client_for(&server, log.clone());

    let err = client.fetch(None, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::UnexpectedStatus);
    assert_eq!(err.to_string(), "An unexpected error occurred.");
    assert!(matches!(
        &err,
        HistoryError::UnexpectedStatus { status: 500, body } if body == "boom"
    ));

    let errors = log.messages(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("500"));
    assert!(errors[0].contains("boom"));
}

#[tokio::test]
async fn test_other_statuses_are_unexpected() {
    for status in [204u16, 403, 404, 429, 503] {
        let server = MockServer::start().await;
        mount_response(&server, ResponseTemplate::new(status)).await;
        let client = client_for(&server, Arc::new(MemoryLog::new()));

        let err = client.fetch(None, None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnexpectedStatus, "status {}", status);
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test]
async fn test_non_array_body_is_parse_error() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(200).set_body_string(r#"{"oops":true}"#),
    )
    .await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    let err = client.fetch(None, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Parse);
}

#[tokio::test]
async fn test_malformed_records_are_parse_errors() {
    for body in [
        "not json at all",
        r#"[{"id":"1"}]"#,
        r#"[{"id":"1","amount":"1.00","surprise":1}]"#,
        r#"[{"id":1,"amount":"1.00"}]"#,
    ] {
        let server = MockServer::start().await;
        mount_response(&server, ResponseTemplate::new(200).set_body_string(body)).await;
        let client = client_for(&server, Arc::new(MemoryLog::new()));

        let err = client.fetch(None, None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Parse, "body {}", body);
    }
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let log = Arc::new(MemoryLog::new());
    let config = Configuration::new(closed_port_url(), API_VERSION)
        .with_credentials(PUBLIC_TOKEN, SECRET_KEY);
    let client = HistoryClient::with_config(
        None,
        None,
        &config,
        ClientConfig::default().with_logger(log.clone()),
    )
    .unwrap();

    let err = client.fetch(Some(jan(1)), None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Network);
    assert_eq!(err.status(), None);

    let errors = log.messages(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Network error occurred"));
}

#[tokio::test]
async fn test_configured_timeout_is_network_error() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(200)
            .set_body_string("[]")
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let config = Configuration::new(server.uri(), API_VERSION)
        .with_credentials(PUBLIC_TOKEN, SECRET_KEY);
    let client = HistoryClient::with_config(
        None,
        None,
        &config,
        ClientConfig::default()
            .with_logger(Arc::new(MemoryLog::new()))
            .with_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    let err = client.fetch(None, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Network);
}

// =============================================================================
// Concurrency and Logging Hygiene
// =============================================================================

#[tokio::test]
async fn test_concurrent_fetches_do_not_interfere() {
    let server = MockServer::start().await;
    mount_response(
        &server,
        ResponseTemplate::new(200).set_body_string(r#"[{"id":"1","amount":"10.00"}]"#),
    )
    .await;
    let client = client_for(&server, Arc::new(MemoryLog::new()));

    let handles: Vec<_> = (1..=8u32)
        .map(|day| {
            let client = client.clone();
            tokio::spawn(async move { client.fetch(Some(jan(day)), None).await })
        })
        .collect();

    for handle in handles {
        let records = handle.await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
    }

    let sent = requests(&server).await;
    assert_eq!(sent.len(), 8);
    for request in &sent {
        let query = query_of(request);
        let header = request
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let signer = Signer::new(Credentials::new(PUBLIC_TOKEN, SECRET_KEY), "/historystd");
        assert!(signer.verify("GET", &query, &header));
    }
}

#[tokio::test]
async fn test_logs_never_contain_secrets() {
    let server = MockServer::start().await;
    mount_response(&server, ResponseTemplate::new(401).set_body_string("nope")).await;
    let log = Arc::new(MemoryLog::new());
    let client = client_for(&server, log.clone());

    client.fetch(Some(jan(1)), None).await.unwrap_err();
    client
        .fetch_window(&RequestWindow::unbounded().with_to("bad"))
        .await
        .unwrap_err();

    let header = requests(&server).await[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let entries = log.entries();
    assert!(!entries.is_empty());
    for (_, message) in entries {
        assert!(!message.contains(SECRET_KEY));
        assert!(!message.contains(&header));
    }
}
