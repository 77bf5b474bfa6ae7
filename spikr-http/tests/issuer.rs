use std::time::Duration;

use serde::Serialize;
use spikr_http::{HttpClient, OutcomeStatus, RequestIssuer, RequestSpec, TransportErrorKind};
use spikr_testserver::{PATH_COURSES, PATH_ENROLL, TestServer, TestServerConfig};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Enrollment {
    user_id: u64,
    course_id: u64,
    priority: u32,
}

#[tokio::test]
async fn get_reports_status_latency_and_bytes() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let outcome = client
        .issue(&RequestSpec::get(server.url(PATH_COURSES)))
        .await;

    let seen = server.stats().courses_total();
    server.shutdown().await;

    assert_eq!(outcome.status, OutcomeStatus::Http(200));
    assert_eq!(&*outcome.name, PATH_COURSES);
    assert!(outcome.bytes_sent > 0);
    assert!(outcome.bytes_received > 0);
    assert!(outcome.latency > Duration::ZERO);
    assert_eq!(seen, 1);
    Ok(())
}

#[tokio::test]
async fn post_json_enroll_passes_check() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let spec = RequestSpec::post_json(
        server.url(PATH_ENROLL),
        &Enrollment {
            user_id: 42,
            course_id: 1,
            priority: 7,
        },
    )?
    .with_check("enroll queued 200", 200);

    let outcome = client.issue(&spec).await;
    let rejected = server.stats().enroll_rejected();
    server.shutdown().await;

    assert_eq!(outcome.status, OutcomeStatus::Http(200));
    assert_eq!(outcome.check.map(|c| c.passed), Some(true));
    assert_eq!(rejected, 0);
    Ok(())
}

#[tokio::test]
async fn injected_server_error_is_an_error_outcome() -> TestResult {
    let server = TestServer::start_with(TestServerConfig::default().with_fail_every(1)).await?;
    let client = HttpClient::default();

    let outcome = client
        .issue(&RequestSpec::get(server.url(PATH_COURSES)))
        .await;
    server.shutdown().await;

    assert_eq!(outcome.status, OutcomeStatus::Http(500));
    assert!(outcome.is_error());
    Ok(())
}

#[tokio::test]
async fn slow_response_times_out_as_transport_error() -> TestResult {
    let server = TestServer::start_with(
        TestServerConfig::default().with_latency(Duration::from_millis(500)),
    )
    .await?;
    let client = HttpClient::default().with_request_timeout(Duration::from_millis(50));

    let outcome = client
        .issue(&RequestSpec::get(server.url(PATH_COURSES)))
        .await;
    server.shutdown().await;

    assert_eq!(
        outcome.status,
        OutcomeStatus::Transport(TransportErrorKind::Timeout)
    );
    assert!(outcome.latency < Duration::from_millis(400));
    Ok(())
}

#[tokio::test]
async fn per_request_timeout_overrides_client_default() -> TestResult {
    let server = TestServer::start_with(
        TestServerConfig::default().with_latency(Duration::from_millis(100)),
    )
    .await?;
    let client = HttpClient::default().with_request_timeout(Duration::from_millis(10));

    let spec = RequestSpec::get(server.url(PATH_COURSES)).with_timeout(Duration::from_secs(5));
    let outcome = client.issue(&spec).await;
    server.shutdown().await;

    assert_eq!(outcome.status, OutcomeStatus::Http(200));
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() -> TestResult {
    let server = TestServer::start().await?;
    let url = server.url(PATH_COURSES);
    server.shutdown().await;

    let outcome = HttpClient::default().issue(&RequestSpec::get(url)).await;

    assert!(matches!(outcome.status, OutcomeStatus::Transport(_)));
    assert_eq!(outcome.bytes_received, 0);
    Ok(())
}

#[tokio::test]
async fn invalid_url_never_panics() {
    let outcome = HttpClient::default()
        .issue(&RequestSpec::get("::not a url::"))
        .await;
    assert_eq!(
        outcome.status,
        OutcomeStatus::Transport(TransportErrorKind::InvalidUrl)
    );
}
