//! Liveness ping against a mock endpoint

use listing_tracker::config::HealthcheckConfig;
use listing_tracker::healthcheck::{Healthcheck, PingStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn healthcheck(server: &MockServer) -> Healthcheck {
    Healthcheck::new(&HealthcheckConfig {
        ping_url: Some(format!("{}/ping/abc-123", server.uri())),
        timeout_secs: 5,
    })
}

#[tokio::test]
async fn test_success_ping_posts_to_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ping/abc-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    healthcheck(&server).ping(PingStatus::Success).await;
}

#[tokio::test]
async fn test_failure_ping_uses_fail_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ping/abc-123/fail"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ping/abc-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    healthcheck(&server).ping(PingStatus::Fail).await;
}

#[tokio::test]
async fn test_endpoint_errors_are_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    healthcheck(&server).ping(PingStatus::Success).await;

    // Unreachable endpoint
    let unreachable = Healthcheck::new(&HealthcheckConfig {
        ping_url: Some("http://127.0.0.1:9/ping".to_string()),
        timeout_secs: 1,
    });
    unreachable.ping(PingStatus::Fail).await;
}
