//! HTTP browser against a mock server

use listing_tracker::browser::{
    Browser, BrowserContext, BrowserError, ContextOptions, HttpBrowser, Page, Viewport,
};
use listing_tracker::config::RetryConfig;
use listing_tracker::evasion::{navigate_with_retry, stealth_headers, Fingerprint, NavigationError};
use std::time::Duration;
use wiremock::matchers::{header, headers, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn options() -> ContextOptions {
    ContextOptions {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Test".to_string(),
        viewport: Viewport {
            width: 1366,
            height: 768,
        },
        locale: "en-CA".to_string(),
        timezone: "America/Toronto".to_string(),
        extra_headers: Vec::new(),
        proxy: None,
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_navigation_reports_status_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><script>var x = 1;</script></head><body><h1>Maison à vendre</h1></body></html>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html><body>Not found</body></html>"))
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let nav = page
        .goto(&format!("{}/listing", server.uri()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(nav.status, 200);
    assert!(page.content().await.unwrap().contains("<h1>Maison à vendre</h1>"));

    let text = page.body_text().await.unwrap();
    assert!(text.contains("Maison à vendre"));
    assert!(!text.contains("var x"));

    // Error statuses are reported, not raised
    let nav = page.goto(&format!("{}/gone", server.uri()), TIMEOUT).await.unwrap();
    assert_eq!(nav.status, 404);
}

#[tokio::test]
async fn test_context_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "Mozilla/5.0 (X11; Linux x86_64) Test"))
        .and(headers(
            "accept-language",
            vec!["en-CA", "en-US;q=0.9", "en;q=0.8", "fr;q=0.7"],
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut options = options();
    options.extra_headers = stealth_headers(Fingerprint::primary());
    let mut context = HttpBrowser::default().new_context(options).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let nav = page.goto(&format!("{}/", server.uri()), TIMEOUT).await.unwrap();
    assert_eq!(nav.status, 200);
}

#[tokio::test]
async fn test_cookies_persist_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "reese84=token123; Path=/")
                .set_body_string("<html><body>home</body></html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("cookie", "reese84=token123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>results</body></html>"))
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();

    let mut home = context.new_page().await.unwrap();
    home.goto(&format!("{}/", server.uri()), TIMEOUT).await.unwrap();

    let mut search = context.new_page().await.unwrap();
    let nav = search
        .goto(&format!("{}/search", server.uri()), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(nav.status, 200);

    let cookies = context.cookies().await.unwrap();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].name, "reese84");
    assert_eq!(cookies[0].value, "token123");
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let err = page
        .goto(&server.uri(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, BrowserError::Timeout { timeout_ms: 100, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_retry_recovers_from_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let nav = navigate_with_retry(&mut page, &server.uri(), &fast_retry(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(nav.status, 200);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let err = navigate_with_retry(&mut page, &server.uri(), &fast_retry(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, NavigationError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let mut context = HttpBrowser::default().new_context(options()).await.unwrap();
    let mut page = context.new_page().await.unwrap();

    let err = navigate_with_retry(&mut page, &server.uri(), &fast_retry(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, NavigationError::RateLimited { .. }));
}
