//! Fetch outcome classification against a mock server

use crate::common::{hits, html, test_config};
use catalog_mirror::crawler::{build_http_client, FetchFailure, FetchResult, Fetcher};
use catalog_mirror::robots::{DomainPolicy, ParsedRobots, PolitenessGate};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(robots: ParsedRobots) -> (Fetcher, CancellationToken) {
    let config = test_config();
    let client = build_http_client(&config).expect("client builds");

    let mut gate = PolitenessGate::new();
    gate.insert_policy(
        "127.0.0.1",
        DomainPolicy::new(robots, Duration::from_millis(10), "TestBot"),
    );

    let cancel = CancellationToken::new();
    (Fetcher::new(client, Arc::new(gate), cancel.clone()), cancel)
}

fn url(server: &MockServer, page_path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page_path)).unwrap()
}

async fn respond(server: &MockServer, page_path: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_html_page_is_success() {
    let server = MockServer::start().await;
    respond(&server, "/page", html("<html><body>Hello</body></html>")).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    match fetcher.fetch(&url(&server, "/page"), 1).await {
        FetchResult::Success {
            status_code,
            body,
            final_url,
        } => {
            assert_eq!(status_code, 200);
            assert!(body.contains("Hello"));
            assert_eq!(final_url, url(&server, "/page"));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    respond(&server, "/flaky", ResponseTemplate::new(503)).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert_eq!(
        fetcher.fetch(&url(&server, "/flaky"), 1).await,
        FetchResult::Retryable {
            reason: FetchFailure::ServerError(503),
            retry_after: None,
        }
    );
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    respond(
        &server,
        "/busy",
        ResponseTemplate::new(429).insert_header("Retry-After", "2"),
    )
    .await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert_eq!(
        fetcher.fetch(&url(&server, "/busy"), 1).await,
        FetchResult::Retryable {
            reason: FetchFailure::RateLimited,
            retry_after: Some(Duration::from_secs(2)),
        }
    );
}

#[tokio::test]
async fn test_not_found_is_fatal() {
    let server = MockServer::start().await;
    respond(&server, "/missing", ResponseTemplate::new(404)).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert_eq!(
        fetcher.fetch(&url(&server, "/missing"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::ClientError(404),
        }
    );
}

#[tokio::test]
async fn test_non_html_is_fatal() {
    let server = MockServer::start().await;
    respond(
        &server,
        "/feed.json",
        ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
    )
    .await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert!(matches!(
        fetcher.fetch(&url(&server, "/feed.json"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::NotHtml(_)
        }
    ));
}

#[tokio::test]
async fn test_same_host_redirect_reported_not_followed() {
    let server = MockServer::start().await;
    respond(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("Location", "/new"),
    )
    .await;
    respond(&server, "/new", html("<html><body>Moved</body></html>")).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert_eq!(
        fetcher.fetch(&url(&server, "/old"), 1).await,
        FetchResult::Redirect {
            status_code: 301,
            location: url(&server, "/new"),
        }
    );
    // The target is left for the caller to authorize and schedule
    assert_eq!(hits(&server, "/new").await, 0);
}

#[tokio::test]
async fn test_redirect_to_disallowed_path_not_requested() {
    let server = MockServer::start().await;
    respond(
        &server,
        "/go",
        ResponseTemplate::new(302).insert_header("Location", "/admin/secret"),
    )
    .await;
    respond(&server, "/admin/secret", html("<html></html>")).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::from_content(
        "User-agent: *\nDisallow: /admin/",
    ));

    assert!(matches!(
        fetcher.fetch(&url(&server, "/go"), 1).await,
        FetchResult::Redirect { .. }
    ));
    assert!(matches!(
        fetcher.fetch(&url(&server, "/admin/secret"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::PolicyDenied(_)
        }
    ));
    assert_eq!(hits(&server, "/admin/secret").await, 0);
}

#[tokio::test]
async fn test_off_domain_redirect_is_fatal() {
    let server = MockServer::start().await;
    let port = Url::parse(&server.uri()).unwrap().port().unwrap();
    respond(
        &server,
        "/away",
        ResponseTemplate::new(302)
            .insert_header("Location", format!("http://localhost:{}/x", port).as_str()),
    )
    .await;
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());

    assert!(matches!(
        fetcher.fetch(&url(&server, "/away"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::OffDomainRedirect(_)
        }
    ));
}

#[tokio::test]
async fn test_disallowed_path_never_requested() {
    let server = MockServer::start().await;
    respond(&server, "/admin/panel", html("<html></html>")).await;
    let (fetcher, _) = fetcher_for(ParsedRobots::from_content(
        "User-agent: *\nDisallow: /admin/",
    ));

    assert!(matches!(
        fetcher.fetch(&url(&server, "/admin/panel"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::PolicyDenied(_)
        }
    ));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_unknown_domain_denied() {
    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());
    let other = Url::parse("http://other.invalid/").unwrap();

    assert!(matches!(
        fetcher.fetch(&other, 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::PolicyDenied(_)
        }
    ));
}

#[tokio::test]
async fn test_cancelled_fetch_sends_nothing() {
    let server = MockServer::start().await;
    respond(&server, "/page", html("<html></html>")).await;
    let (fetcher, cancel) = fetcher_for(ParsedRobots::allow_all());

    assert!(matches!(
        fetcher.fetch(&url(&server, "/page"), 1).await,
        FetchResult::Success { .. }
    ));
    cancel.cancel();

    assert_eq!(
        fetcher.fetch(&url(&server, "/page"), 1).await,
        FetchResult::Fatal {
            reason: FetchFailure::Cancelled,
        }
    );
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn test_refused_connection_is_retryable() {
    // Reserve a port, then free it so nothing is listening there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (fetcher, _) = fetcher_for(ParsedRobots::allow_all());
    let dead = Url::parse(&format!("http://127.0.0.1:{}/gone", port)).unwrap();

    assert!(matches!(
        fetcher.fetch(&dead, 1).await,
        FetchResult::Retryable {
            reason: FetchFailure::Connect(_),
            ..
        }
    ));
}
