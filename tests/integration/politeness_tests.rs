//! robots.txt loading and per-domain pacing against a mock server

use crate::common::{mount_robots, test_config};
use catalog_mirror::crawler::build_http_client;
use catalog_mirror::robots::{load_policy, Authorization, DomainPolicy, PolitenessGate};
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn policy_for(server: &MockServer, retries: u32, respect_robots: bool) -> DomainPolicy {
    let mut config = test_config();
    config.politeness.robots_retries = retries;
    config.politeness.respect_robots = respect_robots;

    let client = build_http_client(&config).unwrap();
    let origin = Url::parse(&server.uri()).unwrap();
    load_policy(&client, &origin, &config.politeness, &config.user_agent).await
}

fn gate_with(policy: DomainPolicy) -> PolitenessGate {
    let mut gate = PolitenessGate::new();
    gate.insert_policy("127.0.0.1", policy);
    gate
}

async fn robots_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rules_and_crawl_delay_loaded() {
    let server = MockServer::start().await;
    mount_robots(
        &server,
        "User-agent: TestBot\nCrawl-delay: 1\nDisallow: /checkout\n\nUser-agent: *\nDisallow: /",
    )
    .await;

    let policy = policy_for(&server, 0, true).await;
    assert_eq!(policy.min_interval, Duration::from_secs(1));

    let gate = gate_with(policy);
    assert_eq!(gate.authorize("127.0.0.1", "/p/1"), Authorization::Allow);
    assert!(!gate.authorize("127.0.0.1", "/checkout").is_allowed());
}

#[tokio::test]
async fn test_missing_robots_allows_all() {
    let server = MockServer::start().await;
    robots_status(&server, 404).await;

    let gate = gate_with(policy_for(&server, 0, true).await);
    assert!(gate.authorize("127.0.0.1", "/anything").is_allowed());
}

#[tokio::test]
async fn test_forbidden_robots_disallows_all() {
    let server = MockServer::start().await;
    robots_status(&server, 403).await;

    let gate = gate_with(policy_for(&server, 2, true).await);
    assert!(!gate.authorize("127.0.0.1", "/").is_allowed());

    // 403 is an answer, not a failure: no retries
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn test_server_error_retried_then_disallows_all() {
    let server = MockServer::start().await;
    robots_status(&server, 500).await;

    let gate = gate_with(policy_for(&server, 1, true).await);
    assert!(!gate.authorize("127.0.0.1", "/").is_allowed());
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 2);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /").await;

    let gate = gate_with(policy_for(&server, 0, false).await);
    assert!(gate.authorize("127.0.0.1", "/").is_allowed());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_slots_spaced_by_min_interval() {
    let gate = gate_with(DomainPolicy::permissive(
        Duration::from_millis(200),
        "TestBot",
    ));

    let started = Instant::now();
    gate.await_slot("127.0.0.1").await;
    gate.await_slot("127.0.0.1").await;
    gate.await_slot("127.0.0.1").await;

    assert!(started.elapsed() >= Duration::from_millis(400));
}
