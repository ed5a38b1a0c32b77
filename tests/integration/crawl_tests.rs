//! End-to-end crawl sessions against a mock storefront

use crate::common::{
    category_page, hits, html, link_page, mount_page, mount_robots, product_page, test_config,
};
use catalog_mirror::crawler::{start_crawl, CrawlRequest, SkipReason};
use catalog_mirror::state::SessionState;
use catalog_mirror::storage::{MemoryProductStore, ProductStore, SqliteProductStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn start_url(server: &MockServer) -> String {
    format!("{}/", server.uri())
}

fn host(server: &MockServer) -> String {
    Url::parse(&server.uri())
        .expect("mock server URI")
        .host_str()
        .expect("mock server host")
        .to_string()
}

#[tokio::test]
async fn test_category_page_leads_to_products() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let mut listing = category_page(&["/p/1", "/p/2", "/p/3"]);
    listing = listing.replace(
        "</ul>",
        r#"</ul><a href="https://external.example/partner">Partner</a>"#,
    );
    mount_page(&server, "/", listing).await;
    mount_page(&server, "/p/1", product_page("Blue Mug", "$19.99", Some("MUG-1"))).await;
    mount_page(&server, "/p/2", product_page("Red Mug", "$21.50", Some("MUG-2"))).await;
    mount_page(&server, "/p/3", product_page("Green Mug", "$9", Some("MUG-3"))).await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));

    let handle = start_crawl(request, config, store.clone()).expect("session starts");
    let summary = handle.wait().await.expect("session finishes");

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.failure, None);
    assert_eq!(summary.report.pages_fetched, 4);
    assert_eq!(summary.report.categories, 1);
    assert_eq!(summary.report.products_saved, 3);
    assert_eq!(summary.report.external_links_ignored, 1);

    let mut products = store.load_products("test-store").unwrap();
    products.sort_by(|a, b| a.source_url.cmp(&b.source_url));
    assert_eq!(products.len(), 3);
    assert_eq!(products[0].name, "Blue Mug");
    assert_eq!(products[0].raw_price, "19.99");
    assert_eq!(products[0].currency, "USD");
    assert_eq!(products[1].raw_price, "21.5");

    // Every visited URL is on the storefront, each exactly once
    let host = host(&server);
    assert_eq!(summary.visited.len(), 4);
    for visited in &summary.visited {
        assert_eq!(Url::parse(visited).unwrap().host_str(), Some(host.as_str()));
    }

    // The start page was fetched once even though every product links back to it
    assert_eq!(hits(&server, "/").await, 1);
}

#[tokio::test]
async fn test_rate_limited_page_retried_until_success() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_page(&server, "/", product_page("Teapot", "$30", None)).await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));

    let started = Instant::now();
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.retries, 3);
    assert_eq!(summary.report.products_saved, 1);
    assert_eq!(hits(&server, "/").await, 4);

    // Retry-After (2s) is capped at the 300ms maximum backoff for each retry
    assert!(elapsed >= Duration::from_millis(900), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_robots_disallowed_path_never_fetched() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /admin/").await;
    mount_page(&server, "/", link_page(&["/admin/secret", "/about"])).await;
    mount_page(&server, "/about", link_page(&[])).await;
    mount_page(&server, "/admin/secret", product_page("Secret", "$1", None)).await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.skipped(SkipReason::PolicyDenied), 1);
    assert!(!summary.visited.iter().any(|u| u.contains("/admin")));
    assert_eq!(hits(&server, "/admin/secret").await, 0);
    assert_eq!(hits(&server, "/about").await, 1);
}

async fn mount_redirect(server: &MockServer, from: &str, to: &str) {
    Mock::given(method("GET"))
        .and(path(from))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", to))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_redirect_into_disallowed_path_never_fetched() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /admin/").await;
    mount_page(&server, "/", link_page(&["/go"])).await;
    mount_redirect(&server, "/go", "/admin/secret").await;
    mount_page(&server, "/admin/secret", product_page("Secret", "$1", None)).await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.redirects, 1);
    assert_eq!(summary.report.skipped(SkipReason::PolicyDenied), 1);
    assert_eq!(summary.report.products_saved, 0);
    assert_eq!(store.save_calls(), 0);
    assert_eq!(hits(&server, "/go").await, 1);
    assert_eq!(hits(&server, "/admin/secret").await, 0);
    assert!(summary.visited.iter().any(|u| u.ends_with("/go")));
    assert!(!summary.visited.iter().any(|u| u.contains("/admin")));
}

#[tokio::test]
async fn test_redirect_to_visited_page_not_refetched() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", link_page(&["/old", "/p/1"])).await;
    mount_redirect(&server, "/old", "/").await;
    mount_page(&server, "/p/1", product_page("Lamp", "$40", Some("LAMP-1"))).await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.redirects, 1);
    assert_eq!(summary.report.products_saved, 1);
    assert_eq!(hits(&server, "/").await, 1);
}

#[tokio::test]
async fn test_redirect_target_crawled_as_own_task() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_redirect(&server, "/", "/home").await;
    mount_page(&server, "/home", link_page(&["/moved"])).await;
    mount_redirect(&server, "/moved", "/p/9").await;
    mount_page(&server, "/p/9", product_page("Vase", "$12", Some("VASE-9"))).await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.redirects, 2);
    assert_eq!(summary.report.pages_fetched, 2);
    assert_eq!(summary.report.products_saved, 1);
    assert_eq!(hits(&server, "/p/9").await, 1);

    let products = store.load_products("test-store").unwrap();
    assert!(products[0].source_url.ends_with("/p/9"));
    for expected in ["/home", "/moved", "/p/9"] {
        assert!(
            summary.visited.iter().any(|u| u.ends_with(expected)),
            "{} not visited",
            expected
        );
    }
}

#[tokio::test]
async fn test_start_redirect_loop_fails() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_redirect(&server, "/", "/").await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::FailedFatal);
    assert!(summary.failure.unwrap().contains("loop"));
    assert_eq!(hits(&server, "/").await, 1);
}

#[tokio::test]
async fn test_page_limit_aborts_with_work_left() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let hrefs: Vec<String> = (0..50).map(|i| format!("/item/{}", i)).collect();
    let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
    mount_page(&server, "/", link_page(&hrefs)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/item/\d+$"))
        .respond_with(html(link_page(&[])))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_pages = 5;
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Aborted);
    assert_eq!(summary.report.dispatched, 5);
    assert_eq!(summary.visited.len(), 5);

    let page_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() != "/robots.txt")
        .count();
    assert_eq!(page_requests, 5);
}

#[tokio::test]
async fn test_page_limit_without_remaining_work_completes() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", link_page(&["/a"])).await;
    mount_page(&server, "/a", link_page(&[])).await;

    let mut config = test_config();
    config.crawler.max_pages = 2;
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.dispatched, 2);
}

#[tokio::test]
async fn test_depth_limit_respected() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", link_page(&["/a"])).await;
    mount_page(&server, "/a", link_page(&["/a/b"])).await;
    mount_page(&server, "/a/b", link_page(&[])).await;

    let mut config = test_config();
    config.crawler.max_depth = 1;
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.pages_fetched, 2);
    assert_eq!(hits(&server, "/a/b").await, 0);
}

#[tokio::test]
async fn test_unreachable_robots_fails_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_page(&server, "/", product_page("Mug", "$5", None)).await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let handle = start_crawl(request, config, Arc::new(MemoryProductStore::new())).unwrap();
    let mut status = handle.subscribe();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.outcome, SessionState::FailedFatal);
    assert!(summary.failure.unwrap().contains("start URL denied"));
    assert_eq!(status.borrow_and_update().state, SessionState::FailedFatal);
    assert_eq!(hits(&server, "/").await, 0);
}

#[tokio::test]
async fn test_start_url_not_found_fails_session() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::FailedFatal);
    assert_eq!(summary.report.skipped(SkipReason::Permanent), 1);
    assert!(summary.failure.unwrap().contains("HTTP 404"));
}

#[tokio::test]
async fn test_broken_product_link_is_skipped_not_fatal() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", category_page(&["/p/1", "/p/gone", "/p/3"])).await;
    mount_page(&server, "/p/1", product_page("One", "$1", Some("S1"))).await;
    mount_page(&server, "/p/3", product_page("Three", "$3", Some("S3"))).await;
    Mock::given(method("GET"))
        .and(path("/p/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.products_saved, 2);
    assert_eq!(summary.report.skipped(SkipReason::Permanent), 1);
}

#[tokio::test]
async fn test_incomplete_product_never_persisted() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    // Price and cart but no name anywhere on the page
    mount_page(
        &server,
        "/",
        r#"<html><body><span class="price">$12.00</span><button>Add to cart</button></body></html>"#,
    )
    .await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.skipped(SkipReason::ExtractionIncomplete), 1);
    assert_eq!(store.save_calls(), 0);
}

#[tokio::test]
async fn test_duplicate_sku_counted() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", category_page(&["/p/a", "/p/b", "/p/c"])).await;
    mount_page(&server, "/p/a", product_page("Mug", "$10", Some("SAME"))).await;
    mount_page(&server, "/p/b", product_page("Mug (copy)", "$11", Some("SAME"))).await;
    mount_page(&server, "/p/c", product_page("Plate", "$4", Some("OTHER"))).await;

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.report.products_extracted, 3);
    assert_eq!(summary.report.products_saved, 2);
    assert_eq!(summary.report.duplicates, 1);
    assert_eq!(store.load_products("test-store").unwrap().len(), 2);
}

#[tokio::test]
async fn test_storage_failure_becomes_warning() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", category_page(&["/p/1", "/p/2", "/p/3"])).await;
    for id in 1..=3 {
        mount_page(
            &server,
            &format!("/p/{}", id),
            product_page("Mug", "$5", Some(&format!("M{}", id))),
        )
        .await;
    }

    let config = test_config();
    let store = Arc::new(MemoryProductStore::new());
    store.set_failing(true);
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(summary.report.pages_fetched, 4);
    assert_eq!(summary.report.skipped(SkipReason::StorageError), 3);
    assert_eq!(summary.report.storage_warnings.len(), 3);
    assert_eq!(store.save_calls(), 3);
}

#[tokio::test]
async fn test_cancel_before_dispatch_aborts() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", link_page(&[])).await;

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let handle = start_crawl(request, config, Arc::new(MemoryProductStore::new())).unwrap();
    handle.cancel();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.outcome, SessionState::Aborted);
    assert_eq!(summary.failure.as_deref(), Some("cancelled"));
    assert_eq!(summary.report.dispatched, 0);
    assert_eq!(hits(&server, "/").await, 0);
}

#[tokio::test]
async fn test_session_budget_aborts() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", link_page(&["/slow"])).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(link_page(&["/after"])).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;
    mount_page(&server, "/after", link_page(&[])).await;

    let mut config = test_config();
    config.crawler.session_budget_secs = Some(1);
    let request = CrawlRequest::from_config(&config, start_url(&server));
    let summary = start_crawl(request, config, Arc::new(MemoryProductStore::new()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Aborted);
    assert_eq!(summary.failure.as_deref(), Some("session budget expired"));
    // The in-flight page finished, nothing new was dispatched
    assert_eq!(hits(&server, "/slow").await, 1);
    assert_eq!(hits(&server, "/after").await, 0);
}

#[tokio::test]
async fn test_sqlite_store_records_products_and_session() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", category_page(&["/p/1", "/p/2", "/p/3"])).await;
    for id in 1..=3 {
        mount_page(
            &server,
            &format!("/p/{}", id),
            product_page("Bowl", "$7.25", Some(&format!("B{}", id))),
        )
        .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteProductStore::new(&dir.path().join("catalog.db")).unwrap());

    let config = test_config();
    let request = CrawlRequest::from_config(&config, start_url(&server)).with_config_hash("cafe");
    let summary = start_crawl(request, config, store.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.outcome, SessionState::Completed);
    assert_eq!(store.count_products("test-store").unwrap(), 3);

    let session = store.latest_session("test-store").unwrap().unwrap();
    assert_eq!(session.outcome, SessionState::Completed);
    assert_eq!(session.products_saved, 3);
    assert_eq!(session.config_hash.as_deref(), Some("cafe"));
}

#[tokio::test]
async fn test_bad_start_input_rejected_before_session() {
    let config = test_config();
    let request = CrawlRequest::from_config(&config, "ftp://shop.example/");
    assert!(start_crawl(request, config, Arc::new(MemoryProductStore::new())).is_err());

    let mut config = test_config();
    config.crawler.concurrency = 0;
    let request = CrawlRequest::from_config(&config, "https://shop.example/");
    assert!(start_crawl(request, config, Arc::new(MemoryProductStore::new())).is_err());
}
