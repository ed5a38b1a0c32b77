//! Shared fixtures for the integration tests

use catalog_mirror::config::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration tuned for fast tests against a local mock server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.id = "test-store".to_string();
    config.store.default_currency = "USD".to_string();
    config.crawler.max_depth = 3;
    config.crawler.max_pages = 100;
    config.crawler.concurrency = 4;
    config.politeness.min_interval_ms = 10;
    config.politeness.robots_retries = 0;
    config.retry.initial_backoff_ms = 20;
    config.retry.max_backoff_ms = 300;
    config.retry.jitter = 0.0;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.user_agent.crawler_version = "1.0.0".to_string();
    config
}

/// 200 response carrying an HTML body
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

pub async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_page(server: &MockServer, page_path: &str, body: impl Into<String>) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// A product page the classifier and extractor both accept
pub fn product_page(name: &str, price: &str, sku: Option<&str>) -> String {
    let sku = sku
        .map(|sku| format!(r#"<span itemprop="sku">{}</span>"#, sku))
        .unwrap_or_default();
    format!(
        r#"<html lang="en"><head><title>{name}</title></head><body>
            <a href="/">Home</a>
            <h1>{name}</h1>
            <span class="price">{price}</span>
            {sku}
            <button type="submit">Add to cart</button>
        </body></html>"#
    )
}

/// A listing page linking to each href as a product card
pub fn category_page(hrefs: &[&str]) -> String {
    let cards: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<li class="product"><a href="{href}">Item</a> <span class="price">$5.00</span></li>"#
            )
        })
        .collect();
    format!(
        r#"<html lang="en"><body><h1>Catalog</h1><ul class="products">{cards}</ul></body></html>"#
    )
}

/// A plain page with the given links
pub fn link_page(hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<p><a href="{href}">link</a></p>"#))
        .collect();
    format!("<html><body><h2>About us</h2>{links}</body></html>")
}

/// Number of requests the server received for `request_path`
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}
