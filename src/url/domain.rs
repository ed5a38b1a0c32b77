use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_mirror::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks whether `url` belongs to the crawl's target domain
///
/// Hosts are compared case-insensitively with a leading `www.` ignored on
/// both sides; ports are not part of the comparison. This is the boundary
/// that keeps a session inside one storefront.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_mirror::url::is_same_domain;
///
/// let url = Url::parse("https://www.shop.example/p/1").unwrap();
/// assert!(is_same_domain(&url, "shop.example"));
/// assert!(!is_same_domain(&url, "other.example"));
/// ```
pub fn is_same_domain(url: &Url, target_domain: &str) -> bool {
    match extract_domain(url) {
        Some(host) => strip_www(&host) == strip_www(&target_domain.to_lowercase()),
        None => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
