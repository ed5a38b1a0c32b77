//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rules {
    AllowAll,
    DisallowAll,
    Content(String),
}

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, providing a simplified
/// interface for checking if paths are allowed. Besides real file content it can
/// represent the two fallbacks used when robots.txt is missing or unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRobots {
    rules: Rules,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            rules: Rules::Content(content.to_string()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when the domain has no robots.txt (HTTP 404) or robots handling is disabled.
    pub fn allow_all() -> Self {
        Self {
            rules: Rules::AllowAll,
        }
    }

    /// Creates a ParsedRobots that denies every path
    ///
    /// Used when robots.txt exists but could not be retrieved.
    pub fn disallow_all() -> Self {
        Self {
            rules: Rules::DisallowAll,
        }
    }

    /// Returns true if this denies every path regardless of content
    pub fn is_disallow_all(&self) -> bool {
        matches!(self.rules, Rules::DisallowAll)
    }

    /// Returns the raw robots.txt content (empty for the fallbacks)
    pub fn content(&self) -> &str {
        match &self.rules {
            Rules::Content(content) => content,
            _ => "",
        }
    }

    /// Checks if a path (or full URL) is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `path` - The URL path to check (e.g., "/page.html?x=1")
    /// * `user_agent` - The user agent product token
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        match &self.rules {
            Rules::AllowAll => true,
            Rules::DisallowAll => false,
            Rules::Content(content) if content.trim().is_empty() => true,
            Rules::Content(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, path)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let content = match &self.rules {
            Rules::Content(content) => content,
            _ => return None,
        };

        // Crawl-delay applies to the most recent User-agent group
        let mut current_user_agents: Vec<String> = Vec::new();
        let mut in_group_body = false;
        let mut crawl_delay_for_wildcard: Option<f64> = None;
        let mut crawl_delay_for_agent: Option<f64> = None;

        let normalized_agent = user_agent.to_lowercase();

        for line in content.lines() {
            let trimmed = line.split('#').next().unwrap_or("").trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A User-agent line after rules starts a new group
                    if in_group_body {
                        current_user_agents.clear();
                        in_group_body = false;
                    }
                    current_user_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_group_body = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if current_user_agents.iter().any(|ua| ua == "*") {
                        crawl_delay_for_wildcard = Some(delay);
                    }
                    if current_user_agents
                        .iter()
                        .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        crawl_delay_for_agent = Some(delay);
                    }
                }
                _ => in_group_body = true,
            }
        }

        // Prefer specific user-agent delay over wildcard delay
        crawl_delay_for_agent.or(crawl_delay_for_wildcard)
    }
}
