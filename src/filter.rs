use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Regex patterns deciding whether a URL belongs to a group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    /// Regex patterns for URLs to include (at least one must match)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude (these take precedence over include patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl UrlFilterConfig {
    pub fn including(patterns: &[String]) -> Self {
        Self {
            include_patterns: patterns.to_vec(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Compiled form of [`UrlFilterConfig`]
#[derive(Debug)]
pub struct UrlFilter {
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl UrlFilter {
    /// Create a new URL filter from configuration
    pub fn new(config: &UrlFilterConfig) -> Result<Self, regex::Error> {
        let include_regexes = config
            .include_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude_regexes = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_regexes,
            exclude_regexes,
        })
    }

    /// True when no exclude pattern and at least one include pattern matches.
    /// An empty include list matches nothing.
    pub fn matches(&self, url: &str) -> bool {
        if self.exclude_regexes.iter().any(|re| re.is_match(url)) {
            return false;
        }
        self.include_regexes.iter().any(|re| re.is_match(url))
    }
}

/// Which part of the portal a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    /// SSO, MFA or the portal's own sign-in pages
    Login,
    /// The authenticated job feed
    JobFeed,
    Other,
}

/// Classifies browser URLs for the session guard
#[derive(Debug)]
pub struct UrlClassifier {
    login: UrlFilter,
    feed: UrlFilter,
}

impl UrlClassifier {
    pub fn new(login: &UrlFilterConfig, feed: &UrlFilterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            login: UrlFilter::new(login)?,
            feed: UrlFilter::new(feed)?,
        })
    }

    /// Login hints win over feed hints, so `/login?next=/stu/jobs` is still a login page
    pub fn classify(&self, url: &str) -> UrlKind {
        if self.login.matches(url) {
            UrlKind::Login
        } else if self.feed.matches(url) {
            UrlKind::JobFeed
        } else {
            UrlKind::Other
        }
    }
}

/// Default hostname/path hints for SSO and MFA providers
pub fn default_login_patterns() -> Vec<String> {
    [
        r"(?i)/log[_-]?in\b",
        r"(?i)sign[_-]?in",
        r"(?i)/sso\b",
        r"(?i)saml",
        r"(?i)shibboleth",
        r"(?i)/idp/",
        r"(?i)/cas/login",
        r"(?i)\.okta\.com",
        r"(?i)duosecurity\.com",
        r"(?i)login\.microsoftonline\.com",
        r"(?i)accounts\.google\.com",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Default path hints for the authenticated job feed
pub fn default_feed_patterns() -> Vec<String> {
    [
        r"(?i)joinhandshake\.com/(stu/)?(jobs|job-search|postings)",
        r"(?i)/stu/(jobs|postings)\b",
        r"(?i)/job-search\b",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Default match for the GraphQL endpoint in captured traffic
pub fn default_endpoint_patterns() -> Vec<String> {
    vec![r"(?i)/graphql\b".to_string()]
}

/// Create a normalized version of the URL (fragment removed)
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}
