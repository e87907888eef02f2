pub mod webdriver;

#[cfg(test)]
pub mod mock;

use crate::decoder::ContentEncoding;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    #[error("could not start a webdriver session: {0}")]
    Connect(String),

    #[error("browser session closed")]
    SessionClosed,

    #[error("{0}")]
    Other(String),
}

impl BrowserError {
    /// Losing the session ends the run; every other browser error only affects one job
    pub fn is_session_lost(&self) -> bool {
        matches!(self, BrowserError::SessionClosed)
    }
}

/// How to locate an element on the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    Css(String),
    XPath(String),
}

impl ElementQuery {
    pub fn css(selector: &str) -> Self {
        ElementQuery::Css(selector.to_string())
    }

    pub fn xpath(expr: &str) -> Self {
        ElementQuery::XPath(expr.to_string())
    }
}

impl std::fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementQuery::Css(s) => write!(f, "css `{s}`"),
            ElementQuery::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// One response observed in the browser
#[derive(Debug, Clone)]
pub struct RawNetworkEvent {
    pub url: String,
    pub method: String,
    pub request_body: Option<String>,
    pub response_body: Option<Vec<u8>>,
    pub content_encoding: ContentEncoding,
    pub status: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl RawNetworkEvent {
    /// Convenience constructor for an already-decoded text body
    pub fn text(url: &str, body: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "POST".to_string(),
            request_body: None,
            response_body: Some(body.as_bytes().to_vec()),
            content_encoding: ContentEncoding::Identity,
            status: Some(200),
            timestamp: Utc::now(),
        }
    }
}

pub type ResponsePredicate = Arc<dyn Fn(&RawNetworkEvent) -> bool + Send + Sync>;
pub type ResponseHandler = Arc<dyn Fn(RawNetworkEvent) + Send + Sync>;

/// The browser operations the scraper and the application driver rely on
#[allow(async_fn_in_trait)]
pub trait Browser {
    /// Navigate the current window
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Full HTML of the current document
    async fn source(&self) -> Result<String, BrowserError>;

    async fn scroll_by(&self, dy: i64) -> Result<(), BrowserError>;

    async fn move_mouse(&self, x: i64, y: i64) -> Result<(), BrowserError>;

    /// Click the first matching element; `Ok(false)` when nothing matches
    async fn click(&self, query: &ElementQuery) -> Result<bool, BrowserError>;

    /// Wait up to `timeout` for an element to appear
    async fn wait_for(&self, query: &ElementQuery, timeout: Duration)
    -> Result<bool, BrowserError>;

    /// Set the file of a file-upload input
    async fn attach_file(&self, query: &ElementQuery, path: &Path) -> Result<(), BrowserError>;

    /// Cookies of the current origin formatted for a `Cookie` request header
    async fn cookie_header(&self) -> Result<String, BrowserError>;

    /// Register a response subscription. Must happen before the navigation
    /// whose traffic should be observed.
    async fn on_response(
        &self,
        predicate: ResponsePredicate,
        handler: ResponseHandler,
    ) -> Result<(), BrowserError>;

    /// Deliver every response observed so far to the registered handler
    async fn flush_responses(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
