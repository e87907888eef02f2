//! Scripted in-memory browser for tests.

use super::{
    Browser, BrowserError, ElementQuery, RawNetworkEvent, ResponseHandler, ResponsePredicate,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    urls: VecDeque<String>,
    last_url: Option<String>,
    visited: Vec<String>,
    sources: HashMap<String, String>,
    elements: HashSet<String>,
    clicked: Vec<String>,
    attached: Vec<PathBuf>,
    fail_attach: bool,
    fail_goto: HashSet<String>,
    lose_session_on_goto: HashSet<String>,
    lose_session_on_url: bool,
    scrolls: usize,
    subscription: Option<(ResponsePredicate, ResponseHandler)>,
    pending_batches: VecDeque<Vec<RawNetworkEvent>>,
    closed: bool,
    /// Navigations, subscriptions and shutdown in call order
    events: Vec<String>,
}

#[derive(Default)]
pub struct MockBrowser {
    state: Mutex<State>,
}

fn key(query: &ElementQuery) -> String {
    match query {
        ElementQuery::Css(s) | ElementQuery::XPath(s) => s.clone(),
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs returned by successive `current_url` calls; the last one repeats
    pub fn with_urls(self, urls: &[&str]) -> Self {
        self.state.lock().unwrap().urls = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .sources
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_element(self, query: &ElementQuery) -> Self {
        self.state.lock().unwrap().elements.insert(key(query));
        self
    }

    pub fn failing_attach(self) -> Self {
        self.state.lock().unwrap().fail_attach = true;
        self
    }

    pub fn failing_goto(self, url: &str) -> Self {
        self.state.lock().unwrap().fail_goto.insert(url.to_string());
        self
    }

    /// Navigating to `url` reports the session as gone
    pub fn losing_session_at(self, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .lose_session_on_goto
            .insert(url.to_string());
        self
    }

    pub fn losing_session(self) -> Self {
        self.state.lock().unwrap().lose_session_on_url = true;
        self
    }

    /// Responses delivered by the next `flush_responses` call, one batch per call
    pub fn queue_responses(&self, batch: Vec<RawNetworkEvent>) {
        self.state.lock().unwrap().pending_batches.push_back(batch);
    }

    /// Fire an event through the subscription right away
    pub fn emit(&self, event: RawNetworkEvent) {
        let subscription = self.state.lock().unwrap().subscription.clone();
        if let Some((predicate, handler)) = subscription {
            if predicate(&event) {
                handler(event);
            }
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked.clone()
    }

    pub fn attached(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().attached.clone()
    }

    pub fn scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().subscription.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// `goto <url>`, `subscribe` and `close` entries in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }
}

impl Browser for MockBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("goto {url}"));
        if state.lose_session_on_goto.contains(url) {
            return Err(BrowserError::SessionClosed);
        }
        if state.fail_goto.contains(url) {
            return Err(BrowserError::Other(format!("net::ERR_NAME_NOT_RESOLVED {url}")));
        }
        state.visited.push(url.to_string());
        state.last_url = Some(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.lose_session_on_url {
            return Err(BrowserError::SessionClosed);
        }
        let next = if state.urls.len() > 1 {
            state.urls.pop_front()
        } else {
            state.urls.front().cloned()
        };
        next.or_else(|| state.last_url.clone())
            .ok_or_else(|| BrowserError::Other("no page loaded".to_string()))
    }

    async fn source(&self) -> Result<String, BrowserError> {
        let state = self.state.lock().unwrap();
        let url = state.last_url.clone().unwrap_or_default();
        Ok(state.sources.get(&url).cloned().unwrap_or_default())
    }

    async fn scroll_by(&self, _dy: i64) -> Result<(), BrowserError> {
        self.state.lock().unwrap().scrolls += 1;
        Ok(())
    }

    async fn move_mouse(&self, _x: i64, _y: i64) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn click(&self, query: &ElementQuery) -> Result<bool, BrowserError> {
        let mut state = self.state.lock().unwrap();
        let key = key(query);
        if state.elements.contains(&key) {
            state.clicked.push(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn wait_for(
        &self,
        query: &ElementQuery,
        _timeout: Duration,
    ) -> Result<bool, BrowserError> {
        Ok(self.state.lock().unwrap().elements.contains(&key(query)))
    }

    async fn attach_file(&self, query: &ElementQuery, path: &Path) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_attach || !state.elements.contains(&key(query)) {
            return Err(BrowserError::Other("element not interactable".to_string()));
        }
        state.attached.push(path.to_path_buf());
        Ok(())
    }

    async fn cookie_header(&self) -> Result<String, BrowserError> {
        Ok("session=abc".to_string())
    }

    async fn on_response(
        &self,
        predicate: ResponsePredicate,
        handler: ResponseHandler,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.events.push("subscribe".to_string());
        state.subscription = Some((predicate, handler));
        Ok(())
    }

    async fn flush_responses(&self) -> Result<(), BrowserError> {
        let (batch, subscription) = {
            let mut state = self.state.lock().unwrap();
            (state.pending_batches.pop_front(), state.subscription.clone())
        };
        if let (Some(batch), Some((predicate, handler))) = (batch, subscription) {
            for event in batch {
                if predicate(&event) {
                    handler(event);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.events.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}
