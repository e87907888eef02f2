use super::{
    Browser, BrowserError, ElementQuery, RawNetworkEvent, ResponseHandler, ResponsePredicate,
};
use crate::decoder::ContentEncoding;
use chrono::{DateTime, Utc};
use fantoccini::actions::{InputSource, MouseActions, PointerAction};
use fantoccini::error::CmdError;
use fantoccini::wd::{Capabilities, WebDriverCompatibleCommand};
use fantoccini::{Client, ClientBuilder, Locator};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Installed in every document to record JSON responses into `window.__jobCapture`
const CAPTURE_HOOK: &str = include_str!("capture_hook.js");

const DRAIN_SCRIPT: &str =
    "var queue = window.__jobCapture || []; window.__jobCapture = []; return queue;";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Options for starting the WebDriver session
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
}

#[derive(Clone)]
struct Subscription {
    predicate: ResponsePredicate,
    handler: ResponseHandler,
}

/// [`Browser`] backed by a WebDriver session (ChromeDriver for network capture)
pub struct WebDriverBrowser {
    client: Client,
    subscription: Arc<Mutex<Option<Subscription>>>,
    inject_after_navigation: AtomicBool,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Connects to the WebDriver server, trying common local ports if the configured one fails
pub async fn connect(options: &BrowserOptions) -> Result<WebDriverBrowser, BrowserError> {
    let capabilities = chrome_capabilities(options);

    match connect_with(&options.webdriver_url, &capabilities).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", options.webdriver_url);
            return Ok(WebDriverBrowser::new(client));
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                options.webdriver_url,
                e
            );
        }
    }

    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4444", // Selenium / geckodriver default
        "http://127.0.0.1:9515",
    ];

    for url in fallback_urls.iter() {
        if *url == options.webdriver_url {
            continue;
        }
        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = connect_with(url, &capabilities).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(WebDriverBrowser::new(client));
        }
    }

    Err(BrowserError::Connect(format!(
        "no WebDriver server reachable at {} or the default ports; start chromedriver or set WEBDRIVER_URL",
        options.webdriver_url
    )))
}

async fn connect_with(url: &str, capabilities: &Capabilities) -> Result<Client, String> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(capabilities.clone());
    builder.connect(url).await.map_err(|e| e.to_string())
}

fn chrome_capabilities(options: &BrowserOptions) -> Capabilities {
    let (width, height) = options.window_size;
    let mut args = vec![format!("--window-size={width},{height}")];
    if options.headless {
        args.push("--headless=new".to_string());
    }

    let mut capabilities = Capabilities::new();
    capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    capabilities
}

/// Chrome DevTools command tunnelled through ChromeDriver's vendor endpoint
#[derive(Debug)]
struct CdpCommand {
    cmd: &'static str,
    params: Value,
}

impl WebDriverCompatibleCommand for CdpCommand {
    fn endpoint(
        &self,
        base_url: &url::Url,
        session_id: Option<&str>,
    ) -> Result<url::Url, url::ParseError> {
        base_url.join(&format!(
            "session/{}/goog/cdp/execute",
            session_id.unwrap_or_default()
        ))
    }

    fn method_and_body(&self, _request_url: &url::Url) -> (http::Method, Option<String>) {
        let body = json!({ "cmd": self.cmd, "params": self.params });
        (http::Method::POST, Some(body.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapturedEntry {
    url: String,
    method: Option<String>,
    request_body: Option<String>,
    status: Option<u16>,
    body: Option<String>,
    content_encoding: Option<String>,
    timestamp: Option<f64>,
}

impl CapturedEntry {
    fn into_event(self) -> RawNetworkEvent {
        let timestamp = self
            .timestamp
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            .unwrap_or_else(Utc::now);

        RawNetworkEvent {
            url: self.url,
            method: self.method.unwrap_or_else(|| "GET".to_string()),
            request_body: self.request_body,
            response_body: self.body.map(String::into_bytes),
            content_encoding: self
                .content_encoding
                .as_deref()
                .map(ContentEncoding::from_label)
                .unwrap_or_default(),
            status: self.status,
            timestamp,
        }
    }
}

impl WebDriverBrowser {
    fn new(client: Client) -> Self {
        Self {
            client,
            subscription: Arc::new(Mutex::new(None)),
            inject_after_navigation: AtomicBool::new(false),
            poller: std::sync::Mutex::new(None),
        }
    }

    /// Install the capture hook so it runs before page scripts in every new document
    async fn install_capture_hook(&self) -> Result<(), BrowserError> {
        let command = CdpCommand {
            cmd: "Page.addScriptToEvaluateOnNewDocument",
            params: json!({ "source": CAPTURE_HOOK }),
        };

        if let Err(e) = self.client.issue_cmd(command).await {
            ::log::warn!(
                "WebDriver does not accept CDP commands ({}); injecting capture hook after each navigation, early responses may be missed",
                e
            );
            self.inject_after_navigation.store(true, Ordering::SeqCst);
        }

        // Also instrument the document that is already open
        self.client
            .execute(CAPTURE_HOOK, Vec::new())
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn locator(query: &ElementQuery) -> Locator<'_> {
        match query {
            ElementQuery::Css(selector) => Locator::Css(selector),
            ElementQuery::XPath(expr) => Locator::XPath(expr),
        }
    }
}

/// Pull the page-side queue and hand matching events to the subscriber
async fn drain_page(
    client: &Client,
    subscription: &Mutex<Option<Subscription>>,
) -> Result<usize, BrowserError> {
    let guard = subscription.lock().await;
    let Some(subscription) = guard.as_ref() else {
        return Ok(0);
    };

    let queued = client
        .execute(DRAIN_SCRIPT, Vec::new())
        .await
        .map_err(classify)?;

    let entries: Vec<CapturedEntry> = match serde_json::from_value(queued) {
        Ok(entries) => entries,
        Err(e) => {
            ::log::warn!("Discarding malformed capture queue: {}", e);
            return Ok(0);
        }
    };

    let mut delivered = 0;
    for entry in entries {
        let event = entry.into_event();
        if (subscription.predicate)(&event) {
            (subscription.handler)(event);
            delivered += 1;
        }
    }
    if delivered > 0 {
        ::log::trace!("Delivered {} captured responses", delivered);
    }
    Ok(delivered)
}

const SESSION_LOSS_MARKERS: &[&str] = &[
    "Unable to find session",
    "invalid session id",
    "no such window",
    "session deleted",
    "chrome not reachable",
    "disconnected",
    "target window already closed",
];

fn is_session_loss_message(message: &str) -> bool {
    SESSION_LOSS_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Separate session loss from ordinary command failures
fn classify(error: CmdError) -> BrowserError {
    let message = error.to_string();
    // Lost: the WebDriver server itself went away
    if matches!(error, CmdError::Lost(..)) || is_session_loss_message(&message) {
        ::log::warn!("Lost WebDriver session: {}", message);
        BrowserError::SessionClosed
    } else {
        BrowserError::Command(error)
    }
}

impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        // Anything still queued in the old document is lost once it unloads
        if let Err(e) = drain_page(&self.client, &self.subscription).await {
            if e.is_session_lost() {
                return Err(e);
            }
            ::log::debug!("Could not drain captures before navigating: {}", e);
        }

        self.client.goto(url).await.map_err(classify)?;

        if self.inject_after_navigation.load(Ordering::SeqCst) {
            self.client
                .execute(CAPTURE_HOOK, Vec::new())
                .await
                .map_err(classify)?;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.client.current_url().await.map_err(classify)?;
        Ok(url.to_string())
    }

    async fn source(&self) -> Result<String, BrowserError> {
        self.client.source().await.map_err(classify)
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), BrowserError> {
        self.client
            .execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn move_mouse(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        let mouse = MouseActions::new("mouse".to_string()).then(PointerAction::MoveTo {
            duration: Some(Duration::from_millis(400)),
            x,
            y,
        });
        self.client.perform_actions(mouse).await.map_err(classify)
    }

    async fn click(&self, query: &ElementQuery) -> Result<bool, BrowserError> {
        match self.client.find(Self::locator(query)).await {
            Ok(element) => {
                element.click().await.map_err(classify)?;
                Ok(true)
            }
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    async fn wait_for(
        &self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Self::locator(query))
            .await
        {
            Ok(_) => Ok(true),
            Err(CmdError::WaitTimeout) => Ok(false),
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    async fn attach_file(&self, query: &ElementQuery, path: &Path) -> Result<(), BrowserError> {
        let element = self
            .client
            .find(Self::locator(query))
            .await
            .map_err(classify)?;
        element
            .send_keys(&path.to_string_lossy())
            .await
            .map_err(classify)
    }

    async fn cookie_header(&self) -> Result<String, BrowserError> {
        let cookies = self.client.get_all_cookies().await.map_err(classify)?;
        Ok(cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect::<Vec<_>>()
            .join("; "))
    }

    async fn on_response(
        &self,
        predicate: ResponsePredicate,
        handler: ResponseHandler,
    ) -> Result<(), BrowserError> {
        *self.subscription.lock().await = Some(Subscription { predicate, handler });
        self.install_capture_hook().await?;

        let client = self.client.clone();
        let subscription = Arc::clone(&self.subscription);
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                match drain_page(&client, &subscription).await {
                    Ok(_) => {}
                    Err(e) if e.is_session_lost() => {
                        ::log::debug!("Capture poller stopping: {}", e);
                        break;
                    }
                    // Navigation in progress or a page without the hook
                    Err(e) => ::log::trace!("Capture poll failed: {}", e),
                }
            }
        });

        if let Ok(mut slot) = self.poller.lock() {
            if let Some(previous) = slot.replace(poller) {
                previous.abort();
            }
        }
        Ok(())
    }

    async fn flush_responses(&self) -> Result<(), BrowserError> {
        drain_page(&self.client, &self.subscription).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if let Ok(mut slot) = self.poller.lock() {
            if let Some(poller) = slot.take() {
                poller.abort();
            }
        }
        self.client.clone().close().await.map_err(classify)
    }
}
