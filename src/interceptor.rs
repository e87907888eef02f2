use crate::browser::{Browser, BrowserError, RawNetworkEvent};
use crate::capture_log::CaptureLog;
use crate::decoder;
use crate::filter::UrlFilter;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Collects decoded GraphQL payloads from browser traffic.
///
/// The browser callback is the only writer; it appends to an unbounded queue.
/// Readers call [`NetworkInterceptor::drain`] at their own synchronization points.
pub struct NetworkInterceptor {
    endpoint: Arc<UrlFilter>,
    sender: mpsc::UnboundedSender<String>,
    receiver: mpsc::UnboundedReceiver<String>,
    mirror: Option<CaptureLog>,
    drained: usize,
}

impl NetworkInterceptor {
    /// `endpoint` selects which response URLs are kept
    pub fn new(endpoint: UrlFilter) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            endpoint: Arc::new(endpoint),
            sender,
            receiver,
            mirror: None,
            drained: 0,
        }
    }

    /// Copy every drained payload into a durable capture log
    pub fn with_mirror(mut self, log: CaptureLog) -> Self {
        self.mirror = Some(log);
        self
    }

    /// Subscribe to the browser's responses. Call this before navigating to the feed.
    pub async fn install<B: Browser>(&self, browser: &B) -> Result<(), BrowserError> {
        let endpoint = Arc::clone(&self.endpoint);
        let sender = self.sender.clone();

        browser
            .on_response(
                Arc::new(move |event: &RawNetworkEvent| endpoint.matches(&event.url)),
                Arc::new(move |event: RawNetworkEvent| {
                    if let Some(payload) = Self::process(&event) {
                        // The receiver only goes away with the interceptor itself
                        let _ = sender.send(payload);
                    }
                }),
            )
            .await?;

        ::log::info!("Network interceptor installed");
        Ok(())
    }

    /// Decode and validate one response; `None` when it should be discarded
    pub fn process(event: &RawNetworkEvent) -> Option<String> {
        let Some(body) = event.response_body.as_deref() else {
            ::log::debug!("No body captured for {} {}", event.method, event.url);
            return None;
        };

        let text = match decoder::decode_body(body, event.content_encoding) {
            Ok(text) => text,
            Err(e) => {
                ::log::warn!("Discarding response from {}: {}", event.url, e);
                return None;
            }
        };

        if let Err(e) = serde_json::from_str::<serde_json::Value>(&text) {
            ::log::warn!("Discarding non-JSON response from {}: {}", event.url, e);
            return None;
        }

        ::log::trace!("Captured {} bytes from {}", text.len(), event.url);
        Some(text)
    }

    /// Everything captured since the previous drain, in arrival order
    pub fn drain(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Ok(payload) = self.receiver.try_recv() {
            payloads.push(payload);
        }

        let mut mirror_failed = false;
        if let Some(log) = self.mirror.as_mut() {
            for payload in &payloads {
                if let Err(e) = log.append(payload) {
                    ::log::warn!("Capture log write failed, disabling mirror: {}", e);
                    mirror_failed = true;
                    break;
                }
            }
            ::log::trace!("{} payloads mirrored so far", log.written());
        }
        if mirror_failed {
            self.mirror = None;
        }

        self.drained += payloads.len();
        payloads
    }

    /// Total payloads handed out so far
    pub fn drained(&self) -> usize {
        self.drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBrowser;
    use crate::decoder::ContentEncoding;
    use crate::filter::{UrlFilterConfig, default_endpoint_patterns};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const GRAPHQL: &str = "https://app.joinhandshake.com/hs/graphql";

    fn interceptor() -> NetworkInterceptor {
        let endpoint =
            UrlFilter::new(&UrlFilterConfig::including(&default_endpoint_patterns())).unwrap();
        NetworkInterceptor::new(endpoint)
    }

    #[tokio::test]
    async fn test_keeps_only_valid_graphql_payloads() {
        let browser = MockBrowser::new();
        let mut interceptor = interceptor();
        interceptor.install(&browser).await.unwrap();
        assert!(browser.is_subscribed());

        browser.emit(RawNetworkEvent::text(GRAPHQL, r#"{"data":{"n":1}}"#));
        browser.emit(RawNetworkEvent::text(GRAPHQL, "<html>502 Bad Gateway</html>"));
        browser.emit(RawNetworkEvent::text(
            "https://app.joinhandshake.com/api/v1/notifications",
            r#"{"data":{"ignored":true}}"#,
        ));

        let mut gzipped = GzEncoder::new(Vec::new(), Compression::default());
        gzipped.write_all(br#"{"data":{"n":2}}"#).unwrap();
        let mut event = RawNetworkEvent::text(GRAPHQL, "");
        event.response_body = Some(gzipped.finish().unwrap());
        event.content_encoding = ContentEncoding::Gzip;
        browser.emit(event);

        let mut corrupt = RawNetworkEvent::text(GRAPHQL, "not gzip");
        corrupt.content_encoding = ContentEncoding::Gzip;
        browser.emit(corrupt);

        let mut empty = RawNetworkEvent::text(GRAPHQL, "");
        empty.response_body = None;
        browser.emit(empty);

        assert_eq!(
            interceptor.drain(),
            vec![r#"{"data":{"n":1}}"#.to_string(), r#"{"data":{"n":2}}"#.to_string()]
        );
        assert!(interceptor.drain().is_empty());
        assert_eq!(interceptor.drained(), 2);
    }

    #[tokio::test]
    async fn test_events_after_drain_are_kept_for_next_drain() {
        let browser = MockBrowser::new();
        let mut interceptor = interceptor();
        interceptor.install(&browser).await.unwrap();

        browser.emit(RawNetworkEvent::text(GRAPHQL, r#"{"data":{"page":1}}"#));
        assert_eq!(interceptor.drain().len(), 1);

        browser.queue_responses(vec![RawNetworkEvent::text(GRAPHQL, r#"{"data":{"page":2}}"#)]);
        browser.flush_responses().await.unwrap();
        assert_eq!(interceptor.drain(), vec![r#"{"data":{"page":2}}"#.to_string()]);
    }
}
