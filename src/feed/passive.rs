use super::{FeedError, FeedOutcome, JobCollection, JobFeed, PageCursor, envelopes};
use crate::browser::Browser;
use crate::interceptor::NetworkInterceptor;
use crate::utils::Jitter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollOptions {
    /// Hard bound on the number of scrolls
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: usize,

    /// Consecutive scrolls without a new payload before giving up
    #[serde(default = "default_idle_scroll_limit")]
    pub idle_scroll_limit: usize,

    /// Pixels per scroll
    #[serde(default = "default_scroll_step")]
    pub scroll_step: i64,
}

fn default_max_scrolls() -> usize {
    60
}

fn default_idle_scroll_limit() -> usize {
    3
}

fn default_scroll_step() -> i64 {
    1600
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            max_scrolls: default_max_scrolls(),
            idle_scroll_limit: default_idle_scroll_limit(),
            scroll_step: default_scroll_step(),
        }
    }
}

/// Folds captured payloads into a [`JobCollection`]
#[derive(Debug, Default)]
pub struct CaptureAccumulator {
    collection: JobCollection,
    last_page: Option<PageCursor>,
    feed_pages: usize,
}

impl CaptureAccumulator {
    pub fn absorb(&mut self, payload: &str) {
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.absorb_value(&value),
            Err(e) => ::log::warn!("Skipping unparsable payload: {}", e),
        }
    }

    pub fn absorb_value(&mut self, value: &Value) {
        for envelope in envelopes(value) {
            if let Some(page) = envelope.job_search() {
                let added = self.collection.absorb_page(&page);
                self.feed_pages += 1;
                println!(
                    "Captured feed page {}: {} jobs ({} new), {} collected",
                    self.feed_pages,
                    page.edges.len(),
                    added,
                    self.collection.len()
                );
                self.last_page = Some(page.page_info);
            }
            if let Some(job) = envelope.job_detail() {
                self.collection.absorb_detail(job);
            }
        }
    }

    /// The latest captured page said there is nothing more
    pub fn reached_end(&self) -> bool {
        self.last_page.as_ref().is_some_and(|p| !p.has_next_page)
    }

    pub fn into_outcome(self) -> FeedOutcome {
        if self.feed_pages == 0 {
            ::log::info!("No jobSearch response was captured");
        }
        self.collection.into_outcome()
    }
}

/// Jobs from already-captured payloads, e.g. a capture log
pub fn collect_from_payloads(payloads: &[String]) -> FeedOutcome {
    let mut accumulator = CaptureAccumulator::default();
    for payload in payloads {
        accumulator.absorb(payload);
    }
    accumulator.into_outcome()
}

/// Scrolls the feed and reads the `jobSearch` responses the page requests itself.
///
/// The interceptor must be installed before the feed page was opened.
pub struct PassiveCaptureFeed<'a, B> {
    browser: &'a B,
    interceptor: &'a mut NetworkInterceptor,
    options: ScrollOptions,
    pause: Jitter,
}

impl<'a, B: Browser> PassiveCaptureFeed<'a, B> {
    pub fn new(browser: &'a B, interceptor: &'a mut NetworkInterceptor, options: ScrollOptions) -> Self {
        Self {
            browser,
            interceptor,
            options,
            pause: Jitter::none(),
        }
    }

    pub fn with_pause(mut self, pause: Jitter) -> Self {
        self.pause = pause;
        self
    }

    async fn collect(&mut self, accumulator: &mut CaptureAccumulator) -> Result<usize, FeedError> {
        self.browser.flush_responses().await?;
        let payloads = self.interceptor.drain();
        for payload in &payloads {
            accumulator.absorb(payload);
        }
        Ok(payloads.len())
    }
}

impl<B: Browser> JobFeed for PassiveCaptureFeed<'_, B> {
    fn name(&self) -> &'static str {
        "passive"
    }

    async fn extract(&mut self) -> Result<FeedOutcome, FeedError> {
        let mut accumulator = CaptureAccumulator::default();

        // Whatever the initial page load fetched
        self.collect(&mut accumulator).await?;

        let mut idle = 0;
        for scroll in 1..=self.options.max_scrolls {
            if accumulator.reached_end() {
                ::log::info!("Feed reports no further pages after {} scrolls", scroll - 1);
                break;
            }

            self.browser.scroll_by(self.options.scroll_step).await?;
            self.pause.sleep().await;

            if self.collect(&mut accumulator).await? == 0 {
                idle += 1;
                ::log::debug!("Scroll {} captured nothing ({} idle)", scroll, idle);
                if idle >= self.options.idle_scroll_limit {
                    ::log::info!("No new responses after {} scrolls, stopping", idle);
                    break;
                }
            } else {
                idle = 0;
            }
        }

        // Late responses from the last scroll
        self.collect(&mut accumulator).await?;

        Ok(accumulator.into_outcome())
    }
}
