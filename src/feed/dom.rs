use super::{FeedError, FeedOutcome, JobCollection, JobFeed};
use crate::browser::Browser;
use crate::filter::normalize_url;
use crate::parsers::html;
use crate::results::JobSummary;
use crate::utils::Jitter;
use url::Url;

/// Job id from a job page URL: the path segment right after `job_path`
pub fn job_id_from_url(url: &Url, job_path: &str) -> Option<String> {
    let rest = url.path().strip_prefix(job_path)?;
    let id = rest.split('/').next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Scrolls the feed and collects job links from the rendered page.
///
/// Only ids are known afterwards; the rest comes from each job page.
pub struct DomLinkFeed<'a, B> {
    browser: &'a B,
    base_url: Url,
    job_path: String,
    scrolls: usize,
    scroll_step: i64,
    pause: Jitter,
}

impl<'a, B: Browser> DomLinkFeed<'a, B> {
    pub fn new(browser: &'a B, base_url: Url, job_path: &str) -> Self {
        Self {
            browser,
            base_url,
            job_path: job_path.to_string(),
            scrolls: 5,
            scroll_step: 2000,
            pause: Jitter::none(),
        }
    }

    pub fn with_scrolls(mut self, scrolls: usize, step: i64) -> Self {
        self.scrolls = scrolls;
        self.scroll_step = step;
        self
    }

    pub fn with_pause(mut self, pause: Jitter) -> Self {
        self.pause = pause;
        self
    }

    fn collect_links(&self, page: &str, collection: &mut JobCollection) {
        for href in html::links_containing(page, &self.job_path) {
            let Ok(url) = self.base_url.join(&href) else {
                ::log::debug!("Ignoring unparsable link {}", href);
                continue;
            };
            if let Some(id) = job_id_from_url(&normalize_url(&url), &self.job_path) {
                collection.push(JobSummary::from_id(id));
            }
        }
    }
}

impl<B: Browser> JobFeed for DomLinkFeed<'_, B> {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn extract(&mut self) -> Result<FeedOutcome, FeedError> {
        let mut collection = JobCollection::default();

        for _ in 0..self.scrolls {
            self.browser.scroll_by(self.scroll_step).await?;
            self.pause.sleep().await;
        }

        let page = self.browser.source().await?;
        self.collect_links(&page, &mut collection);
        println!("Found {} job links on the feed page", collection.len());

        Ok(collection.into_outcome())
    }
}
