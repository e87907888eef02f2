#![allow(clippy::too_many_arguments)]

pub mod browser;
pub mod capture_log;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod feed;
pub mod filter;
pub mod interceptor;
pub mod normalize;
pub mod parsers;
pub mod report;
pub mod results;
pub mod resume;
pub mod session;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{AppConfig, RunMode};
pub use driver::RunSummary;
pub use feed::{FeedOutcome, FeedStrategy};
pub use results::{JobDetail, JobSummary};
pub use utils::{StopHandle, StopSignal, stop_signal};

use browser::webdriver::{self, BrowserOptions, WebDriverBrowser};
use browser::{Browser, BrowserError};
use capture_log::{CaptureError, CaptureLog};
use config::ConfigError;
use driver::{ApplicationDriver, DriverOptions};
use feed::active::{ActiveQueryFeed, HttpTransport};
use feed::dom::DomLinkFeed;
use feed::passive::{PassiveCaptureFeed, collect_from_payloads};
use feed::{FeedError, JobFeed};
use filter::{UrlClassifier, UrlFilter};
use interceptor::NetworkInterceptor;
use resume::{ResumeBridge, ResumeGenerator};
use session::{SessionError, SessionGuard};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("invalid URL pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("run interrupted")]
    Interrupted,

    #[error("could not prepare {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Main builder for a scrape or apply run
pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Override the configured extraction strategy
    pub fn with_strategy(mut self, strategy: FeedStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Load configuration from a file
    pub fn with_config_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(AppConfig::from_file(path)?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Log in if needed and collect the job feed. Raising `stop` ends the run.
    pub async fn scrape(&self, stop: StopSignal) -> Result<FeedOutcome, RunError> {
        self.config.validate_for(RunMode::Scrape)?;
        let browser = self.connect().await?;
        self.scrape_with(&browser, stop).await
    }

    /// Collect the feed in an already connected browser, then close it
    pub async fn scrape_with<B: Browser>(
        &self,
        browser: &B,
        stop: StopSignal,
    ) -> Result<FeedOutcome, RunError> {
        let result: Result<FeedOutcome, RunError> = async {
            let mut interceptor = self.interceptor()?;
            self.extract(browser, &mut interceptor, &stop).await
        }
        .await;

        shutdown(browser).await;
        result
    }

    /// Collect the feed, then prepare an application for every job
    pub async fn apply(&self, stop: StopSignal) -> Result<RunSummary, RunError> {
        self.config.validate_for(RunMode::Apply)?;
        let bridge = self.resume_bridge()?;
        let output_dir = self.prepare_output_dir()?;
        let browser = self.connect().await?;
        self.apply_with(&browser, &bridge, output_dir, stop).await
    }

    /// The apply run against a connected browser and a resume generator; closes the browser
    pub async fn apply_with<B: Browser, R: ResumeGenerator>(
        &self,
        browser: &B,
        resumes: &R,
        output_dir: PathBuf,
        stop: StopSignal,
    ) -> Result<RunSummary, RunError> {
        let result: Result<RunSummary, RunError> = async {
            let mut interceptor = self.interceptor()?;
            let FeedOutcome::Jobs(feed) = self.extract(browser, &mut interceptor, &stop).await?
            else {
                println!("No jobs found.");
                return Ok(RunSummary::default());
            };
            println!(
                "Found {} jobs (feed reports {})",
                feed.jobs.len(),
                feed.total_count
            );

            let mut options = DriverOptions::new(self.config.jobs_url()?, output_dir);
            options.pacing = self.config.pacing;
            options.job_path = self.config.job_path.clone();
            options.upload_timeout = Duration::from_secs(self.config.upload_timeout_secs);

            let summary = ApplicationDriver::new(browser, resumes, options)
                .with_interceptor(&mut interceptor)
                .with_stop(stop.clone())
                .run(&feed.jobs, &feed.documents)
                .await?;
            Ok(summary)
        }
        .await;

        shutdown(browser).await;
        result
    }

    async fn connect(&self) -> Result<WebDriverBrowser, RunError> {
        let options = BrowserOptions {
            webdriver_url: self.config.webdriver_url.clone(),
            headless: self.config.headless,
            window_size: self.config.window_size,
        };
        Ok(webdriver::connect(&options).await?)
    }

    fn interceptor(&self) -> Result<NetworkInterceptor, RunError> {
        let interceptor = NetworkInterceptor::new(UrlFilter::new(&self.config.endpoint)?);
        Ok(match &self.config.capture_log {
            Some(path) => interceptor.with_mirror(CaptureLog::open(path)?),
            None => interceptor,
        })
    }

    fn resume_bridge(&self) -> Result<ResumeBridge, ConfigError> {
        let script = self.config.resume_script().ok_or(ConfigError::Missing {
            setting: "resume_script",
            env: "PYTHON_RESUME_SCRIPT",
        })?;
        Ok(
            ResumeBridge::new(self.config.python_executable.clone(), script)
                .with_working_dir(self.config.resume_working_dir.clone())
                .with_timeout(Duration::from_secs(self.config.resume_timeout_secs)),
        )
    }

    /// Create the output directory and make it absolute, so the generator's
    /// working directory does not change where documents land
    fn prepare_output_dir(&self) -> Result<PathBuf, RunError> {
        let dir = &self.config.resume_output_dir;
        let io_error = |source| RunError::Io {
            path: dir.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_error)?;
        dir.canonicalize().map_err(io_error)
    }

    async fn extract<B: Browser>(
        &self,
        browser: &B,
        interceptor: &mut NetworkInterceptor,
        stop: &StopSignal,
    ) -> Result<FeedOutcome, RunError> {
        let feed_url = self.config.jobs_url()?;
        let classifier = UrlClassifier::new(&self.config.login, &self.config.feed)?;

        // Subscribe before the feed loads so its first page is captured
        interceptor.install(browser).await?;

        let mut guard = SessionGuard::new(classifier).with_login_timeout(
            self.config.login_timeout_secs.map(Duration::from_secs),
        );
        guard.open_feed(browser, feed_url.as_str(), stop.stopped()).await?;

        tokio::select! {
            biased;
            _ = stop.stopped() => Err(RunError::Interrupted),
            outcome = self.read_feed(browser, interceptor, &feed_url) => outcome,
        }
    }

    async fn read_feed<B: Browser>(
        &self,
        browser: &B,
        interceptor: &mut NetworkInterceptor,
        feed_url: &Url,
    ) -> Result<FeedOutcome, RunError> {
        let pause = self.config.pacing.scroll;
        let outcome = match self.config.strategy {
            FeedStrategy::Active => {
                let transport = HttpTransport::from_browser(
                    browser,
                    self.config.graphql_endpoint()?,
                    Duration::from_secs(self.config.http_timeout_secs),
                )
                .await?;
                let mut feed =
                    ActiveQueryFeed::new(transport, self.config.search.clone()).with_pause(pause);
                if let Some(query) = self.config.graphql_query()? {
                    feed = feed.with_query(query);
                }
                run_feed(&mut feed).await?
            }
            FeedStrategy::Passive => {
                let mut feed = PassiveCaptureFeed::new(browser, interceptor, self.config.scroll)
                    .with_pause(pause);
                run_feed(&mut feed).await?
            }
            FeedStrategy::Dom => {
                let mut feed = DomLinkFeed::new(browser, feed_url.clone(), &self.config.job_path)
                    .with_scrolls(self.config.dom_scrolls, self.config.scroll.scroll_step)
                    .with_pause(pause);
                run_feed(&mut feed).await?
            }
        };

        Ok(outcome)
    }
}

async fn shutdown<B: Browser>(browser: &B) {
    if let Err(e) = browser.close().await {
        ::log::debug!("Closing the browser failed: {}", e);
    }
}

async fn run_feed<F: JobFeed>(feed: &mut F) -> Result<FeedOutcome, FeedError> {
    ::log::info!("Extracting jobs with the {} strategy", feed.name());
    let outcome = feed.extract().await?;
    ::log::info!(
        "{} strategy produced {} jobs",
        feed.name(),
        outcome.jobs().len()
    );
    Ok(outcome)
}

/// Jobs and required documents found in a capture file
pub fn inspect(path: impl AsRef<Path>) -> Result<FeedOutcome, RunError> {
    let captures = capture_log::read_captures(path)?;
    Ok(collect_from_payloads(&captures))
}
