use crate::browser::{Browser, BrowserError, ElementQuery};
use crate::feed::{self, envelopes};
use crate::interceptor::NetworkInterceptor;
use crate::normalize::normalize_detail;
use crate::parsers::{self, html};
use crate::report;
use crate::results::{DEFAULT_EMPLOYER, DEFAULT_TITLE, DocumentType, JobSummary};
use crate::resume::{ResumeGenerator, ResumeRequest};
use crate::utils::{Pacing, StopSignal};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const APPLY_BUTTON_XPATH: &str = "//button[contains(normalize-space(.), 'Apply')]";
pub const UPLOAD_INPUT_CSS: &str = "input[type=file]";

#[derive(Debug, Error)]
#[error("could not attach {}: {source}", path.display())]
pub struct AttachmentError {
    pub path: PathBuf,
    #[source]
    pub source: BrowserError,
}

/// Why a job was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Navigation(String),
    EmptyDescription,
    NoApplyButton,
    NoUploadControl,
    ResumeFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Navigation(e) => write!(f, "could not open the job page: {e}"),
            SkipReason::EmptyDescription => f.write_str("no job description"),
            SkipReason::NoApplyButton => f.write_str("no Apply button"),
            SkipReason::NoUploadControl => f.write_str("no resume upload control"),
            SkipReason::ResumeFailed(e) => write!(f, "resume generation failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Resume attached, waiting on the human to submit
    Attached { resume: PathBuf },
    /// Resume generated but the upload failed
    PartiallyApplied { resume: PathBuf, reason: String },
    Skipped(SkipReason),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Attached { resume } => write!(f, "attached {}", resume.display()),
            JobOutcome::PartiallyApplied { resume, reason } => {
                write!(f, "generated {} but not attached ({reason})", resume.display())
            }
            JobOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// Outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub attached: usize,
    pub partially_applied: usize,
    pub skipped: usize,
    /// The run was stopped before every job was processed
    pub interrupted: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &JobOutcome) {
        self.total += 1;
        match outcome {
            JobOutcome::Attached { .. } => self.attached += 1,
            JobOutcome::PartiallyApplied { .. } => self.partially_applied += 1,
            JobOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs: {} attached, {} partially applied, {} skipped",
            self.total, self.attached, self.partially_applied, self.skipped
        )?;
        if self.interrupted {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub pacing: Pacing,
    /// Origin the job paths are resolved against
    pub job_base: Url,
    /// Path prefix of a job page, e.g. `/stu/jobs/`
    pub job_path: String,
    pub apply_button: ElementQuery,
    pub upload_input: ElementQuery,
    pub upload_timeout: Duration,
    pub output_dir: PathBuf,
}

impl DriverOptions {
    pub fn new(job_base: Url, output_dir: PathBuf) -> Self {
        Self {
            pacing: Pacing::default(),
            job_base,
            job_path: "/stu/jobs/".to_string(),
            apply_button: ElementQuery::xpath(APPLY_BUTTON_XPATH),
            upload_input: ElementQuery::css(UPLOAD_INPUT_CSS),
            upload_timeout: Duration::from_secs(10),
            output_dir,
        }
    }
}

/// Required documents for `job_id` among captured payloads, if its detail response is there
pub fn documents_in(payloads: &[String], job_id: &str) -> Option<Vec<DocumentType>> {
    payloads
        .iter()
        .filter_map(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .flat_map(|value| envelopes(&value))
        .filter_map(|envelope| envelope.job_detail().and_then(normalize_detail))
        .filter(|(id, _)| id == job_id)
        .find_map(|(_, documents)| documents)
}

/// Session loss ends the run; anything else is logged and ignored
fn tolerate<T>(result: Result<T, BrowserError>, what: &str) -> Result<Option<T>, BrowserError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_session_lost() => Err(e),
        Err(e) => {
            ::log::debug!("{} failed: {}", what, e);
            Ok(None)
        }
    }
}

/// Walks job pages one at a time and prepares each application for the human
pub struct ApplicationDriver<'a, B, R> {
    browser: &'a B,
    resumes: &'a R,
    interceptor: Option<&'a mut NetworkInterceptor>,
    stop: StopSignal,
    options: DriverOptions,
}

impl<'a, B: Browser, R: ResumeGenerator> ApplicationDriver<'a, B, R> {
    pub fn new(browser: &'a B, resumes: &'a R, options: DriverOptions) -> Self {
        Self {
            browser,
            resumes,
            interceptor: None,
            stop: StopSignal::never(),
            options,
        }
    }

    /// Report required documents from detail responses seen on each job page
    pub fn with_interceptor(mut self, interceptor: &'a mut NetworkInterceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// End the run early when `stop` is raised, abandoning the current job
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Process every job in order. Only a lost browser session is an error.
    pub async fn run(
        &mut self,
        jobs: &[JobSummary],
        known_documents: &HashMap<String, Vec<DocumentType>>,
    ) -> Result<RunSummary, BrowserError> {
        let mut summary = RunSummary::default();

        let stop = self.stop.clone();

        for (index, job) in jobs.iter().enumerate() {
            if stop.is_stopped() {
                summary.interrupted = true;
                break;
            }
            println!("\n[{}/{}] Job {}", index + 1, jobs.len(), job.id);
            let outcome = tokio::select! {
                outcome = self.apply_to(job, known_documents.get(&job.id).map(Vec::as_slice)) => outcome?,
                _ = stop.stopped() => {
                    ::log::warn!("Stopped while working on job {}", job.id);
                    summary.interrupted = true;
                    break;
                }
            };
            println!("Job {}: {}", job.id, outcome);
            summary.record(&outcome);
        }

        println!("\nRun complete: {}", summary);
        Ok(summary)
    }

    pub async fn apply_to(
        &mut self,
        job: &JobSummary,
        known_documents: Option<&[DocumentType]>,
    ) -> Result<JobOutcome, BrowserError> {
        let url = match feed::job_url(&self.options.job_base, &self.options.job_path, &job.id) {
            Ok(url) => url,
            Err(e) => return Ok(JobOutcome::Skipped(SkipReason::Navigation(e.to_string()))),
        };

        match self.browser.goto(url.as_str()).await {
            Ok(()) => {}
            Err(e) if e.is_session_lost() => return Err(e),
            Err(e) => {
                ::log::warn!("Navigation to {} failed: {}", url, e);
                return Ok(JobOutcome::Skipped(SkipReason::Navigation(e.to_string())));
            }
        }

        self.humanize().await?;
        self.report_documents(job, known_documents).await?;

        let page = tolerate(self.browser.source().await, "Reading page source")?.unwrap_or_default();
        let content = html::extract_job_page(&page);

        let title = if job.title != DEFAULT_TITLE {
            job.title.clone()
        } else {
            content.title.unwrap_or_else(|| DEFAULT_TITLE.to_string())
        };
        let employer = if job.employer_name != DEFAULT_EMPLOYER {
            job.employer_name.clone()
        } else {
            content.employer.unwrap_or_else(|| DEFAULT_EMPLOYER.to_string())
        };
        let description = if job.has_description() {
            parsers::clean_description(&job.description)
        } else {
            content.description.unwrap_or_default()
        };
        println!("{} at {}", title, employer);

        if description.trim().is_empty() {
            return Ok(JobOutcome::Skipped(SkipReason::EmptyDescription));
        }

        let clicked = tolerate(
            self.browser.click(&self.options.apply_button).await,
            "Clicking Apply",
        )?;
        if clicked != Some(true) {
            return Ok(JobOutcome::Skipped(SkipReason::NoApplyButton));
        }
        self.options.pacing.after_apply.sleep().await;

        let upload = tolerate(
            self.browser
                .wait_for(&self.options.upload_input, self.options.upload_timeout)
                .await,
            "Waiting for the upload control",
        )?;
        if upload != Some(true) {
            return Ok(JobOutcome::Skipped(SkipReason::NoUploadControl));
        }

        let request = ResumeRequest::new(&description, &title, &employer, &self.options.output_dir);
        println!("Requesting resume {}", request.output_path.display());
        let resume = match self.resumes.request_resume(&request).await {
            Ok(path) => path,
            Err(e) => {
                ::log::warn!("Resume for job {} failed: {}", job.id, e);
                return Ok(JobOutcome::Skipped(SkipReason::ResumeFailed(e.to_string())));
            }
        };

        let outcome = match self.attach(&resume).await {
            Ok(()) => JobOutcome::Attached {
                resume: resume.clone(),
            },
            Err(e) if e.source.is_session_lost() => return Err(e.source),
            Err(e) => {
                ::log::warn!("{}", e);
                JobOutcome::PartiallyApplied {
                    resume: resume.clone(),
                    reason: e.source.to_string(),
                }
            }
        };

        println!("Review and submit the application in the browser.");
        self.options.pacing.review.sleep().await;
        Ok(outcome)
    }

    async fn attach(&self, resume: &std::path::Path) -> Result<(), AttachmentError> {
        self.browser
            .attach_file(&self.options.upload_input, resume)
            .await
            .map_err(|source| AttachmentError {
                path: resume.to_path_buf(),
                source,
            })
    }

    /// Mouse move, pause and a small scroll before touching the page
    async fn humanize(&self) -> Result<(), BrowserError> {
        let (x, y, dy) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(100..900),
                rng.gen_range(100..600),
                rng.gen_range(200..700),
            )
        };
        tolerate(self.browser.move_mouse(x, y).await, "Moving the mouse")?;
        self.options.pacing.settle.sleep().await;
        tolerate(self.browser.scroll_by(dy).await, "Scrolling")?;
        Ok(())
    }

    async fn report_documents(
        &mut self,
        job: &JobSummary,
        known: Option<&[DocumentType]>,
    ) -> Result<(), BrowserError> {
        let mut captured = None;
        if let Some(interceptor) = self.interceptor.as_mut() {
            tolerate(
                self.browser.flush_responses().await,
                "Collecting page responses",
            )?;
            captured = documents_in(&interceptor.drain(), &job.id);
        }

        println!("{}", report::format_documents(captured.as_deref().or(known)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::RawNetworkEvent;
    use crate::browser::mock::MockBrowser;
    use crate::filter::{UrlFilter, UrlFilterConfig, default_endpoint_patterns};
    use crate::resume::ResumeGenerationError;
    use crate::utils::{Jitter, StopHandle, stop_signal};
    use std::sync::Mutex;

    const BASE: &str = "https://app.joinhandshake.com";
    const JOB_PAGE: &str = r#"
        <html><body>
          <h1>Platform Intern</h1>
          <a href="/stu/employers/55">Globex</a>
          <div data-testid="job-description"><p>Ship services.</p><p>Own on-call.</p></div>
          <button>Apply</button>
        </body></html>
    "#;

    #[derive(Default)]
    struct FakeGenerator {
        fail: bool,
        stop_on_request: Option<StopHandle>,
        requests: Mutex<Vec<ResumeRequest>>,
    }

    impl ResumeGenerator for FakeGenerator {
        async fn request_resume(
            &self,
            request: &ResumeRequest,
        ) -> Result<PathBuf, ResumeGenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(handle) = &self.stop_on_request {
                handle.stop();
            }
            if self.fail {
                Err(ResumeGenerationError::NonZeroExit { code: Some(1) })
            } else {
                Ok(PathBuf::from("/tmp/resume.docx"))
            }
        }
    }

    fn options() -> DriverOptions {
        let mut options = DriverOptions::new(Url::parse(BASE).unwrap(), PathBuf::from("/tmp/out"));
        options.pacing = Pacing::immediate();
        options
    }

    fn job_url(id: &str) -> String {
        format!("{BASE}/stu/jobs/{id}")
    }

    fn ready_browser(id: &str) -> MockBrowser {
        MockBrowser::new()
            .with_page(&job_url(id), JOB_PAGE)
            .with_element(&ElementQuery::xpath(APPLY_BUTTON_XPATH))
            .with_element(&ElementQuery::css(UPLOAD_INPUT_CSS))
    }

    #[tokio::test]
    async fn test_attaches_generated_resume() {
        let browser = ready_browser("7");
        let generator = FakeGenerator::default();
        let mut driver = ApplicationDriver::new(&browser, &generator, options());

        let outcome = driver.apply_to(&JobSummary::from_id("7"), None).await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Attached {
                resume: PathBuf::from("/tmp/resume.docx")
            }
        );
        assert_eq!(browser.attached(), vec![PathBuf::from("/tmp/resume.docx")]);

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].job_title, "Platform Intern");
        assert_eq!(requests[0].company_name, "Globex");
        assert_eq!(requests[0].job_description, "Ship services.\n\nOwn on-call.");
        assert!(requests[0].output_path.starts_with("/tmp/out"));
    }

    #[tokio::test]
    async fn test_feed_data_wins_over_page() {
        let browser = ready_browser("7");
        let generator = FakeGenerator::default();
        let mut driver = ApplicationDriver::new(&browser, &generator, options());

        let mut job = JobSummary::from_id("7");
        job.title = "Backend Intern".to_string();
        job.description = "<p>From the feed</p>".to_string();
        driver.apply_to(&job, None).await.unwrap();

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].job_title, "Backend Intern");
        assert_eq!(requests[0].company_name, "Globex");
        assert_eq!(requests[0].job_description, "From the feed");
    }

    #[tokio::test]
    async fn test_skip_paths() {
        let generator = FakeGenerator::default();

        let empty = MockBrowser::new()
            .with_page(&job_url("1"), "<html><body><h1>Role</h1></body></html>")
            .with_element(&ElementQuery::xpath(APPLY_BUTTON_XPATH));
        let outcome = ApplicationDriver::new(&empty, &generator, options())
            .apply_to(&JobSummary::from_id("1"), None)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::EmptyDescription));
        assert!(empty.clicked().is_empty());

        let no_button = MockBrowser::new().with_page(&job_url("2"), JOB_PAGE);
        let outcome = ApplicationDriver::new(&no_button, &generator, options())
            .apply_to(&JobSummary::from_id("2"), None)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::NoApplyButton));

        let no_upload = MockBrowser::new()
            .with_page(&job_url("3"), JOB_PAGE)
            .with_element(&ElementQuery::xpath(APPLY_BUTTON_XPATH));
        let outcome = ApplicationDriver::new(&no_upload, &generator, options())
            .apply_to(&JobSummary::from_id("3"), None)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::NoUploadControl));

        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_failure_skips_without_upload() {
        let browser = ready_browser("4");
        let generator = FakeGenerator {
            fail: true,
            ..FakeGenerator::default()
        };
        let outcome = ApplicationDriver::new(&browser, &generator, options())
            .apply_to(&JobSummary::from_id("4"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Skipped(SkipReason::ResumeFailed(_))));
        assert!(browser.attached().is_empty());
    }

    #[tokio::test]
    async fn test_attach_failure_is_partial() {
        let browser = ready_browser("5").failing_attach();
        let generator = FakeGenerator::default();
        let outcome = ApplicationDriver::new(&browser, &generator, options())
            .apply_to(&JobSummary::from_id("5"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::PartiallyApplied { .. }));
    }

    #[tokio::test]
    async fn test_run_skips_bad_jobs_and_stops_on_session_loss() {
        let browser = ready_browser("2").failing_goto(&job_url("1"));
        let generator = FakeGenerator::default();
        let jobs = vec![JobSummary::from_id("1"), JobSummary::from_id("2")];

        let summary = ApplicationDriver::new(&browser, &generator, options())
            .run(&jobs, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                total: 2,
                attached: 1,
                partially_applied: 0,
                skipped: 1,
                interrupted: false
            }
        );

        let closing = ready_browser("2").losing_session_at(&job_url("1"));
        let err = ApplicationDriver::new(&closing, &generator, options())
            .run(&jobs, &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is_session_lost());
        assert!(closing.attached().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_run_during_review_pause() {
        let browser = ready_browser("1").with_page(&job_url("2"), JOB_PAGE);
        let (handle, stop) = stop_signal();
        let generator = FakeGenerator {
            stop_on_request: Some(handle),
            ..FakeGenerator::default()
        };
        let mut options = options();
        options.pacing.review = Jitter::new(30_000, 30_000);
        let jobs = vec![JobSummary::from_id("1"), JobSummary::from_id("2")];

        let mut driver = ApplicationDriver::new(&browser, &generator, options).with_stop(stop);
        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            driver.run(&jobs, &HashMap::new()),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.total, 0);
        assert_eq!(browser.attached().len(), 1);
        assert_eq!(generator.requests.lock().unwrap().len(), 1);
        assert!(!browser.visited().contains(&job_url("2")));
    }

    #[tokio::test]
    async fn test_detail_documents_drained_from_job_page() {
        let browser = ready_browser("8");
        let mut interceptor = NetworkInterceptor::new(
            UrlFilter::new(&UrlFilterConfig::including(&default_endpoint_patterns())).unwrap(),
        );
        interceptor.install(&browser).await.unwrap();
        browser.queue_responses(vec![RawNetworkEvent::text(
            &format!("{BASE}/hs/graphql"),
            r#"{"data":{"job":{"id":"8","requiredDocumentTypes":[{"id":"1","name":"Resume"}]}}}"#,
        )]);

        let generator = FakeGenerator::default();
        let outcome = ApplicationDriver::new(&browser, &generator, options())
            .with_interceptor(&mut interceptor)
            .apply_to(&JobSummary::from_id("8"), None)
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Attached { .. }));
        assert_eq!(interceptor.drained(), 1);
    }

    #[test]
    fn test_documents_in() {
        let payloads = vec![
            r#"{"data":{"job":{"id":"8"}}}"#.to_string(),
            r#"{"data":{"job":{"id":"9","requiredDocumentTypes":[]}}}"#.to_string(),
        ];
        assert_eq!(documents_in(&payloads, "9"), Some(Vec::new()));
        assert_eq!(documents_in(&payloads, "8"), None);
        assert_eq!(documents_in(&payloads, "10"), None);
    }
}
