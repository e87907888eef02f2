use crate::feed::FeedStrategy;
use crate::feed::active::SearchOptions;
use crate::feed::passive::ScrollOptions;
use crate::filter::{
    UrlFilter, UrlFilterConfig, default_endpoint_patterns, default_feed_patterns,
    default_login_patterns,
};
use crate::utils::Pacing;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing setting `{setting}` (set {env} or pass it on the command line)")]
    Missing {
        setting: &'static str,
        env: &'static str,
    },

    #[error("invalid setting `{setting}`: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },
}

/// What the configuration is about to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Scrape the feed and prepare applications
    Apply,
    /// Scrape the feed and print the jobs
    Scrape,
}

/// Everything a run needs, loaded from JSON and then overlaid by flags and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Authenticated job search page
    #[serde(default)]
    pub jobs_url: Option<String>,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),

    #[serde(default)]
    pub strategy: FeedStrategy,

    #[serde(default)]
    pub search: SearchOptions,

    #[serde(default)]
    pub scroll: ScrollOptions,

    /// Scrolls before reading links with the DOM strategy
    #[serde(default = "default_dom_scrolls")]
    pub dom_scrolls: usize,

    /// GraphQL endpoint path on the feed's origin
    #[serde(default = "default_graphql_path")]
    pub graphql_path: String,

    /// Replaces the bundled job search query document
    #[serde(default)]
    pub graphql_query_file: Option<PathBuf>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_login_filter")]
    pub login: UrlFilterConfig,

    #[serde(default = "default_feed_filter")]
    pub feed: UrlFilterConfig,

    /// Which captured responses count as GraphQL traffic
    #[serde(default = "default_endpoint_filter")]
    pub endpoint: UrlFilterConfig,

    /// Give up waiting for a manual login after this long; unset waits forever
    #[serde(default)]
    pub login_timeout_secs: Option<u64>,

    #[serde(default)]
    pub pacing: Pacing,

    /// Path prefix of job pages
    #[serde(default = "default_job_path")]
    pub job_path: String,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    #[serde(default = "default_python_executable")]
    pub python_executable: String,

    #[serde(default)]
    pub resume_script: Option<String>,

    /// Kill the resume generator and skip the job after this long
    #[serde(default = "default_resume_timeout_secs")]
    pub resume_timeout_secs: u64,

    #[serde(default = "default_resume_output_dir")]
    pub resume_output_dir: PathBuf,

    #[serde(default)]
    pub resume_working_dir: Option<PathBuf>,

    /// JSON Lines mirror of every captured payload
    #[serde(default)]
    pub capture_log: Option<PathBuf>,
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_window_size() -> (u32, u32) {
    (1400, 900)
}

fn default_dom_scrolls() -> usize {
    5
}

fn default_graphql_path() -> String {
    "/hs/graphql".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_login_filter() -> UrlFilterConfig {
    UrlFilterConfig::including(&default_login_patterns())
}

fn default_feed_filter() -> UrlFilterConfig {
    UrlFilterConfig::including(&default_feed_patterns())
}

fn default_endpoint_filter() -> UrlFilterConfig {
    UrlFilterConfig::including(&default_endpoint_patterns())
}

fn default_job_path() -> String {
    "/stu/jobs/".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    10
}

fn default_python_executable() -> String {
    "python".to_string()
}

fn default_resume_timeout_secs() -> u64 {
    180
}

fn default_resume_output_dir() -> PathBuf {
    PathBuf::from("../python-resume/generated")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jobs_url: None,
            webdriver_url: default_webdriver_url(),
            headless: false,
            window_size: default_window_size(),
            strategy: FeedStrategy::default(),
            search: SearchOptions::default(),
            scroll: ScrollOptions::default(),
            dom_scrolls: default_dom_scrolls(),
            graphql_path: default_graphql_path(),
            graphql_query_file: None,
            http_timeout_secs: default_http_timeout_secs(),
            login: default_login_filter(),
            feed: default_feed_filter(),
            endpoint: default_endpoint_filter(),
            login_timeout_secs: None,
            pacing: Pacing::default(),
            job_path: default_job_path(),
            upload_timeout_secs: default_upload_timeout_secs(),
            python_executable: default_python_executable(),
            resume_script: None,
            resume_timeout_secs: default_resume_timeout_secs(),
            resume_output_dir: default_resume_output_dir(),
            resume_working_dir: None,
            capture_log: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_error)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(io_error)?;

        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Fail before any browser work when a needed setting is missing or unusable
    pub fn validate_for(&self, mode: RunMode) -> Result<(), ConfigError> {
        self.jobs_url()?;

        if self.webdriver_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                setting: "webdriver_url",
                env: "WEBDRIVER_URL",
            });
        }

        for (setting, filter) in [
            ("login", &self.login),
            ("feed", &self.feed),
            ("endpoint", &self.endpoint),
        ] {
            UrlFilter::new(filter).map_err(|e| ConfigError::Invalid {
                setting,
                reason: e.to_string(),
            })?;
            if filter.include_patterns.is_empty() {
                return Err(ConfigError::Invalid {
                    setting,
                    reason: "at least one include pattern is required".to_string(),
                });
            }
        }

        if self.search.page_size == 0 {
            return Err(ConfigError::Invalid {
                setting: "search.page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.graphql_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                setting: "graphql_path",
                reason: format!("`{}` must start with /", self.graphql_path),
            });
        }

        if mode == RunMode::Apply {
            if self.python_executable.trim().is_empty() {
                return Err(ConfigError::Missing {
                    setting: "python_executable",
                    env: "PYTHON_EXECUTABLE",
                });
            }
            if self.resume_script().is_none() {
                return Err(ConfigError::Missing {
                    setting: "resume_script",
                    env: "PYTHON_RESUME_SCRIPT",
                });
            }
        }

        Ok(())
    }

    /// The feed URL, parsed
    pub fn jobs_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .jobs_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing {
                setting: "jobs_url",
                env: "HANDSHAKE_JOBS_URL",
            })?;
        Url::parse(raw).map_err(|e| ConfigError::Invalid {
            setting: "jobs_url",
            reason: format!("`{raw}`: {e}"),
        })
    }

    /// `<feed origin><graphql_path>`
    pub fn graphql_endpoint(&self) -> Result<Url, ConfigError> {
        self.jobs_url()?
            .join(&self.graphql_path)
            .map_err(|e| ConfigError::Invalid {
                setting: "graphql_path",
                reason: e.to_string(),
            })
    }

    pub fn resume_script(&self) -> Option<&str> {
        self.resume_script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Job search query document, from `graphql_query_file` when set
    pub fn graphql_query(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.graphql_query_file else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })
    }
}
