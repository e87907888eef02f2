//! Job feed extraction.
//!
//! Every strategy implements [`JobFeed`] and produces the same thing: jobs in
//! extraction order, deduplicated by id (first seen wins), plus a total count.

pub mod active;
pub mod dom;
pub mod passive;

use crate::browser::BrowserError;
use crate::decoder::DecodeError;
use crate::normalize;
use crate::results::{DocumentType, JobDetail, JobSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("job feed rejected the session (HTTP {0}); sign in again")]
    Unauthorized(u16),

    #[error("job feed request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("job feed returned GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("malformed job feed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("invalid job feed URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Which extraction strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStrategy {
    /// Send the paginated GraphQL query ourselves
    Active,
    /// Scroll the feed and read the GraphQL responses the page fetches
    #[default]
    Passive,
    /// Scroll the feed and scrape job links from the DOM
    Dom,
}

/// Cursor pagination state of one feed page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// One `jobSearch` page
#[derive(Debug, Clone)]
pub struct JobSearchPage {
    pub total_count: Option<u64>,
    pub edges: Vec<Value>,
    pub page_info: PageCursor,
}

/// A decoded GraphQL response that carries a `data` object
#[derive(Debug, Clone)]
pub struct GraphQlEnvelope {
    pub data: Map<String, Value>,
    pub errors: Option<Vec<Value>>,
}

impl GraphQlEnvelope {
    pub fn from_value(value: &Value) -> Option<Self> {
        let data = value.get("data")?.as_object()?.clone();
        let errors = value.get("errors").and_then(Value::as_array).cloned();
        Some(Self { data, errors })
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::from_value(&serde_json::from_str(text).ok()?)
    }

    /// The `data.jobSearch` page, when present with an `edges` array
    pub fn job_search(&self) -> Option<JobSearchPage> {
        let search = self.data.get("jobSearch")?;
        let edges = search.get("edges")?.as_array()?.clone();
        let page_info = search
            .get("pageInfo")
            .cloned()
            .and_then(|info| serde_json::from_value(info).ok())
            .unwrap_or_default();

        Some(JobSearchPage {
            total_count: search.get("totalCount").and_then(Value::as_u64),
            edges,
            page_info,
        })
    }

    /// The `data.job` detail object, when present
    pub fn job_detail(&self) -> Option<&Value> {
        self.data.get("job").filter(|job| job.is_object())
    }

    pub fn error_messages(&self) -> Vec<String> {
        error_messages(self.errors.as_deref().unwrap_or_default())
    }
}

fn error_messages(errors: &[Value]) -> Vec<String> {
    errors
        .iter()
        .map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
        .collect()
}

/// All envelopes in a response body; batched responses arrive as a JSON array
pub fn envelopes(value: &Value) -> Vec<GraphQlEnvelope> {
    match value {
        Value::Array(items) => items.iter().filter_map(GraphQlEnvelope::from_value).collect(),
        other => GraphQlEnvelope::from_value(other).into_iter().collect(),
    }
}

/// Jobs accumulated during one scrape session
#[derive(Debug, Default)]
pub struct JobCollection {
    jobs: Vec<JobSummary>,
    seen: HashSet<String>,
    total_count: Option<u64>,
    duplicates: usize,
    documents: HashMap<String, Vec<DocumentType>>,
}

impl JobCollection {
    /// Add a job unless its id was already seen; returns whether it was added
    pub fn push(&mut self, job: JobSummary) -> bool {
        if self.seen.insert(job.id.clone()) {
            self.jobs.push(job);
            true
        } else {
            self.duplicates += 1;
            ::log::debug!("Duplicate job {} ignored", job.id);
            false
        }
    }

    /// Normalize and add every edge of a page; returns how many were new
    pub fn absorb_page(&mut self, page: &JobSearchPage) -> usize {
        if page.total_count.is_some() {
            self.total_count = page.total_count;
        }
        page.edges
            .iter()
            .filter_map(normalize::normalize_edge)
            .map(|job| self.push(job))
            .filter(|added| *added)
            .count()
    }

    /// Record the required documents from a `data.job` payload
    pub fn absorb_detail(&mut self, job: &Value) {
        if let Some((id, Some(documents))) = normalize::normalize_detail(job) {
            ::log::debug!("Job {} requires {} documents", id, documents.len());
            self.documents.insert(id, documents);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_outcome(self) -> FeedOutcome {
        if self.jobs.is_empty() {
            return FeedOutcome::NoJobsFound;
        }

        let unique = self.jobs.len() as u64;
        let total_count = match self.total_count {
            Some(reported) => {
                if reported != unique {
                    ::log::info!(
                        "Feed reports {} jobs, collected {} unique ({} duplicates dropped)",
                        reported,
                        unique,
                        self.duplicates
                    );
                }
                reported
            }
            None => unique,
        };

        FeedOutcome::Jobs(JobFeedResult {
            jobs: self.jobs,
            total_count,
            documents: self.documents,
        })
    }
}

/// Successful extraction
#[derive(Debug, Clone)]
pub struct JobFeedResult {
    pub jobs: Vec<JobSummary>,
    /// `totalCount` reported by the feed, or the number of unique jobs when it never said
    pub total_count: u64,
    /// Required documents by job id, for the jobs whose detail payload was seen
    pub documents: HashMap<String, Vec<DocumentType>>,
}

impl JobFeedResult {
    pub fn documents_for(&self, id: &str) -> Option<&[DocumentType]> {
        self.documents.get(id).map(Vec::as_slice)
    }

    /// Every job joined with whatever detail payload was captured for it
    pub fn details(&self) -> Vec<JobDetail> {
        self.jobs
            .iter()
            .map(|job| JobDetail {
                summary: job.clone(),
                required_document_types: self.documents.get(&job.id).cloned(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum FeedOutcome {
    Jobs(JobFeedResult),
    /// The feed was reachable but yielded nothing
    NoJobsFound,
}

impl FeedOutcome {
    pub fn jobs(&self) -> &[JobSummary] {
        match self {
            FeedOutcome::Jobs(result) => &result.jobs,
            FeedOutcome::NoJobsFound => &[],
        }
    }

    pub fn total_count(&self) -> u64 {
        match self {
            FeedOutcome::Jobs(result) => result.total_count,
            FeedOutcome::NoJobsFound => 0,
        }
    }
}

/// A way of turning the job feed into [`JobSummary`] records
#[allow(async_fn_in_trait)]
pub trait JobFeed {
    fn name(&self) -> &'static str;

    async fn extract(&mut self) -> Result<FeedOutcome, FeedError>;
}

/// URL of a job page, e.g. `https://app.joinhandshake.com/stu/jobs/123`
pub fn job_url(base: &Url, job_path: &str, id: &str) -> Result<Url, url::ParseError> {
    base.join(&format!("{}{}", job_path, id))
}
