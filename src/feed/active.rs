use super::{FeedError, FeedOutcome, GraphQlEnvelope, JobCollection, JobFeed};
use crate::browser::Browser;
use crate::decoder;
use crate::parsers::html;
use crate::utils::Jitter;
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

pub const JOB_SEARCH_QUERY: &str = include_str!("job_search.graphql");
pub const JOB_SEARCH_OPERATION: &str = "JobSearchQuery";

/// Status, declared encoding and undecoded body of one GraphQL response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

/// Sends one GraphQL request body and hands back the raw response
#[allow(async_fn_in_trait)]
pub trait GraphqlTransport {
    async fn post(&self, body: &Value) -> Result<RawResponse, FeedError>;
}

/// Talks to the GraphQL endpoint directly, authenticated with the browser's cookies.
///
/// Decompression is left to [`decoder`], so the client is built without it.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    cookie: String,
    csrf_token: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: Url,
        cookie: String,
        csrf_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            cookie,
            csrf_token,
        })
    }

    /// Reuse the session of the page the browser is showing
    pub async fn from_browser<B: Browser>(
        browser: &B,
        endpoint: Url,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let cookie = browser.cookie_header().await?;
        let csrf_token = html::csrf_token(&browser.source().await?);
        if csrf_token.is_none() {
            ::log::warn!("No CSRF token on the feed page; the endpoint may reject the query");
        }
        Self::new(endpoint, cookie, csrf_token, timeout)
    }
}

impl GraphqlTransport for HttpTransport {
    async fn post(&self, body: &Value) -> Result<RawResponse, FeedError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_ENCODING, "gzip, deflate, br")
            .header(header::COOKIE, &self.cookie)
            .header(header::ORIGIN, self.endpoint.origin().ascii_serialization())
            .json(body);
        if let Some(token) = &self.csrf_token {
            request = request.header("X-CSRF-Token", token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        ::log::debug!(
            "POST {} -> {} ({} bytes, encoding {:?})",
            self.endpoint,
            status,
            body.len(),
            content_encoding
        );
        Ok(RawResponse {
            status,
            content_encoding,
            body,
        })
    }
}

/// Search filter and sort sent with every page request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Passed through verbatim as `input.filter`
    #[serde(default = "default_filter")]
    pub filter: Value,

    #[serde(default = "default_sort_field")]
    pub sort_field: String,

    #[serde(default = "default_sort_direction")]
    pub sort_direction: String,
}

pub(crate) fn default_page_size() -> u32 {
    25
}

pub(crate) fn default_max_pages() -> usize {
    40
}

fn default_filter() -> Value {
    json!({})
}

fn default_sort_field() -> String {
    "RELEVANCE".to_string()
}

fn default_sort_direction() -> String {
    "DESC".to_string()
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            filter: default_filter(),
            sort_field: default_sort_field(),
            sort_direction: default_sort_direction(),
        }
    }
}

/// Pages through `jobSearch` with its own GraphQL requests
pub struct ActiveQueryFeed<T> {
    transport: T,
    options: SearchOptions,
    query: String,
    pause: Jitter,
}

impl<T: GraphqlTransport> ActiveQueryFeed<T> {
    pub fn new(transport: T, options: SearchOptions) -> Self {
        Self {
            transport,
            options,
            query: JOB_SEARCH_QUERY.to_string(),
            pause: Jitter::none(),
        }
    }

    /// Replace the bundled query document
    pub fn with_query(mut self, query: String) -> Self {
        self.query = query;
        self
    }

    /// Pause between page requests
    pub fn with_pause(mut self, pause: Jitter) -> Self {
        self.pause = pause;
        self
    }

    pub fn request_body(&self, after: Option<&str>) -> Value {
        json!({
            "operationName": JOB_SEARCH_OPERATION,
            "query": self.query,
            "variables": {
                "first": self.options.page_size,
                "after": after,
                "input": {
                    "filter": self.options.filter,
                    "sort": {
                        "direction": self.options.sort_direction,
                        "field": self.options.sort_field,
                    }
                }
            }
        })
    }

    async fn fetch_page(&self, after: Option<&str>) -> Result<GraphQlEnvelope, FeedError> {
        let raw = self.transport.post(&self.request_body(after)).await?;
        if matches!(raw.status, 401 | 403) {
            return Err(FeedError::Unauthorized(raw.status));
        }

        let text = decoder::decode_with_header(&raw.body, raw.content_encoding.as_deref())?;
        if !(200..300).contains(&raw.status) {
            return Err(FeedError::Http {
                status: raw.status,
                body: text.chars().take(200).collect(),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        match GraphQlEnvelope::from_value(&value) {
            Some(envelope) => Ok(envelope),
            None => {
                let errors = value
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|e| super::error_messages(e))
                    .unwrap_or_default();
                if errors.is_empty() {
                    Err(FeedError::GraphQl(vec![
                        "response carried neither data nor errors".to_string(),
                    ]))
                } else {
                    Err(FeedError::GraphQl(errors))
                }
            }
        }
    }
}

impl<T: GraphqlTransport> JobFeed for ActiveQueryFeed<T> {
    fn name(&self) -> &'static str {
        "active"
    }

    async fn extract(&mut self) -> Result<FeedOutcome, FeedError> {
        let mut collection = JobCollection::default();
        let mut after: Option<String> = None;

        for page_number in 1..=self.options.max_pages {
            let envelope = self.fetch_page(after.as_deref()).await?;
            let errors = envelope.error_messages();

            let Some(page) = envelope.job_search() else {
                if !errors.is_empty() {
                    return Err(FeedError::GraphQl(errors));
                }
                ::log::warn!("Page {} carried no jobSearch data, stopping", page_number);
                return Ok(collection.into_outcome());
            };
            if !errors.is_empty() {
                ::log::warn!("Page {} has partial errors: {}", page_number, errors.join("; "));
            }

            let added = collection.absorb_page(&page);
            println!(
                "Page {}: {} jobs ({} new), {} collected",
                page_number,
                page.edges.len(),
                added,
                collection.len()
            );

            if !page.page_info.has_next_page {
                return Ok(collection.into_outcome());
            }
            match page.page_info.end_cursor {
                Some(cursor) => after = Some(cursor),
                None => {
                    ::log::warn!("Page {} has more results but no cursor, stopping", page_number);
                    return Ok(collection.into_outcome());
                }
            }

            self.pause.sleep().await;
        }

        ::log::warn!(
            "Stopped after {} pages with more results available",
            self.options.max_pages
        );
        Ok(collection.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;

    /// Replies with queued responses and records every request body
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<RawResponse>>,
        requests: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn reply(self, status: u16, body: &Value) -> Self {
            self.replies.lock().unwrap().push_back(RawResponse {
                status,
                content_encoding: None,
                body: body.to_string().into_bytes(),
            });
            self
        }

        fn reply_raw(self, raw: RawResponse) -> Self {
            self.replies.lock().unwrap().push_back(raw);
            self
        }

        fn requests(&self) -> Vec<Value> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl GraphqlTransport for &ScriptedTransport {
        async fn post(&self, body: &Value) -> Result<RawResponse, FeedError> {
            self.requests.lock().unwrap().push(body.clone());
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra request"))
        }
    }

    fn page(ids: std::ops::Range<usize>, total: usize, cursor: Option<&str>) -> Value {
        let edges: Vec<Value> = ids
            .map(|i| {
                json!({ "node": { "id": format!("n{i}"), "job": {
                    "id": format!("job-{i}"),
                    "title": format!("Engineer {i}"),
                    "employer": { "id": 7, "name": "Acme" },
                    "description": "<p>Build things</p>"
                } } })
            })
            .collect();
        json!({
            "data": { "jobSearch": {
                "totalCount": total,
                "edges": edges,
                "pageInfo": { "hasNextPage": cursor.is_some(), "endCursor": cursor }
            } }
        })
    }

    fn feed(transport: &ScriptedTransport) -> ActiveQueryFeed<&ScriptedTransport> {
        ActiveQueryFeed::new(transport, SearchOptions::default())
    }

    #[tokio::test]
    async fn test_two_pages_in_order() {
        let transport = ScriptedTransport::default()
            .reply(200, &page(0..25, 35, Some("cursor-25")))
            .reply(200, &page(25..35, 35, None));

        let outcome = feed(&transport).extract().await.unwrap();

        let FeedOutcome::Jobs(result) = outcome else {
            panic!("expected jobs");
        };
        assert_eq!(result.jobs.len(), 35);
        assert_eq!(result.total_count, 35);
        for (i, job) in result.jobs.iter().enumerate() {
            assert_eq!(job.id, format!("job-{i}"));
            assert_eq!(job.employer_name, "Acme");
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["operationName"], JOB_SEARCH_OPERATION);
        assert_eq!(requests[0]["variables"]["first"], 25);
        assert!(requests[0]["variables"]["after"].is_null());
        assert_eq!(requests[1]["variables"]["after"], "cursor-25");
        assert_eq!(requests[1]["variables"]["input"]["sort"]["field"], "RELEVANCE");
    }

    #[tokio::test]
    async fn test_overlapping_pages_are_deduplicated() {
        let transport = ScriptedTransport::default()
            .reply(200, &page(0..6, 8, Some("a")))
            .reply(200, &page(3..8, 8, None));

        let outcome = feed(&transport).extract().await.unwrap();
        assert_eq!(outcome.jobs().len(), 8);
        assert!(outcome.jobs().len() as u64 <= outcome.total_count());
    }

    #[tokio::test]
    async fn test_gzip_response_is_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(page(0..3, 3, None).to_string().as_bytes())
            .unwrap();
        let transport = ScriptedTransport::default().reply_raw(RawResponse {
            status: 200,
            content_encoding: Some("gzip".to_string()),
            body: encoder.finish().unwrap(),
        });

        let outcome = feed(&transport).extract().await.unwrap();
        assert_eq!(outcome.jobs().len(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let transport = ScriptedTransport::default().reply(401, &json!({ "error": "login" }));
        let err = feed(&transport).extract().await.unwrap_err();
        assert!(matches!(err, FeedError::Unauthorized(401)));
    }

    #[tokio::test]
    async fn test_server_error() {
        let transport = ScriptedTransport::default().reply(502, &json!("bad gateway"));
        let err = feed(&transport).extract().await.unwrap_err();
        assert!(matches!(err, FeedError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_graphql_errors_without_data() {
        let transport = ScriptedTransport::default().reply(
            200,
            &json!({ "errors": [{ "message": "Field 'jobSearch' doesn't exist" }] }),
        );
        let err = feed(&transport).extract().await.unwrap_err();
        match err {
            FeedError::GraphQl(messages) => {
                assert_eq!(messages, vec!["Field 'jobSearch' doesn't exist".to_string()])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_is_no_jobs_found() {
        let transport = ScriptedTransport::default().reply(200, &page(0..0, 0, None));
        let outcome = feed(&transport).extract().await.unwrap();
        assert!(matches!(outcome, FeedOutcome::NoJobsFound));
    }

    #[tokio::test]
    async fn test_missing_cursor_stops() {
        let mut claims_more = page(0..2, 10, None);
        claims_more["data"]["jobSearch"]["pageInfo"]["hasNextPage"] = json!(true);
        let transport = ScriptedTransport::default().reply(200, &claims_more);

        let outcome = feed(&transport).extract().await.unwrap();
        assert_eq!(outcome.jobs().len(), 2);
        assert_eq!(outcome.total_count(), 10);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_max_pages_bounds_the_loop() {
        let transport = ScriptedTransport::default()
            .reply(200, &page(0..2, 100, Some("a")))
            .reply(200, &page(2..4, 100, Some("b")));
        let options = SearchOptions {
            max_pages: 2,
            ..SearchOptions::default()
        };

        let outcome = ActiveQueryFeed::new(&transport, options)
            .extract()
            .await
            .unwrap();
        assert_eq!(outcome.jobs().len(), 4);
        assert_eq!(transport.requests().len(), 2);
    }
}
