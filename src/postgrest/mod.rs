//! HTTP client for the remote roster store (PostgREST-style API).
//!
//! The remote store is the source of truth for the cutoff year onward.
//! Its query interface caps page size, so reads go through range-bounded
//! requests carrying a `Content-Range` total; `fetch_all` keeps requesting
//! until the cumulative count reaches that total, with a hard iteration cap
//! so a store that misreports its total fails loudly instead of looping.
//!
//! Writes are natural-key upserts: `Prefer: resolution=merge-duplicates`
//! with the key columns declared via `on_conflict`, so re-submitting an
//! unchanged row is a no-op.

pub mod rows;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("malformed Content-Range header: {0}")]
    ContentRange(String),

    #[error("pagination aborted after {requests} requests ({fetched}/{reported} rows)")]
    PaginationExceeded {
        requests: u32,
        fetched: usize,
        reported: u64,
    },

    #[error("invalid store URL: {0}")]
    BadUrl(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect(),
            StoreError::ApiError { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying transient failures (timeouts, connect errors,
/// 408/429/5xx) with exponential backoff. Validation-class statuses (other
/// 4xx) are returned to the caller on the first attempt.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, StoreError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(StoreError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(attempt, policy);
                    log::warn!(
                        "store retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy);
                    log::warn!(
                        "store retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(StoreError::Http(err));
            }
        }
    }

    unreachable!("retry loop always returns")
}

/// One page of a range-bounded read.
#[derive(Debug)]
pub struct Page<T> {
    pub rows: Vec<T>,
    /// Total row count reported by the store, when it sent one.
    pub total: Option<u64>,
}

/// Parse a `Content-Range` value of the form `0-99/1234`, `*/1234` or
/// `0-99/*` into the reported total.
fn parse_content_range_total(value: &str) -> Result<Option<u64>, StoreError> {
    let (_, total) = value
        .rsplit_once('/')
        .ok_or_else(|| StoreError::ContentRange(value.to_string()))?;
    if total == "*" {
        return Ok(None);
    }
    total
        .parse::<u64>()
        .map(Some)
        .map_err(|_| StoreError::ContentRange(value.to_string()))
}

/// Drive `fetch` with successive offsets until the cumulative row count
/// reaches the store's reported total — or, when the store reports no
/// total at all, until a short page proves the end of the set. A full
/// page is never taken as the last one. Exceeding `max_pages`, or an
/// empty page arriving before a reported total is reached, aborts with
/// `PaginationExceeded` rather than returning a silently truncated set.
async fn paginate<T, F, Fut>(
    page_size: u64,
    max_pages: u32,
    mut fetch: F,
) -> Result<Vec<T>, StoreError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>, StoreError>>,
{
    let mut all: Vec<T> = Vec::new();
    let mut requests: u32 = 0;

    loop {
        if requests >= max_pages {
            return Err(StoreError::PaginationExceeded {
                requests,
                fetched: all.len(),
                reported: 0,
            });
        }
        requests += 1;

        let page = fetch(all.len() as u64, page_size).await?;
        let got = page.rows.len();
        all.extend(page.rows);

        match page.total {
            Some(total) => {
                if (all.len() as u64) >= total {
                    return Ok(all);
                }
                if got == 0 {
                    // Store reported more rows than it will serve
                    return Err(StoreError::PaginationExceeded {
                        requests,
                        fetched: all.len(),
                        reported: total,
                    });
                }
            }
            None => {
                if (got as u64) < page_size {
                    return Ok(all);
                }
            }
        }
    }
}

pub struct StoreClient {
    base: Url,
    api_key: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    /// Rows requested per page. The server may cap lower; the loop adapts
    /// to whatever page size actually comes back.
    pub page_size: u64,
    /// Hard cap on page requests per `fetch_all` call.
    pub max_pages: u32,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let base = Url::parse(base_url).map_err(|e| StoreError::BadUrl(e.to_string()))?;
        Ok(Self {
            base,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
            page_size: 1000,
            max_pages: 200,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.base
            .join(table)
            .map_err(|e| StoreError::BadUrl(e.to_string()))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Fetch one range-bounded page of `table`, asking the store for an
    /// exact total count alongside the rows.
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
        offset: u64,
        limit: u64,
    ) -> Result<Page<T>, StoreError> {
        let request = self
            .authed(self.http.get(self.table_url(table)?))
            .query(query)
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{}", offset, offset + limit - 1))
            .header("Prefer", "count=exact");

        let resp = send_with_retry(request, &self.retry).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let total = match resp.headers().get(reqwest::header::CONTENT_RANGE) {
            Some(v) => parse_content_range_total(v.to_str().unwrap_or_default())?,
            None => None,
        };
        let rows: Vec<T> = resp.json().await?;
        Ok(Page { rows, total })
    }

    /// Retrieve every row of `table` matching `query`, in a stable order,
    /// by issuing successive range requests until the cumulative count
    /// reaches the store's reported total.
    ///
    /// Never assumes one response holds the full set.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, StoreError> {
        let mut ordered: Vec<(&str, &str)> = query.to_vec();
        if !ordered.iter().any(|(k, _)| *k == "order") {
            ordered.push(("order", "id"));
        }

        paginate(self.page_size, self.max_pages, |offset, limit| {
            let ordered = ordered.clone();
            async move { self.fetch_page(table, &ordered, offset, limit).await }
        })
        .await
    }

    /// Idempotent upsert keyed by the table's natural unique key.
    /// Re-submitting an unchanged row merges to a no-op; a changed row
    /// updates in place.
    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        payload: &T,
    ) -> Result<(), StoreError> {
        let request = self
            .authed(self.http.post(self.table_url(table)?))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(payload);

        let resp = send_with_retry(request, &self.retry).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
