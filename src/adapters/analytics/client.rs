//! HTTP client for the analytics export and engage APIs
//!
//! Date-range units go to the raw export endpoint, which streams one JSON
//! event per line. Page units go to the engage endpoint, which returns one
//! page of profiles plus the pagination metadata the planner needs.
//!
//! Throttling, server errors and timeouts are retried here with exponential
//! backoff and jitter. Whatever is still failing after the last attempt is
//! returned to the engine as a classified [`SourceError`].

use super::models::EngageResponse;
use super::traits::{FetchClient, FetchedPage, PageInfo};
use crate::config::schema::{RetryConfig, SourceConfig};
use crate::domain::{
    DateRange, PageIndex, QuarryError, RawRecord, Result, SourceError, SourceQuery,
    UnitDescriptor,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Longest error body kept in a [`SourceError`] message
const MAX_ERROR_BODY: usize = 512;

/// Analytics API client
///
/// # Example
///
/// ```no_run
/// use quarry::adapters::analytics::{AnalyticsClient, FetchClient};
/// use quarry::config::schema::SourceConfig;
/// use quarry::domain::{PageIndex, SourceQuery, UnitDescriptor};
///
/// # async fn example(config: SourceConfig) -> quarry::domain::Result<()> {
/// let client = AnalyticsClient::new(config)?;
/// let first = client
///     .fetch(&SourceQuery::default(), &UnitDescriptor::Page(PageIndex { page: 0 }), None)
///     .await?;
/// println!("{} profiles in total", first.pagination.map_or(0, |p| p.total));
/// # Ok(())
/// # }
/// ```
pub struct AnalyticsClient {
    client: Client,
    config: SourceConfig,
    auth_header: String,
    export_endpoint: Url,
    engage_endpoint: Url,
}

impl AnalyticsClient {
    /// # Errors
    ///
    /// Returns [`QuarryError::Configuration`] if a base URL is malformed or the
    /// HTTP client can't be built.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let export_endpoint = endpoint(&config.export_url, "api/2.0/export")?;
        let engage_endpoint = endpoint(&config.base_url, "api/2.0/engage")?;

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            tracing::warn!("TLS certificate verification is disabled for the analytics API");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            QuarryError::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        let auth_header = {
            use secrecy::ExposeSecret;
            basic_auth(&config.username, config.secret.expose_secret().as_ref())
        };

        Ok(Self {
            client,
            config,
            auth_header,
            export_endpoint,
            engage_endpoint,
        })
    }

    async fn fetch_events(
        &self,
        query: &SourceQuery,
        range: &DateRange,
    ) -> std::result::Result<FetchedPage, SourceError> {
        let params = export_params(&self.config.project_id, query, range);

        let body = self
            .with_retry(&format!("export {range}"), || async {
                let response = self
                    .client
                    .get(self.export_endpoint.clone())
                    .header(AUTHORIZATION, &self.auth_header)
                    .query(&params)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = check_status(response).await?;
                response.text().await.map_err(transport_error)
            })
            .await?;

        let records = parse_jsonl(&body)?;
        tracing::debug!(unit = %range, records = records.len(), "Fetched events");
        Ok(FetchedPage::new(records))
    }

    async fn fetch_profiles(
        &self,
        query: &SourceQuery,
        page: PageIndex,
        session_id: Option<&str>,
    ) -> std::result::Result<FetchedPage, SourceError> {
        let form = engage_form(&self.config.project_id, query, page, session_id);

        let response: EngageResponse = self
            .with_retry(&format!("engage {page}"), || async {
                let response = self
                    .client
                    .post(self.engage_endpoint.clone())
                    .header(AUTHORIZATION, &self.auth_header)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = check_status(response).await?;
                response
                    .json::<EngageResponse>()
                    .await
                    .map_err(|e| SourceError::InvalidResponse(e.to_string()))
            })
            .await?;

        if let Some(error) = response.error {
            return Err(SourceError::InvalidResponse(error));
        }

        let info = PageInfo {
            total: response.total,
            page_size: response.page_size,
            session_id: response.session_id,
        };
        let records: Vec<RawRecord> = response.results.into_iter().map(RawRecord).collect();
        tracing::debug!(
            unit = %page,
            records = records.len(),
            total = info.total,
            "Fetched profiles"
        );
        Ok(FetchedPage::new(records).with_pagination(info))
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts
    async fn with_retry<F, Fut, T>(
        &self,
        what: &str,
        operation: F,
    ) -> std::result::Result<T, SourceError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, SourceError>>,
    {
        let max_attempts = self.config.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = retry_delay(&self.config.retry, attempt, &e);
                    crate::log_retry_attempt!(
                        what,
                        attempt,
                        max_attempts,
                        delay.as_millis() as u64,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FetchClient for AnalyticsClient {
    async fn fetch(
        &self,
        query: &SourceQuery,
        descriptor: &UnitDescriptor,
        continuation: Option<&str>,
    ) -> std::result::Result<FetchedPage, SourceError> {
        match descriptor {
            UnitDescriptor::Range(range) => self.fetch_events(query, range).await,
            UnitDescriptor::Page(page) => self.fetch_profiles(query, *page, continuation).await,
        }
    }
}

/// `path` resolved under `base`, keeping any path prefix `base` already has
fn endpoint(base: &str, path: &str) -> Result<Url> {
    Url::parse(&format!("{}/", base.trim_end_matches('/')))
        .and_then(|base| base.join(path))
        .map_err(|e| QuarryError::Configuration(format!("Invalid API URL '{}': {}", base, e)))
}

fn basic_auth(username: &str, secret: &str) -> String {
    let credentials = format!("{username}:{secret}");
    format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()))
}

fn export_params(
    project_id: &str,
    query: &SourceQuery,
    range: &DateRange,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("from_date", range.from.format("%Y-%m-%d").to_string()),
        ("to_date", range.to.format("%Y-%m-%d").to_string()),
        ("project_id", project_id.to_string()),
    ];
    if !query.events.is_empty() {
        params.push(("event", Value::from(query.events.clone()).to_string()));
    }
    if let Some(ref where_clause) = query.where_clause {
        params.push(("where", where_clause.clone()));
    }
    params
}

fn engage_form(
    project_id: &str,
    query: &SourceQuery,
    page: PageIndex,
    session_id: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("project_id", project_id.to_string()),
        ("page", page.page.to_string()),
    ];
    if let Some(session_id) = session_id {
        form.push(("session_id", session_id.to_string()));
    }
    if let Some(ref where_clause) = query.where_clause {
        form.push(("where", where_clause.clone()));
    }
    form
}

/// Pass successful responses through, classify the rest
async fn check_status(response: Response) -> std::result::Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_secs(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, retry_after, &body))
}

fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> SourceError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Unauthorized(format!("{status}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
            retry_after_secs: retry_after,
        },
        s if s.is_server_error() => SourceError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => SourceError::ClientError {
            status: s.as_u16(),
            message,
        },
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(e.to_string())
    } else if e.is_decode() {
        SourceError::InvalidResponse(e.to_string())
    } else {
        SourceError::ConnectionFailed(e.to_string())
    }
}

/// Backoff for the given (1-based) failed attempt
///
/// A `Retry-After` from the server wins over the computed backoff. Both are
/// capped at `max_delay_ms`.
fn retry_delay(retry: &RetryConfig, attempt: usize, error: &SourceError) -> Duration {
    if let SourceError::RateLimited {
        retry_after_secs: Some(secs),
    } = error
    {
        return Duration::from_millis(secs.saturating_mul(1000).min(retry.max_delay_ms));
    }

    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let base = (retry.initial_delay_ms as f64 * retry.backoff_multiplier.powi(exponent))
        .min(retry.max_delay_ms as f64) as u64;
    let jitter = if base > 0 {
        rand::thread_rng().gen_range(0..=base / 4)
    } else {
        0
    };
    Duration::from_millis((base + jitter).min(retry.max_delay_ms))
}

/// One event per non-empty line
fn parse_jsonl(body: &str) -> std::result::Result<Vec<RawRecord>, SourceError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Value>(line)
                .map(RawRecord)
                .map_err(|e| SourceError::InvalidResponse(format!("line {}: {}", n + 1, e)))
        })
        .collect()
}
