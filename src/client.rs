//! Rate-limited MediaWiki Action API client.
//!
//! Every outbound request in the process goes through one [`ApiClient`]: a
//! semaphore caps in-flight requests at the shared worker budget, transient
//! failures (HTTP 429/5xx, transport errors) are retried with exponential
//! backoff, and API `continue` tokens are followed via [`Paginated`], which
//! hands the caller one response page per pull so downstream work can start
//! before enumeration finishes.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config;

/// Classified outcome of a failed fetch. Both variants are local to one unit
/// of work: callers log and skip, the run continues.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network trouble or an overloaded server; already retried up to the
    /// attempt ceiling before being surfaced.
    #[error("transient fetch failure after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },

    /// The request itself is bad (4xx, malformed body, API error envelope);
    /// retrying would not help.
    #[error("permanent fetch failure: {reason}")]
    Permanent { reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    fn permanent(reason: impl Into<String>) -> Self {
        FetchError::Permanent {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint template with a `{lang}` placeholder
    pub api_template: String,
    pub user_agent: String,
    /// Process-wide in-flight request ceiling
    pub max_workers: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Applied between successive pages of one paginated query
    pub courtesy_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_template: config::DEFAULT_API_TEMPLATE.to_string(),
            user_agent: config::DEFAULT_USER_AGENT.to_string(),
            max_workers: config::DEFAULT_MAX_WORKERS,
            max_attempts: config::MAX_FETCH_ATTEMPTS,
            backoff_base: Duration::from_millis(config::BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(config::BACKOFF_CAP_MS),
            courtesy_delay: Duration::from_millis(config::COURTESY_DELAY_MS),
            request_timeout: Duration::from_secs(config::REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Request counters, readable while the run is in progress
#[derive(Default)]
pub struct ClientStats {
    requests: AtomicU64,
    retries: AtomicU64,
    in_flight: AtomicUsize,
    in_flight_peak: AtomicUsize,
}

impl ClientStats {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn in_flight_peak(&self) -> usize {
        self.in_flight_peak.load(Ordering::Relaxed)
    }
}

/// Decrements the in-flight gauge on every exit path
struct InFlightGuard<'a>(&'a ClientStats);

impl<'a> InFlightGuard<'a> {
    fn enter(stats: &'a ClientStats) -> Self {
        let current = stats.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        stats.in_flight_peak.fetch_max(current, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// One successfully decoded API response page
#[derive(Debug)]
pub struct ApiPage {
    /// Contents of the `query` object (Null when the API returned none)
    pub query: Value,
    /// The `continue` map to merge into the follow-up request, if any
    pub cont: Option<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    #[serde(default, rename = "continue")]
    cont: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: String,
    info: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    config: ClientConfig,
    stats: ClientStats,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.max_workers)),
            config,
            stats: ClientStats::default(),
        })
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, lang: &str) -> String {
        self.config.api_template.replace("{lang}", lang)
    }

    /// Issues one API query under the shared concurrency budget. Retries
    /// 429/5xx and transport failures with exponential backoff; everything
    /// else surfaces immediately as a permanent failure.
    pub async fn get(&self, lang: &str, params: &[(&str, String)]) -> Result<ApiPage, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("request semaphore never closed");
        let _gauge = InFlightGuard::enter(&self.stats);

        let url = self.endpoint(lang);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.stats.requests.fetch_add(1, Ordering::Relaxed);

            let retryable_reason = match self
                .http
                .get(&url)
                .query(params)
                .query(&[("format", "json")])
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return decode_envelope(resp).await;
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        format!("HTTP {status}")
                    } else {
                        return Err(FetchError::permanent(format!("HTTP {status} for {url}")));
                    }
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.config.max_attempts {
                return Err(FetchError::Transient {
                    attempts: attempt,
                    reason: retryable_reason,
                });
            }

            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            let delay = backoff_delay(self.config.backoff_base, self.config.backoff_cap, attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %retryable_reason,
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Starts a pull-based page sequence over `params`. Each call to
    /// [`Paginated::next_page`] performs exactly one fetch and merges the
    /// API's `continue` map into the follow-up request.
    pub fn paginate(&self, lang: &str, params: &[(&str, String)]) -> Paginated<'_> {
        Paginated {
            client: self,
            lang: lang.to_string(),
            base_params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            cont: None,
            started: false,
            done: false,
        }
    }
}

async fn decode_envelope(resp: reqwest::Response) -> Result<ApiPage, FetchError> {
    let envelope: ApiEnvelope = resp
        .json()
        .await
        .map_err(|e| FetchError::permanent(format!("malformed response: {e}")))?;

    if let Some(err) = envelope.error {
        return Err(FetchError::permanent(format!(
            "API error {}: {}",
            err.code, err.info
        )));
    }

    Ok(ApiPage {
        query: envelope.query.unwrap_or(Value::Null),
        cont: envelope.cont,
    })
}

/// Lazily pulled sequence of response pages for one continued query
pub struct Paginated<'a> {
    client: &'a ApiClient,
    lang: String,
    base_params: Vec<(String, String)>,
    cont: Option<BTreeMap<String, Value>>,
    started: bool,
    done: bool,
}

impl Paginated<'_> {
    /// Fetches the next page, or `None` once the continuation is exhausted.
    /// The courtesy delay applies between pages, never before the first.
    pub async fn next_page(&mut self) -> Result<Option<Value>, FetchError> {
        if self.done {
            return Ok(None);
        }
        if self.started {
            tokio::time::sleep(self.client.config.courtesy_delay).await;
        }

        let mut params: Vec<(&str, String)> = self
            .base_params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        if let Some(cont) = &self.cont {
            for (k, v) in cont {
                params.push((k.as_str(), continuation_param(v)));
            }
        }

        let page = self.client.get(&self.lang, &params).await?;
        self.started = true;
        match page.cont {
            Some(c) if !c.is_empty() => self.cont = Some(c),
            _ => self.done = true,
        }
        Ok(Some(page.query))
    }
}

/// Continuation values arrive as strings or numbers; both go back verbatim
fn continuation_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << (attempt - 1).min(16);
    (base * factor).min(cap)
}
