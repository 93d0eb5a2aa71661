//! Page retrieval with retry, pacing and cancellation.
//!
//! A [`ScraperSession`] owns one HTTP client and one delay clock. Requests
//! made through the same session are serialized, so the minimum
//! inter-request delay holds between any two outbound requests, retries
//! included.

mod retry;

use std::time::Duration;

use housedb_core::AppConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Url};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use retry::{backoff_delay, looks_like_bot_challenge};
use retry::{is_retriable_status, is_transient};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts (last status {})", fmt_status(.last_status))]
    Exhausted {
        url: String,
        last_status: Option<u16>,
        attempts: u32,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value for header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },
}

#[allow(clippy::ref_option)]
fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// Client behaviour for one session. Header values are configuration, not
/// secrets.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    /// Retries after the first attempt; `retry_attempts + 1` requests at most.
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    pub inter_request_delay: Duration,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            backoff_base: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(60_000),
            inter_request_delay: Duration::from_millis(250),
            user_agent: housedb_core::config::DEFAULT_USER_AGENT.to_string(),
            accept: housedb_core::config::DEFAULT_ACCEPT.to_string(),
            accept_language: housedb_core::config::DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.scraper_request_timeout_secs),
            retry_attempts: config.scraper_retry_attempts,
            backoff_base: Duration::from_millis(config.scraper_retry_backoff_ms),
            max_backoff: Duration::from_millis(config.scraper_max_backoff_ms),
            inter_request_delay: Duration::from_millis(config.scraper_inter_request_delay_ms),
            user_agent: config.scraper_user_agent.clone(),
            accept: config.scraper_accept.clone(),
            accept_language: config.scraper_accept_language.clone(),
        }
    }
}

/// Result of one attempt that did not fail outright.
enum Attempt {
    Body(String),
    Retry {
        status: Option<u16>,
        reason: String,
    },
}

pub struct ScraperSession {
    client: Client,
    base_url: String,
    config: FetchConfig,
    /// When the previous request left. Held for the whole fetch, which is
    /// what serializes requests within the session.
    last_request: Mutex<Option<Instant>>,
}

impl ScraperSession {
    /// Build a session against `base_url` (scheme and host, no trailing
    /// slash needed).
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidUrl`] for a base that does not parse,
    /// [`FetchError::InvalidHeader`] for header values that cannot be sent,
    /// and [`FetchError::Http`] if the client cannot be constructed.
    pub fn new(base_url: &str, config: FetchConfig) -> Result<Self, FetchError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| FetchError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &config.user_agent)?);
        headers.insert(ACCEPT, header_value("Accept", &config.accept)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value("Accept-Language", &config.accept_language)?,
        );

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
            last_request: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a page body with the session's default headers.
    ///
    /// # Errors
    ///
    /// See [`ScraperSession::fetch_with_headers`].
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<String, FetchError> {
        self.fetch_with_headers(url, &HeaderMap::new(), cancel)
            .await
    }

    /// Fetch a page body, adding `headers` to the session defaults.
    ///
    /// 429, 5xx, transport failures and bot-challenge pages are retried
    /// with jittered exponential backoff.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Exhausted`]: every attempt hit a retriable failure.
    /// - [`FetchError::Status`]: any other non-success status (not retried).
    /// - [`FetchError::Cancelled`]: `cancel` fired during a delay or backoff.
    /// - [`FetchError::InvalidUrl`]: `url` does not parse.
    /// - [`FetchError::Http`]: a non-transient client failure.
    pub async fn fetch_with_headers(
        &self,
        url: &str,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut last_request = self.last_request.lock().await;
        let attempts = self.config.retry_attempts.saturating_add(1);
        let mut last_status = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay =
                    backoff_delay(attempt - 1, self.config.backoff_base, self.config.max_backoff);
                tracing::warn!(
                    url,
                    attempt,
                    retry_attempts = self.config.retry_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    status = ?last_status,
                    "transient fetch failure, retrying after backoff"
                );
                sleep_or_cancel(delay, cancel).await?;
            }

            if let Some(previous) = *last_request {
                let elapsed = previous.elapsed();
                if elapsed < self.config.inter_request_delay {
                    sleep_or_cancel(self.config.inter_request_delay - elapsed, cancel).await?;
                }
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            *last_request = Some(Instant::now());

            match self.attempt(&parsed, headers).await? {
                Attempt::Body(body) => {
                    tracing::debug!(url, attempt, bytes = body.len(), "fetched page");
                    return Ok(body);
                }
                Attempt::Retry { status, reason } => {
                    tracing::debug!(url, attempt, ?status, %reason, "attempt failed");
                    last_status = status;
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            last_status,
            attempts,
        })
    }

    async fn attempt(&self, url: &Url, headers: &HeaderMap) -> Result<Attempt, FetchError> {
        let response = match self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                return Ok(Attempt::Retry {
                    status: None,
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if is_retriable_status(status) {
            return Ok(Attempt::Retry {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        match response.text().await {
            Ok(body) if looks_like_bot_challenge(&body) => Ok(Attempt::Retry {
                status: Some(status.as_u16()),
                reason: "bot challenge page".to_string(),
            }),
            Ok(body) => Ok(Attempt::Body(body)),
            Err(e) if is_transient(&e) || e.is_decode() => Ok(Attempt::Retry {
                status: Some(status.as_u16()),
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        () = cancel.cancelled() => Err(FetchError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
