use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use archive_logging::{archive_debug, archive_warn, redact_url};
use archiver_core::ArchiveConfig;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use secrecy::{ExposeSecret, SecretString};

use crate::rate_limit::RateLimiter;
use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput};

/// Bounded retry schedule: attempt count and delays are plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based): doubles each time.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub retry: RetryPolicy,
    pub proxy: Option<String>,
    pub auth_cookie: Option<SecretString>,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 100 * 1024 * 1024,
            retry: RetryPolicy::default(),
            proxy: None,
            auth_cookie: None,
            user_agent: concat!("post-archiver/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            },
            proxy: config.proxy.clone(),
            auth_cookie: config.auth_cookie.clone(),
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchOutput, FetchError>;

    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.fetch(url, &HeaderMap::new()).await
    }
}

/// Production fetcher: proxy, auth cookie, shared rate limit, bounded retries.
#[derive(Debug)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    cookie: Option<HeaderValue>,
    limiter: Arc<RateLimiter>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings, limiter: Arc<RateLimiter>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(settings.user_agent.clone());

        if let Some(proxy) = settings.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy).map_err(|err| {
                FetchError::new(FailureKind::InvalidProxy, err.to_string())
            })?;
            builder = builder.proxy(proxy);
        }

        let cookie = settings
            .auth_cookie
            .as_ref()
            .map(|secret| {
                let mut value = HeaderValue::from_str(secret.expose_secret()).map_err(|_| {
                    FetchError::new(FailureKind::InvalidHeader, "auth cookie is not a valid header value")
                })?;
                value.set_sensitive(true);
                Ok::<_, FetchError>(value)
            })
            .transpose()?;

        let client = builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            settings,
            cookie,
            limiter,
        })
    }

    /// Build a fetcher with its own limiter from run settings.
    pub fn from_config(config: &ArchiveConfig) -> Result<Self, FetchError> {
        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        Self::new(
            FetchSettings::from_config(config),
            Arc::new(RateLimiter::per_second(rate)),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn attempt(&self, url: &reqwest::Url, headers: &HeaderMap) -> Result<FetchOutput, FetchError> {
        let mut request = self.client.get(url.clone()).headers(headers.clone());
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie.clone());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url,
                content_type,
                byte_len: bytes.len() as u64,
                attempts: 0,
            },
            bytes,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let max_attempts = self.settings.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            match self.attempt(&parsed, headers).await {
                Ok(mut output) => {
                    output.metadata.attempts = attempt;
                    return Ok(output);
                }
                Err(err) if err.kind.is_transient() && attempt < max_attempts => {
                    let delay = self.settings.retry.delay_after(attempt);
                    archive_debug!(
                        "fetch attempt {}/{} for {} failed ({}); retrying in {:?}",
                        attempt,
                        max_attempts,
                        redact_url(url),
                        err.kind,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    archive_warn!("fetch of {} failed: {}", redact_url(url), err.kind);
                    return Err(err.after_attempts(attempt));
                }
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
