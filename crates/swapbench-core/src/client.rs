//! HTTP client wrapper for face-swap providers.
//!
//! One POST per attempt, fixed headers, JSON body. Non-2xx statuses and
//! transport failures are classified into [`SwapError`] variants; 2xx
//! bodies go through the normalizer. The client holds no per-call state.

use crate::credentials::{CredentialError, Credentials};
use crate::normalize::{
    self, NormalizeError, NormalizedResponse, RawResponse, GENERATION_TIME_HEADER,
    REMAINING_CREDITS_HEADER, REQUEST_ID_HEADER,
};
use crate::request::{BuildError, SwapRequest};
use crate::types::{ErrorKind, Provider, ResponseShape};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Providers routinely take 40-95 s; anything shorter times out healthy requests.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SEGMIND_BASE: &str = "https://api.segmind.com/v1";
pub const DEFAULT_THORTFUL_URL: &str = "https://api.thortful.com/v1/faceswap?variation=true";

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("transient provider failure{}: {message}", status_suffix(.status))]
    Transient { status: Option<u16>, message: String },
    #[error("unusable response: {0}")]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("http client setup failed: {0}")]
    Setup(#[source] reqwest::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl SwapError {
    /// Timeouts and transient failures may be retried; nothing else can succeed on a repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::Timeout(_) | SwapError::Transient { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SwapError::Timeout(_) => ErrorKind::Timeout,
            SwapError::Auth { .. } | SwapError::Credentials(_) => ErrorKind::Auth,
            SwapError::Transient { .. } => ErrorKind::Transient,
            SwapError::Normalize(_) => ErrorKind::Normalization,
            SwapError::Build(_) | SwapError::Setup(_) => ErrorKind::Config,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            SwapError::Auth { status, .. } => Some(*status),
            SwapError::Transient { status, .. } => *status,
            _ => None,
        }
    }
}

/// Map a non-2xx status to an error. `body` is only used for the message.
pub fn classify_status(status: u16, body: &str, timeout: Duration) -> SwapError {
    let message = truncate(body.trim(), ERROR_BODY_LIMIT);
    match status {
        408 => SwapError::Timeout(timeout),
        429 | 500..=599 => SwapError::Transient {
            status: Some(status),
            message,
        },
        _ => SwapError::Auth { status, message },
    }
}

fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Attempt count and per-attempt timeouts. Centralizes what used to be
/// ad hoc timeout/retry constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per combination, including the first.
    pub max_attempts: u32,
    /// Timeout for the first attempt.
    pub timeout: Duration,
    /// Multiplier applied to the timeout on retries (clamped to >= 1.0).
    pub retry_timeout_factor: f64,
    /// Extra pause before a retry, on top of the inter-request delay.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout: DEFAULT_TIMEOUT,
            retry_timeout_factor: 1.5,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_timeout_factor(mut self, factor: f64) -> Self {
        self.retry_timeout_factor = factor;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Timeout for the given 1-based attempt. Retries never get less time.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.timeout;
        }
        let factor = if self.retry_timeout_factor.is_finite() {
            self.retry_timeout_factor.max(1.0)
        } else {
            1.0
        };
        self.timeout.mul_f64(factor)
    }

    /// Whether a failed `attempt` should be followed by another.
    pub fn should_retry(&self, error: &SwapError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

/// Where each provider lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base for Segmind endpoints, without trailing slash.
    pub segmind_base: String,
    pub thortful: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            segmind_base: DEFAULT_SEGMIND_BASE.to_string(),
            thortful: DEFAULT_THORTFUL_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn url_for(&self, provider: Provider) -> String {
        let base = self.segmind_base.trim_end_matches('/');
        match provider {
            Provider::V2 => format!("{base}/faceswap-v2"),
            Provider::V4 => format!("{base}/faceswap-v4"),
            Provider::V43 => format!("{base}/faceswap-v4.3"),
            Provider::Thortful => self.thortful.clone(),
        }
    }
}

/// Performs single swap attempts. The orchestrator owns sequencing and
/// retries; implementations only describe how long and how often.
#[async_trait]
pub trait Swapper: Send + Sync {
    fn retry_policy(&self) -> &RetryPolicy;

    async fn attempt(
        &self,
        request: &SwapRequest,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<NormalizedResponse, SwapError>;
}

/// reqwest-backed [`Swapper`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(endpoints: Endpoints, policy: RetryPolicy) -> Result<Self, SwapError> {
        if policy.timeout < MIN_TIMEOUT {
            tracing::warn!(
                timeout_secs = policy.timeout.as_secs_f64(),
                min_secs = MIN_TIMEOUT.as_secs(),
                "request timeout below provider processing times; expect spurious timeouts"
            );
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("swapbench/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SwapError::Setup)?;
        Ok(Self {
            http,
            endpoints,
            policy,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// POST `payload` to `endpoint` and normalize the response.
    pub async fn send<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        mut headers: HeaderMap,
        payload: &P,
        timeout: Duration,
        shape: ResponseShape,
    ) -> Result<NormalizedResponse, SwapError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let response = self
            .http
            .post(endpoint)
            .headers(headers)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE.as_str());
        let generation_time = header(GENERATION_TIME_HEADER);
        let remaining_credits = header(REMAINING_CREDITS_HEADER);
        let request_id = header(REQUEST_ID_HEADER);

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &String::from_utf8_lossy(&body), timeout));
        }

        let raw = RawResponse {
            status,
            content_type,
            generation_time,
            remaining_credits,
            request_id,
            body: body.to_vec(),
        };
        Ok(normalize::normalize(&raw, shape)?)
    }

    /// Download an image the provider returned by URL.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, SwapError> {
        let timeout = self.policy.timeout;
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &String::from_utf8_lossy(&body), timeout));
        }
        if body.is_empty() {
            return Err(NormalizeError::EmptyBody.into());
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Swapper for HttpClient {
    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(
        &self,
        request: &SwapRequest,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<NormalizedResponse, SwapError> {
        let provider = request.provider();
        let endpoint = self.endpoints.url_for(provider);
        let headers = credentials.headers(provider)?;
        tracing::debug!(
            %provider,
            endpoint = %endpoint,
            timeout_secs = timeout.as_secs_f64(),
            source_bytes = request.source().len(),
            target_bytes = request.target().len(),
            "sending swap request"
        );
        self.send(
            &endpoint,
            headers,
            &request.payload(),
            timeout,
            provider.response_shape(),
        )
        .await
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> SwapError {
    if err.is_timeout() {
        SwapError::Timeout(timeout)
    } else {
        SwapError::Transient {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
