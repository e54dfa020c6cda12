//! Batch orchestrator.
//!
//! Walks sources x targets x providers in a fixed order, one outbound
//! request at a time, and yields one [`TestRecord`] per attempt. The
//! sequence is lazy: nothing is sent until the consumer polls, and
//! dropping the stream stops the batch after the in-flight request.

use crate::client::{SwapError, Swapper};
use crate::credentials::CredentialSource;
use crate::input::ImageInput;
use crate::normalize::NormalizedResponse;
use crate::request::{SwapOptions, SwapRequest};
use crate::types::{Provider, SwapResult, TestRecord};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Pause between consecutive provider calls, for provider rate limits.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

impl SwapResult {
    pub fn from_response(response: NormalizedResponse, wall_clock_millis: u64) -> Self {
        Self {
            success: true,
            image: Some(response.image),
            cost_units: response.cost_units,
            inference_seconds: response.inference_seconds,
            wall_clock_millis,
            error_message: None,
            error_kind: None,
            http_status: Some(response.status),
            remaining_credits: response.remaining_credits,
            request_id: response.request_id,
        }
    }

    pub fn from_error(error: &SwapError, wall_clock_millis: u64) -> Self {
        Self {
            success: false,
            image: None,
            cost_units: None,
            inference_seconds: None,
            wall_clock_millis,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            http_status: error.http_status(),
            remaining_credits: None,
            request_id: None,
        }
    }
}

/// Sequential driver for swap attempts.
pub struct Orchestrator<S> {
    swapper: S,
    credentials: Arc<dyn CredentialSource>,
    delay: Duration,
}

impl<S: Swapper> Orchestrator<S> {
    pub fn new(swapper: S, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            swapper,
            credentials,
            delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn swapper(&self) -> &S {
        &self.swapper
    }

    /// Run every source x target x provider combination.
    ///
    /// Records come out in loop order (sources outermost, providers
    /// innermost), with retry attempts immediately after the attempt they
    /// follow. Failures never end the batch; they become records.
    pub fn run_batch<'a>(
        &'a self,
        sources: &'a [ImageInput],
        targets: &'a [ImageInput],
        providers: &'a [Provider],
        options: &'a SwapOptions,
    ) -> impl Stream<Item = TestRecord> + 'a {
        stream! {
            let policy = self.swapper.retry_policy().clone();
            let mut first_call = true;
            let mut last_credits: Option<f64> = None;

            for source in sources {
                for target in targets {
                    for &provider in providers {
                        let request = match SwapRequest::build(provider, source.bytes(), target.bytes(), options) {
                            Ok(request) => request,
                            Err(err) => {
                                tracing::warn!(
                                    source = source.id(),
                                    target = target.id(),
                                    %provider,
                                    error = %err,
                                    "cannot build request"
                                );
                                let err = SwapError::from(err);
                                yield record(source, target, provider, options, 1, Utc::now(), SwapResult::from_error(&err, 0));
                                continue;
                            }
                        };

                        let mut attempt = 1;
                        loop {
                            // pacing only applies to calls that actually go out
                            let credentials = self.credentials.credentials(provider);
                            if credentials.is_ok() {
                                if !first_call {
                                    sleep(self.delay).await;
                                }
                                if attempt > 1 && !policy.backoff.is_zero() {
                                    sleep(policy.backoff).await;
                                }
                                first_call = false;
                            }

                            let timeout = policy.timeout_for(attempt);
                            let timestamp = Utc::now();
                            let started = Instant::now();
                            let outcome = match credentials {
                                Ok(credentials) => self.swapper.attempt(&request, &credentials, timeout).await,
                                Err(e) => Err(SwapError::from(e)),
                            };
                            let wall_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                            let (result, retry) = match outcome {
                                Ok(mut response) => {
                                    if provider.is_segmind() {
                                        if response.cost_units.is_none() {
                                            response.cost_units = credit_drop(last_credits, response.remaining_credits);
                                        }
                                        if response.remaining_credits.is_some() {
                                            last_credits = response.remaining_credits;
                                        }
                                    }
                                    tracing::info!(
                                        source = source.id(),
                                        target = target.id(),
                                        %provider,
                                        attempt,
                                        wall_ms,
                                        inference_secs = ?response.inference_seconds,
                                        "swap succeeded"
                                    );
                                    (SwapResult::from_response(response, wall_ms), false)
                                }
                                Err(err) => {
                                    let retry = policy.should_retry(&err, attempt);
                                    tracing::warn!(
                                        source = source.id(),
                                        target = target.id(),
                                        %provider,
                                        attempt,
                                        wall_ms,
                                        kind = err.kind().as_str(),
                                        error = %err,
                                        retry,
                                        "swap failed"
                                    );
                                    (SwapResult::from_error(&err, wall_ms), retry)
                                }
                            };

                            yield record(source, target, provider, options, attempt, timestamp, result);

                            if !retry {
                                break;
                            }
                            attempt += 1;
                        }
                    }
                }
            }
        }
    }
}

fn record(
    source: &ImageInput,
    target: &ImageInput,
    provider: Provider,
    options: &SwapOptions,
    attempt: u32,
    timestamp: DateTime<Utc>,
    result: SwapResult,
) -> TestRecord {
    TestRecord {
        timestamp,
        source_id: source.id().to_string(),
        target_id: target.id().to_string(),
        provider,
        attempt,
        options: options.clone(),
        result,
    }
}

/// Credits spent between two balance readings, if the balance went down.
fn credit_drop(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(prev), Some(cur)) if prev > cur => Some(prev - cur),
        _ => None,
    }
}
