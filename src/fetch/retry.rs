//! Immediate retry inside a single fetch call.
//!
//! These are the *micro* retries: a fixed number of attempts separated by a
//! fixed delay, applied to one segment before the fetch call returns. They
//! are nested inside the coordinator's *macro* rounds, which resubmit every
//! still-failing segment as a fresh batch.
//!
//! Failures are first classified into a [`FailureType`]; only transient and
//! rate-limited failures are retried here. Permanent failures return
//! immediately and are left to the coordinator's rounds.
//!
//! # Example
//!
//! ```
//! use segmerge_core::fetch::{FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::http_status("https://cdn.example/seg_1.ts", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::FetchError;
use super::constants::{DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY, RATE_LIMIT_DELAY_FACTOR};

/// Classification of fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, truncated body.
    Transient,

    /// Failure an immediate retry cannot fix.
    ///
    /// Examples: 404 Not Found, invalid URL, local IO, undecodable image.
    Permanent,

    /// Server rate limiting (HTTP 429).
    ///
    /// Retried like a transient failure, but after a longer pause.
    RateLimited,
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Fixed-count, fixed-delay retry policy.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `delay`: 2 seconds
///
/// A rate-limited failure waits `delay * RATE_LIMIT_DELAY_FACTOR` instead.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Pause between attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FETCH_ATTEMPTS,
            delay: DEFAULT_FETCH_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the pause between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Determines whether to retry after attempt number `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - immediate retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match failure_type {
            FailureType::RateLimited => self.delay.saturating_mul(RATE_LIMIT_DELAY_FACTOR),
            FailureType::Transient | FailureType::Permanent => self.delay,
        };

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a fetch error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | other HTTP 4xx | Permanent |
/// | Timeout, Network, Integrity | Transient |
/// | Network (TLS) | Permanent |
/// | Io, InvalidUrl, Decode | Permanent |
/// | WorkerLost | Transient |
#[instrument]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        FetchError::Timeout { .. }
        | FetchError::Integrity { .. }
        | FetchError::WorkerLost { .. } => FailureType::Transient,
        FetchError::Io { .. } | FetchError::InvalidUrl { .. } | FetchError::Decode { .. } => {
            FailureType::Permanent
        }
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
