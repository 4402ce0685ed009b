use std::time::Duration;

use anyhow::Result;

const TRANSIENT_MARKERS: [&str; 2] = ["503", "UNAVAILABLE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: usize,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(retries: usize) -> Self {
        Self {
            retries,
            initial_delay: Duration::ZERO,
            multiplier: 2,
        }
    }

    /// Delay before retry number `retry_index` (zero based).
    pub fn delay_for(&self, retry_index: usize) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(u32::try_from(retry_index).unwrap_or(u32::MAX));
        self.initial_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// One based number of the retry about to happen.
    pub retry: usize,
    pub retries: usize,
    pub delay: Duration,
    pub error: String,
}

/// Overload signals from the AI service, plus transport timeouts and
/// connection failures.
pub fn is_transient_error(err: &anyhow::Error) -> bool {
    let transport = err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| reqwest_err.is_timeout() || reqwest_err.is_connect())
            .unwrap_or(false)
    });
    if transport {
        return true;
    }
    let text = error_chain_text(err);
    text.to_ascii_lowercase().contains("overloaded")
        || TRANSIENT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy runs out of retries. The operation receives the zero based
/// attempt number.
pub fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut on_retry: impl FnMut(&RetryAttempt),
    mut operation: impl FnMut(usize) -> Result<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        let err = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= policy.retries || !is_transient_error(&err) {
            return Err(err);
        }
        let retry = RetryAttempt {
            retry: attempt + 1,
            retries: policy.retries,
            delay: policy.delay_for(attempt),
            error: error_chain_text(&err),
        };
        tracing::warn!(
            retry = retry.retry,
            retries = retry.retries,
            delay_ms = retry.delay.as_millis() as u64,
            error = %retry.error,
            "transient AI service failure; retrying"
        );
        on_retry(&retry);
        sleep(retry.delay);
        attempt += 1;
    }
}

pub fn error_chain_text(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    parts.join(" | caused by: ")
}
