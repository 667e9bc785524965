// ABOUTME: Generic retry executor with exponential backoff and jitter
// ABOUTME: Classifies errors as retryable or non-retryable per operation class

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry configuration for one operation class.
///
/// Each class carries its own attempt ceiling and delay curve because
/// failure cost and retry safety differ: retrying a dropped connection
/// is cheap, retrying a syntax error is pointless.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// If non-empty, only errors matching one of these substrings are
    /// retried. Empty means everything not non-retryable is retryable.
    pub retryable_error_patterns: Vec<String>,
    /// Checked before the retryable list; a match always wins.
    pub non_retryable_error_patterns: Vec<String>,
}

impl RetryOptions {
    /// Sandbox provisioning: slow operation, generous delays.
    pub fn sandbox_init() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 15_000,
            retryable_error_patterns: Vec::new(),
            non_retryable_error_patterns: vec![
                "unauthorized".to_string(),
                "invalid api key".to_string(),
                "quota".to_string(),
            ],
        }
    }

    /// Tunnel establishment: the provider process can be flaky on boot.
    pub fn tunnel_connect() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            retryable_error_patterns: Vec::new(),
            non_retryable_error_patterns: vec!["not found".to_string(), "no such".to_string()],
        }
    }

    /// Outbound API calls: retry only transport-shaped failures.
    pub fn api_call() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            retryable_error_patterns: vec![
                "connection".to_string(),
                "timeout".to_string(),
                "timed out".to_string(),
                "reset".to_string(),
                "refused".to_string(),
                "502".to_string(),
                "503".to_string(),
                "429".to_string(),
            ],
            non_retryable_error_patterns: Vec::new(),
        }
    }

    /// Code execution: deterministic language errors are never retried,
    /// a second attempt cannot fix them.
    pub fn code_execution() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
            retryable_error_patterns: vec![
                "connection".to_string(),
                "timeout".to_string(),
                "timed out".to_string(),
                "reset".to_string(),
                "unavailable".to_string(),
            ],
            non_retryable_error_patterns: vec![
                "syntaxerror".to_string(),
                "typeerror".to_string(),
                "nameerror".to_string(),
                "indentationerror".to_string(),
                "compilation failed".to_string(),
                "compile error".to_string(),
            ],
        }
    }

    /// Classify an error message. Non-retryable patterns take precedence;
    /// an empty retryable list means everything else is retryable.
    pub fn is_retryable(&self, message: &str) -> bool {
        let lower = message.to_lowercase();

        if self
            .non_retryable_error_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
        {
            return false;
        }

        if self.retryable_error_patterns.is_empty() {
            return true;
        }

        self.retryable_error_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
    }

    /// Delay before retry number `attempt` (zero-based): capped
    /// exponential backoff with +/- 25% uniform jitter. Jitter keeps
    /// concurrent sessions from retrying in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }
}

/// Run `operation` under `options`, sleeping between attempts.
///
/// The original error is propagated unchanged once attempts are
/// exhausted or a non-retryable error is classified, so callers can
/// classify it again upstream.
pub async fn with_retry<T, E, F, Fut>(options: &RetryOptions, operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_notify(options, operation, |_, _, _| {}).await
}

/// Like [`with_retry`], invoking `on_retry(next_attempt, delay, error)`
/// before each sleep for logging or telemetry.
pub async fn with_retry_notify<T, E, F, Fut, N>(
    options: &RetryOptions,
    mut operation: F,
    mut on_retry: N,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(u32, Duration, &E),
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                if attempt + 1 >= max_attempts || !options.is_retryable(&message) {
                    return Err(err);
                }

                let delay = options.delay_for_attempt(attempt);
                debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt + 1,
                    max_attempts,
                    message,
                    delay
                );
                on_retry(attempt + 1, delay, &err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
