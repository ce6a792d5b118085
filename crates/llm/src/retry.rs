//! Retry/backoff policy (spec §5): exponential backoff starting at 1s,
//! doubling to a 60s cap, with 0-10% jitter, retrying only errors
//! [`LLMError::classify`] marks [`LLMErrorClass::Transient`].

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use wenshape_protocol::{LLMError, LLMErrorClass};

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: usize = 5;

fn policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(BASE_DELAY)
        .with_max_delay(MAX_DELAY)
        .with_factor(2.0)
        .with_max_times(MAX_ATTEMPTS)
        .with_jitter()
}

/// Runs `f`, retrying per the spec §5 backoff sequence when the error
/// classifies as transient. Permanent errors (auth, invalid input) return
/// immediately on the first attempt.
pub async fn with_retry<F, Fut, T>(f: F) -> Result<T, LLMError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LLMError>>,
{
    f.retry(policy())
        .when(|err: &LLMError| LLMError::classify(&err.to_string()) == LLMErrorClass::Transient)
        .notify(|err: &LLMError, dur: Duration| {
            tracing::warn!(error = %err, delay_ms = dur.as_millis() as u64, "retrying llm call");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), LLMError> = with_retry(|| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LLMError::Permanent("401 invalid api key".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_eventually_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = with_retry(|| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(LLMError::Transient("connection timeout".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
