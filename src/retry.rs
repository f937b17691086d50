use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 10000;

macro_rules! retry_db_operation {
    ($context:expr, $operation:expr) => {{
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY_SECS: u64 = 3;

        let context_value: String = $context.into();
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= MAX_ATTEMPTS => break Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}s.",
                        attempt,
                        MAX_ATTEMPTS,
                        context_value,
                        err,
                        RETRY_DELAY_SECS
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_db_operation;

/// Exponential delay for a zero-based retry attempt, capped and spread by up to ±25% jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let delay_ms = BASE_DELAY_MS
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(MAX_DELAY_MS);
    let jitter_range = (delay_ms as f64 * 0.25) as u64;
    let jitter = fastrand::u64(0..=jitter_range * 2);
    Duration::from_millis(delay_ms.saturating_sub(jitter_range).saturating_add(jitter))
}

/// Runs `operation` until it succeeds or `MAX_RETRIES` retries have failed.
pub async fn retry_with_backoff<F, Fut, T>(context: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt < MAX_RETRIES {
                    let delay = backoff_delay(attempt);
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms.",
                        attempt + 1,
                        MAX_RETRIES + 1,
                        context,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("{}: retries exhausted", context)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_is_capped() {
        for _ in 0..50 {
            let first = backoff_delay(0).as_millis();
            assert!((750..=1250).contains(&first), "{first}");
            let third = backoff_delay(2).as_millis();
            assert!((3000..=5000).contains(&third), "{third}");
            let capped = backoff_delay(10).as_millis();
            assert!((7500..=12500).contains(&capped), "{capped}");
        }
    }

    #[tokio::test]
    async fn returns_first_success_without_retrying() {
        let calls = AtomicU32::new(0);
        let value = retry_with_backoff("probe", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(42) }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_last_error_after_exhausting_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("probe", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(anyhow!("failure {}", attempt)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
        assert_eq!(result.unwrap_err().to_string(), "failure 3");
    }
}
