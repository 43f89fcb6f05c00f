use crate::core::error::FetchError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Enforces a minimum spacing between calls from one adapter instance.
/// Callers block cooperatively until the spacing elapses; requests are
/// never dropped.
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Throttle {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                debug!("Throttling for {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// Retries an async fetch on rate-limit signals with a growing delay.
///
/// Attempt `n` sleeps `base_delay * n` before retrying, up to `retries`
/// retries. Any other error aborts immediately; a rate limit that
/// survives all attempts is returned as `RateLimited` for the caller to
/// degrade.
pub async fn with_backoff<F, Fut, T>(
    mut operation: F,
    retries: usize,
    base_delay: Duration,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(FetchError::RateLimited) if attempt <= retries => {
                let delay = base_delay * attempt as u32;
                debug!(
                    "Rate limited on attempt {}/{}, backing off {:?}",
                    attempt,
                    retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
