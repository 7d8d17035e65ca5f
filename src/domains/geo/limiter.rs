use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Process-wide gate enforcing a minimum delay between external lookups.
///
/// All resolver instances share one limiter so concurrent callers cannot
/// exceed the provider's request etiquette. Holding the lock across the sleep
/// is what serializes callers.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until the minimum inter-request interval has elapsed, then
    /// claims the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
