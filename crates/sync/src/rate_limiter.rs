//! Token bucket limiting how fast blocks are fetched from one publisher.

#[cfg(test)]
#[path = "tests/rate_limiter.rs"]
mod tests;

use core::time::Duration;
use std::sync::Arc;

use dagsync_network::PeerId;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::RateLimitConfig;

/// Shortest wait between refill attempts, so rounding never spins.
const MIN_WAIT: Duration = Duration::from_micros(1);

/// Chooses the limiter for a publisher. `None` disables limiting.
pub type RateLimiterFactory = Arc<dyn Fn(PeerId) -> Option<Arc<RateLimiter>> + Send + Sync>;

/// Token bucket that earns one token per `interval`, holding at most `burst`.
///
/// The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = elapsed.mul_add(self.rate_per_sec, self.tokens).min(self.capacity);
        self.last_update = now;
    }

    /// Takes a token, or reports how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        if self.rate_per_sec.is_infinite() {
            return Ok(());
        }

        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - self.tokens;

        let wait = Duration::try_from_secs_f64(missing / self.rate_per_sec).unwrap_or(Duration::MAX);

        Err(wait.max(MIN_WAIT))
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(interval: Duration, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));

        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                capacity,
                rate_per_sec: 1.0 / interval.as_secs_f64(),
                last_update: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.interval, config.burst)
    }

    /// Factory giving every publisher its own limiter built from `config`.
    #[must_use]
    pub fn per_peer(config: RateLimitConfig) -> RateLimiterFactory {
        Arc::new(move |_peer| Some(Arc::new(Self::from_config(&config))))
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().try_take(Instant::now()).is_ok()
    }

    /// Waits for a token.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.bucket.lock().try_take(Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };

            sleep(wait).await;
        }
    }
}
