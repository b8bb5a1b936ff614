//! Fixed-rate token bucket for outbound calls.
//!
//! Callers reserve a token and then sleep until it is theirs. Reservations
//! may drive the balance negative; the debt is what later callers queue
//! behind. A reservation that would wait longer than `max_wait` is refused
//! instead of queued.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter saturated, next token in {0:?}")]
    Saturated(Duration),
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    capacity: f64,
    max_wait: Duration,
}

impl TokenBucket {
    /// A bucket refilling `rate` tokens per second up to `burst`
    /// (`burst == 0` means the burst equals the rate).
    pub fn new(rate: u32, burst: u32, max_wait: Duration) -> Self {
        let rate = f64::from(rate.max(1));
        let capacity = if burst == 0 { rate } else { f64::from(burst) };
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_update: Instant::now(),
            }),
            rate,
            capacity,
            max_wait,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Claim the next token, returning the instant it becomes usable.
    pub fn reserve(&self) -> Result<Instant, RateLimitError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_update = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(now);
        }

        let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.rate);
        if wait > self.max_wait {
            return Err(RateLimitError::Saturated(wait));
        }
        state.tokens -= 1.0;
        Ok(now + wait)
    }

    /// Wait for a token.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let at = self.reserve()?;
        tokio::time::sleep_until(at).await;
        Ok(())
    }
}
