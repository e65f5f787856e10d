//! Human-behavior rate control: token-bucket admission plus jittered delays.
//!
//! Delays are drawn from a clamped normal distribution rather than a uniform
//! one; uniformly spaced actions are themselves a detectable signal.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound for a single wait iteration inside `acquire`.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(5);

/// Exponential backoff cap.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Action classes with independent jitter profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    /// A page navigation or network request.
    Request,
    /// A simulated click.
    Click,
    /// One scroll step (not one scroll gesture).
    Scroll,
}

/// Jitter parameters for one action class: normal distribution clamped to
/// `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct JitterProfile {
    pub min: f64,
    pub max: f64,
    pub mu: f64,
    pub sigma: f64,
}

impl JitterProfile {
    pub fn for_class(class: ActionClass) -> Self {
        match class {
            ActionClass::Request => Self {
                min: 1.5,
                max: 4.0,
                mu: 2.5,
                sigma: 0.6,
            },
            ActionClass::Click => Self {
                min: 0.1,
                max: 0.6,
                mu: 0.3,
                sigma: 0.1,
            },
            ActionClass::Scroll => Self {
                min: 0.05,
                max: 0.15,
                mu: 0.09,
                sigma: 0.03,
            },
        }
    }

    /// Draw one delay in seconds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let drawn = match Normal::new(self.mu, self.sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mu,
        };
        drawn.clamp(self.min, self.max)
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with lazy refill. State is mutated only inside `acquire`'s
/// critical section, so the bucket is safe under concurrent callers.
pub struct TokenBucket {
    capacity: f64,
    fill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Panics unless both parameters are positive; a non-positive fill rate
    /// would make `acquire` wait forever.
    pub fn new(capacity: f64, fill_rate: f64) -> Self {
        assert!(capacity > 0.0, "token bucket capacity must be positive");
        assert!(fill_rate > 0.0, "token bucket fill rate must be positive");
        Self {
            capacity,
            fill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.fill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Block until `cost` tokens are available, then consume them.
    pub async fn acquire(&self, cost: f64) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= cost {
                    state.tokens -= cost;
                    return;
                }
                let deficit = cost - state.tokens;
                Duration::from_secs_f64(deficit / self.fill_rate).min(MAX_WAIT_SLICE)
            };
            debug!(wait_ms = wait.as_millis() as u64, "token bucket drained, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Current token count (refilled to now). For telemetry.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Rate controller owned by one spider instance: one bucket plus per-class
/// jittered delays and retry backoff.
pub struct RateController {
    bucket: TokenBucket,
    base_backoff: Duration,
}

impl RateController {
    pub fn new(capacity: f64, fill_rate: f64) -> Self {
        Self {
            bucket: TokenBucket::new(capacity, fill_rate),
            base_backoff: Duration::from_secs(2),
        }
    }

    pub async fn acquire(&self, cost: f64) {
        self.bucket.acquire(cost).await;
    }

    /// Sleep a human-like jittered duration for the given action class.
    pub async fn delay(&self, class: ActionClass) {
        let seconds = JitterProfile::for_class(class).sample(&mut rand::thread_rng());
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }

    /// Backoff delay for a stage retry: `base * 2^min(retry, 5)`, capped.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32 << retry_count.min(5);
        (self.base_backoff * factor).min(MAX_BACKOFF)
    }

    pub async fn backoff(&self, retry_count: u32) {
        tokio::time::sleep(self.backoff_delay(retry_count)).await;
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

impl Default for RateController {
    fn default() -> Self {
        // Matches observed safe request volume: burst of 10, 2 tokens/sec.
        Self::new(10.0, 2.0)
    }
}
