//! Per-authority token-bucket pacing for polite crawling.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::authority_of;

/// Default: one request per two seconds per authority.
pub const DEFAULT_RATE: f64 = 0.5;
pub const DEFAULT_BURST: u32 = 3;

/// Upper bound on a single sleep slice while waiting for a token.
const MAX_SLEEP: Duration = Duration::from_secs(2);

struct TokenBucket {
    rate: f64,
    burst: u32,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            tokens: burst as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst as f64);
        self.last_refill = now;
    }

    /// Consume a token, or return how long to wait before retrying.
    fn try_acquire(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return None;
        }
        let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.rate);
        Some(wait.min(MAX_SLEEP))
    }
}

/// Process-wide rate limiter keyed by URL authority. One owned instance is
/// passed explicitly to everything that fetches.
pub struct RateLimiter {
    default_rate: f64,
    default_burst: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    overrides: Mutex<HashMap<String, (f64, u32)>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_defaults(DEFAULT_RATE, DEFAULT_BURST)
    }

    pub fn with_defaults(rate: f64, burst: u32) -> Self {
        Self {
            default_rate: rate,
            default_burst: burst,
            buckets: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// Override the rate for one authority (e.g. from a robots crawl-delay).
    /// Takes effect when that authority's bucket is next created.
    pub async fn set_authority_rate(&self, authority: &str, rate: f64, burst: Option<u32>) {
        let mut overrides = self.overrides.lock().await;
        overrides.insert(
            authority.to_string(),
            (rate, burst.unwrap_or(self.default_burst)),
        );
    }

    /// Wait until the authority's bucket allows a request, then consume a token.
    pub async fn acquire(&self, url: &str) {
        let authority = authority_of(url);
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                if !buckets.contains_key(&authority) {
                    let (rate, burst) = {
                        let overrides = self.overrides.lock().await;
                        overrides
                            .get(&authority)
                            .copied()
                            .unwrap_or((self.default_rate, self.default_burst))
                    };
                    buckets.insert(authority.clone(), TokenBucket::new(rate, burst));
                }
                // Bucket exists by construction above.
                buckets
                    .get_mut(&authority)
                    .map(|bucket| bucket.try_acquire())
                    .unwrap_or(None)
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    /// Drop all buckets (overrides are kept).
    pub async fn clear(&self) {
        self.buckets.lock().await.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_tokens_are_immediate() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..DEFAULT_BURST {
            limiter.acquire("https://example.com/page").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_request_waits_for_refill() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..(DEFAULT_BURST + 1) {
            limiter.acquire("https://example.com/page").await;
        }
        // One token at 0.5 req/s takes 2 virtual seconds to refill.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn authorities_do_not_share_buckets() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..DEFAULT_BURST {
            limiter.acquire("https://a.example.com/").await;
        }
        for _ in 0..DEFAULT_BURST {
            limiter.acquire("https://b.example.com/").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn override_applies_to_new_bucket() {
        let limiter = RateLimiter::new();
        limiter
            .set_authority_rate("slow.example.com", 1.0, Some(1))
            .await;

        let start = Instant::now();
        limiter.acquire("https://slow.example.com/a").await;
        limiter.acquire("https://slow.example.com/b").await;
        // Burst 1 at 1 req/s: the second acquire waits ~1 virtual second.
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
