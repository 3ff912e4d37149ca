//! In-memory sliding-window limiter for response submissions, keyed by client id.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests: max_requests.max(1),
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records an attempt for `key` and reports whether it is within the limit.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let history = requests.entry(key.to_string()).or_default();
        history.retain(|&at| now.duration_since(at) < self.window);

        if history.len() < self.max_requests {
            history.push(now);
            true
        } else {
            false
        }
    }

    /// Drops keys whose attempts have all left the window.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        requests.retain(|_, history| {
            history.retain(|&at| now.duration_since(at) < self.window);
            !history.is_empty()
        });

        tracing::debug!(active = requests.len(), "Submission limiter cleanup");
        requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_per_client() {
        let limiter = RateLimiter::new(3, 60);

        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-a").await);
        assert!(limiter.check("client-a").await);
        assert!(!limiter.check("client-a").await);

        assert!(limiter.check("client-b").await);
    }

    #[tokio::test]
    async fn cleanup_forgets_expired_clients() {
        let limiter = RateLimiter::new(5, 1);

        limiter.check("client-a").await;
        limiter.check("client-b").await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.cleanup().await, 0);
        assert!(limiter.requests.read().await.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_still_allows_one() {
        let limiter = RateLimiter::new(0, 60);
        assert!(limiter.check("client-a").await);
        assert!(!limiter.check("client-a").await);
    }
}
