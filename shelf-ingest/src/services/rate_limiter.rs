//! Sliding-window rate limiter
//!
//! Keeps the start instants of the requests issued in the last `window`.
//! A caller arriving when the window is full is suspended until the oldest
//! in-window instant expires; no request is ever dropped.
//!
//! The limiter is cooperative and per instance (not cross-process).

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Limiter allowing `requests_per_second` requests in any one-second window
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second as usize, Duration::from_secs(1))
    }

    /// `max_requests` is raised to at least 1
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until the window has room, then record this request
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();

                while let Some(oldest) = issued.front() {
                    if now.duration_since(*oldest) >= self.window {
                        issued.pop_front();
                    } else {
                        break;
                    }
                }

                if issued.len() < self.max_requests {
                    issued.push_back(now);
                    return;
                }

                match issued.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limiting: waiting for window");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests currently counted in the window
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let now = Instant::now();
        issued
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_creation() {
        let limiter = SlidingWindowLimiter::per_second(3);
        assert_eq!(limiter.max_requests(), 3);
        assert_eq!(limiter.window(), Duration::from_secs(1));

        // Zero would deadlock every caller
        assert_eq!(SlidingWindowLimiter::per_second(0).max_requests(), 1);
    }

    #[tokio::test]
    async fn test_requests_within_capacity_are_immediate() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_millis(500));
        let start = std::time::Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn test_excess_requests_are_delayed_not_dropped() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(200));
        let start = std::time::Instant::now();

        // Requests 1-2 immediate, 3-4 wait for the first window, 5 for the second
        let mut completed = 0;
        for _ in 0..5 {
            limiter.acquire().await;
            completed += 1;
        }

        let elapsed = start.elapsed();
        assert_eq!(completed, 5);
        assert!(elapsed >= Duration::from_millis(380), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_third_request_waits_for_oldest_to_expire() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(300));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = std::time::Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(250), "waited {:?}", waited);
    }
}
