//! Dual rate limiting for exchange access.
//!
//! A weighted token bucket guards general request volume; two sliding
//! windows (10s / 24h) guard order placement specifically, matching the
//! venue's own separate accounting for orders vs. general weight.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ExchangeError;

/// Weighted token bucket for general request volume.
pub struct RequestLimiter {
    inner: Mutex<BucketState>,
    burst_limit: f64,
    refill_rate: f64, // tokens per second
    requests_per_minute: u32,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    request_times: VecDeque<Instant>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateStats {
    pub tokens_available: f64,
    pub max_tokens: f64,
    pub requests_last_minute: usize,
    pub max_requests_per_minute: u32,
    pub utilization: f64,
}

impl RequestLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let burst_limit = (requests_per_minute as f64 / 10.0).max(10.0);
        Self {
            inner: Mutex::new(BucketState {
                tokens: burst_limit,
                last_refill: Instant::now(),
                request_times: VecDeque::new(),
            }),
            burst_limit,
            refill_rate: requests_per_minute as f64 / 60.0,
            requests_per_minute,
        }
    }

    /// Acquire permission to issue a request weighing `weight` units,
    /// refilling by elapsed time and sleeping if the bucket is short.
    pub async fn acquire(&self, weight: u32) {
        let weight = weight as f64;
        let mut state = self.inner.lock().await;
        self.refill(&mut state);

        if state.tokens < weight {
            let wait = Duration::from_secs_f64((weight - state.tokens) / self.refill_rate);
            debug!(wait_secs = wait.as_secs_f64(), tokens = state.tokens, weight, "rate limit approached, waiting");
            drop(state);
            tokio::time::sleep(wait).await;
            state = self.inner.lock().await;
            self.refill(&mut state);
        }

        state.tokens -= weight;
        let now = Instant::now();
        state.request_times.push_back(now);
        let cutoff = now - Duration::from_secs(60);
        while matches!(state.request_times.front(), Some(t) if *t < cutoff) {
            state.request_times.pop_front();
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.burst_limit);
        state.last_refill = now;
    }

    pub async fn current_rate(&self) -> RateStats {
        let state = self.inner.lock().await;
        let cutoff = Instant::now() - Duration::from_secs(60);
        let recent = state.request_times.iter().filter(|t| **t > cutoff).count();
        RateStats {
            tokens_available: state.tokens,
            max_tokens: self.burst_limit,
            requests_last_minute: recent,
            max_requests_per_minute: self.requests_per_minute,
            utilization: recent as f64 / self.requests_per_minute as f64,
        }
    }

    /// Yield for 1s if utilization is already above 90%.
    pub async fn wait_if_needed(&self) {
        let stats = self.current_rate().await;
        if stats.utilization > 0.9 {
            warn!(utilization = stats.utilization, "high rate limit utilization, throttling");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Sliding-window limiter for order placement specifically.
pub struct OrderLimiter {
    inner: Mutex<OrderWindows>,
    orders_per_10s: usize,
    orders_per_day: usize,
}

struct OrderWindows {
    window_10s: VecDeque<Instant>,
    window_1d: VecDeque<Instant>,
}

impl OrderLimiter {
    pub fn new(orders_per_10s: u32, orders_per_day: u32) -> Self {
        Self {
            inner: Mutex::new(OrderWindows {
                window_10s: VecDeque::new(),
                window_1d: VecDeque::new(),
            }),
            orders_per_10s: orders_per_10s as usize,
            orders_per_day: orders_per_day as usize,
        }
    }

    /// Acquire permission to place one order. Sleeps to satisfy the 10s
    /// window; fails with `PolicyViolation{daily_order_limit}` if the
    /// 24h window is exhausted.
    pub async fn acquire_order(&self) -> Result<(), ExchangeError> {
        let mut state = self.inner.lock().await;
        let mut now = Instant::now();

        let ten_sec_ago = now - Duration::from_secs(10);
        while matches!(state.window_10s.front(), Some(t) if *t < ten_sec_ago) {
            state.window_10s.pop_front();
        }

        if state.window_10s.len() >= self.orders_per_10s {
            let oldest = *state.window_10s.front().unwrap();
            let wait = Duration::from_secs(10).saturating_sub(now.duration_since(oldest));
            warn!(wait_secs = wait.as_secs_f64(), "order rate limit (10s) reached, waiting");
            drop(state);
            tokio::time::sleep(wait).await;
            state = self.inner.lock().await;
            now = Instant::now();
            let ten_sec_ago = now - Duration::from_secs(10);
            while matches!(state.window_10s.front(), Some(t) if *t < ten_sec_ago) {
                state.window_10s.pop_front();
            }
        }

        let one_day_ago = now - Duration::from_secs(86_400);
        while matches!(state.window_1d.front(), Some(t) if *t < one_day_ago) {
            state.window_1d.pop_front();
        }

        if state.window_1d.len() >= self.orders_per_day {
            return Err(ExchangeError::policy_violation("daily_order_limit"));
        }

        state.window_10s.push_back(now);
        state.window_1d.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_limiter_allows_within_burst() {
        let limiter = RequestLimiter::new(1200);
        for _ in 0..10 {
            limiter.acquire(1).await;
        }
        let stats = limiter.current_rate().await;
        assert_eq!(stats.requests_last_minute, 10);
    }

    #[tokio::test]
    async fn order_limiter_rejects_past_daily_cap() {
        let limiter = OrderLimiter::new(1000, 2);
        limiter.acquire_order().await.unwrap();
        limiter.acquire_order().await.unwrap();
        let err = limiter.acquire_order().await.unwrap_err();
        assert!(matches!(err, ExchangeError::PolicyViolation { .. }));
    }

    #[tokio::test]
    async fn order_limiter_allows_back_to_back_under_window_cap() {
        let limiter = OrderLimiter::new(5, 1000);
        for _ in 0..5 {
            limiter.acquire_order().await.unwrap();
        }
    }
}
