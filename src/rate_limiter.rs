//! Sliding-window admission control for outbound requests.
//!
//! The limiter remembers when each of the last requests was admitted. Once
//! the window holds `max_requests` admissions, the next caller is held back
//! until the oldest admission leaves the window. Callers are delayed, never
//! rejected.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Sliding-window rate limiter.
///
/// Waiting callers queue on an async turn lock, so they are admitted one at a
/// time in arrival order. The window itself sits behind a short synchronous
/// lock that is never held across a sleep, so it can be inspected while a
/// caller is waiting.
#[derive(Debug)]
pub struct RateLimiter {
    /// Held by the caller currently being admitted
    turn: tokio::sync::Mutex<()>,
    /// Admission instants inside the current window, oldest first
    admissions: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter admitting `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            turn: tokio::sync::Mutex::new(()),
            admissions: Mutex::new(VecDeque::with_capacity(max_requests.min(4096))),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_millis(config.window_ms))
    }

    /// Waits until one more request fits in the window, then records it.
    pub async fn admit(&self) {
        let _turn = self.turn.lock().await;

        loop {
            let (wait, in_window) = {
                let mut admissions = self.admissions.lock();
                let now = Instant::now();
                self.purge(&mut admissions, now);

                if admissions.len() < self.max_requests {
                    admissions.push_back(now);
                    debug!(in_window = admissions.len(), "Request admitted");
                    return;
                }

                let oldest = admissions.front().copied().unwrap_or(now);
                (
                    self.window.saturating_sub(now.duration_since(oldest)),
                    admissions.len(),
                )
            };

            warn!(
                wait_ms = wait.as_millis() as u64,
                in_window,
                max_requests = self.max_requests,
                "Rate limit reached, delaying request"
            );
            sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window. Never waits on a
    /// caller that is being held back.
    pub fn requests_in_window(&self) -> usize {
        let mut admissions = self.admissions.lock();
        self.purge(&mut admissions, Instant::now());
        admissions.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn purge(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admissions.front() {
            if now.duration_since(oldest) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}
