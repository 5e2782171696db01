//! Sliding-window admission control for calls to the refine API.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Length of the admission window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Small margin so a woken waiter finds the oldest slot already expired
const WAKE_MARGIN: Duration = Duration::from_millis(10);

/// Allows at most `max_per_minute` admissions in any trailing 60-second window.
///
/// Share one instance (behind an `Arc`) among every caller hitting the same
/// external API. The window lock is never held while sleeping; a waiter that
/// wakes up re-checks the window instead of assuming a slot is free.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_minute: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limit of 0 would never admit anything; it is raised to 1.
    pub fn new(max_per_minute: usize) -> Self {
        if max_per_minute == 0 {
            warn!("rate limit of 0 requests per minute raised to 1");
        }
        let max_per_minute = max_per_minute.max(1);
        Self {
            max_per_minute,
            window: Mutex::new(VecDeque::with_capacity(max_per_minute)),
        }
    }

    /// Wait until a slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= WINDOW)
                {
                    window.pop_front();
                }

                if window.len() < self.max_per_minute {
                    window.push_back(now);
                    return;
                }

                match window.front() {
                    Some(&oldest) => WINDOW.saturating_sub(now.duration_since(oldest)) + WAKE_MARGIN,
                    None => WAKE_MARGIN,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window.
    #[cfg(test)]
    pub(crate) async fn in_window(&self) -> usize {
        let window = self.window.lock().await;
        let now = Instant::now();
        window
            .iter()
            .filter(|&&t| now.duration_since(t) < WINDOW)
            .count()
    }
}
