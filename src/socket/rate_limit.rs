//! Per-connection message rate limiting.
//!
//! Each authenticated connection owns one limiter: a counter over a fixed
//! window starting at the first message. When the window elapses the counter
//! resets and a new window begins. No locking and no persistence; the state
//! dies with the connection.

use std::time::{Duration, Instant};

/// Message-rate limiter for a single connection.
#[derive(Debug)]
pub struct ConnectionRateLimiter {
    cap: u32,
    window: Duration,
    window_start: Option<Instant>,
    count: u32,
}

impl ConnectionRateLimiter {
    /// Create a limiter allowing `cap` messages per `window`.
    pub fn new(cap: u32, window: Duration) -> Self {
        Self {
            cap,
            window,
            window_start: None,
            count: 0,
        }
    }

    /// Account for one message. Returns `false` once the window's allowance
    /// is exhausted; the caller must reject the message explicitly.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();

        match self.window_start {
            Some(start) if now.duration_since(start) >= self.window => {
                self.window_start = Some(now);
                self.count = 0;
            }
            None => self.window_start = Some(now),
            Some(_) => {}
        }

        if self.count >= self.cap {
            return false;
        }

        self.count += 1;
        true
    }
}
