//! Per-source reputation tracking.
//!
//! Keeps a sliding window of authentication failures per source address and
//! a persisted block list. Failure windows are in-memory only; blocks
//! survive restarts. Expired blocks are evicted lazily on lookup, with a
//! periodic sweep bounding memory growth.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store;
use crate::config::SecurityConfig;
use crate::error::BridgeError;

/// Reason attached to blocks created by the failure counter.
const AUTO_BLOCK_REASON: &str = "automatic: excessive failures";

/// Thresholds and durations governing failure accounting.
#[derive(Debug, Clone)]
pub struct ReputationPolicy {
    /// Width of the failure window.
    pub failure_window: Duration,
    /// In-window failures after which further attempts are refused.
    pub rate_limit_failures: usize,
    /// In-window failures that trigger an automatic block.
    pub auto_block_failures: usize,
    /// How long a block lasts.
    pub block_duration: Duration,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            failure_window: Duration::from_secs(300),
            rate_limit_failures: 10,
            auto_block_failures: 20,
            block_duration: Duration::from_secs(3600),
        }
    }
}

impl ReputationPolicy {
    pub fn from_settings(security: &SecurityConfig) -> Self {
        Self {
            failure_window: Duration::from_secs(security.failure_window_seconds),
            rate_limit_failures: security.rate_limit_failures,
            auto_block_failures: security.auto_block_failures,
            block_duration: Duration::from_secs(security.block_duration_seconds),
        }
    }
}

/// A blocked source address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedAddress {
    /// When the block was created, unix seconds.
    pub blocked_at: i64,
    /// Why it was created.
    pub reason: String,
    /// When it lapses, unix seconds.
    pub expires_at: i64,
}

#[derive(Default)]
struct ReputationState {
    failures: HashMap<IpAddr, Vec<Instant>>,
    blocked: HashMap<IpAddr, BlockedAddress>,
}

/// Tracks failure history and blocks per source address.
pub struct IpReputationTracker {
    state: Mutex<ReputationState>,
    policy: ReputationPolicy,
    path: PathBuf,
}

impl IpReputationTracker {
    /// Load the block list from disk, starting empty if the file is absent
    /// or unreadable. Failure windows always start empty.
    pub fn load(path: impl Into<PathBuf>, policy: ReputationPolicy) -> Self {
        let path = path.into();
        let blocked: HashMap<IpAddr, BlockedAddress> = store::load_or_default(&path);
        Self {
            state: Mutex::new(ReputationState {
                failures: HashMap::new(),
                blocked,
            }),
            policy,
            path,
        }
    }

    /// Record an authentication failure for a source address.
    ///
    /// When the in-window count reaches the auto-block threshold the address
    /// is blocked and the block list persisted. The in-memory block stands
    /// even if persistence fails; losing it on restart is the lesser evil
    /// next to ignoring an active brute-force source.
    pub fn record_failure(&self, addr: IpAddr) {
        let now = Instant::now();
        let mut state = self.lock();

        let count = {
            let window = self.policy.failure_window;
            let entry = state.failures.entry(addr).or_default();
            entry.retain(|&t| now.duration_since(t) < window);
            entry.push(now);
            entry.len()
        };

        if count >= self.policy.auto_block_failures && !state.blocked.contains_key(&addr) {
            let blocked_at = Utc::now().timestamp();
            state.blocked.insert(
                addr,
                BlockedAddress {
                    blocked_at,
                    reason: AUTO_BLOCK_REASON.to_string(),
                    expires_at: blocked_at + self.policy.block_duration.as_secs() as i64,
                },
            );
            state.failures.remove(&addr);

            warn!(address = %addr, failures = count, "Address automatically blocked");
            if let Err(e) = self.persist_blocked(&state) {
                warn!(address = %addr, error = %e, "Failed to persist automatic block");
            }
        }
    }

    /// Whether a source address is currently blocked.
    ///
    /// Expired entries are evicted here rather than waiting for the sweep.
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        let now = Utc::now().timestamp();
        let mut state = self.lock();

        match state.blocked.get(&addr) {
            Some(block) if block.expires_at > now => true,
            Some(_) => {
                state.blocked.remove(&addr);
                if let Err(e) = self.persist_blocked(&state) {
                    warn!(address = %addr, error = %e, "Failed to persist block expiry");
                }
                false
            }
            None => false,
        }
    }

    /// Whether a source address has accumulated enough in-window failures to
    /// be refused before any verification work is done.
    pub fn rate_limited(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        let window = self.policy.failure_window;

        match state.failures.get_mut(&addr) {
            Some(times) => {
                times.retain(|&t| now.duration_since(t) < window);
                times.len() >= self.policy.rate_limit_failures
            }
            None => false,
        }
    }

    /// Block an address explicitly, bypassing the automatic counters.
    ///
    /// Persisted before returning; a persistence failure is the caller's to
    /// handle because an unpersisted block is a silent security regression.
    pub fn block(&self, addr: IpAddr, reason: impl Into<String>) -> Result<(), BridgeError> {
        let blocked_at = Utc::now().timestamp();
        let mut state = self.lock();
        state.blocked.insert(
            addr,
            BlockedAddress {
                blocked_at,
                reason: reason.into(),
                expires_at: blocked_at + self.policy.block_duration.as_secs() as i64,
            },
        );
        self.persist_blocked(&state)
    }

    /// Lift a block explicitly.
    pub fn unblock(&self, addr: IpAddr) -> Result<(), BridgeError> {
        let mut state = self.lock();
        state.blocked.remove(&addr);
        self.persist_blocked(&state)
    }

    /// Details of an active block, if any.
    pub fn blocked_info(&self, addr: IpAddr) -> Option<BlockedAddress> {
        self.lock().blocked.get(&addr).cloned()
    }

    /// In-window failure count for an address.
    pub fn failure_count(&self, addr: IpAddr) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let window = self.policy.failure_window;
        match state.failures.get_mut(&addr) {
            Some(times) => {
                times.retain(|&t| now.duration_since(t) < window);
                times.len()
            }
            None => 0,
        }
    }

    /// Evict expired blocks and stale failure windows.
    ///
    /// Lookups are self-correcting via lazy expiry; this pass only bounds
    /// memory growth.
    pub fn sweep(&self) {
        let now_wall = Utc::now().timestamp();
        let now = Instant::now();
        let mut state = self.lock();
        let window = self.policy.failure_window;

        let before = state.blocked.len();
        state.blocked.retain(|_, block| block.expires_at > now_wall);
        let evicted = before - state.blocked.len();

        state.failures.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) < window);
            !times.is_empty()
        });

        if evicted > 0 {
            if let Err(e) = self.persist_blocked(&state) {
                warn!(error = %e, "Failed to persist sweep results");
            }
        }
    }

    /// Start a background sweep task.
    pub fn start_sweep_task(self: &std::sync::Arc<Self>, interval: Duration) {
        let tracker = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                tracker.sweep();
            }
        });
    }

    fn persist_blocked(&self, state: &ReputationState) -> Result<(), BridgeError> {
        store::save_atomic(&self.path, &state.blocked)
    }

    fn lock(&self) -> MutexGuard<'_, ReputationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
