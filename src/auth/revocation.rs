//! Revocation ledger.
//!
//! Tracks invalidated token identifiers plus a ledger-wide "revoked before"
//! marker, and keeps a last-used timestamp per token for audit. Entries are
//! append-only within a process lifetime and the full set is written to disk
//! on every mutation, so a restart reproduces the same answers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store;
use crate::error::BridgeError;

/// A single ledger record.
///
/// A record with `revoked_at` unset is a pure usage record: the token has
/// been seen by a successful verification but never revoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    /// Every token issued at or before this unix timestamp is revoked,
    /// whether or not its identifier was ever seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_before: Option<i64>,
    #[serde(default)]
    entries: HashMap<String, LedgerEntry>,
}

/// Persistent set of invalidated token identifiers.
pub struct RevocationLedger {
    state: Mutex<LedgerState>,
    path: PathBuf,
}

impl RevocationLedger {
    /// Load the ledger from disk, starting empty if the file is absent or
    /// unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = store::load_or_default(&path);
        Self {
            state: Mutex::new(state),
            path,
        }
    }

    /// Revoke a single token identifier.
    ///
    /// The ledger is persisted before this returns; a persistence failure is
    /// surfaced to the caller because an unpersisted revocation would
    /// silently disappear on restart.
    pub fn revoke(&self, token_id: &str, reason: impl Into<String>) -> Result<(), BridgeError> {
        let mut state = self.lock();
        let entry = state.entries.entry(token_id.to_string()).or_default();
        entry.revoked_at = Some(Utc::now().timestamp());
        entry.reason = Some(reason.into());
        store::save_atomic(&self.path, &*state)
    }

    /// Revoke every token issued up to now.
    ///
    /// Sets the revoked-before marker and individually marks every tracked
    /// identifier, so both seen and never-seen tokens are caught.
    pub fn revoke_all(&self, reason: impl Into<String>) -> Result<(), BridgeError> {
        let now = Utc::now().timestamp();
        let reason = reason.into();
        let mut state = self.lock();

        state.revoked_before = Some(state.revoked_before.map_or(now, |prev| prev.max(now)));
        for entry in state.entries.values_mut() {
            if entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                entry.reason = Some(reason.clone());
            }
        }

        store::save_atomic(&self.path, &*state)
    }

    /// Whether a token is revoked, either by identifier or because it was
    /// issued at or before the revoked-before marker.
    pub fn is_revoked(&self, token_id: &str, issued_at: i64) -> bool {
        let state = self.lock();
        if let Some(marker) = state.revoked_before {
            if issued_at <= marker {
                return true;
            }
        }
        state
            .entries
            .get(token_id)
            .is_some_and(|e| e.revoked_at.is_some())
    }

    /// Record a successful use of a token.
    ///
    /// Usage records are audit metadata; a failed write is logged rather
    /// than propagated so a disk hiccup cannot fail an otherwise valid
    /// authentication.
    pub fn touch_last_used(&self, token_id: &str) {
        let mut state = self.lock();
        let entry = state.entries.entry(token_id.to_string()).or_default();
        entry.last_used = Some(Utc::now().timestamp());

        if let Err(e) = store::save_atomic(&self.path, &*state) {
            warn!(token_id = %token_id, error = %e, "Failed to persist token usage record");
        }
    }

    /// Last successful use of a token, if it has ever been seen.
    pub fn last_used(&self, token_id: &str) -> Option<i64> {
        self.lock().entries.get(token_id).and_then(|e| e.last_used)
    }

    /// Number of tracked token identifiers.
    pub fn tracked(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(temp: &TempDir) -> RevocationLedger {
        RevocationLedger::load(temp.path().join("revocations.json"))
    }

    #[test]
    fn test_unknown_token_not_revoked() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        assert!(!ledger.is_revoked("nope", Utc::now().timestamp()));
    }

    #[test]
    fn test_revoke_marks_token() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        ledger.revoke("tok-1", "operator request").unwrap();
        assert!(ledger.is_revoked("tok-1", Utc::now().timestamp()));
        assert!(!ledger.is_revoked("tok-2", Utc::now().timestamp()));
    }

    #[test]
    fn test_revoke_all_marks_unseen_identifiers() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        let issued_at = Utc::now().timestamp();
        ledger.revoke_all("bulk").unwrap();

        // Never tracked, but issued before the marker.
        assert!(ledger.is_revoked("never-seen", issued_at));
        // Issued after the marker.
        assert!(!ledger.is_revoked("future-token", issued_at + 10));
    }

    #[test]
    fn test_revoke_all_marks_tracked_identifiers() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        ledger.touch_last_used("tok-used");
        ledger.revoke_all("bulk").unwrap();

        assert!(ledger.is_revoked("tok-used", Utc::now().timestamp() + 10));
    }

    #[test]
    fn test_touch_last_used_records_timestamp() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);

        assert!(ledger.last_used("tok-1").is_none());
        ledger.touch_last_used("tok-1");
        assert!(ledger.last_used("tok-1").is_some());
        assert!(!ledger.is_revoked("tok-1", Utc::now().timestamp()));
    }

    #[test]
    fn test_state_survives_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("revocations.json");

        {
            let ledger = RevocationLedger::load(&path);
            ledger.revoke("tok-1", "before restart").unwrap();
            ledger.revoke_all("and everything older").unwrap();
        }

        let reloaded = RevocationLedger::load(&path);
        assert!(reloaded.is_revoked("tok-1", Utc::now().timestamp()));
        assert!(reloaded.is_revoked("unseen", Utc::now().timestamp() - 10));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("revocations.json");
        std::fs::write(&path, b"{broken").unwrap();

        let ledger = RevocationLedger::load(&path);
        assert_eq!(ledger.tracked(), 0);
        assert!(!ledger.is_revoked("tok-1", Utc::now().timestamp()));
    }
}
