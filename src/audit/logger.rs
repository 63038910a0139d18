//! Audit logger for writing audit entries to file.
//!
//! Entries are written as JSON lines (one object per line) and synced after
//! each write for durability.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::BridgeError;

use super::entry::AuditEntry;

/// Logger for audit entries.
///
/// Thread-safe via internal mutex.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Create a new audit logger that appends to the given path, creating
    /// the parent directory if needed.
    pub fn new(path: &Path) -> Result<Self, BridgeError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append an audit entry as a single JSON line.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), BridgeError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        Ok(())
    }

    /// Path of the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_logger_creates_directory() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("subdir/audit.log");

        let logger = AuditLogger::new(&log_path).unwrap();
        assert!(log_path.parent().unwrap().exists());
        assert_eq!(logger.path(), log_path);
    }

    #[test]
    fn test_logger_writes_json_lines() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("audit.log");

        let logger = AuditLogger::new(&log_path).unwrap();
        logger
            .log(
                &AuditEntry::new(AuditEvent::TokenIssued)
                    .with_token_id("tok-1")
                    .with_reason("host request"),
            )
            .unwrap();
        logger
            .log(
                &AuditEntry::new(AuditEvent::AuthRejected)
                    .with_source("192.0.2.9")
                    .with_reason("AUTH_EXPIRED"),
            )
            .unwrap();

        let mut content = String::new();
        File::open(&log_path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "token_issued");
        assert_eq!(first["token_id"], "tok-1");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "auth_rejected");
        assert_eq!(second["reason"], "AUTH_EXPIRED");
    }

    #[test]
    fn test_logger_appends_across_instances() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("audit.log");

        {
            let logger = AuditLogger::new(&log_path).unwrap();
            logger.log(&AuditEntry::new(AuditEvent::AddressBlocked)).unwrap();
        }
        {
            let logger = AuditLogger::new(&log_path).unwrap();
            logger
                .log(&AuditEntry::new(AuditEvent::AddressUnblocked))
                .unwrap();
        }

        let mut content = String::new();
        File::open(&log_path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
