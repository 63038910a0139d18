//! Audit logging module.
//!
//! Records security-relevant events (issuance, authentication outcomes,
//! revocations, blocks) as JSON lines for log analysis tooling. Details are
//! sanitized so token material never reaches the audit file.

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEntry, AuditEvent};
pub use logger::AuditLogger;
pub use sanitize::sanitize_detail;
