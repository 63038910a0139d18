//! Audit entry types.

use serde::Serialize;

use super::sanitize::sanitize_detail;

/// Security events worth a durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    TokenIssued,
    AuthSucceeded,
    AuthRejected,
    ProtocolViolation,
    TokenRevoked,
    AllTokensRevoked,
    AddressBlocked,
    AddressUnblocked,
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp of the event.
    pub timestamp: String,
    /// What happened.
    pub event: AuditEvent,
    /// Source address, for network-triggered events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Token identifier, where one is involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// Outcome or reason code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Additional structured detail, sanitized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
            source: None,
            token_id: None,
            reason: None,
            detail: None,
        }
    }

    pub fn with_source(mut self, source: impl ToString) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(sanitize_detail(&detail));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_serialization() {
        let entry = AuditEntry::new(AuditEvent::AuthRejected)
            .with_source("192.0.2.7")
            .with_reason("AUTH_INVALID");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event\":\"auth_rejected\""));
        assert!(json.contains("\"source\":\"192.0.2.7\""));
        assert!(json.contains("\"reason\":\"AUTH_INVALID\""));
        assert!(!json.contains("\"detail\""));
    }

    #[test]
    fn test_detail_is_sanitized() {
        let entry = AuditEntry::new(AuditEvent::AuthSucceeded)
            .with_detail(json!({"name": "tui", "token": "eyJhbGciOi..."}));

        let detail = entry.detail.unwrap();
        assert_eq!(detail["name"], "tui");
        assert_eq!(detail["token"], "[REDACTED]");
    }
}
