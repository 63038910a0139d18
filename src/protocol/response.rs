//! Response types for the bridge protocol.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Map an error code to the message a client is allowed to see.
///
/// Rejections carry a distinguishable reason, but never internal detail:
/// no path names, no timing internals, no secret material.
fn client_message(code: &str) -> String {
    match code {
        "AUTH_INVALID" => "Credential is invalid",
        "AUTH_EXPIRED" => "Credential has expired",
        "AUTH_REVOKED" => "Credential has been revoked",
        "AUTH_WRONG_ORIGIN" => "Credential was not issued for this bridge",
        "AUTH_BLOCKED" => "Source address is blocked",
        "AUTH_TOO_MANY_ATTEMPTS" => "Too many failed attempts, try again later",
        "NOT_AUTHENTICATED" => "Authentication required",
        "ALREADY_AUTHENTICATED" => "Connection is already authenticated",
        "RATE_LIMITED" => "Message rate limit exceeded",
        "MALFORMED_MESSAGE" => "Message could not be parsed",
        "PAYLOAD_TOO_LARGE" => "Message exceeds the maximum allowed size",
        "COMPRESSED_PAYLOAD" => "Compressed payloads are not accepted",
        "UNKNOWN_COMMAND" => "Unknown command",
        "DISPATCH_ERROR" => "Command execution failed",
        _ => "An error occurred",
    }
    .to_string()
}

/// A response from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,

    /// Identifier correlating this response with its request. Responses to
    /// messages without a caller-chosen id get a fresh one.
    pub request_id: Uuid,

    /// Response data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code (e.g. "AUTH_EXPIRED", "RATE_LIMITED").
    pub code: String,

    /// Human-readable, sanitized message.
    pub message: String,
}

impl Response {
    /// Create a success response.
    pub fn success(request_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            success: true,
            request_id,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    ///
    /// The internal message is logged server-side for debugging; the client
    /// sees only the code and its sanitized message.
    pub fn error(request_id: Uuid, code: &str, internal: impl Into<String>) -> Self {
        let internal = internal.into();
        debug!(
            request_id = %request_id,
            code = %code,
            internal = %internal,
            "Error response (sanitized for client)"
        );

        Self {
            success: false,
            request_id,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: client_message(code),
            }),
        }
    }
}
