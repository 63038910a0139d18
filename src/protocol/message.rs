//! Client message types.
//!
//! The set of messages a client may send is closed: every frame must parse
//! into exactly one of these tagged variants, and the dispatcher matches
//! over them exhaustively.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BridgeError, ProtocolErrorKind};

/// A message from a client, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Credential presentation. The only message an unauthenticated
    /// connection may usefully send.
    Auth { token: String },

    /// A command for the dispatcher, with a caller-chosen correlation id.
    Command {
        id: Uuid,
        name: String,
        #[serde(default)]
        params: serde_json::Value,
    },

    /// Liveness probe.
    Ping,
}

impl ClientMessage {
    /// Parse a frame payload into a message.
    pub fn parse(bytes: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(bytes).map_err(|e| BridgeError::Protocol {
            kind: ProtocolErrorKind::InvalidMessageFormat {
                message: format!("Invalid JSON: {}", e),
            },
        })
    }

    /// Message kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Command { .. } => "command",
            Self::Ping => "ping",
        }
    }
}
