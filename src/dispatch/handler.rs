//! Command handler trait and execution context.

use std::net::IpAddr;

use uuid::Uuid;

use crate::auth::ClientInfo;
use crate::error::BridgeError;

/// Context for a command execution: who is asking, from where, on which
/// session.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Connection session identifier.
    pub session_id: Uuid,
    /// Source address of the connection.
    pub source: IpAddr,
    /// Client metadata from the authenticated credential.
    pub client: ClientInfo,
}

/// A command the bridge can route an authenticated message to.
///
/// This is the extension point for the external command layer: register an
/// implementation per command name.
pub trait CommandHandler: Send + Sync {
    /// Unique command identifier clients use in the `name` field.
    fn name(&self) -> &'static str;

    /// Execute the command and produce its response data.
    fn execute(
        &self,
        ctx: &DispatchContext,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError>;
}
