//! Command registry.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::handler::{CommandHandler, DispatchContext};
use crate::error::{BridgeError, DispatchErrorKind};

/// Routes authenticated command messages to their handlers.
pub struct DispatchRegistry {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl DispatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry with the built-in commands registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PingCommand));
        registry
    }

    /// Register a command handler.
    pub fn register(&mut self, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Execute a command by name.
    pub fn dispatch(
        &self,
        ctx: &DispatchContext,
        name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        let handler = self.handlers.get(name).ok_or_else(|| BridgeError::Dispatch {
            kind: DispatchErrorKind::UnknownCommand {
                name: name.to_string(),
            },
        })?;

        debug!(session_id = %ctx.session_id, command = %name, "Dispatching command");
        handler.execute(ctx, params)
    }

    /// Names of all registered commands.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Built-in liveness command.
struct PingCommand;

impl CommandHandler for PingCommand {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn execute(
        &self,
        ctx: &DispatchContext,
        _params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        Ok(json!({
            "pong": true,
            "client": ctx.client.name,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
