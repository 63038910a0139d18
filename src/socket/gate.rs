//! Per-connection state machine.
//!
//! Every connection starts `Unauthenticated` and must present a valid
//! credential before anything else it sends is eligible for dispatch.
//! Authenticated traffic is metered by the connection's rate limiter.
//! `Closed` is terminal.

use std::net::IpAddr;
use std::sync::Arc;

use uuid::Uuid;

use super::rate_limit::ConnectionRateLimiter;
use crate::auth::{AuthenticationManager, Claims};
use crate::error::{AuthErrorKind, BridgeError};
use crate::protocol::ClientMessage;

/// Connection authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// What the connection handler should do with a message.
#[derive(Debug)]
pub enum GateOutcome {
    /// Credential accepted; the gate is now open.
    AuthAccepted(Box<Claims>),
    /// Credential rejected. `disconnect` is set when the source is blocked
    /// and the transport must be torn down.
    AuthRejected {
        kind: AuthErrorKind,
        disconnect: bool,
    },
    /// Message approved for the dispatcher.
    Dispatch {
        id: Uuid,
        name: String,
        params: serde_json::Value,
    },
    /// Liveness probe from an authenticated connection.
    Pong,
    /// Message rejected without a state change.
    Rejected {
        code: &'static str,
        detail: String,
    },
    /// Message exceeded the connection's rate allowance.
    RateLimited,
}

/// Per-connection gate tying authentication and rate limiting together.
pub struct ConnectionGate {
    session_id: Uuid,
    source: IpAddr,
    state: GateState,
    auth: Arc<AuthenticationManager>,
    limiter: ConnectionRateLimiter,
    claims: Option<Claims>,
}

impl ConnectionGate {
    pub fn new(
        session_id: Uuid,
        source: IpAddr,
        auth: Arc<AuthenticationManager>,
        limiter: ConnectionRateLimiter,
    ) -> Self {
        Self {
            session_id,
            source,
            state: GateState::Unauthenticated,
            auth,
            limiter,
            claims: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == GateState::Authenticated
    }

    /// Claims of the credential this connection authenticated with.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Feed one parsed message through the gate.
    pub fn on_message(&mut self, msg: ClientMessage) -> GateOutcome {
        match self.state {
            GateState::Closed => GateOutcome::Rejected {
                code: "CONNECTION_CLOSED",
                detail: "connection is closed".to_string(),
            },
            GateState::Unauthenticated => self.on_unauthenticated(msg),
            GateState::Authenticated => self.on_authenticated(msg),
        }
    }

    /// Transition to `Closed`, releasing connection-local state.
    pub fn close(&mut self) {
        self.state = GateState::Closed;
        self.claims = None;
    }

    fn on_unauthenticated(&mut self, msg: ClientMessage) -> GateOutcome {
        match msg {
            ClientMessage::Auth { token } => match self.auth.authenticate(&token, self.source) {
                Ok(claims) => {
                    self.state = GateState::Authenticated;
                    self.claims = Some(claims.clone());
                    GateOutcome::AuthAccepted(Box::new(claims))
                }
                Err(BridgeError::Auth {
                    kind: AuthErrorKind::Blocked,
                }) => GateOutcome::AuthRejected {
                    kind: AuthErrorKind::Blocked,
                    disconnect: true,
                },
                Err(BridgeError::Auth { kind }) => {
                    // The failure just recorded may have tipped the source
                    // over the auto-block threshold; close right away
                    // instead of waiting for its next attempt.
                    if self.auth.reputation().is_blocked(self.source) {
                        GateOutcome::AuthRejected {
                            kind: AuthErrorKind::Blocked,
                            disconnect: true,
                        }
                    } else {
                        GateOutcome::AuthRejected {
                            kind,
                            disconnect: false,
                        }
                    }
                }
                Err(_) => GateOutcome::AuthRejected {
                    kind: AuthErrorKind::Invalid,
                    disconnect: false,
                },
            },
            other => {
                // Probing the command surface without a credential counts
                // toward the same failure window as bad credentials.
                self.auth.record_violation(self.source);
                GateOutcome::Rejected {
                    code: "NOT_AUTHENTICATED",
                    detail: format!("received '{}' before authentication", other.kind()),
                }
            }
        }
    }

    fn on_authenticated(&mut self, msg: ClientMessage) -> GateOutcome {
        if let ClientMessage::Auth { .. } = msg {
            return GateOutcome::Rejected {
                code: "ALREADY_AUTHENTICATED",
                detail: "redundant credential message".to_string(),
            };
        }

        if !self.limiter.allow() {
            return GateOutcome::RateLimited;
        }

        match msg {
            ClientMessage::Command { id, name, params } => {
                GateOutcome::Dispatch { id, name, params }
            }
            ClientMessage::Ping => GateOutcome::Pong,
            ClientMessage::Auth { .. } => unreachable!("handled above"),
        }
    }
}
