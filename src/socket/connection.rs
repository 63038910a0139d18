//! Per-connection handler.
//!
//! Drives one connection's gate: reads frames, enforces the authentication
//! deadline, and turns gate outcomes into responses. Frame-level defects
//! (oversized, compressed, malformed) are rejected here, before the gate
//! ever sees them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticationManager;
use crate::config::Settings;
use crate::dispatch::{DispatchContext, DispatchRegistry};
use crate::error::{BridgeError, ProtocolErrorKind};
use crate::protocol::{read_frame, read_frame_with_timeout, write_frame_with_timeout};
use crate::protocol::{ClientMessage, Response};
use crate::socket::{ConnectionGate, ConnectionRateLimiter, GateOutcome};

/// Handle a single client connection.
pub async fn handle_connection(
    stream: TcpStream,
    source: SocketAddr,
    settings: Arc<Settings>,
    auth: Arc<AuthenticationManager>,
    dispatch: Arc<DispatchRegistry>,
) -> Result<(), BridgeError> {
    let session_id = Uuid::new_v4();
    let limiter = ConnectionRateLimiter::new(
        settings.limits.messages_per_window,
        Duration::from_secs(settings.limits.message_window_seconds),
    );
    let mut gate = ConnectionGate::new(session_id, source.ip(), auth, limiter);

    let (mut reader, mut writer) = stream.into_split();
    let max_size = settings.limits.max_message_size;
    let write_timeout = Duration::from_secs(settings.limits.socket_timeout_seconds);
    let auth_deadline =
        Instant::now() + Duration::from_secs(settings.security.auth_deadline_seconds);

    debug!(session_id = %session_id, source = %source, "Connection accepted");

    loop {
        // Unauthenticated connections only get until the deadline; once the
        // gate is open the bridge is persistent and reads block until the
        // client sends something or disconnects.
        let read_result = if gate.is_authenticated() {
            read_frame(&mut reader, max_size).await
        } else {
            let remaining = auth_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!(session_id = %session_id, source = %source, "Authentication deadline elapsed");
                gate.close();
                return Ok(());
            }
            read_frame_with_timeout(&mut reader, max_size, remaining).await
        };

        let frame = match read_result {
            Ok(frame) => frame,
            Err(BridgeError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            }) => {
                debug!(session_id = %session_id, source = %source, "Client disconnected");
                gate.close();
                return Ok(());
            }
            Err(BridgeError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            }) => {
                info!(session_id = %session_id, source = %source, "Authentication deadline elapsed");
                gate.close();
                return Ok(());
            }
            Err(
                err @ BridgeError::Protocol {
                    kind:
                        ProtocolErrorKind::MessageTooLarge { .. }
                        | ProtocolErrorKind::CompressedPayload
                        | ProtocolErrorKind::InvalidMessageFormat { .. },
                },
            ) => {
                // The stream may be desynchronized past this point, so the
                // connection ends after the rejection is sent.
                warn!(session_id = %session_id, source = %source, error = %err, "Frame rejected");
                let response = Response::error(Uuid::new_v4(), err.code(), err.to_string());
                let _ = send(&mut writer, &response, write_timeout).await;
                gate.close();
                return Ok(());
            }
            Err(err) => {
                gate.close();
                return Err(err);
            }
        };

        let msg = match ClientMessage::parse(&frame) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "Malformed message");
                let response = Response::error(Uuid::new_v4(), err.code(), err.to_string());
                send(&mut writer, &response, write_timeout).await?;
                continue;
            }
        };

        debug!(session_id = %session_id, kind = msg.kind(), "Message received");

        match gate.on_message(msg) {
            GateOutcome::AuthAccepted(claims) => {
                info!(
                    session_id = %session_id,
                    source = %source,
                    client = %claims.client.name,
                    "Connection authenticated"
                );
                let response = Response::success(
                    Uuid::new_v4(),
                    json!({
                        "authenticated": true,
                        "session_id": session_id,
                        "expires_at": claims.exp,
                    }),
                );
                send(&mut writer, &response, write_timeout).await?;
            }
            GateOutcome::AuthRejected { kind, disconnect } => {
                let response = Response::error(Uuid::new_v4(), kind.code(), kind.to_string());
                send(&mut writer, &response, write_timeout).await?;
                if disconnect {
                    info!(session_id = %session_id, source = %source, "Closing connection from blocked source");
                    gate.close();
                    return Ok(());
                }
            }
            GateOutcome::Dispatch { id, name, params } => {
                let claims = gate
                    .claims()
                    .ok_or_else(|| BridgeError::Internal {
                        message: "Dispatch outcome without claims".to_string(),
                    })?;
                let ctx = DispatchContext {
                    session_id,
                    source: source.ip(),
                    client: claims.client.clone(),
                };

                let response = match dispatch.dispatch(&ctx, &name, params) {
                    Ok(data) => Response::success(id, data),
                    Err(err) => Response::error(id, err.code(), err.to_string()),
                };
                send(&mut writer, &response, write_timeout).await?;
            }
            GateOutcome::Pong => {
                let response = Response::success(Uuid::new_v4(), json!({"pong": true}));
                send(&mut writer, &response, write_timeout).await?;
            }
            GateOutcome::Rejected { code, detail } => {
                debug!(session_id = %session_id, code = %code, detail = %detail, "Message rejected");
                let response = Response::error(Uuid::new_v4(), code, detail);
                send(&mut writer, &response, write_timeout).await?;
            }
            GateOutcome::RateLimited => {
                warn!(session_id = %session_id, source = %source, "Message rate limit exceeded");
                let err = BridgeError::RateLimitExceeded;
                let response = Response::error(Uuid::new_v4(), err.code(), err.to_string());
                send(&mut writer, &response, write_timeout).await?;
            }
        }
    }
}

async fn send(
    writer: &mut OwnedWriteHalf,
    response: &Response,
    timeout: Duration,
) -> Result<(), BridgeError> {
    let bytes = serde_json::to_vec(response)?;
    write_frame_with_timeout(writer, &bytes, timeout).await
}
