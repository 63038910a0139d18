//! Central authentication authority.
//!
//! Owns the token service, the revocation ledger, and the per-source
//! reputation tracker. Every authentication attempt flows through here:
//! blocked sources are refused before any signature work, rate-limited
//! sources are slowed down, and verification failures feed back into the
//! failure accounting that can escalate to an automatic block.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::reputation::IpReputationTracker;
use super::revocation::RevocationLedger;
use super::token::{Claims, ClientInfo, IssuedToken, TokenService};
use crate::audit::{AuditEntry, AuditEvent, AuditLogger};
use crate::error::{AuthErrorKind, BridgeError};

/// Orchestrates issuance, verification, revocation, and blocking.
pub struct AuthenticationManager {
    tokens: TokenService,
    reputation: Arc<IpReputationTracker>,
    ledger: Arc<RevocationLedger>,
    audit: Option<Arc<AuditLogger>>,
}

impl AuthenticationManager {
    pub fn new(
        tokens: TokenService,
        reputation: Arc<IpReputationTracker>,
        ledger: Arc<RevocationLedger>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            tokens,
            reputation,
            ledger,
            audit,
        }
    }

    /// Issue a new credential. Host-invoked only; issuance is not reachable
    /// from the network and therefore not rate-limited.
    pub fn request_token(&self, client: ClientInfo) -> Result<IssuedToken, BridgeError> {
        let issued = self.tokens.issue(client)?;

        info!(
            token_id = %issued.claims.jti,
            subject = %issued.claims.sub,
            client = %issued.claims.client.name,
            "Token issued"
        );
        self.record(
            AuditEntry::new(AuditEvent::TokenIssued)
                .with_token_id(issued.claims.jti.clone())
                .with_detail(json!({
                    "name": issued.claims.client.name,
                    "version": issued.claims.client.version,
                    "platform": issued.claims.client.platform,
                })),
        );

        Ok(issued)
    }

    /// Authenticate a presented token from a source address.
    ///
    /// Order matters: a blocked source is refused before any signature
    /// verification, a rate-limited source before any expensive work, and
    /// only genuine verification failures count against the source.
    pub fn authenticate(&self, token: &str, source: IpAddr) -> Result<Claims, BridgeError> {
        if self.reputation.is_blocked(source) {
            self.record(
                AuditEntry::new(AuditEvent::AuthRejected)
                    .with_source(source)
                    .with_reason(AuthErrorKind::Blocked.code()),
            );
            return Err(BridgeError::Auth {
                kind: AuthErrorKind::Blocked,
            });
        }

        if self.reputation.rate_limited(source) {
            self.record(
                AuditEntry::new(AuditEvent::AuthRejected)
                    .with_source(source)
                    .with_reason(AuthErrorKind::TooManyAttempts.code()),
            );
            return Err(BridgeError::Auth {
                kind: AuthErrorKind::TooManyAttempts,
            });
        }

        match self.tokens.verify(token) {
            Ok(claims) => {
                info!(
                    source = %source,
                    token_id = %claims.jti,
                    client = %claims.client.name,
                    "Authentication succeeded"
                );
                self.record(
                    AuditEntry::new(AuditEvent::AuthSucceeded)
                        .with_source(source)
                        .with_token_id(claims.jti.clone()),
                );
                Ok(claims)
            }
            Err(err) => {
                self.reputation.record_failure(source);
                warn!(source = %source, error = %err, "Authentication failed");
                self.record(
                    AuditEntry::new(AuditEvent::AuthRejected)
                        .with_source(source)
                        .with_reason(err.code()),
                );
                Err(err)
            }
        }
    }

    /// Count a non-credential message from an unauthenticated connection
    /// toward the source's failure window.
    pub fn record_violation(&self, source: IpAddr) {
        self.reputation.record_failure(source);
        self.record(
            AuditEntry::new(AuditEvent::ProtocolViolation).with_source(source),
        );
    }

    /// Revoke a single token. Administrative, host-invoked only.
    pub fn revoke_token(&self, token_id: &str, reason: &str) -> Result<(), BridgeError> {
        self.ledger.revoke(token_id, reason)?;
        info!(token_id = %token_id, reason = %reason, "Token revoked");
        self.record(
            AuditEntry::new(AuditEvent::TokenRevoked)
                .with_token_id(token_id)
                .with_reason(reason),
        );
        Ok(())
    }

    /// Revoke every token issued up to now. Administrative, host-invoked only.
    pub fn revoke_all_tokens(&self, reason: &str) -> Result<(), BridgeError> {
        self.ledger.revoke_all(reason)?;
        info!(reason = %reason, "All tokens revoked");
        self.record(AuditEntry::new(AuditEvent::AllTokensRevoked).with_reason(reason));
        Ok(())
    }

    /// Block a source address. Administrative, host-invoked only.
    pub fn block_address(&self, addr: IpAddr, reason: &str) -> Result<(), BridgeError> {
        self.reputation.block(addr, reason)?;
        info!(address = %addr, reason = %reason, "Address blocked");
        self.record(
            AuditEntry::new(AuditEvent::AddressBlocked)
                .with_source(addr)
                .with_reason(reason),
        );
        Ok(())
    }

    /// Lift a block on a source address. Administrative, host-invoked only.
    pub fn unblock_address(&self, addr: IpAddr) -> Result<(), BridgeError> {
        self.reputation.unblock(addr)?;
        info!(address = %addr, "Address unblocked");
        self.record(AuditEntry::new(AuditEvent::AddressUnblocked).with_source(addr));
        Ok(())
    }

    /// The reputation tracker, for sweep-task wiring.
    pub fn reputation(&self) -> &Arc<IpReputationTracker> {
        &self.reputation
    }

    /// The revocation ledger.
    pub fn ledger(&self) -> &Arc<RevocationLedger> {
        &self.ledger
    }

    fn record(&self, entry: AuditEntry) {
        if let Some(logger) = &self.audit {
            if let Err(e) = logger.log(&entry) {
                warn!(error = %e, "Failed to write audit log entry");
            }
        }
    }
}
