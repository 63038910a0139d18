//! Token issuance and verification.
//!
//! Credentials are JWTs signed with the process-wide secret under a pinned
//! HS256 algorithm. The algorithm in the token header is validated against
//! the pinned one on every verify, so an attacker cannot substitute a weaker
//! algorithm in the envelope.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::revocation::RevocationLedger;
use super::secret::SecretKey;
use crate::error::{AuthErrorKind, BridgeError};

/// Fixed issuer claim for all tokens minted by this daemon.
pub const ISSUER: &str = "bridgeward";

/// Fixed audience claim for all tokens minted by this daemon.
pub const AUDIENCE: &str = "bridgeward-client";

const PINNED_ALGORITHM: Algorithm = Algorithm::HS256;

/// Client metadata embedded in a token at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

/// The structured fields carried inside a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier, unique per issuance.
    pub sub: String,
    /// Issuer, always [`ISSUER`].
    pub iss: String,
    /// Audience, always [`AUDIENCE`].
    pub aud: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds (issued-at + TTL).
    pub exp: i64,
    /// Token identifier used for revocation and usage tracking.
    pub jti: String,
    /// Client metadata supplied at issuance.
    pub client: ClientInfo,
}

/// A freshly issued credential, plus its claims for display.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded, signed token.
    pub token: String,
    /// The claims embedded in it.
    pub claims: Claims,
}

impl IssuedToken {
    /// Human-readable representation suitable for out-of-band delivery.
    pub fn summary(&self) -> String {
        format!(
            "Token ID:  {}\nSubject:   {}\nClient:    {} {} ({})\nIssued:    {}\nExpires:   {}\n\n{}",
            self.claims.jti,
            self.claims.sub,
            self.claims.client.name,
            self.claims.client.version,
            self.claims.client.platform,
            format_timestamp(self.claims.iat),
            format_timestamp(self.claims.exp),
            self.token
        )
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// Issues and verifies signed credentials.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    ledger: Arc<RevocationLedger>,
}

impl TokenService {
    /// Create a token service over the given secret and revocation ledger.
    pub fn new(secret: &SecretKey, ttl: Duration, ledger: Arc<RevocationLedger>) -> Self {
        let mut validation = Validation::new(PINNED_ALGORITHM);
        // Expiry is exact; the host and its clients share a clock domain.
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            ledger,
        }
    }

    /// Issue a signed token carrying the given client metadata.
    pub fn issue(&self, client: ClientInfo) -> Result<IssuedToken, BridgeError> {
        self.issue_at(client, Utc::now().timestamp())
    }

    fn issue_at(&self, client: ClientInfo, iat: i64) -> Result<IssuedToken, BridgeError> {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat,
            exp: iat + self.ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
            client,
        };

        let token = encode(&Header::new(PINNED_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| BridgeError::Internal {
                message: format!("Failed to sign token: {}", e),
            })?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify a token and return its claims.
    ///
    /// The signature is checked before any claim, so a tampered token is
    /// always `Invalid` regardless of what else is wrong with it. A valid
    /// signature is then checked for expiry, issuer/audience, and revocation,
    /// in that order. Successful verification records a usage timestamp in
    /// the ledger.
    pub fn verify(&self, token: &str) -> Result<Claims, BridgeError> {
        let data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                let kind = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthErrorKind::Expired,
                    ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                        AuthErrorKind::WrongOrigin
                    }
                    _ => AuthErrorKind::Invalid,
                };
                BridgeError::Auth { kind }
            })?;

        let claims = data.claims;

        if self.ledger.is_revoked(&claims.jti, claims.iat) {
            return Err(BridgeError::Auth {
                kind: AuthErrorKind::Revoked,
            });
        }

        self.ledger.touch_last_used(&claims.jti);

        Ok(claims)
    }
}
