//! Signing secret storage.
//!
//! The secret is 64 bytes from a cryptographically secure source, persisted
//! hex-encoded in a file restricted to owner access and reloaded verbatim on
//! subsequent starts. Rotation atomically overwrites the file, invalidating
//! every previously issued token.

use std::fmt;
use std::path::Path;

use ring::rand::{SecureRandom, SystemRandom};

use super::store;
use crate::error::BridgeError;

/// Length of the signing secret in bytes.
pub const SECRET_LEN: usize = 64;

/// The process-wide signing secret.
#[derive(Clone)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Raw key material for signing and verification.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material must never appear in logs.
        write!(f, "SecretKey({} bytes, redacted)", self.bytes.len())
    }
}

/// Loads, creates, and rotates the persisted signing secret.
pub struct SecretKeyStore;

impl SecretKeyStore {
    /// Load the persisted secret, generating and persisting a fresh one on
    /// first run.
    ///
    /// Security: an existing secret file must be restricted to owner access
    /// (0600 or 0400); anything looser is rejected rather than silently used.
    pub fn load_or_create(path: &Path) -> Result<SecretKey, BridgeError> {
        if path.exists() {
            Self::load(path)
        } else {
            let key = Self::generate_ephemeral()?;
            Self::persist(path, &key)?;
            Ok(key)
        }
    }

    /// Generate a fresh secret and atomically overwrite the persisted one.
    ///
    /// Every token signed with the previous secret becomes invalid.
    pub fn rotate(path: &Path) -> Result<SecretKey, BridgeError> {
        let key = Self::generate_ephemeral()?;
        Self::persist(path, &key)?;
        Ok(key)
    }

    /// Generate a secret without persisting it.
    ///
    /// Used when the store path is unwritable and the caller chooses to keep
    /// running with in-memory-only key material.
    pub fn generate_ephemeral() -> Result<SecretKey, BridgeError> {
        let rng = SystemRandom::new();
        let mut bytes = vec![0u8; SECRET_LEN];
        rng.fill(&mut bytes)
            .map_err(|_| BridgeError::Persistence {
                message: "System random source failed while generating the signing secret"
                    .to_string(),
            })?;
        Ok(SecretKey { bytes })
    }

    fn load(path: &Path) -> Result<SecretKey, BridgeError> {
        let metadata = std::fs::metadata(path).map_err(|e| BridgeError::Persistence {
            message: format!(
                "Failed to read secret file metadata from {}: {}",
                path.display(),
                e
            ),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(BridgeError::Persistence {
                    message: format!(
                        "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                        path.display(),
                        mode & 0o777
                    ),
                });
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        let content = std::fs::read_to_string(path).map_err(|e| BridgeError::Persistence {
            message: format!("Failed to read secret file {}: {}", path.display(), e),
        })?;

        let bytes = hex::decode(content.trim()).map_err(|e| BridgeError::Persistence {
            message: format!("Secret file {} is not valid hex: {}", path.display(), e),
        })?;

        if bytes.len() != SECRET_LEN {
            return Err(BridgeError::Persistence {
                message: format!(
                    "Secret file {} holds {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    SECRET_LEN
                ),
            });
        }

        Ok(SecretKey { bytes })
    }

    fn persist(path: &Path, key: &SecretKey) -> Result<(), BridgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BridgeError::Persistence {
                message: format!(
                    "Failed to create secret directory {}: {}",
                    parent.display(),
                    e
                ),
            })?;
        }

        let encoded = hex::encode(&key.bytes);
        let tmp = path.with_extension("tmp");
        store::write_owner_only(&tmp, encoded.as_bytes()).map_err(|e| {
            BridgeError::Persistence {
                message: format!("Failed to write secret file {}: {}", tmp.display(), e),
            }
        })?;
        std::fs::rename(&tmp, path).map_err(|e| BridgeError::Persistence {
            message: format!(
                "Failed to move secret file into place at {}: {}",
                path.display(),
                e
            ),
        })?;

        Ok(())
    }
}
