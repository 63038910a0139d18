//! JSON persistence helpers for authentication state files.
//!
//! Reads fall back to an empty default so a missing or corrupt state file
//! degrades the daemon to reduced history instead of refusing to start.
//! Writes go through a temp file and rename so a crash mid-write never
//! leaves a truncated state file behind.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::BridgeError;

/// Load a JSON state file, returning the default value if it is absent,
/// unreadable, or corrupt. Anything other than a clean load is surfaced
/// as a warning.
pub(crate) fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read state file, starting with empty state"
            );
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "State file is corrupt, starting with empty state"
            );
            T::default()
        }
    }
}

/// Serialize a value as JSON and atomically replace the state file.
///
/// The file is written with owner-only permissions before it is moved into
/// place.
pub(crate) fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BridgeError::Persistence {
            message: format!(
                "Failed to create state directory {}: {}",
                parent.display(),
                e
            ),
        })?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|e| BridgeError::Persistence {
        message: format!("Failed to serialize state for {}: {}", path.display(), e),
    })?;

    let tmp = path.with_extension("tmp");
    write_owner_only(&tmp, &json).map_err(|e| BridgeError::Persistence {
        message: format!("Failed to write {}: {}", tmp.display(), e),
    })?;

    std::fs::rename(&tmp, path).map_err(|e| BridgeError::Persistence {
        message: format!(
            "Failed to move {} into place at {}: {}",
            tmp.display(),
            path.display(),
            e
        ),
    })?;

    Ok(())
}

/// Write a file readable and writable only by the owning user.
pub(crate) fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_data()?;
    Ok(())
}
