//! File-backed model store. One artifact, replaced atomically on every save and read
//! fresh on every load.

use super::atomic::replace_bytes;
use crate::error::{Result, SentinelError};
use crate::model::ModelSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u32,
    saved_at: DateTime<Utc>,
    sha256: String,
    payload: String,
}

fn checksum(payload: &str) -> String {
    let mut h = Sha256::new();
    h.update(payload.as_bytes());
    format!("{:x}", h.finalize())
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the stored snapshot.
    pub fn save(&self, snapshot: &ModelSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        // Non-finite floats serialize as null and would make every later load fail.
        serde_json::from_str::<ModelSnapshot>(&payload).map_err(|e| {
            SentinelError::Persistence(format!("snapshot would not load back: {}", e))
        })?;
        let envelope = SnapshotEnvelope {
            format_version: FORMAT_VERSION,
            saved_at: Utc::now(),
            sha256: checksum(&payload),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;
        replace_bytes(&self.path, &bytes)?;
        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            rows = snapshot.metadata.total_transactions,
            "model snapshot saved"
        );
        Ok(())
    }

    /// Read the current snapshot from disk.
    pub fn load(&self) -> Result<ModelSnapshot> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SentinelError::ModelNotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes).map_err(|e| {
            SentinelError::Persistence(format!("corrupt snapshot {}: {}", self.path.display(), e))
        })?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(SentinelError::Persistence(format!(
                "unsupported snapshot version {} (expected {})",
                envelope.format_version, FORMAT_VERSION
            )));
        }
        if checksum(&envelope.payload) != envelope.sha256 {
            return Err(SentinelError::Persistence(format!(
                "snapshot checksum mismatch in {}",
                self.path.display()
            )));
        }
        let snapshot: ModelSnapshot = serde_json::from_str(&envelope.payload)?;
        debug!(path = %self.path.display(), saved_at = %envelope.saved_at, "model snapshot loaded");
        Ok(snapshot)
    }
}
