//! Content digests and the sibling metadata file written next to the mirror.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MirrorError, Result};

/// Metadata written alongside `issues.jsonl` after every export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorMetadata {
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub record_count: usize,
    pub digest: String,
}

/// Name of the mirror file inside the mirror directory.
pub const MIRROR_FILE_NAME: &str = "issues.jsonl";
/// Name of the sibling metadata file.
pub const METADATA_FILE_NAME: &str = "metadata.json";
/// Name of the deletions record file.
pub const DELETIONS_FILE_NAME: &str = "deletions.jsonl";

/// Computes a SHA-256 hex digest over raw file bytes.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Reads and parses the sibling metadata file, if present.
pub fn read_metadata(mirror_dir: &Path) -> Result<Option<MirrorMetadata>> {
    let path = mirror_dir.join(METADATA_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let metadata: MirrorMetadata =
        serde_json::from_str(&content).map_err(|e| MirrorError::Metadata(e.to_string()))?;
    Ok(Some(metadata))
}

/// Writes the sibling metadata file.
pub fn write_metadata(mirror_dir: &Path, metadata: &MirrorMetadata) -> Result<()> {
    let path = mirror_dir.join(METADATA_FILE_NAME);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| MirrorError::Metadata(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}
