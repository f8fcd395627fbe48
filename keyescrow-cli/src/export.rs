//! Writing fetched key material to local files.

use crate::client::{ClientError, Result};
use crate::models::KeyRecord;
use std::path::{Path, PathBuf};

/// `key_<hostname>.txt`, with characters that would leave the target
/// directory replaced by `_`.
pub fn export_file_name(hostname: Option<&str>) -> String {
    let host = hostname.filter(|h| !h.is_empty()).unwrap_or("unknown");
    let safe: String = host
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("key_{}.txt", safe)
}

/// Write the record's key string, byte for byte, into `dir`.
pub fn export_key(record: &KeyRecord, dir: &Path) -> Result<PathBuf> {
    let key = record
        .encryption_key
        .as_deref()
        .ok_or_else(|| ClientError::MissingKey(record.id.clone()))?;

    let path = dir.join(export_file_name(record.hostname.as_deref()));
    std::fs::write(&path, key.as_bytes())?;
    tracing::debug!("Exported key {} to {}", record.id, path.display());
    Ok(path)
}
